use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default location of the provenance log.
pub const DEFAULT_ORIGINS_FILE: &str = "/tmp/variant-origins.txt";

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(
    author,
    version,
    about = "Rebuild and search the Galaxy Beacon variant store"
)]
#[command(after_help = "Examples:
  beacon rebuild --galaxy-url https://usegalaxy.eu --store-origins
  beacon search sequence --reference-bases A --alternate-bases G --start 43044294
  beacon search individuals -f sex=NCIT:C16576 --explain
  beacon origins --index 1042
  beacon stats")]
pub struct Config {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Settings file (default: <config dir>/beacon/beacon.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delete the store content and re-import every shared Galaxy dataset
    #[command(after_help = "Example: beacon rebuild --store-origins --deadline 14400")]
    Rebuild(RebuildArgs),

    /// Search variants or entity collections
    #[command(subcommand)]
    Search(SearchKind),

    /// Show which Galaxy datasets contributed a stored variant
    Origins {
        /// Provenance log written by `rebuild --store-origins`
        #[arg(long, value_name = "PATH", default_value = DEFAULT_ORIGINS_FILE)]
        origins_file: PathBuf,

        /// Storage index of the variant record
        #[arg(long)]
        index: i64,
    },

    /// Show per-dataset variant and call counts
    Stats,
}

#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// Galaxy instance URL
    #[arg(long, env = "GALAXY_URL")]
    pub galaxy_url: Option<String>,

    /// Galaxy API key of an admin user
    #[arg(long, env = "GALAXY_API_KEY", hide_env_values = true)]
    pub galaxy_key: Option<String>,

    /// Record which dataset each variant came from
    #[arg(long)]
    pub store_origins: bool,

    /// Provenance log location
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ORIGINS_FILE)]
    pub origins_file: PathBuf,

    /// Directory for downloaded working files
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Timeout for a single remote call, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Time budget for the whole rebuild, in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

/// Options shared by every search.
#[derive(Args, Debug, Default, Clone)]
pub struct SearchTarget {
    /// Collection to search (default depends on the query kind)
    #[arg(long)]
    pub collection: Option<String>,

    /// Print the compiled filter instead of running it
    #[arg(long)]
    pub explain: bool,

    /// Stop after this many documents
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum SearchKind {
    /// Variant at an exact position
    Sequence(SequenceArgs),
    /// Variants inside a position range
    Range(RangeArgs),
    /// Variants of a gene
    Gene(GeneArgs),
    /// Variants whose start and end fall in two brackets
    Bracket(BracketArgs),
    Analyses(EntityArgs),
    Biosamples(EntityArgs),
    Cohorts(EntityArgs),
    Datasets(EntityArgs),
    Individuals(EntityArgs),
    Runs(EntityArgs),
    StructuralVariants(EntityArgs),
}

#[derive(Args, Debug, Default)]
pub struct SequenceArgs {
    #[arg(long, alias = "referenceName")]
    pub reference_name: Option<String>,
    /// 0-based start position
    #[arg(long)]
    pub start: Option<i64>,
    #[arg(long, alias = "referenceBases")]
    pub reference_bases: Option<String>,
    #[arg(long, alias = "alternateBases")]
    pub alternate_bases: Option<String>,
    /// Comma-separated biosample ids
    #[arg(long, alias = "collectionIds", value_delimiter = ',')]
    pub collection_ids: Vec<String>,
    #[command(flatten)]
    pub target: SearchTarget,
}

#[derive(Args, Debug, Default)]
pub struct RangeArgs {
    #[arg(long, alias = "referenceName")]
    pub reference_name: Option<String>,
    /// Lowest start position (inclusive)
    #[arg(long)]
    pub start: Option<i64>,
    /// Highest end position (inclusive)
    #[arg(long)]
    pub end: Option<i64>,
    #[command(flatten)]
    pub variant: VariantFilters,
    #[command(flatten)]
    pub target: SearchTarget,
}

#[derive(Args, Debug, Default)]
pub struct GeneArgs {
    #[arg(long, alias = "geneId")]
    pub gene_id: Option<String>,
    #[command(flatten)]
    pub variant: VariantFilters,
    #[command(flatten)]
    pub target: SearchTarget,
}

/// Optional filters shared by range and gene queries.
#[derive(Args, Debug, Default)]
pub struct VariantFilters {
    #[arg(long, alias = "variantType")]
    pub variant_type: Option<String>,
    #[arg(long, alias = "alternateBases")]
    pub alternate_bases: Option<String>,
    #[arg(long, alias = "aminoacidChange")]
    pub aminoacid_change: Option<String>,
    #[arg(long, alias = "variantMinLength")]
    pub variant_min_length: Option<i64>,
    #[arg(long, alias = "variantMaxLength")]
    pub variant_max_length: Option<i64>,
}

#[derive(Args, Debug, Default)]
pub struct BracketArgs {
    #[arg(long, alias = "referenceName")]
    pub reference_name: Option<String>,
    #[arg(long, alias = "startMinimum")]
    pub start_minimum: Option<i64>,
    #[arg(long, alias = "startMaximum")]
    pub start_maximum: Option<i64>,
    #[arg(long, alias = "endMinimum")]
    pub end_minimum: Option<i64>,
    #[arg(long, alias = "endMaximum")]
    pub end_maximum: Option<i64>,
    #[arg(long, alias = "variantType")]
    pub variant_type: Option<String>,
    #[command(flatten)]
    pub target: SearchTarget,
}

#[derive(Args, Debug, Default)]
pub struct EntityArgs {
    /// Entity id
    #[arg(long)]
    pub id: Option<String>,
    /// Field filter, repeatable
    #[arg(short = 'f', long = "filter", value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,
    #[command(flatten)]
    pub target: SearchTarget,
}
