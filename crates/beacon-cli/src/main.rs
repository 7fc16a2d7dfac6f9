use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use beacon_cli::{report, Command, Config, RebuildArgs, SearchKind};
use beacon_client::GalaxyClient;
use beacon_core::provenance;
use beacon_core::query::{Filter, QueryTranslator};
use beacon_core::{
    load_settings, AppError, CallGuard, DbConfig, DocumentStore, Reconciler, Settings,
    TracingReporter,
};
use beacon_db::PgDocumentStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    let config = match Config::try_parse() {
        Ok(config) => config,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(config.verbose);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current call");
            token.cancel();
        }
    });

    match run(config, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let app_error = err.chain().find_map(|e| e.downcast_ref::<AppError>());
            match app_error {
                Some(app) => error!("{:#}\n   {}", err, app.user_message()),
                None => error!("{:#}", err),
            }
            ExitCode::from(app_error.map(AppError::exit_code).unwrap_or(1))
        }
    }
}

/// Logs to stderr so stdout stays clean for search output.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }
}

async fn run(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let settings = load_settings(config.config.as_deref()).context("Failed to load settings")?;
    let database_url = config.database_url;

    match config.command {
        Command::Rebuild(args) => {
            rebuild(required(database_url, "database-url")?, &settings, args, cancel).await
        }
        Command::Search(kind) => search(database_url, kind).await,
        Command::Origins {
            origins_file,
            index,
        } => origins(&origins_file, index).await,
        Command::Stats => show_stats(required(database_url, "database-url")?, &settings).await,
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::MissingParameter(name.to_string()))
}

async fn connect_store(database_url: &str) -> anyhow::Result<PgDocumentStore> {
    info!("Connecting to database...");
    let store = PgDocumentStore::connect(database_url, &DbConfig::default())
        .await
        .context("Failed to connect to database")?;
    Ok(store)
}

/// Rebuild the store from the shared Galaxy datasets
async fn rebuild(
    database_url: String,
    settings: &Settings,
    args: RebuildArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let galaxy_url = required(args.galaxy_url.or(settings.galaxy.url.clone()), "galaxy-url")?;
    let galaxy_key = required(args.galaxy_key, "galaxy-key")?;

    let mut import = settings.import_config();
    if let Some(dir) = args.work_dir {
        import.work_dir = dir;
    }
    let mut guard_config = settings.guard_config();
    if let Some(secs) = args.timeout.filter(|s| *s > 0) {
        guard_config.call_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.deadline.filter(|s| *s > 0) {
        guard_config.deadline = Some(Duration::from_secs(secs));
    }

    let galaxy = GalaxyClient::new(&galaxy_url, &galaxy_key).context("Invalid Galaxy URL")?;
    let store = connect_store(&database_url).await?;
    store
        .ensure_schema()
        .await
        .context("Failed to prepare the document table")?;

    let guard = CallGuard::new(&guard_config, cancel);
    let mut reconciler = Reconciler::new(&galaxy, &store, import, guard);
    if args.store_origins {
        info!("Recording variant origins in {}", args.origins_file.display());
        reconciler = reconciler.with_origins_file(&args.origins_file);
    }

    let summary = reconciler
        .rebuild_with_progress(&TracingReporter)
        .await
        .context("Rebuild failed")?;

    println!("\nRebuild complete\n");
    println!("  Collections:        {}", summary.collections);
    println!("  Datasets imported:  {}", summary.imported);
    println!("  Datasets skipped:   {}", summary.failed);
    println!("  Variant records:    {}", summary.records);
    if args.store_origins {
        println!("  Provenance lines:   {}", summary.provenance_lines);
    }
    println!();

    Ok(())
}

/// Search a collection and print matching documents as JSON lines
async fn search(database_url: Option<String>, kind: SearchKind) -> anyhow::Result<()> {
    let criteria = kind.criteria()?;
    let collection = kind.collection();
    let target = kind.target();
    let translator = QueryTranslator::new(criteria.kind());
    translator.validate(&collection, &criteria)?;

    if target.explain {
        let filter = translator.compile(&criteria)?;
        let explained = json!({
            "kind": criteria.kind().name(),
            "collection": collection,
            "filter": filter.to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&explained)?);
        return Ok(());
    }

    let store = connect_store(&required(database_url, "database-url")?).await?;
    let mut results = translator.search(&store, &collection, &criteria)?;

    let mut found = 0usize;
    while let Some(doc) = results.try_next().await? {
        println!("{}", serde_json::to_string(&doc.body)?);
        found += 1;
        if target.limit.is_some_and(|limit| found >= limit) {
            break;
        }
    }
    info!("{} document(s) found in {}", found, collection);

    Ok(())
}

/// Print the provenance entries of one storage index
async fn origins(origins_file: &std::path::Path, index: i64) -> anyhow::Result<()> {
    let entries = provenance::lookup(origins_file, index)
        .await
        .with_context(|| format!("Failed to read {}", origins_file.display()))?;

    if entries.is_empty() {
        println!("No recorded origins for index {}", index);
    }
    for entry in entries {
        println!("{}", entry);
    }
    Ok(())
}

/// Show dataset counts and collection sizes
async fn show_stats(database_url: String, settings: &Settings) -> anyhow::Result<()> {
    let import = settings.import_config();
    let store = connect_store(&database_url).await?;

    let counts = report::dataset_counts(
        store
            .find(&import.counts_collection, &Filter::All)
            .try_collect()
            .await?,
    );

    println!("\n📊 Beacon Statistics\n");
    for collection in [
        &import.variants_collection,
        &import.datasets_collection,
        &import.counts_collection,
    ] {
        println!("  {:<20} {}", collection, store.count(collection).await?);
    }

    if counts.is_empty() {
        println!("\n  No dataset counts yet. Run: beacon rebuild");
    } else {
        println!("\n  {:<20} {:>12} {:>12}", "dataset", "variants", "calls");
        for counts in &counts {
            println!("{}", report::count_row(counts));
        }
    }
    println!();

    Ok(())
}
