//! Variant provenance log.
//!
//! Links storage indices of variant records to the platform dataset they
//! were imported from. The log lives outside the store so that nothing in
//! the store can be traced back to a platform file.
//!
//! Lines are written as
//! `index:<n> dataset:<id> assemblyId:<a> referenceName:<r> start:<s> referenceBases:<ref> alternateBases:<alt>`.
//! The older two-column form `<n> <id>` is still read.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::warn;

use crate::AppError;

/// Public coordinates of the variant a provenance line refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    pub assembly_id: String,
    pub reference_name: String,
    pub start: i64,
    pub reference_bases: String,
    pub alternate_bases: String,
}

/// One provenance line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceEntry {
    /// Storage index of the variant record.
    pub index: i64,
    /// Platform dataset id.
    pub dataset_id: String,
    /// Absent for lines in the legacy two-column form.
    pub locus: Option<Locus>,
}

impl fmt::Display for ProvenanceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index:{} dataset:{}", self.index, self.dataset_id)?;
        if let Some(locus) = &self.locus {
            write!(
                f,
                " assemblyId:{} referenceName:{} start:{} referenceBases:{} alternateBases:{}",
                locus.assembly_id,
                locus.reference_name,
                locus.start,
                locus.reference_bases,
                locus.alternate_bases
            )?;
        }
        Ok(())
    }
}

impl FromStr for ProvenanceEntry {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if let [index, dataset_id] = tokens.as_slice() {
            if !index.contains(':') {
                return Ok(Self {
                    index: index
                        .parse()
                        .map_err(|_| format!("invalid index \"{}\"", index))?,
                    dataset_id: dataset_id.to_string(),
                    locus: None,
                });
            }
        }

        let mut fields = std::collections::HashMap::new();
        for token in &tokens {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| format!("unexpected token \"{}\"", token))?;
            fields.insert(key, value);
        }
        let field = |key: &str| -> Result<String, String> {
            fields
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| format!("missing {}", key))
        };
        let number = |key: &str| -> Result<i64, String> {
            field(key)?
                .parse()
                .map_err(|_| format!("invalid {}", key))
        };

        let locus = if fields.contains_key("start") {
            Some(Locus {
                assembly_id: field("assemblyId")?,
                reference_name: field("referenceName")?,
                start: number("start")?,
                reference_bases: field("referenceBases")?,
                alternate_bases: field("alternateBases")?,
            })
        } else {
            None
        };

        Ok(Self {
            index: number("index")?,
            dataset_id: field("dataset")?,
            locus,
        })
    }
}

/// Append-only writer for the provenance log of one rebuild.
pub struct ProvenanceLog {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    lines: usize,
}

impl ProvenanceLog {
    /// Creates the log, truncating any previous content.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let mut log = Self::open(path).await?;
        log.truncate().await?;
        Ok(log)
    }

    /// Opens the log for writing, creating it if needed. Existing content is
    /// kept until [`truncate`](Self::truncate).
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Drops every line, including those written before the log was opened.
    pub async fn truncate(&mut self) -> Result<(), AppError> {
        self.writer.flush().await?;
        let file = self.writer.get_mut();
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        self.lines = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub async fn append(&mut self, entry: &ProvenanceEntry) -> Result<(), AppError> {
        self.writer
            .write_all(format!("{}\n", entry).as_bytes())
            .await?;
        self.lines += 1;
        Ok(())
    }

    /// Flushes buffered lines to disk.
    pub async fn flush(&mut self) -> Result<(), AppError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Reads every entry of a provenance log. Unparseable lines are skipped with a warning.
pub async fn read_entries(path: &Path) -> Result<Vec<ProvenanceEntry>, AppError> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ProvenanceEntry>() {
            Ok(entry) => entries.push(entry),
            Err(reason) => warn!(
                "{}:{}: ignoring provenance line: {}",
                path.display(),
                number + 1,
                reason
            ),
        }
    }

    Ok(entries)
}

/// Returns the entries recorded for one storage index.
pub async fn lookup(path: &Path, index: i64) -> Result<Vec<ProvenanceEntry>, AppError> {
    Ok(read_entries(path)
        .await?
        .into_iter()
        .filter(|e| e.index == index)
        .collect())
}
