//! Configuration types for Galaxy Beacon components.
//!
//! Every component has a `Default` that matches the behavior of the original
//! import scripts. An optional TOML settings file (see [`default_config_path`])
//! can override the import and guard defaults; command-line flags override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::FileKind;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Time budget for remote calls made during enumeration and rebuild.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Upper bound for any single remote call.
    pub call_timeout: Duration,
    /// Upper bound for the whole run, if set.
    pub deadline: Option<Duration>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(300),
            deadline: None,
        }
    }
}

/// Import pipeline configuration.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Datasets requested per page during enumeration.
    pub page_size: usize,
    /// Directory holding downloaded working files.
    pub work_dir: PathBuf,
    /// Name of the platform collections (histories) exported to the beacon.
    pub history_name: String,
    /// Owner preference that must be truthy for a dataset to be imported.
    pub sharing_preference: String,
    /// File kinds requested from the platform.
    pub file_kinds: Vec<FileKind>,
    /// Public URL written into dataset metadata.
    pub external_url: String,
    pub variants_collection: String,
    pub datasets_collection: String,
    pub counts_collection: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            work_dir: std::env::temp_dir(),
            history_name: "Beacon Export 📡".to_string(),
            sharing_preference: "beacon_enabled".to_string(),
            file_kinds: FileKind::ALL.to_vec(),
            external_url: "usegalaxy.eu".to_string(),
            variants_collection: "genomicVariations".to_string(),
            datasets_collection: "datasets".to_string(),
            counts_collection: "datasetCounts".to_string(),
        }
    }
}

/// Contents of the optional `beacon.toml` settings file.
///
/// All keys are optional; missing keys keep the built-in defaults.
///
/// ```toml
/// [import]
/// page_size = 200
/// work_dir = "/var/tmp/beacon"
///
/// [guard]
/// call_timeout_secs = 120
/// deadline_secs = 14400
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub galaxy: GalaxySettings,
    pub import: ImportSettings,
    pub guard: GuardSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GalaxySettings {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub page_size: Option<usize>,
    pub work_dir: Option<PathBuf>,
    pub history_name: Option<String>,
    pub sharing_preference: Option<String>,
    pub file_kinds: Option<Vec<FileKind>>,
    pub external_url: Option<String>,
    pub variants_collection: Option<String>,
    pub datasets_collection: Option<String>,
    pub counts_collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub call_timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
}

impl Settings {
    /// Builds the import configuration from defaults plus file overrides.
    pub fn import_config(&self) -> ImportConfig {
        let mut config = ImportConfig::default();
        let s = &self.import;
        if let Some(page_size) = s.page_size.filter(|n| *n > 0) {
            config.page_size = page_size;
        }
        if let Some(dir) = &s.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(name) = &s.history_name {
            config.history_name = name.clone();
        }
        if let Some(key) = &s.sharing_preference {
            config.sharing_preference = key.clone();
        }
        if let Some(kinds) = s.file_kinds.as_ref().filter(|k| !k.is_empty()) {
            config.file_kinds = kinds.clone();
        }
        if let Some(url) = &s.external_url {
            config.external_url = url.clone();
        }
        if let Some(name) = &s.variants_collection {
            config.variants_collection = name.clone();
        }
        if let Some(name) = &s.datasets_collection {
            config.datasets_collection = name.clone();
        }
        if let Some(name) = &s.counts_collection {
            config.counts_collection = name.clone();
        }
        config
    }

    /// Builds the guard configuration from defaults plus file overrides.
    pub fn guard_config(&self) -> GuardConfig {
        let mut config = GuardConfig::default();
        if let Some(secs) = self.guard.call_timeout_secs.filter(|s| *s > 0) {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.guard.deadline_secs.filter(|s| *s > 0) {
            config.deadline = Some(Duration::from_secs(secs));
        }
        config
    }
}

/// Returns the default settings path: `<config dir>/beacon/beacon.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("beacon").join("beacon.toml"))
}

/// Loads settings from `path`, or from [`default_config_path`] when `path` is `None`.
///
/// An explicit path must exist. A missing default file yields default settings.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Settings::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|e| {
        AppError::InvalidConfig(format!("{}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_import_config_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.page_size, 500);
        assert_eq!(config.sharing_preference, "beacon_enabled");
        assert_eq!(config.file_kinds.len(), 4);
        assert_eq!(config.variants_collection, "genomicVariations");
    }

    #[test]
    fn test_settings_override_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [import]
            page_size = 50
            history_name = "Export"
            file_kinds = ["vcf"]

            [guard]
            call_timeout_secs = 10
            deadline_secs = 600
            "#,
        )
        .unwrap();

        let import = settings.import_config();
        assert_eq!(import.page_size, 50);
        assert_eq!(import.history_name, "Export");
        assert_eq!(import.file_kinds, vec![FileKind::Vcf]);
        assert_eq!(import.datasets_collection, "datasets");

        let guard = settings.guard_config();
        assert_eq!(guard.call_timeout, Duration::from_secs(10));
        assert_eq!(guard.deadline, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_zero_page_size_is_ignored() {
        let settings: Settings = toml::from_str("[import]\npage_size = 0\n").unwrap();
        assert_eq!(settings.import_config().page_size, 500);
    }

    #[test]
    fn test_load_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[galaxy]\nurl = \"https://usegalaxy.eu\"").unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.galaxy.url.as_deref(), Some("https://usegalaxy.eu"));
    }

    #[test]
    fn test_load_settings_missing_explicit_path() {
        let result = load_settings(Some(Path::new("/nonexistent/beacon.toml")));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
