//! Configuration types for prestalink components.
//!
//! Backends are declared in a TOML file, by default
//! `~/.config/prestalink/backends.toml`:
//!
//! ```toml
//! [[backends]]
//! id = 1
//! name = "main-shop"
//! url = "https://shop.example.com"
//! import_image_type = "db"
//! resize_images = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::{Backend, BackendId, ImageImportType};

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for webservice calls.
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

/// Batch import configuration.
pub struct ImportConfig {
    /// Number of images imported in parallel by the CLI.
    pub concurrency: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// One `[[backends]]` entry of the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BackendEntry {
    pub id: BackendId,
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub import_image_type: ImageImportType,
    #[serde(default)]
    pub resize_images: bool,
}

fn default_enabled() -> bool {
    true
}

impl BackendEntry {
    pub fn to_backend(&self) -> Backend {
        Backend {
            id: self.id,
            name: self.name.clone(),
            location: self.url.trim_end_matches('/').to_string(),
            import_image_type: self.import_image_type,
            resize_images: self.resize_images,
        }
    }
}

/// Parsed backends configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

impl BackendsConfig {
    /// Enabled backends, in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &BackendEntry> {
        self.backends.iter().filter(|b| b.enabled)
    }

    /// Looks up a backend by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&BackendEntry> {
        self.backends
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    fn validate(&self) -> Result<(), AppError> {
        for (i, entry) in self.backends.iter().enumerate() {
            if self.backends[..i].iter().any(|b| b.id == entry.id) {
                return Err(AppError::ConfigError(format!(
                    "duplicate backend id {}",
                    entry.id
                )));
            }
            if !entry.url.starts_with("http://") && !entry.url.starts_with("https://") {
                return Err(AppError::InvalidBackendUrl(entry.url.clone()));
            }
        }
        Ok(())
    }
}

/// Default location of the backends file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prestalink").join("backends.toml"))
}

/// Loads the backends file.
///
/// Returns `Ok(None)` when no explicit path is given and the default file does not exist.
pub fn load_backends_config(path: Option<&Path>) -> Result<Option<BackendsConfig>, AppError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(None),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| AppError::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
    let config: BackendsConfig = toml::from_str(&content)
        .map_err(|e| AppError::ConfigError(format!("invalid {}: {}", path.display(), e)))?;
    config.validate()?;

    tracing::debug!(
        "Loaded {} backend(s) from {}",
        config.backends.len(),
        path.display()
    );
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_db_config_defaults() {
        assert_eq!(DbConfig::default().max_connections, 5);
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_load_backends_config() {
        let file = write_config(
            r#"
            [[backends]]
            id = 1
            name = "Main"
            url = "https://shop.example.com/"
            import_image_type = "db"
            resize_images = true

            [[backends]]
            id = 2
            name = "outlet"
            url = "https://outlet.example.com"
            enabled = false
            "#,
        );

        let config = load_backends_config(Some(file.path())).unwrap().unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.enabled().count(), 1);

        let main = config.find("main").unwrap().to_backend();
        assert_eq!(main.location, "https://shop.example.com");
        assert_eq!(main.import_image_type, ImageImportType::Db);
        assert!(main.resize_images);

        let outlet = config.find("OUTLET").unwrap();
        assert_eq!(outlet.import_image_type, ImageImportType::Url);
        assert!(!outlet.resize_images);
    }

    #[test]
    fn test_duplicate_backend_ids_rejected() {
        let file = write_config(
            r#"
            [[backends]]
            id = 1
            name = "a"
            url = "https://a.example.com"

            [[backends]]
            id = 1
            name = "b"
            url = "https://b.example.com"
            "#,
        );
        assert!(matches!(
            load_backends_config(Some(file.path())),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let file = write_config(
            r#"
            [[backends]]
            id = 1
            name = "a"
            url = "shop.example.com"
            "#,
        );
        assert!(matches!(
            load_backends_config(Some(file.path())),
            Err(AppError::InvalidBackendUrl(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_backends_config(Some(Path::new("/nonexistent/backends.toml")));
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
