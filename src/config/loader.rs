//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::store::ConfigStore;
use crate::error::ConfigError;

/// Read a TOML file into its raw section tables.
///
/// A missing file reads as an empty document; mandatory sections then
/// surface as `ConfigError::Missing` when the store is built.
pub fn load_document(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Config file not found, using an empty document");
            return Ok(toml::Table::new());
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    content.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
        section: path.display().to_string(),
        source,
    })
}

/// Load and validate every section from a TOML file.
pub fn load_config(path: &Path) -> Result<ConfigStore, ConfigError> {
    let document = load_document(path)?;
    ConfigStore::from_document(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [app]
            name = "orders"
            bind_address = "127.0.0.1:9000"

            [correlation]
            header_name = "X-Request-Id"
            "#
        )
        .unwrap();

        let store = load_config(file.path()).unwrap();
        assert_eq!(store.app().name, "orders");
        assert_eq!(store.correlation().header_name, "X-Request-Id");
    }

    #[test]
    fn missing_file_reports_missing_app_section() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("app")));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app\nname = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }
}
