//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::evolution::EvolutionPolicy;
use crate::typemap::TypeMapOptions;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl LoadConfig {
    pub fn evolution_policy(&self) -> EvolutionPolicy {
        EvolutionPolicy {
            allow_column_add: self.allow_column_add,
            allow_column_alter: self.allow_column_alter,
        }
    }

    /// Type mapping options for an engine with or without native booleans.
    pub fn type_map_options(&self, native_boolean: bool) -> TypeMapOptions {
        TypeMapOptions {
            native_boolean,
            prefer_float: self.prefer_float_over_numeric,
            default_text_length: self.default_text_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(
            r#"
target:
  type: postgres
  host: localhost
  database: warehouse
  user: loader
  password: secret
"#,
        )
        .unwrap();

        assert_eq!(config.target.effective_port(), 5432);
        assert_eq!(config.target.max_connections, 4);
        assert_eq!(config.load, LoadConfig::default());
        assert!(config.load.allow_column_add);
        assert!(!config.load.allow_column_alter);
        assert!(config.load.lower_case_identifiers);
        assert_eq!(config.load.default_text_length, 2000);
    }

    #[test]
    fn test_from_yaml_load_section() {
        let config = Config::from_yaml(
            r#"
target:
  type: mysql
  host: db
  database: warehouse
  user: loader
load:
  allow_column_alter: true
  default_target_schema: raw
  replace_null_with_type_default: true
  insert_batch_size: 250
"#,
        )
        .unwrap();

        assert_eq!(config.target.effective_port(), 3306);
        assert!(config.load.allow_column_alter);
        assert_eq!(config.load.default_target_schema.as_deref(), Some("raw"));
        assert!(config.load.replace_null_with_type_default);
        assert_eq!(config.load.insert_batch_size, 250);

        let policy = config.load.evolution_policy();
        assert!(policy.allow_column_add && policy.allow_column_alter);
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target:\n  type: memory\nload:\n  lower_case_identifiers: false").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.target.r#type, "memory");
        assert!(!config.load.lower_case_identifiers);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.yaml")).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_IO_ERROR);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let err = Config::from_yaml("target:\n  type: oracle\n").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }
}
