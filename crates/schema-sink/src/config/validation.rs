//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{Result, SinkError};

const TARGET_TYPES: &[&str] = &["postgres", "mysql", "memory"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let target = &config.target;

    if !TARGET_TYPES.contains(&target.r#type.as_str()) {
        return Err(SinkError::Config(format!(
            "target.type must be one of {}, got '{}'",
            TARGET_TYPES.join(", "),
            target.r#type
        )));
    }

    // The in-process engine needs no connection settings
    if let (Some(url), false) = (&target.url, target.r#type == "memory") {
        let schemes: &[&str] = match target.r#type.as_str() {
            "mysql" => &["mysql://"],
            _ => &["postgres://", "postgresql://"],
        };
        if !schemes.iter().any(|s| url.starts_with(s)) {
            return Err(SinkError::Config(format!(
                "target.url must start with {} for a {} target",
                schemes.join(" or "),
                target.r#type
            )));
        }
    } else if target.r#type != "memory" {
        if target.host.is_empty() {
            return Err(SinkError::Config("target.host is required".into()));
        }
        if target.database.is_empty() {
            return Err(SinkError::Config("target.database is required".into()));
        }
        if target.user.is_empty() {
            return Err(SinkError::Config("target.user is required".into()));
        }
    }

    if target.r#type != "memory" && target.max_connections == 0 {
        return Err(SinkError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    if config.load.insert_batch_size == 0 {
        return Err(SinkError::Config(
            "load.insert_batch_size must be at least 1".into(),
        ));
    }

    if let Some(schema) = &config.load.default_target_schema {
        validate_identifier(schema).map_err(|e| {
            SinkError::Config(format!("load.default_target_schema is invalid: {}", e))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                r#type: "postgres".to_string(),
                url: None,
                host: "localhost".to_string(),
                port: Some(5432),
                database: "warehouse".to_string(),
                user: "loader".to_string(),
                password: "password".to_string(),
                max_connections: 4,
            },
            load: LoadConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mssql".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.type"));
    }

    #[test]
    fn test_memory_target_needs_no_connection() {
        let mut config = valid_config();
        config.target.r#type = "memory".to_string();
        config.target.host = String::new();
        config.target.database = String::new();
        config.target.user = String::new();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_url_replaces_connection_fields() {
        let mut config = valid_config();
        config.target.host = String::new();
        config.target.database = String::new();
        config.target.user = String::new();
        config.target.url = Some("postgresql://loader:pw@db.internal:6543/warehouse".into());
        assert!(validate(&config).is_ok());
        assert_eq!(config.target.endpoint(), "db.internal:6543/warehouse");

        config.target.url = Some("mysql://loader:pw@db.internal/warehouse".into());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.url"));

        config.target.r#type = "mysql".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_url_is_redacted_and_not_serialized() {
        let mut config = valid_config();
        config.target.url = Some("postgres://loader:hunter2@db/warehouse".into());
        assert!(!format!("{:?}", config.target).contains("hunter2"));
        let json = serde_json::to_string(&config.target).unwrap();
        assert!(!json.contains("hunter2"), "URL was serialized: {}", json);
    }

    #[test]
    fn test_zero_insert_batch_size() {
        let mut config = valid_config();
        config.load.insert_batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_default_schema() {
        let mut config = valid_config();
        config.load.default_target_schema = Some(String::new());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_password_not_serialized() {
        let mut config = valid_config();
        config.target.password = "super_secret".to_string();
        let json = serde_json::to_string(&config.target).unwrap();
        assert!(!json.contains("super_secret"), "Password was serialized: {}", json);
    }
}
