//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration.
    pub target: TargetConfig,

    /// Loading behavior configuration.
    #[serde(default)]
    pub load: LoadConfig,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Engine: "postgres", "mysql" or "memory".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Connection URL (`postgres://…` or `mysql://…`). When set it replaces
    /// host, port, database, user and password. Never serialized.
    #[serde(default, skip_serializing)]
    pub url: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default depends on the engine).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl TargetConfig {
    /// Configured port, or the engine's default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type.as_str() {
            "mysql" | "mariadb" => 3306,
            _ => 5432,
        })
    }

    /// Where the target lives, without credentials.
    pub fn endpoint(&self) -> String {
        match &self.url {
            Some(url) => {
                let rest = url.split_once("://").map_or(url.as_str(), |(_, r)| r);
                let rest = rest.rsplit_once('@').map_or(rest, |(_, r)| r);
                rest.split('?').next().unwrap_or(rest).to_string()
            }
            None => format!("{}:{}/{}", self.host, self.effective_port(), self.database),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            r#type: default_postgres(),
            url: None,
            host: String::new(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Loading behavior configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Add columns for new properties (default: true).
    #[serde(default = "default_true")]
    pub allow_column_add: bool,

    /// Widen column types when a property's type grows (default: false).
    #[serde(default)]
    pub allow_column_alter: bool,

    /// Lower-case conformed identifiers (default: true).
    #[serde(default = "default_true")]
    pub lower_case_identifiers: bool,

    /// Schema for every table, overriding the schema part of stream ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target_schema: Option<String>,

    /// Replace NULL values with a type-appropriate empty value (default: false).
    #[serde(default)]
    pub replace_null_with_type_default: bool,

    /// Map `number` properties to double precision (default: false).
    #[serde(default)]
    pub prefer_float_over_numeric: bool,

    /// Length of text columns without a declared maximum; 0 is unbounded
    /// (default: 2000).
    #[serde(default = "default_text_length")]
    pub default_text_length: u32,

    /// Rows per INSERT/COPY round trip (default: 1000).
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            allow_column_add: true,
            allow_column_alter: false,
            lower_case_identifiers: true,
            default_target_schema: None,
            replace_null_with_type_default: false,
            prefer_float_over_numeric: false,
            default_text_length: default_text_length(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

// Default value functions for serde
fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_text_length() -> u32 {
    2000
}

fn default_insert_batch_size() -> usize {
    1000
}
