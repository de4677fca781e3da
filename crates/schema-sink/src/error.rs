//! Error types for the loading engine.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for schema errors (empty schema, identifier collisions, unmergeable types).
pub const EXIT_SCHEMA_ERROR: u8 = 2;
/// Exit code for evolutions blocked by configuration.
pub const EXIT_EVOLUTION_ERROR: u8 = 3;
/// Exit code for statements rejected by the target engine.
pub const EXIT_EXECUTION_ERROR: u8 = 4;
/// Exit code for errors raised by the batch source.
pub const EXIT_UPSTREAM_ERROR: u8 = 5;
/// Exit code for record values that cannot be converted.
pub const EXIT_DATA_ERROR: u8 = 6;
/// Exit code for file and serialization errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for sink operations.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table cannot be defined from the presented schema.
    #[error("Schema definition error for {table}: {message}")]
    SchemaDefinition { table: String, message: String },

    /// Two distinct source names conform to the same identifier.
    #[error("Identifier collision: '{first}' and '{second}' both conform to '{conformed}'")]
    IdentifierCollision {
        first: String,
        second: String,
        conformed: String,
    },

    /// No compatible common type exists, or the merge had no inputs.
    #[error("Type merge error: {0}")]
    TypeMerge(String),

    /// A required column add or type widen is disabled by configuration.
    #[error("Evolution not permitted on {table}: {message}")]
    EvolutionNotPermitted { table: String, message: String },

    /// The target engine rejected a statement.
    #[error("Execution failed ({context}): {source}")]
    Execution {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error surfaced by the batch source.
    #[error("Upstream validation error: {0}")]
    Upstream(String),

    /// A record value cannot be converted to its column type.
    #[error("Invalid value for column {column}: {message}")]
    InvalidValue { column: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SinkError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        SinkError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap an engine error with the context of the statement that failed.
    pub fn execution<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SinkError::Execution {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Create a SchemaDefinition error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::SchemaDefinition {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an EvolutionNotPermitted error
    pub fn not_permitted(table: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::EvolutionNotPermitted {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::InvalidValue {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SinkError::Config(_) | SinkError::Yaml(_) => EXIT_CONFIG_ERROR,
            SinkError::SchemaDefinition { .. }
            | SinkError::IdentifierCollision { .. }
            | SinkError::TypeMerge(_) => EXIT_SCHEMA_ERROR,
            SinkError::EvolutionNotPermitted { .. } => EXIT_EVOLUTION_ERROR,
            SinkError::Execution { .. } | SinkError::Pool { .. } => EXIT_EXECUTION_ERROR,
            SinkError::Upstream(_) => EXIT_UPSTREAM_ERROR,
            SinkError::InvalidValue { .. } => EXIT_DATA_ERROR,
            SinkError::Io(_) | SinkError::Json(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
