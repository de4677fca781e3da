//! schema-sink CLI - load JSON record batches into PostgreSQL or MySQL.

use clap::{Parser, Subcommand};
use schema_sink::{drivers, BatchLoader, Config, JsonBatchSource, Sink, SinkError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "schema-sink")]
#[command(about = "Schema-driven loading of record batches into relational tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load batches from a JSON file into the target
    Load {
        /// Batch file ("-" reads standard input)
        #[arg(short, long)]
        batch: PathBuf,

        /// Override load.default_target_schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Show the target table a stream loads into
    Describe {
        /// Stream identifier, e.g. "crm-contacts"
        #[arg(short, long)]
        stream: String,
    },

    /// Validate the configuration file without connecting
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SinkError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SinkError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::CheckConfig => {
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Configuration OK");
                println!("  Target: {}", config.target.r#type);
                if config.target.r#type != "memory" {
                    println!("  Database: {}", config.target.endpoint());
                }
                println!(
                    "  Evolution: add columns {}, alter columns {}",
                    on_off(config.load.allow_column_add),
                    on_off(config.load.allow_column_alter)
                );
            }
        }

        Commands::Load {
            batch,
            target_schema,
        } => {
            if let Some(schema) = target_schema {
                config.load.default_target_schema = Some(schema);
                config.validate()?;
            }

            let mut source = if batch.as_os_str() == "-" {
                let text = std::io::read_to_string(std::io::stdin())?;
                JsonBatchSource::from_json(&text)?
            } else {
                JsonBatchSource::from_path(&batch)?
            };

            let engine = drivers::connect(&config.target).await?;
            let sink = Sink::new(BatchLoader::new(engine, config.load));
            let result = sink.run(&mut source).await;
            sink.close().await;
            let summary = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Load completed!");
                println!("  Batches: {}", summary.batches);
                println!("  Rows: {}", summary.rows);
                if summary.uncounted_batches > 0 {
                    println!("  Uncounted batches: {}", summary.uncounted_batches);
                }
                println!("  Tables: {}", summary.tables.len());
                for table in &summary.tables {
                    println!("    {}", table);
                }
            }
        }

        Commands::Describe { stream } => {
            let engine = drivers::connect(&config.target).await?;
            let loader = BatchLoader::new(engine.clone(), config.load);
            let table = loader.table_for(&stream);
            let described = engine.describe_table(&table).await;
            engine.close().await;
            let columns = described?;

            if cli.output_json {
                let json = serde_json::json!({
                    "table": table.to_string(),
                    "exists": columns.is_some(),
                    "columns": columns.iter().flatten().map(|c| {
                        serde_json::json!({"name": c.name, "type": c.sql_type.to_string()})
                    }).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("Table: {}", table);
                match columns {
                    Some(columns) => {
                        for column in columns {
                            println!("  {} {}", column.name, column.sql_type);
                        }
                    }
                    None => println!("  (does not exist yet)"),
                }
            }
        }
    }

    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
