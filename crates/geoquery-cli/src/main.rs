mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use geoquery_ai::{LLMProviderFactory, NLQueryParser};
use geoquery_arcgis::{FeatureQueryClient, NearbyRequest, QueryRequest, SpatialRelationship};
use geoquery_compliance::{
    analyze_lease_compliance, check_area_compliance, detect_area_discrepancies,
    generate_shortfall_report, JsonReferenceFile, DEFAULT_LEASE_MIN_AREA,
    DEFAULT_TOLERANCE_PERCENT,
};
use geoquery_core::{
    ConfigError, ConfigManager, GeoPoint, GeoQueryConfig, GeoQueryError, LoggingConfig,
};
use geoquery_query::QueryExecutor;
use output::{print_output, CommandOutput};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "geoquery")]
#[command(about = "GeoQuery CLI - ArcGIS feature queries with natural-language filters", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (pretty, json, geojson)
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Explicit config file (defaults to ./.geoquery.toml, then ~/.geoquery/config.toml)
    #[arg(short, long, global = true, env = "GEOQUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Geojson,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an attribute query against the feature service
    Query {
        /// SQL-style where clause
        #[arg(short, long, default_value = "1=1")]
        r#where: String,

        #[command(flatten)]
        options: QueryOptions,
    },

    /// Find features within a distance of a point
    Nearby {
        /// Longitude (WGS84)
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Latitude (WGS84)
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Search radius in miles
        #[arg(short, long, default_value = "50")]
        distance: f64,

        /// ArcGIS spatial relationship (e.g. intersects, within)
        #[arg(long, default_value = "intersects")]
        relationship: String,

        /// Additional attribute filter
        #[arg(short, long, default_value = "1=1")]
        r#where: String,

        #[command(flatten)]
        options: QueryOptions,
    },

    /// Translate a question into a filter and run it
    Ask {
        /// Natural-language question
        question: String,

        /// Maximum number of features to return
        #[arg(short, long)]
        max_results: Option<usize>,

        /// Skip the translation cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Translate a question into a filter without running it
    Parse {
        /// Natural-language question
        question: String,
    },

    /// Check feature areas against a minimum
    Compliance {
        /// SQL-style where clause selecting the features to check
        #[arg(short, long, default_value = "1=1")]
        r#where: String,

        /// Minimum area in square miles
        #[arg(short, long, default_value_t = DEFAULT_LEASE_MIN_AREA)]
        min_area: f64,

        #[arg(long, value_enum, default_value = "lease")]
        report: ReportKind,

        /// Attach geometry to the lease report
        #[arg(long)]
        include_geometry: bool,
    },

    /// Compare feature areas against a JSON reference table
    Discrepancy {
        /// JSON file of `{name, state, sqmi}` rows
        reference: PathBuf,

        /// SQL-style where clause selecting the features to compare
        #[arg(short, long, default_value = "1=1")]
        r#where: String,

        /// Allowed absolute percent difference
        #[arg(short, long, default_value_t = DEFAULT_TOLERANCE_PERCENT)]
        tolerance: f64,
    },

    /// List supported LLM providers
    Providers,

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportKind {
    Summary,
    Shortfall,
    Lease,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default config file
    Init {
        /// Destination path
        #[arg(short, long, default_value = ".geoquery.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(clap::Args, Debug, Clone)]
struct QueryOptions {
    /// Comma-separated output fields
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Records per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Stop after this many features
    #[arg(long)]
    max_features: Option<usize>,

    /// Fetch only the first page
    #[arg(long)]
    no_paginate: bool,

    /// Omit geometry from the response
    #[arg(long)]
    no_geometry: bool,

    /// Bypass the response cache
    #[arg(long)]
    no_cache: bool,
}

impl QueryOptions {
    fn apply(&self, mut request: QueryRequest) -> QueryRequest {
        if !self.fields.is_empty() {
            request = request.out_fields(self.fields.iter().map(|f| f.trim().to_string()));
        }
        if let Some(page_size) = self.page_size {
            request = request.page_size(page_size);
        }
        if let Some(max_features) = self.max_features {
            request = request.max_features(max_features);
        }
        request
            .paginate(!self.no_paginate)
            .return_geometry(!self.no_geometry)
            .use_cache(!self.no_cache)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", format!("{}:", error_kind(&e)).red().bold(), error_message(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // `config init` must work before any config file exists.
    let config = if matches!(cli.command, Commands::Config(ConfigCommands::Init { .. })) {
        GeoQueryConfig::default()
    } else {
        load_config(cli.config.as_deref())?.into_config()
    };
    init_tracing(&config.logging, cli.verbose);

    let output = execute_command(&cli, &config).await?;
    print_output(cli.output, &output)
}

fn load_config(path: Option<&Path>) -> Result<ConfigManager> {
    match path {
        Some(path) => ConfigManager::from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigManager::load().context("Failed to load configuration"),
    }
}

fn init_config(path: &Path, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    ConfigManager::create_default_config(path)?;
    Ok(path.to_path_buf())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr so that stdout stays machine-readable.
    let installed = match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.ok();
}

fn feature_client(config: &GeoQueryConfig) -> Result<FeatureQueryClient> {
    Ok(FeatureQueryClient::new(config.service.url.clone(), config)?)
}

async fn execute_command(cli: &Cli, config: &GeoQueryConfig) -> Result<CommandOutput> {
    match &cli.command {
        Commands::Query { r#where, options } => {
            let client = feature_client(config)?;
            let request = options.apply(client.request(r#where.as_str()));
            let collection = client.query(&request).await?;
            CommandOutput::collection(collection)
        }
        Commands::Nearby {
            lon,
            lat,
            distance,
            relationship,
            r#where,
            options,
        } => {
            let client = feature_client(config)?;
            let relationship: SpatialRelationship = relationship.parse()?;
            let request = NearbyRequest::new(GeoPoint::new(*lon, *lat), *distance)
                .with_query(options.apply(client.request(r#where.as_str())))
                .spatial_relationship(relationship);
            let collection = client.query_nearby(&request).await?;
            CommandOutput::collection(collection)
        }
        Commands::Ask {
            question,
            max_results,
            no_cache,
        } => {
            let parser = NLQueryParser::from_config(config)?;
            let spec = parser.parse_with_options(question, !no_cache).await?;
            info!(
                where_clause = %spec.where_clause,
                confidence = spec.confidence,
                "Question translated"
            );
            let executor = QueryExecutor::new(Arc::new(feature_client(config)?));
            let result = executor.execute(&spec, *max_results).await?;
            CommandOutput::execution(result)
        }
        Commands::Parse { question } => {
            let parser = NLQueryParser::from_config(config)?;
            let spec = parser.parse(question).await?;
            Ok(CommandOutput::value(serde_json::to_value(&spec)?))
        }
        Commands::Compliance {
            r#where,
            min_area,
            report,
            include_geometry,
        } => {
            let client = feature_client(config)?;
            let request = client
                .request(r#where.as_str())
                .return_geometry(*include_geometry);
            let collection = client.query(&request).await?;
            let value = match report {
                ReportKind::Summary => {
                    serde_json::to_value(check_area_compliance(&collection.features, *min_area)?)?
                }
                ReportKind::Shortfall => serde_json::to_value(generate_shortfall_report(
                    &collection.features,
                    *min_area,
                )?)?,
                ReportKind::Lease => serde_json::to_value(analyze_lease_compliance(
                    &collection.features,
                    *min_area,
                    *include_geometry,
                )?)?,
            };
            Ok(CommandOutput::value(value))
        }
        Commands::Discrepancy {
            reference,
            r#where,
            tolerance,
        } => {
            let store = JsonReferenceFile::new(reference.clone());
            let client = feature_client(config)?;
            let collection = client.query(&client.request(r#where.as_str())).await?;
            let report = detect_area_discrepancies(&collection.features, &store, *tolerance)?;
            info!(
                flagged = report.flagged_count,
                compared = report.compared,
                "Discrepancy check complete"
            );
            Ok(CommandOutput::value(serde_json::to_value(report)?))
        }
        Commands::Providers => {
            let active = config.llm.provider.to_lowercase();
            let providers: Vec<_> = LLMProviderFactory::provider_catalog()
                .iter()
                .map(|info| {
                    json!({
                        "id": info.id,
                        "name": info.name,
                        "default_model": info.default_model,
                        "env_var": info.env_var,
                        "signup_url": info.signup_url,
                        "models": info.models,
                        "active": info.id == active,
                    })
                })
                .collect();
            Ok(CommandOutput::value(json!({ "providers": providers })))
        }
        Commands::Config(ConfigCommands::Show) => {
            Ok(CommandOutput::value(serde_json::to_value(redacted(config))?))
        }
        Commands::Config(ConfigCommands::Init { path, force }) => {
            let written = init_config(path, *force)?;
            Ok(CommandOutput::value(json!({
                "status": "created",
                "path": written.display().to_string(),
            })))
        }
    }
}

/// Copy of the configuration with API keys masked.
fn redacted(config: &GeoQueryConfig) -> GeoQueryConfig {
    let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
    let mut config = config.clone();
    config.llm.anthropic_api_key = mask(&config.llm.anthropic_api_key);
    config.llm.openai_api_key = mask(&config.llm.openai_api_key);
    config.llm.gemini_api_key = mask(&config.llm.gemini_api_key);
    config
}

fn error_kind(err: &anyhow::Error) -> String {
    if let Some(e) = err.downcast_ref::<GeoQueryError>() {
        e.kind().to_string()
    } else if err.downcast_ref::<ConfigError>().is_some() {
        "ConfigError".to_string()
    } else {
        "Error".to_string()
    }
}

/// Message without the kind prefix that the error's Display already carries.
fn error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<GeoQueryError>() {
        Some(
            GeoQueryError::Connection(msg)
            | GeoQueryError::Query(msg)
            | GeoQueryError::Validation(msg)
            | GeoQueryError::Translation(msg),
        ) => msg.clone(),
        None => format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_options() {
        let cli = Cli::try_parse_from([
            "geoquery",
            "--output",
            "geojson",
            "query",
            "--where",
            "STATE_NAME = 'Texas'",
            "--fields",
            "NAME,SQMI",
            "--max-features",
            "10",
            "--no-cache",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Geojson);
        match cli.command {
            Commands::Query { r#where, options } => {
                assert_eq!(r#where, "STATE_NAME = 'Texas'");
                let request = options.apply(QueryRequest::new(r#where.as_str()));
                assert_eq!(request.out_fields, vec!["NAME", "SQMI"]);
                assert_eq!(request.max_features, Some(10));
                assert!(!request.use_cache);
                assert!(request.paginate);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_nearby_negative_longitude() {
        let cli = Cli::try_parse_from([
            "geoquery", "nearby", "--lon", "-97.7431", "--lat", "30.2672", "--distance", "25",
        ])
        .unwrap();
        match cli.command {
            Commands::Nearby {
                lon, lat, distance, ..
            } => {
                assert_eq!(lon, -97.7431);
                assert_eq!(lat, 30.2672);
                assert_eq!(distance, 25.0);
            }
            _ => panic!("expected nearby command"),
        }
    }

    #[test]
    fn test_compliance_defaults() {
        let cli = Cli::try_parse_from(["geoquery", "compliance"]).unwrap();
        match cli.command {
            Commands::Compliance {
                min_area, report, ..
            } => {
                assert_eq!(min_area, DEFAULT_LEASE_MIN_AREA);
                assert_eq!(report, ReportKind::Lease);
            }
            _ => panic!("expected compliance command"),
        }
    }

    #[test]
    fn test_discrepancy_args() {
        let cli = Cli::try_parse_from([
            "geoquery",
            "discrepancy",
            "reference.json",
            "--where",
            "STATE_NAME = 'Texas'",
        ])
        .unwrap();
        match cli.command {
            Commands::Discrepancy {
                reference,
                r#where,
                tolerance,
            } => {
                assert_eq!(reference, PathBuf::from("reference.json"));
                assert_eq!(r#where, "STATE_NAME = 'Texas'");
                assert_eq!(tolerance, DEFAULT_TOLERANCE_PERCENT);
            }
            _ => panic!("expected discrepancy command"),
        }
    }

    #[test]
    fn test_config_init_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(&path, false).unwrap();
        assert!(ConfigManager::from_path(&path).is_ok());

        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
    }

    #[test]
    fn test_error_kind_prefix() {
        let err = anyhow::Error::from(GeoQueryError::validation("where_clause cannot be empty"));
        assert_eq!(error_kind(&err), "ValidationError");
        assert_eq!(error_message(&err), "where_clause cannot be empty");

        let err = anyhow::Error::from(ConfigError::NotFound("x.toml".to_string()));
        assert_eq!(error_kind(&err), "ConfigError");
    }

    #[test]
    fn test_redacted_masks_keys() {
        let mut config = GeoQueryConfig::default();
        config.llm.anthropic_api_key = Some("sk-ant-secret".to_string());
        let shown = redacted(&config);
        assert_eq!(shown.llm.anthropic_api_key.as_deref(), Some("********"));
        assert!(shown.llm.openai_api_key.is_none());
    }
}
