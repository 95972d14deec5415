use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub max_rows_per_query: Option<usize>,
}

fn default_dialect() -> String {
    "duckdb".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    60
}

/// Tunables for the query coordinator.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Row cap used when a connection does not carry its own.
    pub default_max_rows: usize,
    /// Tables per database when the resolver falls back to a broad scan.
    pub fallback_max_tables: usize,
    /// Column names listed per table in the intent prompt.
    pub column_preview_limit: usize,
    /// Row limit of the last-resort `SELECT *` draft.
    pub simplified_row_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_max_rows: 1000,
            fallback_max_tables: 5,
            column_preview_limit: 15,
            simplified_row_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    pub data_dir: String,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory scanned for <name>/<name>.duckdb databases
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Answer a single question and exit instead of serving the API
    #[arg(short, long)]
    pub question: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        // Defaults first so a partial config file still deserializes
        let mut config_builder = Config::builder()
            .set_default("data_dir", defaults.data_dir.clone())?
            .set_default("web.host", defaults.web.host.clone())?
            .set_default("web.port", i64::from(defaults.web.port))?
            .set_default("llm.backend", defaults.llm.backend.clone())?
            .set_default("llm.model", defaults.llm.model.clone())?;

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/polyquery/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // POLYQUERY__LLM__API_KEY=... style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("POLYQUERY")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "ollama".to_string(),
                model: "llama3".to_string(),
                api_key: None,
                api_url: None,
                timeout_secs: default_llm_timeout(),
            },
            coordinator: CoordinatorConfig::default(),
            databases: Vec::new(),
            data_dir: "data".to_string(),
        }
    }
}
