use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String, // file path, or ":memory:"
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_upload_mb: usize,
}

/// Wire format spoken by a text-generation provider.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions.
    Chat,
    /// Raw-prompt generate API.
    Generate,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Environment variable holding the credential when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// The credential for this provider, if one is configured and non-empty.
    pub fn credential(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    /// Tried in order; the first is the primary provider.
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub format: String, // "text" or "json"
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
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

    /// Directory for uploaded files
    #[arg(long)]
    pub data_dir: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with the built-in defaults so a config file is optional
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/csv-nlq/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // CSV_NLQ__WEB__PORT=8080 and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("CSV_NLQ")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
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
            database: DatabaseConfig {
                connection_string: "csv-nlq.duckdb".to_string(),
                pool_size: 5,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
                max_upload_mb: 100,
            },
            llm: LlmConfig {
                providers: vec![
                    ProviderConfig {
                        name: "openai".to_string(),
                        kind: ProviderKind::Chat,
                        api_url: "https://api.openai.com/v1/chat/completions".to_string(),
                        model: "gpt-4o-mini".to_string(),
                        api_key: None,
                        api_key_env: Some("OPENAI_API_KEY".to_string()),
                        timeout_secs: 20,
                    },
                    ProviderConfig {
                        name: "ollama".to_string(),
                        kind: ProviderKind::Generate,
                        api_url: "http://localhost:11434/api/generate".to_string(),
                        model: "sqlcoder".to_string(),
                        api_key: None,
                        api_key_env: Some("OLLAMA_API_KEY".to_string()),
                        timeout_secs: 30,
                    },
                ],
            },
            logging: LoggingConfig {
                format: "text".to_string(),
            },
            data_dir: "data".to_string(),
        }
    }
}
