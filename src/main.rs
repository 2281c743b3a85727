//! `resilient-http` command line.
//!
//! ```text
//! resilient-http request GET https://api.example.com/health --config client.toml
//! resilient-http check-config client.toml
//! ```
//!
//! `request` sends one request through the full client pipeline (rate limiter,
//! circuit breaker, retries) and prints the response plus the metrics it
//! produced as JSON. `check-config` loads a config file and reports every
//! validation error in it.

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::json;
use std::path::PathBuf;

use resilient_http::config::{load_config, ClientConfig, ConfigError};
use resilient_http::observability::logging::init_logging;
use resilient_http::observability::metrics::init_metrics;
use resilient_http::{Request, ResilientHttpClient};

#[derive(Parser)]
#[command(name = "resilient-http")]
#[command(about = "Send HTTP requests through retries, rate limiting and a circuit breaker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single request
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Absolute URL, or a path relative to the configured base_url
        url: String,
        /// Extra header as NAME:VALUE; may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        /// Treat the body as JSON
        #[arg(long)]
        json: bool,
        /// TOML config file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a config file
    CheckConfig {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Request {
            method,
            url,
            headers,
            data,
            json,
            config,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => ClientConfig::default(),
            };
            send(config, &method, url, headers, data, json).await?;
        }
        Commands::CheckConfig { file } => match load_config(&file) {
            Ok(_) => println!("{}: configuration is valid", file.display()),
            Err(ConfigError::Validation(errors)) => {
                eprintln!("{}: {} validation error(s)", file.display(), errors.len());
                for error in &errors {
                    eprintln!("  - {error}");
                }
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

async fn send(
    config: ClientConfig,
    method: &str,
    url: String,
    headers: Vec<String>,
    data: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.logging.enabled {
        init_logging(&config.logging)?;
    }
    if let Some(address) = &config.metrics.exporter_address {
        init_metrics(address.parse()?)?;
    }

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let mut request = Request::new(method, url);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header '{header}' is not in NAME:VALUE form"))?;
        request = request.header(name.trim(), value.trim());
    }
    if let Some(data) = data {
        request = if json {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            request.body(value)
        } else {
            request.body(data)
        };
    }

    let client = ResilientHttpClient::new(config)?;
    let response = client.execute(request).await?;

    let body = match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(value) => value,
        Err(_) => serde_json::Value::String(response.text()),
    };
    let output = json!({
        "status": response.status,
        "headers": response.headers,
        "body": body,
        "retry_count": response.retry_count,
        "correlation_id": response.correlation_id,
        "duration_ms": response.duration.as_millis() as u64,
        "error": response.error,
        "circuit": client.circuit_stats(),
        "metrics": client.metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
