mod config;
mod conversation;
mod departments;
mod error;
mod llm;
mod logging;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use crate::config::AppConfig;
use crate::conversation::Conversation;
use crate::departments::DepartmentDispatcher;
use crate::llm::{AgentClient, build_http_client};
use crate::logging::init_logging;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cs-relay",
    version,
    about = "Interactive customer-service chat that delegates to department agents"
)]
pub struct Cli {
    /// Path to a TOML config file (default: ~/.config/cs-relay/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log filter (error,warn,info,debug,trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let cfg = AppConfig::from_cli(cli)?;
    init_logging(&cfg.log_level)?;
    info!(?cfg, "app config");
    cfg.log_credentials();

    let http = build_http_client(&cfg.http)?;
    let client = AgentClient::new(cfg.endpoint.clone(), cfg.main_api_key.clone(), http.clone());
    let dispatcher = DepartmentDispatcher::new(cfg.departments.clone(), http);

    let mut conversation = Conversation::new(client, dispatcher, io::stdout());
    conversation.run(io::stdin().lock()).await
}
