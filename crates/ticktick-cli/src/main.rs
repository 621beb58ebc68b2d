//! TickTick CLI - MCP server and OAuth helper for the TickTick Open API.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ticktick_api::{AccessToken, CredentialProvider, OAuthClient, TickTickClient};
use ticktick_core::config::Config;
use ticktick_mcp::{McpServer, ToolHandler};

mod auth;

#[derive(Parser)]
#[command(name = "ticktick")]
#[command(author, version, about = "TickTick task tools - MCP server and OAuth helper", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdin/stdout
    Serve,

    /// Authorize with TickTick via the browser
    Auth,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set a config value, e.g. `config set oauth.client_id <id>`
    Set {
        /// Key in section.field form
        key: String,
        /// Value to store
        value: String,
    },

    /// Read a single config value
    Get {
        /// Key in section.field form
        key: String,
    },

    /// Show the current configuration with secrets hidden
    Show,

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the MCP protocol, so logs go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Serve) | None => serve().await?,
        Some(Commands::Auth) => {
            let mut config = Config::load()?;
            config.apply_env();
            auth::login(config).await?;
        }
        Some(Commands::Config { command }) => handle_config(command)?,
    }

    Ok(())
}

/// Build the API client from config and run the MCP server loop.
async fn serve() -> anyhow::Result<()> {
    let mut config = Config::load()?;
    config.apply_env();

    let access_token = config.oauth.access_token.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "No access token configured. Run `ticktick auth` or set TICKTICK_ACCESS_TOKEN"
        )
    })?;

    // With app credentials available the provider can refresh expired
    // tokens; otherwise the token is used as-is until it stops working.
    let credentials = match OAuthClient::from_config(&config) {
        Ok(oauth) => CredentialProvider::new(
            oauth,
            AccessToken {
                access_token,
                refresh_token: config.oauth.refresh_token.clone(),
            },
            Some(Config::config_path()?),
        ),
        Err(_) => {
            tracing::debug!("OAuth app credentials not set, token refresh disabled");
            CredentialProvider::fixed(access_token)
        }
    };

    let client = TickTickClient::with_base_url(config.api.base_url.clone(), Arc::new(credentials));
    let handler = ToolHandler::new(Arc::new(client), config.display.clone());

    McpServer::new(handler).run().await?;
    Ok(())
}

fn handle_config(command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Updated {}", key);
        }
        ConfigCommands::Get { key } => {
            let config = Config::load()?;
            match config.get(&key)? {
                Some(value) => println!("{}", value),
                None => println!("(not set)"),
            }
        }
        ConfigCommands::Show => {
            let config = Config::load()?;
            println!("api.base_url = {}", config.api.base_url);
            println!("oauth.auth_url = {}", config.oauth.auth_url);
            println!("oauth.token_url = {}", config.oauth.token_url);
            println!(
                "oauth.client_id = {}",
                config.oauth.client_id.as_deref().unwrap_or("(not set)")
            );
            println!("oauth.client_secret = {}", mask(&config.oauth.client_secret));
            println!("oauth.access_token = {}", mask(&config.oauth.access_token));
            println!("oauth.refresh_token = {}", mask(&config.oauth.refresh_token));
            println!(
                "display.timezone = {}",
                config
                    .display
                    .timezone
                    .as_deref()
                    .unwrap_or("(system local)")
            );
            println!("display.week_start = {}", config.display.week_start);
        }
        ConfigCommands::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

fn mask(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "(set, hidden)",
        None => "(not set)",
    }
}
