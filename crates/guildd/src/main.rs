//! guildd - guild site backend daemon
//!
//! Proxies the game-data API and asset host under `/api/<name>`, caching
//! character stats from proxied profiles, and serves the leaderboards.
//!
//! Usage:
//!   guildd [OPTIONS] [config.toml]
//!
//! Without a config file the stock routes and defaults are used; secrets
//! and deployment settings come from the environment (or `.env`).

use std::net::SocketAddr;

use guildd::{build_router, open_store, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Server config file (TOML)
    config_path: Option<String>,
    /// Overrides `[server] port` and `PORT`
    port: Option<u16>,
    /// Emit logs as JSON lines
    log_json: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        port: None,
        log_json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                match args.get(i + 1).map(|p| p.parse::<u16>()) {
                    Some(Ok(port)) => result.port = Some(port),
                    Some(Err(_)) => eprintln!("Invalid port: {}", args[i + 1]),
                    None => eprintln!("Missing argument for --port"),
                }
                i += 2;
            }
            "--log-json" => {
                result.log_json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                i += 1;
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"guildd - Guild site backend

Usage: guildd [OPTIONS] [config.toml]

Options:
  -p, --port <port>  Listen port (overrides config and PORT)
      --log-json     Log as JSON lines
  -h, --help         Print this help message

Environment:
  PORT, FRONTEND_URL, BLIZZARD_CLIENT_ID, BLIZZARD_CLIENT_SECRET,
  DATABASE_URL, GUILD_NAME (also read from .env)

Examples:
  # Stock routes, in-memory cache
  guildd

  # With a config file on port 8080
  guildd -p 8080 guildd.toml
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "guildd=info,guild_api=info,guild_proxy=debug,guild_db=info,tower_http=info".into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = parse_args();
    init_logging(args.log_json);

    tracing::info!("Starting guildd");
    if let Ok(path) = dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let mut config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading config from: {}", path);
            Config::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            Config::default()
        }
    };
    config.apply_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = open_store(&config).await?;
    let app = build_router(&config, store)?;

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(guild = %config.guild.name, "Listening on http://{}", addr);

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
