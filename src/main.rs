//! Binary entrypoint for the xbeebridge CLI.
//!
//! Commands:
//! - `run [--port <path>]` - start the bridge, optionally overriding the configured serial port
//! - `init` - create a starter `config.toml`
//! - `inspect <line>...` - classify serial lines offline and print the routing decision as JSON
//!
//! See the library crate docs for module‑level details: `xbeebridge::`.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use xbeebridge::bridge::router::{RouteOutcome, Router};
use xbeebridge::bridge::Bridge;
use xbeebridge::config::Config;
use xbeebridge::error::BridgeResult;
use xbeebridge::mqtt::Publisher;
use xbeebridge::xbee::codec;

#[derive(Parser)]
#[command(name = "xbeebridge")]
#[command(about = "Bridge between an XBee serial radio and an MQTT broker over TLS")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge
    Run {
        /// XBee serial port (e.g., /dev/ttyUSB0); overrides the config file
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Parse serial lines without touching the radio or the broker
    Inspect {
        /// Lines as the radio would send them, e.g. "REPORT:N1:80:temp=22"
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

/// Stands in for the broker during `inspect`; records what would have been published.
struct DryRun {
    published: Vec<(String, String)>,
}

impl Publisher for DryRun {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<()> {
        self.published
            .push((topic.to_string(), String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { port } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(Some(&config), cli.verbose);
            info!("Starting xbeebridge v{}", env!("CARGO_PKG_VERSION"));
            if let Some(port) = port {
                config.serial.port = port;
            }
            let mut bridge = Bridge::from_config(&config)
                .with_context(|| format!("Failed to start bridge on {}", config.serial.port))?;
            if let Err(e) = bridge.run().await {
                error!("Bridge stopped: {}", e);
                return Err(e.into());
            }
        }
        Commands::Init => {
            init_logging(None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Inspect { lines } => {
            init_logging(None, cli.verbose);
            let config = Config::load(&cli.config).await.unwrap_or_default();
            let router = Router::new(&config.topics.reports);
            for line in lines {
                let mut dry = DryRun {
                    published: Vec::new(),
                };
                let parsed = codec::parse(&line);
                let outcome = router.route_line(&line, &mut dry);
                let forwarded = matches!(outcome, RouteOutcome::Published { .. });
                let payload = serde_json::json!({
                    "line": line,
                    "kind": parsed.ok().flatten().map(|m| m.kind()),
                    "outcome": outcome,
                    "published": dry.published.iter().map(|(topic, message)| {
                        serde_json::json!({ "topic": topic, "message": message })
                    }).collect::<Vec<_>>(),
                    "forwarded": forwarded,
                });
                println!("{}", payload);
            }
        }
    }

    Ok(())
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Mirror to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
