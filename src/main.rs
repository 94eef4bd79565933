use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use devvisor::SessionConfig;

/// Run an app under a development session supervisor.
#[derive(Parser, Debug)]
#[command(name = "devvisor", version, about)]
struct Cli {
    /// Session config file (TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application directory.
    #[arg(long, value_name = "DIR")]
    app_dir: Option<PathBuf>,

    /// Public proxy port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Pin the application port instead of drawing a random one.
    #[arg(long)]
    app_port: Option<u16>,

    /// External database URL (disables the managed database).
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Settings file passed to the app as APP_SETTINGS.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Run the app once and exit with its status.
    #[arg(long)]
    once: bool,

    /// Hide progress lines.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<SessionConfig> {
        let mut cfg = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig {
                app_dir: std::env::current_dir().context("resolving current directory")?,
                proxy_port: 3000,
                ..SessionConfig::default()
            },
        };
        if let Some(dir) = self.app_dir {
            cfg.app_dir = dir;
        }
        if let Some(port) = self.port {
            cfg.proxy_port = port;
        }
        if self.app_port.is_some() {
            cfg.app_port = self.app_port;
        }
        if self.database_url.is_some() {
            cfg.database.url = self.database_url;
        }
        if self.settings.is_some() {
            cfg.settings_file = self.settings;
        }
        cfg.once |= self.once;
        cfg.quiet |= self.quiet;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("DEVVISOR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cfg = Cli::parse().into_config()?;
    let report = devvisor::run(cfg).await?;
    if let Some(message) = &report.message {
        eprint!("{message}");
    }
    std::process::exit(report.code);
}
