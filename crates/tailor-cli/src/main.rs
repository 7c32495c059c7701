mod cli;

use anyhow::Context;
use clap::Parser;
use tailor_core::app::AppBuilder;
use tailor_core::domain::ResizeJob;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Command, ServeArgs};

const DEFAULT_FILTER: &str = "tailor=info,tailor_core=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Fingerprint {
            url,
            width,
            height,
            key_prefix,
        } => {
            let job = ResizeJob::new(url, width, height);
            println!("fingerprint  {}", job.fingerprint());
            println!("original     {}", job.local_file_name());
            println!("resized      {}", job.resized_file_name());
            println!("publish key  {}", job.publish_key(&key_prefix));
            Ok(())
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config();
    let addr = config.socket_addr()?;

    let app = AppBuilder::new(config)
        .build()
        .await
        .context("building service")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => error!("cannot listen for ctrl-c: {}", e),
            }
        }
    });

    app.serve(listener, shutdown).await.context("http server")?;
    info!("bye");
    Ok(())
}
