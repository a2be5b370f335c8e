// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use samplepool::channel;
use samplepool::config::Settings;
use samplepool::coordinator::SessionManager;
use samplepool::error::{ErrorKind, Failure};
use samplepool::pool::builtin::all_resources;
use samplepool::pool::TempBlobStore;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A session manager for low-latency sample pools."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reads one JSON call per line from stdin and writes one JSON reply per
    /// line to stdout.
    Serve {
        /// The path to the settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Removes scratch files orphaned by an earlier process.
    Sweep {
        /// The scratch directory to sweep.
        dir: PathBuf,
    },
    /// Lists the bundled resources that can be loaded by category and index.
    Builtins {},
}

/// One call read from stdin. The id, if any, is echoed back in the reply.
#[derive(Deserialize)]
struct Call {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    arguments: Value,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Stdout carries replies, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let settings = Settings::load(config.as_deref())?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .max_blocking_threads(settings.max_blocking_threads())
                .build()?;
            runtime.block_on(serve(settings))?;
        }
        Commands::Sweep { dir } => {
            let removed = TempBlobStore::new(&dir).sweep()?;
            println!("Removed {} scratch file(s) from {}.", removed, dir.display());
        }
        Commands::Builtins {} => {
            for resource in all_resources() {
                println!(
                    "- {} (type: {}, index: {})",
                    resource,
                    resource.category().as_str(),
                    resource.index()
                );
            }
        }
    }

    Ok(())
}

async fn serve(settings: Settings) -> Result<(), Box<dyn Error>> {
    info!(
        backend = ?settings.backend(),
        scratch_dir = ?settings.scratch_dir(),
        max_blocking_threads = settings.max_blocking_threads(),
        "Starting session manager."
    );
    let (manager, coordinator) = SessionManager::start(
        settings.platform(),
        TempBlobStore::new(settings.scratch_dir()),
        settings.sweep_on_start(),
    );

    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(reply) = replies_rx.recv().await {
            let line = reply + "\n";
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!(err = %e, "Unable to write reply");
                return;
            }
            let _ = stdout.flush().await;
        }
    });

    // Calls run concurrently so that a load waiting on its completion never
    // holds up the calls behind it.
    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let manager = manager.clone();
        let replies_tx = replies_tx.clone();
        calls.spawn(async move {
            let reply = match serde_json::from_str::<Call>(&line) {
                Ok(call) => match channel::handle(&manager, &call.method, call.arguments).await {
                    Ok(result) => json!({"id": call.id, "result": result}),
                    Err(failure) => json!({"id": call.id, "error": failure}),
                },
                Err(e) => json!({
                    "id": Value::Null,
                    "error": Failure {
                        kind: ErrorKind::InvalidParameters,
                        message: e.to_string(),
                    },
                }),
            };
            let _ = replies_tx.send(reply.to_string());
        });
    }

    while calls.join_next().await.is_some() {}
    drop(replies_tx);
    drop(manager);
    coordinator.await?;
    writer.await?;
    info!("Session manager stopped.");
    Ok(())
}
