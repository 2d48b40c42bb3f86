// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{anyhow, Result};
use chartalk::{ChatConfig, ChatSession, ConfigLoader, FileSource, HttpBackend};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod output;
use output::{print_alerts, print_turns, PageWriter};

#[derive(Parser, Debug, Clone)]
#[command(name = "chartalk", about = "Ask questions about a CSV file and get charts back")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "CHARTALK_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `backend.base_url`
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Directory receiving index.html and the chart SVGs
    #[arg(long, global = true, default_value = "chartalk-out")]
    out: PathBuf,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Interactive session; lines starting with ':' are commands
    Chat {
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    Ask {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long, short)]
        question: String,
    },

    Preview {
        #[arg(long)]
        csv: PathBuf,
    },
}

const HELP: &str = ":load <file>  load a CSV file\n\
                    :preview      toggle the data preview\n\
                    :clear        clear the chat\n\
                    :quit         leave";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let filter = if cli.debug {
        EnvFilter::new("chartalk=debug,chartalk_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let writer = PageWriter::new(&cli.out);
    match cli.cmd.unwrap_or(Command::Chat { csv: None }) {
        Command::Chat { csv } => run_chat(config, csv, &writer).await,
        Command::Ask { csv, question } => run_ask(config, &csv, &question, &writer).await,
        Command::Preview { csv } => run_preview(config, &csv, &writer).await,
    }
}

fn load_config(cli: &Cli) -> Result<ChatConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load()?;
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.clone();
        config.validate()?;
    }
    Ok(config)
}

fn new_session(config: ChatConfig) -> Result<ChatSession> {
    let backend = HttpBackend::new(config.backend.base_url.clone(), config.backend.timeout())?;
    info!("Using backend at {}", backend.base_url());
    let mut session = ChatSession::new(config, Arc::new(backend));
    session.on_busy_change(|busy| {
        if busy {
            eprintln!("Working...");
        }
    });
    Ok(session)
}

async fn load(session: &mut ChatSession, path: &Path) -> Result<()> {
    let file = FileSource::from_path(path)?;
    let loaded = session
        .load_file(Some(file))
        .await
        .map(|dataset| (dataset.len(), dataset.columns().join(", ")));
    match loaded {
        Ok((rows, columns)) => {
            println!("Loaded {} ({rows} rows, columns: {columns})", path.display());
            Ok(())
        }
        Err(e) => Err(anyhow!(session
            .file_error()
            .map_or_else(|| e.to_string(), str::to_string))),
    }
}

async fn ask(session: &mut ChatSession, question: &str, writer: &PageWriter) -> Result<()> {
    let turns = session.submit_query(question).await;
    print_turns(turns);
    if let Some(error) = session.query_error() {
        eprintln!("{error}");
    }
    print_alerts(session.take_alerts());
    let charts = writer.write(session)?;
    for chart in charts {
        println!("Chart written to {}", chart.display());
    }
    Ok(())
}

async fn run_ask(config: ChatConfig, csv: &Path, question: &str, writer: &PageWriter) -> Result<()> {
    let mut session = new_session(config)?;
    load(&mut session, csv).await?;
    ask(&mut session, question, writer).await?;
    println!("Page written to {}", writer.dir().join("index.html").display());
    Ok(())
}

async fn run_preview(config: ChatConfig, csv: &Path, writer: &PageWriter) -> Result<()> {
    let mut session = new_session(config)?;
    load(&mut session, csv).await?;
    session.toggle_preview();
    if let Some(dataset) = session.dataset() {
        for (name, kind) in dataset.column_types() {
            println!("  {name}: {}", kind.label());
        }
    }
    writer.write(&session)?;
    println!("Page written to {}", writer.dir().join("index.html").display());
    Ok(())
}

async fn run_chat(config: ChatConfig, csv: Option<PathBuf>, writer: &PageWriter) -> Result<()> {
    let mut session = new_session(config)?;
    if let Some(path) = csv {
        if let Err(e) = load(&mut session, &path).await {
            eprintln!("{e}");
        }
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            (":quit" | ":q", _) => break,
            (":help", _) => println!("{HELP}"),
            (":load", path) => {
                if !session.request_file_picker() {
                    warn!("Ignoring repeated :load");
                    continue;
                }
                if path.is_empty() {
                    eprintln!("usage: :load <file>");
                    continue;
                }
                if let Err(e) = load(&mut session, Path::new(path)).await {
                    eprintln!("{e}");
                }
                writer.write(&session)?;
            }
            (":preview", _) => {
                let visible = session.toggle_preview();
                println!("Preview {}", if visible { "shown" } else { "hidden" });
                writer.write(&session)?;
            }
            (":clear", _) => {
                session.clear_transcript();
                writer.write(&session)?;
            }
            _ => ask(&mut session, line, writer).await?,
        }
    }
    Ok(())
}
