use crate::commands::{Cli, Commands, DiscIdCommand, RunCommand};
use crate::drive::CommandProbe;
use crate::metadata::NullResolver;
use crate::disc::models::ParsedToc;
use crate::orchestrator::DriveOrchestrator;
use crate::playback::{MPlayerSpawner, PlaybackController};
use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

mod commands;
mod disc;
mod drive;
mod metadata;
mod orchestrator;
mod playback;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(cmd) => run(cmd).await?,
        Commands::DiscId(cmd) => print_disc_id(cmd).await?,
    }

    Ok(())
}

/// Reads a saved TOC dump, `-` meaning stdin.
async fn read_toc(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

/// The identity plus the table it was hashed from, for comparing against other tools.
fn disc_id_record(parsed: &ParsedToc) -> Result<serde_json::Value> {
    let table = &parsed.table;
    let mut record = disc::identify(table).to_record()?;
    record["firstTrack"] = json!(table.first_track());
    record["lastTrack"] = json!(table.last_track());
    record["leadOut"] = json!(table.lead_out());
    record["offsets"] = (1..=table.last_track())
        .filter_map(|track| table.track_offset(track))
        .collect();
    record["diagnostics"] = parsed
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.to_string())
        .collect();
    Ok(record)
}

async fn print_disc_id(cmd: DiscIdCommand) -> Result<()> {
    let text = read_toc(&cmd.toc_file).await?;
    let parsed = disc::try_parse(&text)?;
    for diagnostic in &parsed.diagnostics {
        debug!("{diagnostic}");
    }

    emit(&disc_id_record(&parsed)?)
}

/// Requests accepted on stdin, either `{"action":"play"}` or a bare `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Eject,
    Status,
}

#[derive(Debug, Deserialize)]
struct Request {
    action: Action,
}

fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    serde_json::from_str::<Request>(line)
        .map(|request| request.action)
        .or_else(|_| serde_json::from_value(json!(line.to_lowercase())))
        .ok()
}

fn emit(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn emit_state(orchestrator: &DriveOrchestrator) -> Result<()> {
    emit(&orchestrator.snapshot())
}

/// Reads one newline terminated command, `None` at end of input.
///
/// Safe to cancel: a partial line stays in `buffer` until the rest arrives. Invalid UTF-8 is
/// replaced rather than rejected.
async fn read_command<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    if reader.read_until(b'\n', buffer).await? == 0 && buffer.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buffer).into_owned();
    buffer.clear();
    Ok(Some(line))
}

fn report_error(message: String) -> Result<()> {
    warn!("{message}");
    emit(&json!({ "type": "error", "message": message }))
}

async fn handle_action(orchestrator: &DriveOrchestrator, action: Action) -> Result<()> {
    let ok = match action {
        Action::Play => orchestrator.play().await,
        Action::Pause => orchestrator.pause().await,
        Action::Stop => orchestrator.stop_playback().await,
        Action::Next => orchestrator.next().await,
        Action::Previous => orchestrator.previous().await,
        Action::Eject => orchestrator.eject().await,
        Action::Status => return emit_state(orchestrator),
    };
    emit(&json!({ "type": "result", "action": action, "ok": ok }))
}

async fn run(cmd: RunCommand) -> Result<()> {
    let player_config = cmd.player_config();
    let controller = PlaybackController::new(
        Arc::new(MPlayerSpawner::new(player_config.clone())),
        player_config,
    );
    let orchestrator = DriveOrchestrator::new(
        Arc::new(CommandProbe::new(cmd.probe_config())),
        cmd.monitor_config(),
        controller,
        Arc::new(NullResolver),
    );

    let mut events = orchestrator.subscribe();
    emit_state(&orchestrator)?;
    orchestrator.start().await;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut buffer = Vec::new();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => emit(&event)?,
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {skipped} drive events"),
                Err(RecvError::Closed) => break,
            },
            line = read_command(&mut stdin, &mut buffer), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_action(&line) {
                    Some(action) => handle_action(&orchestrator, action).await?,
                    None => report_error(format!("unknown command: {}", line.trim()))?,
                },
                Ok(None) => {
                    debug!("stdin closed, no longer reading commands");
                    stdin_open = false;
                }
                Err(e) => {
                    report_error(format!("stdin unreadable, no longer reading commands: {e}"))?;
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    orchestrator.stop().await;
    Ok(())
}
