use crate::playback::error::{PlaybackError, PlaybackResult};
use crate::playback::models::PlayerConfig;
use log::{debug, info};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// A running player with its pipes split off.
pub struct PlayerProcess {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Resolves with the exit code once the process is gone.
    pub exited: oneshot::Receiver<Option<i32>>,
    /// Sending, or dropping, terminates the process.
    pub kill: oneshot::Sender<()>,
    pub pid: Option<u32>,
}

pub trait PlayerSpawner: Send + Sync {
    fn spawn(&self, device: &Path) -> PlaybackResult<PlayerProcess>;
}

/// Starts mplayer in slave mode, reading audio straight from the drive.
#[derive(Debug, Clone)]
pub struct MPlayerSpawner {
    config: PlayerConfig,
}

impl MPlayerSpawner {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    fn args(&self, device: &Path) -> Vec<String> {
        [
            "-nogui",
            "-slave",
            "-quiet",
            "-idle",
            "-ao",
            self.config.audio_output.as_str(),
            "-cdda",
            "speed=4:paranoia=0",
            "-cache",
            "2048",
            "-cache-min",
            "1",
            "-cdrom-device",
        ]
        .into_iter()
        .map(String::from)
        .chain(std::iter::once(device.to_string_lossy().into_owned()))
        .collect()
    }
}

impl PlayerSpawner for MPlayerSpawner {
    fn spawn(&self, device: &Path) -> PlaybackResult<PlayerProcess> {
        let args = self.args(device);
        info!("Spawning {} {}", self.config.binary.display(), args.join(" "));

        let mut command = Command::new(&self.config.binary);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(card) = &self.config.alsa_card {
            command.env("ALSA_CARD", card);
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(PlaybackError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(PlaybackError::MissingPipe("stdout"))?;
        let pid = child.id();

        let (exit_tx, exited) = oneshot::channel();
        let (kill, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, exit_tx));

        Ok(PlayerProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            exited,
            kill,
            pid,
        })
    }
}

async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            info!("Killing player [{}]", child.id().unwrap_or_default());
            if let Err(e) = child.start_kill() {
                debug!("Failed to signal the player: {e}");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            debug!("Failed to wait on the player: {e}");
            None
        }
    };
    let _ = exit_tx.send(code);
}
