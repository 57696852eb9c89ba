use crate::playback::error::{PlaybackError, PlaybackResult};
use crate::playback::player::{PlayerProcess, PlayerSpawner};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::{mpsc, oneshot};

/// The far side of a spawned fake player.
pub struct FakePlayer {
    pub commands: Lines<BufReader<DuplexStream>>,
    pub replies: DuplexStream,
    pub exit: oneshot::Sender<Option<i32>>,
    pub killed: oneshot::Receiver<()>,
}

impl FakePlayer {
    pub async fn next_line(&mut self) -> Option<String> {
        self.commands.next_line().await.unwrap()
    }

    /// Next command other than a position query.
    pub async fn command(&mut self) -> String {
        loop {
            let line = self.next_line().await.expect("player stdin closed");
            if line != "get_time_pos" {
                return line;
            }
        }
    }

    pub async fn reply(&mut self, line: &str) {
        self.replies
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    pub fn exit(self, code: i32) {
        let FakePlayer { replies, exit, .. } = self;
        drop(replies);
        exit.send(Some(code)).unwrap();
    }
}

/// Hands every spawned player to the test through a channel.
pub struct FakeSpawner {
    players: mpsc::UnboundedSender<FakePlayer>,
    fail: bool,
    /// Bytes each pipe buffers before writes block.
    capacity: usize,
}

impl FakeSpawner {
    pub fn new(fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<FakePlayer>) {
        Self::with_capacity(fail, 64 * 1024)
    }

    pub fn with_capacity(
        fail: bool,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FakePlayer>) {
        let (players, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                players,
                fail,
                capacity,
            }),
            rx,
        )
    }
}

impl PlayerSpawner for FakeSpawner {
    fn spawn(&self, _device: &Path) -> PlaybackResult<PlayerProcess> {
        if self.fail {
            return Err(PlaybackError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "mplayer",
            )));
        }

        let (stdin, commands) = tokio::io::duplex(self.capacity);
        let (replies, stdout) = tokio::io::duplex(self.capacity);
        let (exit, exited) = oneshot::channel();
        let (kill, killed) = oneshot::channel();
        // the test may have dropped its receiver already
        let _ = self.players.send(FakePlayer {
            commands: BufReader::new(commands).lines(),
            replies,
            exit,
            killed,
        });

        Ok(PlayerProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            exited,
            kill,
            pid: None,
        })
    }
}
