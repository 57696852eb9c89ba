use crate::playback::protocol::{PlayerCommand, PlayerReply, classify_reply};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

pub mod error;
pub mod models;
pub mod player;
pub mod protocol;
#[cfg(test)]
pub(crate) mod testing;

pub use models::{PlaybackState, PlaybackStatus, PlayerConfig};
pub use player::{MPlayerSpawner, PlayerSpawner};

/// How long `shutdown` waits for `quit` to reach the player before killing it.
const QUIT_GRACE: Duration = Duration::from_millis(500);

struct PlayerHandle {
    generation: u64,
    /// Queue drained by the writer task, in order.
    commands: mpsc::UnboundedSender<PlayerCommand>,
    writer: JoinHandle<()>,
    kill: oneshot::Sender<()>,
    pid: Option<u32>,
}

#[derive(Default)]
struct ControllerState {
    status: PlaybackStatus,
    track_count: u32,
    device: Option<PathBuf>,
    player: Option<PlayerHandle>,
    /// Bumped on every spawn so output and exits of a replaced player are ignored.
    generation: u64,
    poll_task: Option<JoinHandle<()>>,
}

impl ControllerState {
    fn owns(&self, generation: u64) -> bool {
        self.player.as_ref().map(|p| p.generation) == Some(generation)
    }
}

struct Shared {
    spawner: Arc<dyn PlayerSpawner>,
    config: PlayerConfig,
    state: Mutex<ControllerState>,
    status: watch::Sender<PlaybackStatus>,
}

/// Drives an mplayer subprocess and tracks what it is playing.
///
/// Commands and position queries are queued to a single writer task, so they reach the
/// player in the order they were issued and a slow pipe never holds the state lock.
/// Every status change is published on a watch channel.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn new(spawner: Arc<dyn PlayerSpawner>, config: PlayerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                spawner,
                config,
                state: Mutex::new(ControllerState::default()),
                status: watch::Sender::new(PlaybackStatus::default()),
            }),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status.subscribe()
    }

    /// Binds the controller to a freshly inserted disc.
    pub async fn load_disc(&self, device: PathBuf, track_count: u32) {
        let mut state = self.shared.state.lock().await;
        debug!("Loaded {} with {track_count} tracks", device.display());
        state.device = Some(device);
        state.track_count = track_count;
    }

    /// Kills the player and forgets the disc.
    pub async fn unload(&self) {
        let mut state = self.shared.state.lock().await;
        Self::kill_player(&mut state);
        Self::force_stopped(&mut state);
        state.device = None;
        state.track_count = 0;
        self.publish(&state);
    }

    /// Asks the player to quit, then makes sure it is gone.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(player) = state.player.take() {
            let PlayerHandle {
                commands,
                writer,
                kill,
                pid,
                ..
            } = player;
            let _ = commands.send(PlayerCommand::Quit);
            drop(commands);
            if timeout(QUIT_GRACE, writer).await.is_err() {
                debug!("Player did not take `quit` in time");
            }
            info!("Stopping player [{}]", pid.unwrap_or_default());
            let _ = kill.send(());
        }
        Self::force_stopped(&mut state);
        self.publish(&state);
    }

    pub async fn play(&self) -> bool {
        let mut state = self.shared.state.lock().await;

        let current = state.status.state;
        match current {
            PlaybackState::Playing => return false,
            PlaybackState::Paused if state.player.is_some() => {
                Self::send(&state, PlayerCommand::Pause);
                state.status.state = PlaybackState::Playing;
                self.start_polling(&mut state);
                self.publish(&state);
                return true;
            }
            _ => {}
        }

        if !self.ensure_player(&mut state) {
            Self::force_stopped(&mut state);
            self.publish(&state);
            return false;
        }

        if state.status.track == 0 {
            state.status.track = 1;
        }
        let track = state.status.track;
        Self::send(&state, PlayerCommand::LoadTrack(track));
        state.status.state = PlaybackState::Playing;
        state.status.elapsed = Duration::ZERO;
        self.start_polling(&mut state);
        self.publish(&state);
        true
    }

    pub async fn pause(&self) -> bool {
        let mut state = self.shared.state.lock().await;
        if state.status.state != PlaybackState::Playing {
            return false;
        }

        Self::send(&state, PlayerCommand::Pause);
        state.status.state = PlaybackState::Paused;
        Self::stop_polling(&mut state);
        self.publish(&state);
        true
    }

    pub async fn stop(&self) -> bool {
        let mut state = self.shared.state.lock().await;
        if state.status.state == PlaybackState::Stopped {
            return false;
        }

        Self::send(&state, PlayerCommand::Stop);
        state.status.state = PlaybackState::Stopped;
        state.status.elapsed = Duration::ZERO;
        Self::stop_polling(&mut state);
        self.publish(&state);
        true
    }

    pub async fn next(&self) -> bool {
        self.step(1).await
    }

    pub async fn previous(&self) -> bool {
        self.step(-1).await
    }

    async fn step(&self, delta: i32) -> bool {
        let mut state = self.shared.state.lock().await;
        if state.status.state == PlaybackState::Stopped || state.player.is_none() {
            return false;
        }

        let track_count = state.track_count;
        let Some(track) = state
            .status
            .track
            .checked_add_signed(delta)
            .filter(|track| (1..=track_count).contains(track))
        else {
            return false;
        };

        state.status.track = track;
        state.status.elapsed = Duration::ZERO;
        Self::send(&state, PlayerCommand::LoadTrack(track));
        if state.status.state == PlaybackState::Paused {
            // loadfile resumes playback
            Self::send(&state, PlayerCommand::Pause);
        }
        self.publish(&state);
        true
    }

    async fn handle_reply(&self, generation: u64, line: &str) {
        let mut state = self.shared.state.lock().await;
        if !state.owns(generation) {
            return;
        }

        match classify_reply(line) {
            PlayerReply::TimePosition(seconds) => {
                if state.status.state == PlaybackState::Stopped {
                    return;
                }
                let elapsed = seconds.map(Duration::from_secs_f64).unwrap_or_default();
                if state.status.elapsed != elapsed {
                    state.status.elapsed = elapsed;
                    self.publish(&state);
                }
            }
            PlayerReply::PropertyUnavailable => self.track_finished(&mut state),
            PlayerReply::Error(e) => debug!("Player error reply: {e}"),
            PlayerReply::Other => {}
        }
    }

    fn track_finished(&self, state: &mut ControllerState) {
        match state.status.state {
            PlaybackState::Stopped => {}
            PlaybackState::Playing if state.status.track < state.track_count => {
                state.status.track += 1;
                state.status.elapsed = Duration::ZERO;
                let track = state.status.track;
                debug!("Advancing to track {track}");
                Self::send(state, PlayerCommand::LoadTrack(track));
                self.publish(state);
            }
            _ => {
                debug!("Reached the end of the disc");
                Self::force_stopped(state);
                self.publish(state);
            }
        }
    }

    async fn handle_exit(&self, generation: u64, code: Option<i32>) {
        let mut state = self.shared.state.lock().await;
        if !state.owns(generation) {
            return;
        }

        info!("Player exited with {code:?}");
        state.player = None;
        Self::force_stopped(&mut state);
        self.publish(&state);
    }

    async fn poll(&self) {
        let state = self.shared.state.lock().await;
        if state.status.state != PlaybackState::Playing {
            return;
        }

        Self::send(&state, PlayerCommand::GetTimePos);
        self.publish(&state);
    }

    fn ensure_player(&self, state: &mut ControllerState) -> bool {
        if state.player.is_some() {
            return true;
        }
        let Some(device) = state.device.clone() else {
            debug!("No disc loaded, not starting the player");
            return false;
        };

        let process = match self.shared.spawner.spawn(&device) {
            Ok(process) => process,
            Err(e) => {
                warn!("Failed to start the player: {e}");
                return false;
            }
        };

        state.generation += 1;
        let generation = state.generation;
        let (commands, queue) = mpsc::unbounded_channel();
        state.player = Some(PlayerHandle {
            generation,
            commands,
            writer: tokio::spawn(write_commands(process.stdin, queue)),
            kill: process.kill,
            pid: process.pid,
        });

        tokio::spawn(watch_player(
            Arc::downgrade(&self.shared),
            generation,
            process.stdout,
            process.exited,
        ));
        true
    }

    fn start_polling(&self, state: &mut ControllerState) {
        if state.poll_task.is_some() {
            return;
        }

        let shared = Arc::downgrade(&self.shared);
        let period = self.shared.config.poll_interval;
        state.poll_task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                PlaybackController { shared }.poll().await;
            }
        }));
    }

    fn stop_polling(state: &mut ControllerState) {
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
    }

    fn force_stopped(state: &mut ControllerState) {
        Self::stop_polling(state);
        state.status = PlaybackStatus::default();
    }

    fn kill_player(state: &mut ControllerState) {
        if let Some(player) = state.player.take() {
            info!("Stopping player [{}]", player.pid.unwrap_or_default());
            player.writer.abort();
            let _ = player.kill.send(());
        }
    }

    fn send(state: &ControllerState, command: PlayerCommand) {
        let Some(player) = state.player.as_ref() else {
            return;
        };
        if player.commands.send(command).is_err() {
            debug!("Player input closed, dropping `{command}`");
        }
    }

    fn publish(&self, state: &ControllerState) {
        self.shared.status.send_replace(state.status);
    }
}

/// Writes queued commands to the player's stdin. Failures are logged and swallowed.
async fn write_commands(
    mut stdin: Box<dyn AsyncWrite + Send + Unpin>,
    mut queue: mpsc::UnboundedReceiver<PlayerCommand>,
) {
    while let Some(command) = queue.recv().await {
        debug!("STDIN mplayer {command}");
        let line = format!("{command}\n");
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Failed to send `{command}` to the player: {e}");
        }
    }
}

/// Feeds player output to the controller line by line, then reports the exit.
async fn watch_player(
    shared: Weak<Shared>,
    generation: u64,
    stdout: Box<dyn AsyncRead + Send + Unpin>,
    exited: oneshot::Receiver<Option<i32>>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let line = String::from_utf8_lossy(&buffer);
                PlaybackController { shared }
                    .handle_reply(generation, line.trim_end())
                    .await;
            }
            Err(e) => {
                debug!("Player output closed: {e}");
                break;
            }
        }
    }

    let code = exited.await.ok().flatten();
    if let Some(shared) = shared.upgrade() {
        PlaybackController { shared }
            .handle_exit(generation, code)
            .await;
    }
}
