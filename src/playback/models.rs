use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of the player. `track` is 1-based, 0 when no track is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub track: u32,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

impl PlaybackStatus {
    pub fn is_active(&self) -> bool {
        self.state != PlaybackState::Stopped
    }
}

/// `m:ss`, minutes unpadded.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_elapsed(*elapsed))
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub binary: PathBuf,
    pub audio_output: String,
    /// Exported as `ALSA_CARD` when set.
    pub alsa_card: Option<String>,
    pub poll_interval: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mplayer"),
            audio_output: "alsa".to_string(),
            alsa_card: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}
