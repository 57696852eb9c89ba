use std::fmt::{Display, Formatter};

/// Slave mode commands understood by mplayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    LoadTrack(u32),
    /// Toggles pause.
    Pause,
    Stop,
    GetTimePos,
    Quit,
}

impl Display for PlayerCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerCommand::LoadTrack(track) => write!(f, "loadfile cdda://{track}"),
            PlayerCommand::Pause => f.write_str("pause"),
            PlayerCommand::Stop => f.write_str("stop"),
            PlayerCommand::GetTimePos => f.write_str("get_time_pos"),
            PlayerCommand::Quit => f.write_str("quit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerReply {
    /// `ANS_TIME_POSITION=<seconds>`, `None` when the value is not a usable number.
    TimePosition(Option<f64>),
    /// `ANS_ERROR=PROPERTY_UNAVAILABLE`, which mplayer answers once nothing is loaded.
    PropertyUnavailable,
    Error(String),
    Other,
}

pub fn classify_reply(line: &str) -> PlayerReply {
    let Some((key, value)) = line.trim().split_once('=') else {
        return PlayerReply::Other;
    };
    let value = value.trim();

    match key {
        "ANS_TIME_POSITION" => PlayerReply::TimePosition(
            value
                .parse::<f64>()
                .ok()
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0),
        ),
        "ANS_ERROR" if value == "PROPERTY_UNAVAILABLE" => PlayerReply::PropertyUnavailable,
        "ANS_ERROR" => PlayerReply::Error(value.to_string()),
        _ => PlayerReply::Other,
    }
}
