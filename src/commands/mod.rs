use crate::drive::{MonitorConfig, ProbeConfig};
use crate::playback::PlayerConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Watches an optical drive, identifies audio CDs and plays them through mplayer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Eq, PartialEq)]
pub enum Commands {
    Run(RunCommand),
    DiscId(DiscIdCommand),
}

/// Monitors the drive, printing events as JSON lines and reading commands from stdin.
#[derive(Parser, Debug, Clone, Eq, PartialEq)]
pub struct RunCommand {
    /// Optical drive device
    #[arg(long, env = "CDCTL_DEVICE", default_value = "/dev/cdrom")]
    pub device: PathBuf,

    /// Milliseconds between drive probes
    #[arg(long, env = "CDCTL_POLL_INTERVAL_MS", default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Consecutive empty probes before a disc counts as ejected
    #[arg(long, env = "CDCTL_EJECT_THRESHOLD", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub eject_threshold: u32,

    /// Milliseconds before a probe command is abandoned
    #[arg(long, env = "CDCTL_PROBE_TIMEOUT_MS", default_value_t = 10_000)]
    pub probe_timeout_ms: u64,

    /// Keep probing the drive while a disc is playing
    #[arg(long, default_value_t = false)]
    pub no_suspend: bool,

    /// Player binary
    #[arg(long, env = "CDCTL_PLAYER", default_value = "mplayer")]
    pub player: PathBuf,

    /// mplayer audio output driver
    #[arg(long, env = "CDCTL_AUDIO_OUTPUT", default_value = "alsa")]
    pub audio_output: String,

    /// ALSA card handed to the player
    #[arg(long, env = "ALSA_CARD")]
    pub alsa_card: Option<String>,

    /// Milliseconds between playback position queries
    #[arg(long, env = "CDCTL_PLAYER_POLL_INTERVAL_MS", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub player_poll_interval_ms: u64,
}

impl RunCommand {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            eject_threshold: self.eject_threshold,
            suspend_while_playing: !self.no_suspend,
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            device: self.device.clone(),
            timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            binary: self.player.clone(),
            audio_output: self.audio_output.clone(),
            alsa_card: self.alsa_card.clone(),
            poll_interval: Duration::from_millis(self.player_poll_interval_ms),
        }
    }
}

/// Prints the disc ID of a saved TOC dump (wodim or drutil output).
#[derive(Parser, Debug, Clone, Eq, PartialEq)]
pub struct DiscIdCommand {
    /// TOC file, `-` reads stdin
    #[arg(value_name = "TOC_FILE")]
    pub toc_file: PathBuf,
}
