use crate::drive::error::{ProbeError, ProbeResult};
use crate::drive::models::{ProbeConfig, ProbeReading};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

lazy_static! {
    static ref NO_MEDIA: Regex = Regex::new(r"(?i)cannot load media|no media present").unwrap();
    static ref AUDIO_CD: Regex = Regex::new(r"(?i)audio cd").unwrap();
}

/// Access to the optical drive.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Reads the TOC of the inserted disc, `None` when the drive has no media.
    async fn probe(&self) -> ProbeResult<Option<ProbeReading>>;

    async fn eject(&self, device: &Path) -> ProbeResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// wodim against the configured device
    Linux,
    /// diskutil for discovery, drutil for the TOC
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Probes the drive by running the platform's CD tools.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    config: ProbeConfig,
    platform: Platform,
}

impl CommandProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            platform: Platform::current(),
        }
    }

    async fn find_device(&self) -> ProbeResult<Option<PathBuf>> {
        match self.platform {
            Platform::Linux => Ok(Some(self.config.device.clone())),
            Platform::MacOs => {
                let listing = run_command("diskutil", &["list"], self.config.timeout).await?;
                Ok(find_audio_cd_device(&listing))
            }
        }
    }

    async fn read_toc(&self, device: &Path) -> ProbeResult<String> {
        match self.platform {
            Platform::Linux => {
                let dev = format!("dev={}", device.display());
                run_command("wodim", &[dev.as_str(), "-toc"], self.config.timeout).await
            }
            Platform::MacOs => run_command("drutil", &["toc"], self.config.timeout).await,
        }
    }
}

#[async_trait]
impl Probe for CommandProbe {
    async fn probe(&self) -> ProbeResult<Option<ProbeReading>> {
        let Some(device) = self.find_device().await? else {
            return Ok(None);
        };

        let toc = match self.read_toc(&device).await {
            Ok(toc) => toc,
            Err(ProbeError::CommandFailed { stderr, .. }) if is_no_media(&stderr) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if toc.is_empty() {
            return Ok(None);
        }

        Ok(Some(ProbeReading { device, toc }))
    }

    async fn eject(&self, device: &Path) -> ProbeResult<()> {
        match self.platform {
            Platform::Linux => {
                let device = device.to_string_lossy();
                run_command("eject", &[&*device], self.config.timeout).await?;
            }
            Platform::MacOs => {
                run_command("drutil", &["tray", "eject"], self.config.timeout).await?;
            }
        }
        Ok(())
    }
}

/// Runs a command to completion and returns its trimmed stdout.
pub async fn run_command(program: &str, args: &[&str], limit: Duration) -> ProbeResult<String> {
    let command_line = format!("{program} {}", args.join(" "));

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(limit, command.output())
        .await
        .map_err(|_| ProbeError::Timeout(command_line.clone()))??;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(ProbeError::CommandFailed {
            command: command_line,
            stderr,
        });
    }

    if !stderr.is_empty() {
        debug!("{command_line}: {stderr}");
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn is_no_media(message: &str) -> bool {
    NO_MEDIA.is_match(message)
}

/// Picks the first external physical disk that `diskutil list` reports as an audio CD.
pub fn find_audio_cd_device(listing: &str) -> Option<PathBuf> {
    let mut blocks: Vec<(&str, String)> = Vec::new();

    for line in listing.lines() {
        if line.starts_with("/dev/disk") {
            let device = line.split_whitespace().next().unwrap_or(line);
            blocks.push((device, line.to_string()));
        } else if let Some((_, body)) = blocks.last_mut() {
            body.push('\n');
            body.push_str(line);
        }
    }

    blocks
        .into_iter()
        .find(|(_, body)| body.contains("(external, physical)") && AUDIO_CD.is_match(body))
        .map(|(device, _)| PathBuf::from(device))
}
