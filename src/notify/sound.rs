//! Audible alerts.

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

use super::NotificationSink;
use crate::alert::AlertEvent;
use crate::config::SoundSettings;

/// Plays the configured sound file through an external player, or rings the
/// terminal bell when no player is configured. The player runs to completion
/// inside `notify`, so the frame loop waits for the clip.
pub struct AudibleSink {
    settings: SoundSettings,
}

impl AudibleSink {
    pub fn new(settings: SoundSettings) -> Self {
        Self { settings }
    }

    fn play(&self, player: &str) -> Result<()> {
        if !self.settings.path.is_file() {
            return Err(anyhow!(
                "alert sound {} not found",
                self.settings.path.display()
            ));
        }
        let mut parts = player.split_whitespace();
        let program = parts.next().ok_or_else(|| anyhow!("sound player command is empty"))?;
        let status = Command::new(program)
            .args(parts)
            .arg(&self.settings.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to start sound player '{}'", program))?;
        if !status.success() {
            return Err(anyhow!("sound player '{}' exited with {}", program, status));
        }
        Ok(())
    }
}

impl NotificationSink for AudibleSink {
    fn name(&self) -> &'static str {
        "sound"
    }

    fn notify(&mut self, _event: &AlertEvent) -> Result<()> {
        match self.settings.player.as_deref() {
            Some(player) => self.play(player),
            None => {
                let mut stderr = std::io::stderr();
                stderr.write_all(b"\x07").context("ring terminal bell")?;
                stderr.flush().context("ring terminal bell")?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceKind;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn event() -> AlertEvent {
        AlertEvent {
            label: "fire".into(),
            frame_timestamp: SystemTime::now(),
            frame_index: 1,
            source: SourceKind::Image,
            confidence: 0.9,
        }
    }

    #[test]
    fn bell_without_player_succeeds() {
        let mut sink = AudibleSink::new(SoundSettings {
            path: PathBuf::from("missing.wav"),
            player: None,
        });
        assert!(sink.notify(&event()).is_ok());
    }

    #[test]
    fn missing_sound_file_is_a_failure() {
        let mut sink = AudibleSink::new(SoundSettings {
            path: PathBuf::from("/nonexistent/alert.wav"),
            player: Some("aplay -q".into()),
        });
        let err = sink.notify(&event()).expect_err("missing file");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn unknown_player_is_a_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("alert.wav");
        std::fs::write(&path, b"RIFF")?;
        let mut sink = AudibleSink::new(SoundSettings {
            path,
            player: Some("watchpost-no-such-player".into()),
        });
        assert!(sink.notify(&event()).is_err());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return 0;
        };
        entries
            .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("stat")).ok())
            .filter(|stat| {
                // "<pid> (<comm>) <state> <ppid> ..."; comm may contain spaces.
                let Some((_, rest)) = stat.rsplit_once(')') else {
                    return false;
                };
                let mut fields = rest.split_whitespace();
                fields.next() == Some("Z") && fields.next() == Some(me.as_str())
            })
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn player_processes_are_reaped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("alert.wav");
        std::fs::write(&path, b"RIFF")?;
        let mut sink = AudibleSink::new(SoundSettings {
            path,
            player: Some("true".into()),
        });
        let before = zombie_children();
        for _ in 0..20 {
            sink.notify(&event())?;
        }
        assert!(zombie_children() <= before);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_player_is_a_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("alert.wav");
        std::fs::write(&path, b"RIFF")?;
        let mut sink = AudibleSink::new(SoundSettings {
            path,
            player: Some("false".into()),
        });
        assert!(sink.notify(&event()).is_err());
        Ok(())
    }
}
