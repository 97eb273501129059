//! Door camera snapshots attached to notifications.
//!
//! A snapshot is taken on the notifier thread right before delivery, either
//! by running a capture command that writes the image to stdout
//! (`fswebcam -`, `libcamera-still -o -`) or by reading a file another
//! process keeps fresh. The command is bounded in time and output size.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Larger captures are cut off and the command is left to time out
pub const MAX_SNAPSHOT_BYTES: u64 = 8 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn default_timeout_ms() -> u64 {
    5_000
}

pub trait ImageSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn capture(&self) -> Result<Vec<u8>, SnapshotError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotConfig {
    /// Notifications carry no image
    #[default]
    Disabled,
    /// Run `program args...` and take its stdout as the image
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// Read the image from a file
    File { path: PathBuf },
}

impl SnapshotConfig {
    pub fn build(&self) -> Option<Arc<dyn ImageSource>> {
        match self {
            SnapshotConfig::Disabled => None,
            SnapshotConfig::Command {
                program,
                args,
                timeout_ms,
            } => Some(Arc::new(CommandSnapshot::new(
                program.clone(),
                args.clone(),
                Duration::from_millis(*timeout_ms),
            ))),
            SnapshotConfig::File { path } => Some(Arc::new(FileSnapshot::new(path.clone()))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSnapshot {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSnapshot {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn failed(&self, details: impl Into<String>) -> SnapshotError {
        SnapshotError::CommandFailed {
            program: self.program.clone(),
            details: details.into(),
        }
    }

    fn timed_out(&self, child: &mut Child) -> SnapshotError {
        let _ = child.kill();
        let _ = child.wait();
        SnapshotError::Timeout {
            program: self.program.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

impl ImageSource for CommandSnapshot {
    fn name(&self) -> &'static str {
        "command"
    }

    fn capture(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.failed(e.to_string()))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(self.failed("stdout was not captured"));
        };

        // The pipe is drained on its own thread so a large image cannot
        // fill it and stall the child.
        let reader = thread::spawn(move || {
            let mut image = Vec::new();
            stdout
                .take(MAX_SNAPSHOT_BYTES)
                .read_to_end(&mut image)
                .map(|_| image)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => return Err(self.timed_out(&mut child)),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.failed(e.to_string()));
                }
            }
        };

        // A descendant may still hold stdout open
        while !reader.is_finished() {
            if Instant::now() >= deadline {
                return Err(SnapshotError::Timeout {
                    program: self.program.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }

        if !status.success() {
            return Err(self.failed(format!("exited with {}", status)));
        }

        let image = match reader.join() {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => return Err(self.failed(e.to_string())),
            Err(_) => return Err(self.failed("stdout reader panicked")),
        };
        if image.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(image)
    }
}

#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ImageSource for FileSnapshot {
    fn name(&self) -> &'static str {
        "file"
    }

    fn capture(&self) -> Result<Vec<u8>, SnapshotError> {
        let image = fs::read(&self.path).map_err(|e| SnapshotError::ReadFailed {
            path: self.path.display().to_string(),
            details: e.to_string(),
        })?;
        if image.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout_ms: u64) -> CommandSnapshot {
        CommandSnapshot::new(
            "sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
            Duration::from_millis(timeout_ms),
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_command_stdout_is_the_image() {
        let image = sh("printf '\\377\\330JPEG'", 2_000).capture().unwrap();
        assert_eq!(image, b"\xff\xd8JPEG");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failures() {
        assert!(matches!(
            sh("exit 3", 2_000).capture(),
            Err(SnapshotError::CommandFailed { .. })
        ));
        assert_eq!(sh("true", 2_000).capture(), Err(SnapshotError::Empty));

        let missing = CommandSnapshot::new(
            "no-such-camera-tool".to_string(),
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            missing.capture(),
            Err(SnapshotError::CommandFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_times_out() {
        let started = Instant::now();
        let result = sh("sleep 5", 100).capture();
        assert!(matches!(
            result,
            Err(SnapshotError::Timeout {
                timeout_ms: 100,
                ..
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_file_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("door.jpg");

        let source = FileSnapshot::new(path.clone());
        assert!(matches!(
            source.capture(),
            Err(SnapshotError::ReadFailed { .. })
        ));

        fs::write(&path, b"").unwrap();
        assert_eq!(source.capture(), Err(SnapshotError::Empty));

        fs::write(&path, b"\xff\xd8frame").unwrap();
        assert_eq!(source.capture().unwrap(), b"\xff\xd8frame");
    }

    #[test]
    fn test_config_builds_sources() {
        assert!(SnapshotConfig::default().build().is_none());

        let parsed: SnapshotConfig =
            serde_json::from_str(r#"{"kind": "command", "program": "fswebcam", "args": ["-"]}"#)
                .unwrap();
        assert_eq!(
            parsed,
            SnapshotConfig::Command {
                program: "fswebcam".to_string(),
                args: vec!["-".to_string()],
                timeout_ms: 5_000,
            }
        );
        assert_eq!(parsed.build().unwrap().name(), "command");
    }
}
