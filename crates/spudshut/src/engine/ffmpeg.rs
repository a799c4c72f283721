use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::command::{concat_args, concat_list, segment_args};
use super::{EngineError, MediaEngine, SegmentRequest};

const CONCAT_LIST_NAME: &str = ".concat_list.txt";

/// [`MediaEngine`] backed by the ffmpeg binary.
pub struct FfmpegEngine {
    program: String,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the tool to completion, collecting stderr for error reports.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// stage timeouts end a hung run.
    async fn run(&self, args: Vec<OsString>) -> Result<(), EngineError> {
        log::debug!("Running {} {:?}", self.program, args);

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| EngineError::ToolNotFound {
            program: self.program.clone(),
            source: e,
        })?;

        let stderr_pipe = child.stderr.take();
        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::trace!("{}: {}", self.program, line);
                    collected.push(line);
                }
            }
            collected
        };

        let (stderr_lines, status) = tokio::join!(stderr_task, child.wait());
        let status = status.map_err(|e| EngineError::Io {
            path: PathBuf::from(&self.program),
            source: e,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                program: self.program.clone(),
                code: status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: stderr_lines.join("\n").trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn segment(&self, req: &SegmentRequest) -> Result<(), EngineError> {
        self.run(segment_args(req)).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        let list_dir = inputs
            .first()
            .and_then(|p| p.parent())
            .ok_or_else(|| EngineError::Io {
                path: output.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no input files to concatenate",
                ),
            })?;
        let list_file = list_dir.join(CONCAT_LIST_NAME);

        tokio::fs::write(&list_file, concat_list(inputs))
            .await
            .map_err(|e| EngineError::Io {
                path: list_file.clone(),
                source: e,
            })?;

        let result = self.run(concat_args(&list_file, output)).await;

        if let Err(e) = tokio::fs::remove_file(&list_file).await {
            log::warn!("Failed to remove {}: {}", list_file.display(), e);
        }
        result
    }

    async fn probe(&self) -> Result<(), EngineError> {
        self.run(vec!["-hide_banner".into(), "-version".into()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_binary_is_fatal() {
        let engine = FfmpegEngine::new("/nonexistent/bin/ffmpeg-missing");
        let err = engine.probe().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, EngineError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_concat_without_inputs() {
        let engine = FfmpegEngine::new("ffmpeg");
        let err = engine.concat(&[], Path::new("/tmp/out.wav")).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
