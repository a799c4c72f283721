//! In-process stand-ins for the media tool and the voice service.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use spudshut::engine::{EngineError, MediaEngine, SegmentRequest};
use spudshut::voice::{Voice, VoiceConverter, VoiceError};

/// Splits the input into `ceil(duration / chunk_seconds)` byte ranges, one
/// file per range, and joins by concatenating bytes in list order.
///
/// With the copy codec the joined output is therefore byte-identical to the
/// input, which is what a lossless segment / concat round trip produces.
pub struct FakeEngine {
    pub duration_secs: u32,
    pub segment_calls: AtomicUsize,
    pub concat_calls: AtomicUsize,
    /// `segment <input name>` / `concat <output name>`, in call order.
    pub log: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new(duration_secs: u32) -> Self {
        Self {
            duration_secs,
            segment_calls: AtomicUsize::new(0),
            concat_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn segments(&self) -> usize {
        self.segment_calls.load(Ordering::SeqCst)
    }

    pub fn concats(&self) -> usize {
        self.concat_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, op: &str, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log.lock().unwrap().push(format!("{} {}", op, name));
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn segment(&self, req: &SegmentRequest) -> Result<(), EngineError> {
        self.segment_calls.fetch_add(1, Ordering::SeqCst);
        self.record("segment", &req.input);
        let data = std::fs::read(&req.input).map_err(|e| EngineError::Io {
            path: req.input.clone(),
            source: e,
        })?;

        let count = self.duration_secs.div_ceil(req.chunk_seconds) as usize;
        let template = req.output_template.to_string_lossy().into_owned();
        for i in 0..count {
            let start = i * data.len() / count;
            let end = (i + 1) * data.len() / count;
            let path = PathBuf::from(template.replace("%03d", &format!("{:03}", i)));
            std::fs::write(&path, &data[start..end])
                .map_err(|e| EngineError::Io { path, source: e })?;
        }
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        self.concat_calls.fetch_add(1, Ordering::SeqCst);
        self.record("concat", output);
        let mut data = Vec::new();
        for input in inputs {
            data.extend(std::fs::read(input).map_err(|e| EngineError::Io {
                path: input.clone(),
                source: e,
            })?);
        }
        std::fs::write(output, data).map_err(|e| EngineError::Io {
            path: output.to_path_buf(),
            source: e,
        })
    }

    async fn probe(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterMode {
    /// Prefix every chunk with `converted:`.
    Echo,
    /// Reject every request as unauthorized.
    Unauthorized,
    /// Fail the n-th call (zero based) with a rate limit, echo the rest.
    RateLimitOn(usize),
}

pub struct FakeConverter {
    pub mode: ConverterMode,
    pub calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new(mode: ConverterMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConverter for FakeConverter {
    async fn list_voices(&self) -> Result<Vec<Voice>, VoiceError> {
        Ok(vec![Voice {
            voice_id: "voiceAAAA1111".to_string(),
            name: "Narrator".to_string(),
        }])
    }

    async fn convert(
        &self,
        input: &Path,
        _voice_id: &str,
        _model: &str,
        _output_format: &str,
    ) -> Result<Vec<u8>, VoiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ConverterMode::Unauthorized => {
                return Err(VoiceError::Authentication {
                    status: 401,
                    body: "invalid api key".to_string(),
                })
            }
            ConverterMode::RateLimitOn(at) if at == n => {
                return Err(VoiceError::RateLimited {
                    body: "too many requests".to_string(),
                })
            }
            _ => {}
        }
        let mut data = b"converted:".to_vec();
        data.extend(std::fs::read(input).map_err(|e| VoiceError::Io {
            path: input.to_path_buf(),
            source: e,
        })?);
        Ok(data)
    }
}
