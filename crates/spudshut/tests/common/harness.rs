//! Isolated environment for driving the orchestrator end to end.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use spudshut::config::load_config_from_str;
use spudshut::db::job_repo;
use spudshut::engine::MediaEngine;
use spudshut::voice::VoiceConverter;
use spudshut::worker::DirectoryScanner;
use spudshut::{
    Config, Database, Job, Orchestrator, Pipeline, PipelineConfig, WorkerPool,
};

/// Voice ID handed to the pipeline when conversion is on.
pub const VOICE_ID: &str = "voiceAAAA1111";

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: Config,
    pub db: Database,
    pub shutdown: Arc<AtomicBool>,
}

impl TestHarness {
    /// Conversion on, FLAC chunks of 240 seconds.
    pub fn new() -> Self {
        Self::with_settings(true, "flac")
    }

    /// Conversion off, chunks cut with the copy codec.
    pub fn copy_mode() -> Self {
        Self::with_settings(false, "copy")
    }

    pub fn with_settings(convert: bool, codec: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let input_dir = base.join("input");
        let work_dir = base.join("work");
        let output_dir = base.join("output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let config_json = serde_json::json!({
            "version": "1.0",
            "input_directory": input_dir,
            "work_directory": work_dir,
            "output_directory": output_dir,
            "database_path": base.join("jobs.db"),
            "chunking": { "chunk_seconds": 240, "codec": codec },
            "conversion": {
                "enabled": convert,
                "voice": "Narrator",
                "output_format": "mp3_44100_128"
            },
            "orchestrator": { "poll_interval_secs": 1, "stage_timeout_secs": 30 }
        });
        let config =
            load_config_from_str(&config_json.to_string()).expect("Harness config is invalid");
        let db = Database::open(&base.join("jobs.db")).expect("Failed to open job store");

        Self {
            temp_dir,
            input_dir,
            work_dir,
            output_dir,
            config,
            db,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Drops a file into the input directory and returns its path.
    pub fn add_input(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(name);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    pub fn pipeline(
        &self,
        engine: Arc<dyn MediaEngine>,
        converter: Option<Arc<dyn VoiceConverter>>,
    ) -> Arc<Pipeline> {
        let voice_id = self
            .config
            .conversion
            .enabled
            .then(|| VOICE_ID.to_string());
        let config = Arc::new(PipelineConfig::from_config(&self.config, voice_id));
        Arc::new(Pipeline::new(config, engine, converter))
    }

    /// A fresh orchestrator over this harness's store and directories.
    pub fn orchestrator(
        &self,
        engine: Arc<dyn MediaEngine>,
        converter: Option<Arc<dyn VoiceConverter>>,
    ) -> Orchestrator {
        let pool = WorkerPool::new(
            self.pipeline(engine, converter),
            self.config.orchestrator.worker_count,
            Arc::clone(&self.shutdown),
        )
        .expect("Failed to start worker pool");
        let scanner = DirectoryScanner::new(&self.input_dir, &self.config.extensions);
        Orchestrator::new(
            self.db.clone(),
            scanner,
            pool,
            &self.config.orchestrator,
            Arc::clone(&self.shutdown),
        )
    }

    pub fn job(&self, id: i64) -> Job {
        job_repo::get_job(&self.db, id).expect("Job not found")
    }

    /// The only job in the store.
    pub fn single_job(&self) -> Job {
        let mut jobs = job_repo::list_recent(&self.db, 10).expect("Failed to list jobs");
        assert_eq!(jobs.len(), 1, "expected exactly one job, got {:?}", jobs);
        jobs.remove(0)
    }

    /// File names in `dir`, sorted.
    pub fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("Failed to read directory")
            .map(|e| e.expect("bad dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
