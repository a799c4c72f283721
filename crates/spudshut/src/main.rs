use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use spudshut::config::default_config_path;
use spudshut::db::job_repo;
use spudshut::worker::{ingest_file, preflight, reconcile_stale, DirectoryScanner};
use spudshut::{
    load_config, resolve_api_key, Config, ConfigError, Database, ElevenLabsClient, FfmpegEngine,
    JobStatus, MediaEngine, Orchestrator, Pipeline, PipelineConfig, VoiceConverter,
    WorkerError, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.spudshut/config.json)
    #[arg(short, long, env = "SPUDSHUT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest, chunk, convert and join until interrupted
    Run {
        /// Exit once no job is left to dispatch
        #[arg(long)]
        once: bool,
    },
    /// Register a single audio file as a new job
    Ingest { file: PathBuf },
    /// List jobs, newest first
    Jobs {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Show one job and its status history
    Show { id: i64 },
    /// Put an ERROR job back at the stage that failed
    Retry { id: i64 },
    /// Requeue in-progress jobs that stopped making progress
    Reconcile {
        /// Override orchestrator.stale_after_secs
        #[arg(long)]
        stale_after: Option<u64>,
    },
    /// List the voices available to the configured API key
    Voices,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    spudshut::logging::init(cli.verbose, cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> spudshut::Result<()> {
    let config_path = cli
        .config
        .or_else(default_config_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "cannot determine home directory for the default config path".to_string(),
        })?;
    let config = load_config(&config_path)?;
    info!("Loaded config from {}", config_path.display());

    match cli.command {
        Command::Run { once } => cmd_run(&config, once),
        Command::Ingest { file } => {
            let db = open_database(&config)?;
            let id = ingest_file(&db, &file)?;
            println!("Created job {}", id);
            Ok(())
        }
        Command::Jobs { status, limit } => cmd_jobs(&open_database(&config)?, status, limit),
        Command::Show { id } => cmd_show(&open_database(&config)?, id),
        Command::Retry { id } => {
            let db = open_database(&config)?;
            let status = job_repo::retry(&db, id)?;
            println!("Job {} re-entered at {}", id, status);
            Ok(())
        }
        Command::Reconcile { stale_after } => {
            let db = open_database(&config)?;
            let window = stale_after
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.orchestrator.stale_after());
            let ids = reconcile_stale(&db, window)?;
            println!("Requeued {} job(s)", ids.len());
            Ok(())
        }
        Command::Voices => cmd_voices(&config),
    }
}

fn open_database(config: &Config) -> spudshut::Result<Database> {
    let path = config
        .database_file()
        .ok_or_else(|| ConfigError::Validation {
            message: "cannot determine home directory for the default database path".to_string(),
        })?;
    Ok(Database::open(&path)?)
}

fn voice_client(config: &Config) -> spudshut::Result<ElevenLabsClient> {
    let key = resolve_api_key(&config.conversion)?;
    let client = ElevenLabsClient::new(
        &config.conversion.base_url,
        key,
        config.orchestrator.stage_timeout(),
    )?;
    Ok(client)
}

fn runtime() -> spudshut::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| WorkerError::SpawnFailed(format!("tokio runtime: {}", e)).into())
}

fn cmd_run(config: &Config, once: bool) -> spudshut::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| WorkerError::SpawnFailed(format!("signal handler: {}", e)))?;
    }

    let scanner = DirectoryScanner::new(config.input_dir(), &config.extensions);
    // A bad input directory is a config error at startup; later it only
    // skips ingest.
    let waiting = scanner.scan()?.len();
    info!(
        "Watching {} ({} audio file(s) present)",
        scanner.input_directory().display(),
        waiting
    );

    let engine: Arc<dyn MediaEngine> = Arc::new(FfmpegEngine::new(&config.ffmpeg_path));
    let converter: Option<Arc<dyn VoiceConverter>> = if config.conversion.enabled {
        Some(Arc::new(voice_client(config)?))
    } else {
        None
    };

    let voice_id =
        runtime()?.block_on(preflight(config, engine.as_ref(), converter.as_deref()))?;

    let db = open_database(config)?;
    let pipeline_config = Arc::new(PipelineConfig::from_config(config, voice_id));
    let pipeline = Arc::new(Pipeline::new(pipeline_config, engine, converter));
    let pool = WorkerPool::new(
        pipeline,
        config.orchestrator.worker_count,
        Arc::clone(&shutdown),
    )?;

    let orchestrator = Orchestrator::new(db, scanner, pool, &config.orchestrator, shutdown);
    let result = orchestrator.run(once);
    orchestrator.finish();
    Ok(result?)
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn cmd_jobs(db: &Database, status: Option<JobStatus>, limit: u64) -> spudshut::Result<()> {
    let jobs = match status {
        Some(status) => {
            let mut jobs = job_repo::list_jobs(db, status)?;
            jobs.reverse();
            jobs.truncate(limit as usize);
            jobs
        }
        None => job_repo::list_recent(db, limit)?,
    };

    if jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }
    println!("{:>6}  {:<10}  {:<20}  FILE", "ID", "STATUS", "UPDATED");
    for job in &jobs {
        println!(
            "{:>6}  {:<10}  {:<20}  {}",
            job.id,
            job.status.as_str(),
            job.updated_at.format("%Y-%m-%d %H:%M:%S"),
            job.original_filename
        );
        if let Some(message) = &job.error_message {
            println!("{:>6}  ! {}", "", message);
        }
    }

    let mut totals = Vec::new();
    for status in JobStatus::ALL {
        let count = job_repo::count_by_status(db, status)?;
        if count > 0 {
            totals.push(format!("{} {}", count, status));
        }
    }
    println!("\nTotal: {}", totals.join(", "));
    Ok(())
}

fn cmd_show(db: &Database, id: i64) -> spudshut::Result<()> {
    let job = job_repo::get_job(db, id)?;
    println!("Job {}", job.id);
    println!("  file:       {}", job.original_filename);
    println!("  input:      {}", job.input_path.display());
    println!("  status:     {}", job.status);
    println!("  chunks:     {}", display_path(job.chunks_dir.as_deref()));
    println!("  converted:  {}", display_path(job.converted_chunks_dir.as_deref()));
    println!("  output:     {}", display_path(job.output_path.as_deref()));
    if let Some(message) = &job.error_message {
        println!("  error:      {}", message);
    }
    println!("  created:    {}", job.created_at.to_rfc3339());
    println!("  updated:    {}", job.updated_at.to_rfc3339());

    println!("History:");
    for event in job_repo::history(db, id)? {
        let from = event.from_status.map_or("-", |s| s.as_str());
        print!(
            "  {}  {:>10} -> {:<10}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            from,
            event.to_status.as_str()
        );
        match event.message {
            Some(message) => println!("  {}", message),
            None => println!(),
        }
    }
    Ok(())
}

fn cmd_voices(config: &Config) -> spudshut::Result<()> {
    let client = voice_client(config)?;
    let mut voices = runtime()?.block_on(client.list_voices())?;
    voices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    for voice in voices {
        println!("{}\t{}", voice.voice_id, voice.name);
    }
    Ok(())
}
