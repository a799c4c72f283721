use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::{job_repo, Database, DatabaseError};
use crate::error::WorkerError;

/// Finds audio files in the input directory and registers them as jobs.
pub struct DirectoryScanner {
    input_directory: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(input_directory: P, extensions: &[String]) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    fn is_audio(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }

    /// Audio files at the top level of the input directory, as absolute
    /// paths sorted by name. Symlinks count as the file they point to;
    /// dangling links are logged and skipped.
    pub fn scan(&self) -> Result<Vec<PathBuf>, WorkerError> {
        let root =
            std::fs::canonicalize(&self.input_directory).map_err(|e| WorkerError::Input {
                path: self.input_directory.clone(),
                source: e,
            })?;

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1);

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_audio(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!("Scanned {} audio files in {}", files.len(), root.display());
        Ok(files)
    }

    /// Registers every scanned file that has never had a job. Returns the ids
    /// of the new jobs.
    ///
    /// Files whose earlier job ended in `ERROR` are left alone; those are
    /// resumed with an explicit retry.
    pub fn ingest(&self, db: &Database) -> Result<Vec<i64>, WorkerError> {
        let mut created = Vec::new();
        for path in self.scan()? {
            if !job_repo::find_by_input_path(db, &path)?.is_empty() {
                continue;
            }
            match register(db, &path) {
                Ok(id) => created.push(id),
                Err(WorkerError::Database(DatabaseError::Duplicate { existing_id, .. })) => {
                    debug!("{} already tracked by job {}", path.display(), existing_id);
                }
                Err(e) => return Err(e),
            }
        }

        if !created.is_empty() {
            info!("Ingested {} new file(s)", created.len());
        }
        Ok(created)
    }
}

/// Creates a job for one audio file given on the command line.
pub fn ingest_file(db: &Database, path: &Path) -> Result<i64, WorkerError> {
    let absolute = std::fs::canonicalize(path).map_err(|e| WorkerError::Input {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !absolute.is_file() {
        return Err(WorkerError::Input {
            path: absolute,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    register(db, &absolute)
}

fn register(db: &Database, path: &Path) -> Result<i64, WorkerError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = job_repo::create_job(db, &filename, path)?;
    info!("Created job {} for {}", id, filename);
    Ok(id)
}
