//! Chunk file naming and discovery.
//!
//! Chunks are named `<stem>_<seq:03>.<ext>`. Order always comes from the
//! parsed sequence number, never from directory enumeration.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::codec::Codec;

static RE_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_(\d+)$").unwrap());

/// Suffix for files still being written.
pub const PART_SUFFIX: &str = "part";

/// Extension for chunk files: the codec's own, or the input's for `copy`.
pub fn chunk_extension(codec: Codec, input: &Path) -> Option<String> {
    match codec.extension() {
        Some(ext) => Some(ext.to_string()),
        None => input
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase()),
    }
}

/// Segmenter output pattern, e.g. `<dir>/talk_%03d.flac`. A literal `%` in
/// the stem is doubled so the segmenter does not read it as a placeholder.
pub fn chunk_template(dir: &Path, stem: &str, ext: Option<&str>) -> PathBuf {
    let stem = stem.replace('%', "%%");
    match ext {
        Some(ext) => dir.join(format!("{}_%03d.{}", stem, ext)),
        None => dir.join(format!("{}_%03d", stem)),
    }
}

/// Sequence number parsed from the trailing `_<digits>` of the file stem.
pub fn sequence_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    RE_SEQUENCE
        .captures(stem)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn is_candidate(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    let partial = path.extension().is_some_and(|e| e == PART_SUFFIX);
    !hidden && !partial
}

/// Sequenced files in `dir`, sorted by sequence number.
///
/// Hidden files, `.part` files and files without a sequence suffix are
/// ignored.
pub fn sequenced_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if !is_candidate(&path) {
            continue;
        }
        if let Some(seq) = sequence_number(&path) {
            files.push((seq, path));
        }
    }
    files.sort();
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// Keeps the files whose extension equals `ext` (ASCII case-insensitive).
/// `None` keeps files without an extension.
pub fn with_extension(files: Vec<PathBuf>, ext: Option<&str>) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|p| {
            let actual = p.extension().and_then(|e| e.to_str());
            match (actual, ext) {
                (Some(actual), Some(ext)) => actual.eq_ignore_ascii_case(ext),
                (None, None) => true,
                _ => false,
            }
        })
        .collect()
}

/// First sequence number carried by more than one file. `files` must be in
/// [`sequenced_files`] order.
pub fn duplicate_sequence(files: &[PathBuf]) -> Option<u32> {
    files
        .windows(2)
        .map(|pair| (sequence_number(&pair[0]), sequence_number(&pair[1])))
        .find_map(|(a, b)| if a.is_some() && a == b { a } else { None })
}

/// Removes sequenced and partial files left in `dir` by an earlier attempt.
pub fn clear_chunk_files(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let partial = path.extension().is_some_and(|e| e == PART_SUFFIX);
        if partial || sequence_number(&path).is_some() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// `<dir>/<chunk_stem>.<ext>` for a converted chunk.
pub fn converted_chunk_path(dir: &Path, chunk: &Path, ext: &str) -> PathBuf {
    let stem = chunk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{}.{}", stem, ext))
}

/// Same path with `.part` appended.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Final output file, `<stem>_converted.<ext>` or `<stem>_joined.<ext>`.
pub fn joined_output_path(dir: &Path, stem: &str, converted: bool, ext: Option<&str>) -> PathBuf {
    let suffix = if converted { "converted" } else { "joined" };
    match ext {
        Some(ext) => dir.join(format!("{}_{}.{}", stem, suffix, ext)),
        None => dir.join(format!("{}_{}", stem, suffix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_chunk_extension() {
        assert_eq!(
            chunk_extension(Codec::Flac, Path::new("/in/talk.m4a")).as_deref(),
            Some("flac")
        );
        assert_eq!(
            chunk_extension(Codec::Aac, Path::new("/in/talk.wav")).as_deref(),
            Some("m4a")
        );
        assert_eq!(
            chunk_extension(Codec::Copy, Path::new("/in/talk.M4A")).as_deref(),
            Some("m4a")
        );
        assert_eq!(chunk_extension(Codec::Copy, Path::new("/in/talk")), None);
    }

    #[test]
    fn test_chunk_template() {
        assert_eq!(
            chunk_template(Path::new("/w/chunks"), "talk", Some("flac")),
            PathBuf::from("/w/chunks/talk_%03d.flac")
        );
        assert_eq!(
            chunk_template(Path::new("/w"), "100%", None),
            PathBuf::from("/w/100%%_%03d")
        );
    }

    #[test]
    fn test_sequence_number() {
        assert_eq!(sequence_number(Path::new("talk_000.flac")), Some(0));
        assert_eq!(sequence_number(Path::new("my_talk_012.wav")), Some(12));
        assert_eq!(sequence_number(Path::new("talk_1000.flac")), Some(1000));
        assert_eq!(sequence_number(Path::new("talk.flac")), None);
        assert_eq!(sequence_number(Path::new("talk_abc.flac")), None);
    }

    #[test]
    fn test_sequenced_files_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "talk_010.flac",
            "talk_002.flac",
            "talk_1000.flac",
            "talk_000.flac",
            "talk_003.flac.part",
            ".talk_004.flac",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names: Vec<String> = sequenced_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["talk_000.flac", "talk_002.flac", "talk_010.flac", "talk_1000.flac"]
        );
    }

    #[test]
    fn test_clear_chunk_files_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["talk_000.flac", "talk_001.flac.part", "keep.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        assert_eq!(clear_chunk_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("keep.txt").exists());
        assert!(sequenced_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_converted_and_part_paths() {
        let out = converted_chunk_path(Path::new("/w/conv"), Path::new("/w/chunks/talk_001.flac"), "mp3");
        assert_eq!(out, PathBuf::from("/w/conv/talk_001.mp3"));
        assert_eq!(part_path(&out), PathBuf::from("/w/conv/talk_001.mp3.part"));
    }

    #[test]
    fn test_joined_output_path() {
        assert_eq!(
            joined_output_path(Path::new("/out"), "talk", true, Some("wav")),
            PathBuf::from("/out/talk_converted.wav")
        );
        assert_eq!(
            joined_output_path(Path::new("/out"), "talk", false, Some("flac")),
            PathBuf::from("/out/talk_joined.flac")
        );
    }

    #[test]
    fn test_with_extension_drops_leftovers_of_other_formats() {
        let files = vec![
            PathBuf::from("/c/talk_000.mp3"),
            PathBuf::from("/c/talk_000.wav"),
            PathBuf::from("/c/talk_001.MP3"),
            PathBuf::from("/c/talk_002"),
        ];
        assert_eq!(
            with_extension(files.clone(), Some("mp3")),
            vec![PathBuf::from("/c/talk_000.mp3"), PathBuf::from("/c/talk_001.MP3")]
        );
        assert_eq!(
            with_extension(files, None),
            vec![PathBuf::from("/c/talk_002")]
        );
    }

    #[test]
    fn test_duplicate_sequence() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["talk_000.mp3", "talk_001.mp3", "talk_1.mp3", "talk_002.mp3"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = sequenced_files(dir.path()).unwrap();
        assert_eq!(duplicate_sequence(&files), Some(1));
        assert_eq!(duplicate_sequence(&files[..2]), None);
        assert_eq!(duplicate_sequence(&[]), None);
    }
}
