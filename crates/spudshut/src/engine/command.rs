//! ffmpeg argument construction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::SegmentRequest;

/// Arguments for a segmenting run.
///
/// Re-encoding codecs get explicit channel, rate and encoder flags; `copy`
/// passes the streams through untouched.
pub fn segment_args(req: &SegmentRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into()];
    if !req.verbose {
        args.extend(["-loglevel".into(), "error".into()]);
    }
    args.extend(["-y".into(), "-i".into(), req.input.clone().into_os_string()]);

    if req.codec.reencodes() {
        args.extend([
            "-ac".into(),
            req.channels.to_string().into(),
            "-ar".into(),
            req.sample_rate.to_string().into(),
            "-c:a".into(),
            req.codec.encoder().into(),
        ]);
        if let Some(bitrate) = &req.bitrate {
            args.extend(["-b:a".into(), bitrate.into()]);
        }
    } else {
        args.extend(["-c".into(), "copy".into()]);
    }

    args.extend([
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        req.chunk_seconds.to_string().into(),
        "-reset_timestamps".into(),
        "1".into(),
        req.output_template.clone().into_os_string(),
    ]);
    args
}

/// Body of a concat demuxer list file. Single quotes in paths are escaped
/// as `'\''`.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut body = String::new();
    for input in inputs {
        let escaped = input.to_string_lossy().replace('\'', r"'\''");
        body.push_str("file '");
        body.push_str(&escaped);
        body.push_str("'\n");
    }
    body
}

/// Arguments for joining the files listed in `list_file` into `output`.
pub fn concat_args(list_file: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.as_os_str().to_os_string(),
        "-c".into(),
        "copy".into(),
        output.as_os_str().to_os_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn request(codec: Codec) -> SegmentRequest {
        SegmentRequest {
            input: PathBuf::from("/in/talk.m4a"),
            output_template: PathBuf::from("/w/chunks/talk_%03d.flac"),
            chunk_seconds: 240,
            codec,
            sample_rate: 16_000,
            channels: 1,
            bitrate: None,
            verbose: false,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_segment_args_reencode() {
        let args = strings(segment_args(&request(Codec::Flac)));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-i",
                "/in/talk.m4a",
                "-ac",
                "1",
                "-ar",
                "16000",
                "-c:a",
                "flac",
                "-f",
                "segment",
                "-segment_time",
                "240",
                "-reset_timestamps",
                "1",
                "/w/chunks/talk_%03d.flac",
            ]
        );
    }

    #[test]
    fn test_segment_args_bitrate_and_verbose() {
        let mut req = request(Codec::Opus);
        req.bitrate = Some("24k".to_string());
        req.verbose = true;
        let args = strings(segment_args(&req));

        assert!(!args.contains(&"-loglevel".to_string()));
        let pos = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[pos + 1], "24k");
        assert!(args.contains(&"libopus".to_string()));
    }

    #[test]
    fn test_segment_args_copy_skips_encoding_flags() {
        let mut req = request(Codec::Copy);
        req.bitrate = Some("64k".to_string());
        let args = strings(segment_args(&req));

        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(!args.contains(&"-ar".to_string()));
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/w/a_000.wav"),
            PathBuf::from("/w/it's_001.wav"),
        ]);
        assert_eq!(
            list,
            "file '/w/a_000.wav'\nfile '/w/it'\\''s_001.wav'\n"
        );
    }

    #[test]
    fn test_concat_args() {
        let args = strings(concat_args(Path::new("/w/list.txt"), Path::new("/out/a.wav")));
        assert!(args.windows(2).any(|w| w == ["-f", "concat"]));
        assert!(args.windows(2).any(|w| w == ["-safe", "0"]));
        assert_eq!(args.last().map(String::as_str), Some("/out/a.wav"));
    }
}
