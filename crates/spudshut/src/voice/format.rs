/// File extension for a service output-format string such as `mp3_44100_128`.
///
/// Only the part before the first `_` matters. Raw μ-law is wrapped as WAV
/// and anything unrecognised falls back to `wav`.
pub fn ext_from_output_format(fmt: &str) -> &'static str {
    let root = fmt.split('_').next().unwrap_or_default();
    match root.to_ascii_lowercase().as_str() {
        "mp3" => "mp3",
        "opus" => "opus",
        // wav, ulaw and anything else
        _ => "wav",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_roots() {
        assert_eq!(ext_from_output_format("mp3_44100_128"), "mp3");
        assert_eq!(ext_from_output_format("opus_48000_64"), "opus");
        assert_eq!(ext_from_output_format("wav"), "wav");
        assert_eq!(ext_from_output_format("ulaw_8000"), "wav");
    }

    #[test]
    fn test_unknown_defaults_to_wav() {
        assert_eq!(ext_from_output_format("flac_48000"), "wav");
        assert_eq!(ext_from_output_format(""), "wav");
    }
}
