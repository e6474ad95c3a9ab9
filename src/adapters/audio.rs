//! Audio format coercion via ffmpeg.
//!
//! Converted files live in a private temp directory that is removed when
//! the returned [`ConvertedAudio`] is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tokio::process::Command;

/// Extensions the transcription API reliably accepts as-is
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "webm"];

/// Target container for a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// Codec arguments passed to ffmpeg after the mono/16 kHz options
    fn codec_args(self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["-codec:a", "libmp3lame", "-b:a", "128k"],
            AudioFormat::Wav => &[],
        }
    }
}

/// A converted audio file, deleted on drop
#[derive(Debug)]
pub struct ConvertedAudio {
    _dir: TempDir,
    path: PathBuf,
}

impl ConvertedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether a file can be sent without conversion
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Output file name for a conversion of `src`
fn converted_name(src: &Path, format: AudioFormat) -> String {
    let stem = src.file_stem().unwrap_or_default().to_string_lossy();
    format!("{}_conv.{}", stem, format.extension())
}

/// Convert audio to 16 kHz mono in the given format
pub async fn convert(src: &Path, format: AudioFormat) -> Result<ConvertedAudio> {
    let ffmpeg = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
    let dir = tempfile::tempdir().context("Failed to create temp dir")?;
    let dst = dir.path().join(converted_name(src, format));

    let output = Command::new(&ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(src)
        .args(["-ac", "1", "-ar", "16000"])
        .args(format.codec_args())
        .arg(&dst)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to run ffmpeg ({}); is it installed?", ffmpeg))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg conversion failed: {}", stderr.trim());
    }

    Ok(ConvertedAudio { _dir: dir, path: dst })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("memo.m4a")));
        assert!(is_supported(Path::new("memo.MP3")));
        assert!(!is_supported(Path::new("memo.oga")));
        assert!(!is_supported(Path::new("memo")));
    }

    #[test]
    fn test_converted_name() {
        assert_eq!(
            converted_name(Path::new("/tmp/voice.oga"), AudioFormat::Mp3),
            "voice_conv.mp3"
        );
        assert_eq!(
            converted_name(Path::new("voice.m4a"), AudioFormat::Wav),
            "voice_conv.wav"
        );
    }
}
