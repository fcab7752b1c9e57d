//! Probing and decoding of clip/narration media through the system `ffmpeg`
//! and `ffprobe` binaries.
//!
//! We intentionally shell out rather than link FFmpeg bindings to avoid
//! native dev header/lib requirements; both binaries being on PATH is the
//! export capability precondition checked at pipeline entry.

use std::path::{Path, PathBuf};

use crate::foundation::error::{TalkieError, TalkieResult};

/// Probed facts about a seekable video clip source.
#[derive(Clone, Debug, serde::Serialize)]
pub struct VideoSourceInfo {
    pub source_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_sec: f64,
    pub has_audio: bool,
}

/// Decoded narration PCM: interleaved `f32` samples, all source channels.
#[derive(Clone, Debug)]
pub(crate) struct AudioPcm {
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
    pub(crate) interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (samples per channel).
    pub(crate) fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u16>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

fn run_ffprobe(source_path: &Path) -> TalkieResult<ProbeOut> {
    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| TalkieError::media_load(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(TalkieError::media_load(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    serde_json::from_slice(&out.stdout)
        .map_err(|e| TalkieError::media_load(format!("ffprobe json parse failed: {e}")))
}

/// Probe a video clip for dimensions and duration.
pub fn probe_video(source_path: &Path) -> TalkieResult<VideoSourceInfo> {
    let parsed = run_ffprobe(source_path)?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            TalkieError::media_load(format!(
                "no video stream found in '{}'",
                source_path.display()
            ))
        })?;
    let width = video_stream
        .width
        .ok_or_else(|| TalkieError::media_load("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .ok_or_else(|| TalkieError::media_load("missing video height from ffprobe"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        duration_sec,
        has_audio,
    })
}

/// Decode one video frame at `source_time_sec` into straight-alpha RGBA8.
pub(crate) fn decode_video_frame_rgba8(
    source: &VideoSourceInfo,
    source_time_sec: f64,
) -> TalkieResult<Vec<u8>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{source_time_sec:.9}")])
        .arg("-i")
        .arg(&source.source_path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| TalkieError::media_load(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(TalkieError::media_load(format!(
            "ffmpeg video decode failed for '{}': {}",
            source.source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = source.width as usize * source.height as usize * 4;
    if expected_len == 0 {
        return Err(TalkieError::media_load(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }
    if out.stdout.len() < expected_len {
        // Seeks past the end of stream yield no frame; callers clamp their
        // source times, so this is a decode failure, not an expected state.
        return Err(TalkieError::media_load(format!(
            "ffmpeg returned no video frame for '{}' at {source_time_sec:.3}s",
            source.source_path.display()
        )));
    }
    Ok(out.stdout[..expected_len].to_vec())
}

/// Decode the narration track to interleaved `f32` PCM at `sample_rate`,
/// preserving the source channel count (channel selection happens in the
/// audio slicer).
pub(crate) fn decode_audio_f32(path: &Path, sample_rate: u32) -> TalkieResult<AudioPcm> {
    let parsed = run_ffprobe(path).map_err(|e| TalkieError::audio_decode(e.to_string()))?;
    let channels = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| s.channels)
        .ok_or_else(|| {
            TalkieError::audio_decode(format!(
                "no audio stream found in '{}'",
                path.display()
            ))
        })?;
    if channels == 0 {
        return Err(TalkieError::audio_decode("audio stream reports 0 channels"));
    }

    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &channels.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| TalkieError::audio_decode(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        return Err(TalkieError::audio_decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(TalkieError::audio_decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels,
        interleaved_f32: pcm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_pcm_frames_counts_per_channel() {
        let pcm = AudioPcm {
            sample_rate: 44_100,
            channels: 2,
            interleaved_f32: vec![0.0; 10],
        };
        assert_eq!(pcm.frames(), 5);

        let empty = AudioPcm {
            sample_rate: 44_100,
            channels: 0,
            interleaved_f32: vec![],
        };
        assert_eq!(empty.frames(), 0);
    }

    #[test]
    fn probe_missing_file_is_media_load_error() {
        let err = probe_video(Path::new("/no/such/clip.mp4")).unwrap_err();
        assert!(matches!(err, TalkieError::MediaLoad(_)));
    }
}
