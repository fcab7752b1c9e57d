/// Fixed output frame rate in frames per second.
pub const FPS: u32 = 30;

/// A keyframe is forced every this many frames (~2 seconds of output).
pub const KEYFRAME_INTERVAL: u64 = 2 * FPS as u64;

/// Fixed output audio sample rate in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Fixed output audio bitrate in bits per second (AAC-LC mono).
pub const AUDIO_BITRATE: u32 = 128_000;

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    pub fn is_portrait(self) -> bool {
        self.height > self.width
    }
}

/// Number of composited frames for a segment of `secs` seconds at `fps`.
///
/// Matches the frame-count contract: `round(duration * frame_rate)`, so even
/// very short segments contribute at least their rounded share of frames.
pub fn frames_for_duration(fps: u32, secs: f64) -> u64 {
    (secs * f64::from(fps)).round().max(0.0) as u64
}

/// Presentation timestamp in microseconds of frame `frame` at `fps`.
///
/// Truncating division; gaplessness is guaranteed by deriving each frame's
/// duration as `ts(n+1) - ts(n)` rather than from a fixed per-frame constant.
pub fn frame_timestamp_us(fps: u32, frame: u64) -> u64 {
    frame.saturating_mul(1_000_000) / u64::from(fps)
}

/// Presentation timestamp in microseconds of sample `sample` at `sample_rate`.
pub fn sample_timestamp_us(sample_rate: u32, sample: u64) -> u64 {
    let num = u128::from(sample) * 1_000_000u128;
    (num / u128::from(sample_rate)) as u64
}
