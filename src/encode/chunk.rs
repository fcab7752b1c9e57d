use bytes::Bytes;

use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkieError, TalkieResult};

/// One compressed unit of video or audio, ready for the muxer.
#[derive(Clone, Debug)]
pub(crate) struct EncodedChunk {
    pub(crate) data: Bytes,
    /// Presentation timestamp in microseconds within its stream.
    pub(crate) timestamp_us: u64,
    pub(crate) duration_us: u64,
    /// Video: self-contained keyframe. Audio: always true.
    pub(crate) key: bool,
}

/// Fixed-profile H.264 encoder configuration.
///
/// Codec profile is constrained baseline level 3.1; only geometry, frame
/// rate and the orientation-tiered bitrate vary per export.
#[derive(Clone, Copy, Debug)]
pub(crate) struct VideoEncoderConfig {
    pub(crate) canvas: Canvas,
    pub(crate) fps: u32,
    pub(crate) bitrate: u32,
}

impl VideoEncoderConfig {
    pub(crate) fn validate(&self) -> TalkieResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(TalkieError::encoder("encode width/height must be non-zero"));
        }
        if !self.canvas.width.is_multiple_of(2) || !self.canvas.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(TalkieError::encoder(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }
        if self.fps == 0 {
            return Err(TalkieError::encoder("encode fps must be non-zero"));
        }
        if self.bitrate == 0 {
            return Err(TalkieError::encoder("encode bitrate must be non-zero"));
        }
        Ok(())
    }
}

/// Fixed-profile AAC-LC encoder configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AudioEncoderConfig {
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
    pub(crate) bitrate: u32,
}

impl AudioEncoderConfig {
    pub(crate) fn validate(&self) -> TalkieResult<()> {
        if self.sample_rate == 0 {
            return Err(TalkieError::encoder("audio sample_rate must be non-zero"));
        }
        if self.channels == 0 {
            return Err(TalkieError::encoder("audio channels must be non-zero"));
        }
        if self.bitrate == 0 {
            return Err(TalkieError::encoder("audio bitrate must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_config_validation_catches_bad_values() {
        let good = VideoEncoderConfig {
            canvas: Canvas {
                width: 1280,
                height: 720,
            },
            fps: 30,
            bitrate: 2_000_000,
        };
        good.validate().unwrap();

        let mut odd = good;
        odd.canvas.width = 1281;
        assert!(odd.validate().is_err());

        let mut zero = good;
        zero.canvas.height = 0;
        assert!(zero.validate().is_err());

        let mut no_fps = good;
        no_fps.fps = 0;
        assert!(no_fps.validate().is_err());
    }

    #[test]
    fn audio_config_validation_catches_bad_values() {
        let good = AudioEncoderConfig {
            sample_rate: 44_100,
            channels: 1,
            bitrate: 128_000,
        };
        good.validate().unwrap();

        assert!(
            AudioEncoderConfig {
                sample_rate: 0,
                ..good
            }
            .validate()
            .is_err()
        );
        assert!(
            AudioEncoderConfig {
                channels: 0,
                ..good
            }
            .validate()
            .is_err()
        );
    }
}
