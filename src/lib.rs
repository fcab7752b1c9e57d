//! Talkie turns a narration recording and a list of timed, captioned visual
//! segments into a single subtitled H.264 + AAC MP4.
//!
//! The public API is a single blocking call:
//!
//! - Build (or deserialize) an ordered list of [`Segment`]s
//! - Call [`export`] with the narration location, an [`AspectRatio`] and a
//!   progress callback
//! - Receive the finished MP4 as an in-memory byte buffer
//!
//! Video-clip decode and A/V encoding shell out to the system `ffmpeg` /
//! `ffprobe` binaries; compositing and subtitle rendering are pure CPU.
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod assets;
pub(crate) mod audio;
pub(crate) mod compose;
pub(crate) mod encode;
pub(crate) mod mux;

pub mod model;
pub mod pipeline;
pub mod progress;

pub use crate::foundation::core::{
    AUDIO_BITRATE, AUDIO_SAMPLE_RATE, Canvas, FPS, KEYFRAME_INTERVAL, frame_timestamp_us,
    frames_for_duration,
};
pub use crate::foundation::error::{TalkieError, TalkieResult};

pub use crate::assets::media::{VideoSourceInfo, probe_video};
pub use crate::model::{AspectRatio, MediaKind, Segment, TimeRange, validate_segments};
pub use crate::pipeline::{ExportOpts, export, is_encode_toolchain_available};
pub use crate::progress::ProgressReporter;
