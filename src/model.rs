//! Input data model: the segment list handed over by the transcription and
//! media-acquisition stages, plus the export canvas geometry derived from the
//! requested aspect ratio.

use std::str::FromStr;

use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkieError, TalkieResult};

/// Half-open time window `[start, end)` in seconds of narration time.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn duration(self) -> f64 {
        self.end - self.start
    }
}

/// Where a segment's visual came from.
///
/// The distinction only matters for playback semantics: the two `*Video`
/// kinds are seekable clips, the `*Image` kinds are stills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    GeneratedImage,
    GeneratedVideo,
    StockImage,
    StockVideo,
}

impl MediaKind {
    pub fn is_video(self) -> bool {
        matches!(self, Self::GeneratedVideo | Self::StockVideo)
    }
}

/// One time-bounded slice of the narration with subtitle text and a resolved
/// visual resource.
///
/// Segments are owned by the caller and treated as immutable for the whole
/// export run. Unknown fields (e.g. the prompt-generation stage's metadata)
/// are tolerated on deserialization and ignored.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    /// Unique, stable identifier.
    pub id: String,
    /// Narration window this segment covers.
    pub timestamp: TimeRange,
    /// Seconds of output this segment produces; must equal `end - start`.
    pub duration: f64,
    /// Subtitle text rendered over every frame of the segment.
    pub text: String,
    /// Resolved visual resource (http(s) URL or filesystem path).
    #[serde(default, alias = "mediaUrl")]
    pub media_url: Option<String>,
    #[serde(default, alias = "mediaType")]
    pub media_type: Option<MediaKind>,
}

impl Segment {
    pub fn is_video(&self) -> bool {
        self.media_type.is_some_and(MediaKind::is_video)
    }
}

/// Requested output orientation. Only the two ratios the compositor encodes
/// for are accepted; anything else is rejected at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
}

impl AspectRatio {
    /// Output canvas for this ratio. Fixed for the whole export; drives both
    /// encoder configuration and compositing geometry.
    pub fn canvas(self) -> Canvas {
        match self {
            Self::Landscape16x9 => Canvas {
                width: 1280,
                height: 720,
            },
            Self::Portrait9x16 => Canvas {
                width: 720,
                height: 1280,
            },
        }
    }

    pub fn is_portrait(self) -> bool {
        matches!(self, Self::Portrait9x16)
    }

    /// Video bitrate tier in bits per second.
    pub fn video_bitrate(self) -> u32 {
        if self.is_portrait() { 1_800_000 } else { 2_000_000 }
    }
}

impl FromStr for AspectRatio {
    type Err = TalkieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape16x9),
            "9:16" => Ok(Self::Portrait9x16),
            other => Err(TalkieError::input(format!(
                "unsupported aspect ratio '{other}' (expected '16:9' or '9:16')"
            ))),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Landscape16x9 => f.write_str("16:9"),
            Self::Portrait9x16 => f.write_str("9:16"),
        }
    }
}

const DURATION_EPSILON: f64 = 1e-6;

/// Validate an export's segment list.
///
/// Checks: non-empty list, well-formed windows (`0 <= start < end`), the
/// `duration == end - start` invariant, non-blank subtitle text, a resolved
/// `media_url` on every segment, and in-order non-overlapping windows. Small
/// gaps between consecutive segments are tolerated.
pub fn validate_segments(segments: &[Segment]) -> TalkieResult<()> {
    if segments.is_empty() {
        return Err(TalkieError::input("segment list must be non-empty"));
    }

    let mut prev_end = 0.0f64;
    for (i, seg) in segments.iter().enumerate() {
        let ts = seg.timestamp;
        if !ts.start.is_finite() || !ts.end.is_finite() || ts.start < 0.0 || ts.start >= ts.end {
            return Err(TalkieError::input(format!(
                "segment '{}' (#{i}) has invalid window [{}, {})",
                seg.id, ts.start, ts.end
            )));
        }
        if (seg.duration - ts.duration()).abs() > DURATION_EPSILON {
            return Err(TalkieError::input(format!(
                "segment '{}' (#{i}) duration {} does not match window length {}",
                seg.id,
                seg.duration,
                ts.duration()
            )));
        }
        if seg.text.trim().is_empty() {
            return Err(TalkieError::input(format!(
                "segment '{}' (#{i}) has empty subtitle text",
                seg.id
            )));
        }
        if seg.media_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            return Err(TalkieError::input(format!(
                "segment '{}' (#{i}) has no media_url (filter unresolved segments before export)",
                seg.id
            )));
        }
        if ts.start + DURATION_EPSILON < prev_end {
            return Err(TalkieError::input(format!(
                "segment '{}' (#{i}) overlaps the previous segment (starts at {}, previous ends at {prev_end})",
                seg.id, ts.start
            )));
        }
        prev_end = ts.end;
    }

    Ok(())
}
