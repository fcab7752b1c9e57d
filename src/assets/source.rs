//! Per-segment visual sources.
//!
//! A segment's visual is either a still image or a seekable video clip; both
//! expose natural dimensions and a `frame_at` seek. A still always yields
//! the same frame. Sources are loaded at the start of a segment's render
//! loop and dropped at its end, releasing the decode resources (including
//! the temp spool file for remote clips) before the next segment begins.

use std::collections::{HashMap, VecDeque};

use crate::assets::decode::decode_image;
use crate::assets::fetch::fetch_media;
use crate::assets::media::{VideoSourceInfo, decode_video_frame_rgba8, probe_video};
use crate::compose::frame::{ImagePaint, image_paint_from_premul, image_paint_from_straight};
use crate::foundation::error::{TalkieError, TalkieResult};
use crate::model::Segment;

pub(crate) enum MediaSource {
    Still(StillImage),
    Clip(VideoClip),
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaSource::Still(_) => f.write_str("MediaSource::Still"),
            MediaSource::Clip(_) => f.write_str("MediaSource::Clip"),
        }
    }
}

pub(crate) struct StillImage {
    paint: ImagePaint,
}

pub(crate) struct VideoClip {
    info: VideoSourceInfo,
    frame_cache: HashMap<u64, ImagePaint>,
    lru: VecDeque<u64>,
    capacity: usize,
    // Keeps a downloaded clip's temp file alive while frames decode from it.
    _spool: Option<tempfile::NamedTempFile>,
}

impl MediaSource {
    /// Resolve a segment's `media_url` into a ready-to-draw source.
    pub(crate) fn load(segment: &Segment) -> TalkieResult<Self> {
        let url = segment.media_url.as_deref().ok_or_else(|| {
            TalkieError::media_load(format!("segment '{}' has no media_url", segment.id))
        })?;
        let payload = fetch_media(url)?;

        if segment.is_video() {
            let (path, spool) = payload.into_path()?;
            let info = probe_video(&path)?;
            Ok(Self::Clip(VideoClip {
                info,
                frame_cache: HashMap::new(),
                lru: VecDeque::new(),
                capacity: 64,
                _spool: spool,
            }))
        } else {
            let prepared = decode_image(&payload.bytes()?)?;
            let paint = image_paint_from_premul(
                &prepared.rgba8_premul,
                prepared.width,
                prepared.height,
            )?;
            Ok(Self::Still(StillImage { paint }))
        }
    }

    /// Intrinsic source dimensions in pixels.
    pub(crate) fn natural_size(&self) -> (u32, u32) {
        match self {
            Self::Still(s) => (s.paint.w, s.paint.h),
            Self::Clip(c) => (c.info.width, c.info.height),
        }
    }

    /// Source time for output frame `frame_idx` of `frames_in_segment`.
    ///
    /// Clips are stretched across the segment (`i/n` of the clip duration);
    /// stills are timeless.
    pub(crate) fn source_time(&self, frame_idx: u64, frames_in_segment: u64) -> f64 {
        match self {
            Self::Still(_) => 0.0,
            Self::Clip(c) => {
                if frames_in_segment == 0 {
                    return 0.0;
                }
                (frame_idx as f64 / frames_in_segment as f64) * c.info.duration_sec
            }
        }
    }

    /// Seek to `source_time_sec` and return the decoded frame as a paint.
    pub(crate) fn frame_at(&mut self, source_time_sec: f64) -> TalkieResult<ImagePaint> {
        match self {
            Self::Still(s) => Ok(s.paint.clone()),
            Self::Clip(c) => c.decode_at(source_time_sec),
        }
    }
}

impl VideoClip {
    fn decode_at(&mut self, source_time_sec: f64) -> TalkieResult<ImagePaint> {
        let key = self.key_for_time(source_time_sec);
        if let Some(paint) = self.frame_cache.get(&key).cloned() {
            self.touch(key);
            return Ok(paint);
        }

        // Clamp a hair inside the stream end so the last frame's seek never
        // lands past the final packet.
        let t = if self.info.duration_sec > 0.0 {
            source_time_sec.clamp(0.0, (self.info.duration_sec - 0.001).max(0.0))
        } else {
            source_time_sec.max(0.0)
        };
        let rgba = decode_video_frame_rgba8(&self.info, t)?;
        let paint = image_paint_from_straight(&rgba, self.info.width, self.info.height)?;
        self.insert_frame(key, paint.clone());
        Ok(paint)
    }

    fn key_for_time(&self, source_time_sec: f64) -> u64 {
        (source_time_sec.max(0.0) * 1000.0).round() as u64
    }

    fn insert_frame(&mut self, key: u64, paint: ImagePaint) {
        self.frame_cache.insert(key, paint);
        self.touch(key);
        while self.lru.len() > self.capacity {
            if let Some(old) = self.lru.pop_front() {
                self.frame_cache.remove(&old);
            }
        }
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.lru.iter().position(|x| *x == key) {
            self.lru.remove(pos);
        }
        self.lru.push_back(key);
    }
}
