//! The export orchestrator.
//!
//! One export runs on the calling thread and moves through initialization,
//! audio submission, per-segment video submission, encoder flushing, and
//! container finalization. The two ffmpeg children encode asynchronously;
//! their output channels are drained into the muxer between submissions so
//! finished chunks land in the container as they are produced. Every failure
//! aborts the whole run: encoder processes are torn down on drop and no
//! partial buffer is ever returned.

use std::path::PathBuf;

use crate::assets::fetch::fetch_media;
use crate::assets::media::decode_audio_f32;
use crate::assets::source::MediaSource;
use crate::audio::slice::slice_narration;
use crate::compose::frame::Compositor;
use crate::compose::subtitle::SubtitleStyle;
use crate::encode::aac::{AacEncoder, AudioEvent};
use crate::encode::chunk::{AudioEncoderConfig, VideoEncoderConfig};
use crate::encode::h264::{H264Encoder, VideoEvent};
use crate::foundation::core::{AUDIO_BITRATE, AUDIO_SAMPLE_RATE, Canvas, FPS, frames_for_duration};
use crate::foundation::error::{TalkieError, TalkieResult};
use crate::model::{AspectRatio, Segment, validate_segments};
use crate::mux::mp4::Mp4Muxer;
use crate::progress::{
    AUDIO_PERCENT, COMPLETE_PERCENT, FINALIZE_PERCENT, INIT_PERCENT, MUX_PERCENT,
    ProgressReporter, segment_complete_percent, segment_start_percent,
};

/// Export tunables. Everything provider-specific stays outside the core;
/// this is deliberately small.
#[derive(Clone, Debug, Default)]
pub struct ExportOpts {
    /// Subtitle font file; system sans-serif stack when absent.
    pub font_path: Option<PathBuf>,
}

/// Return `true` when both `ffmpeg` and `ffprobe` can be invoked from PATH.
pub fn is_encode_toolchain_available() -> bool {
    let check = |bin: &str| {
        std::process::Command::new(bin)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };
    check("ffmpeg") && check("ffprobe")
}

/// Run a full export: segments + narration -> finished MP4 buffer.
///
/// `on_progress` is called synchronously at every milestone with a
/// human-readable message and a monotonically non-decreasing percent that
/// reaches exactly 100 on success.
#[tracing::instrument(skip_all, fields(segments = segments.len(), aspect = %aspect))]
pub fn export(
    segments: &[Segment],
    audio_url: &str,
    aspect: AspectRatio,
    opts: &ExportOpts,
    on_progress: &mut dyn FnMut(&str, f64),
) -> TalkieResult<Vec<u8>> {
    if !is_encode_toolchain_available() {
        return Err(TalkieError::capability(
            "ffmpeg and ffprobe are required for video export, but were not found on PATH",
        ));
    }
    if audio_url.trim().is_empty() {
        return Err(TalkieError::input("narration audio reference is missing"));
    }
    validate_segments(segments)?;

    let mut progress = ProgressReporter::new(on_progress);
    progress.report("Initializing rendering engine...", INIT_PERCENT);

    let canvas = aspect.canvas();
    let video_cfg = VideoEncoderConfig {
        canvas,
        fps: FPS,
        bitrate: aspect.video_bitrate(),
    };
    let audio_cfg = AudioEncoderConfig {
        sample_rate: AUDIO_SAMPLE_RATE,
        channels: 1,
        bitrate: AUDIO_BITRATE,
    };

    let mut muxer = Mp4Muxer::new()?;
    let mut video_enc = H264Encoder::spawn(video_cfg)?;
    let mut audio_enc = AacEncoder::spawn(audio_cfg)?;
    let style = SubtitleStyle::for_canvas(canvas).with_font(opts.font_path.clone());
    let mut compositor = Compositor::new(canvas, style)?;

    // Audio first: the whole re-timed narration is submitted before any
    // video frame. The streams are independently timestamped; the muxer
    // interleaves them in the container.
    progress.report("Processing audio track...", AUDIO_PERCENT);
    let (narration_path, _narration_spool) = fetch_media(audio_url)
        .map_err(narration_error)?
        .into_path()
        .map_err(narration_error)?;
    let pcm = decode_audio_f32(&narration_path, AUDIO_SAMPLE_RATE)?;
    let timeline = slice_narration(&pcm, segments);
    tracing::debug!(
        units = timeline.units.len(),
        samples = timeline.total_samples(),
        sample_rate = timeline.sample_rate,
        "narration sliced"
    );
    for unit in &timeline.units {
        audio_enc.encode_unit(unit)?;
        apply_audio_events(audio_enc.poll()?, &mut muxer, audio_cfg)?;
    }

    let count = segments.len();
    for (index, segment) in segments.iter().enumerate() {
        progress.report(
            &format!("Processing segment {}/{count}", index + 1),
            segment_start_percent(index, count),
        );
        // Decode resources are scoped to this segment's loop and released
        // before the next segment begins.
        let mut source = MediaSource::load(segment)?;
        let subtitle = compositor.prepare_subtitle(&segment.text)?;
        let frames_in_segment = frames_for_duration(FPS, segment.duration);
        let (src_w, src_h) = source.natural_size();
        tracing::debug!(
            segment = %segment.id,
            source_width = src_w,
            source_height = src_h,
            frames = frames_in_segment,
            "rendering segment"
        );

        for i in 0..frames_in_segment {
            let t = source.source_time(i, frames_in_segment);
            let paint = source.frame_at(t)?;
            let frame = compositor.render(&paint, &subtitle)?;
            video_enc.encode_frame(&frame)?;

            apply_video_events(video_enc.poll()?, &mut muxer, canvas)?;
            apply_audio_events(audio_enc.poll()?, &mut muxer, audio_cfg)?;
        }

        progress.report(
            &format!("Segment {} complete", index + 1),
            segment_complete_percent(index, count),
        );
    }

    progress.report("Finalizing video...", FINALIZE_PERCENT);
    tracing::debug!(
        frames = video_enc.frames_submitted(),
        audio_units = audio_enc.units_submitted(),
        "flushing encoders"
    );
    apply_video_events(video_enc.flush()?, &mut muxer, canvas)?;
    apply_audio_events(audio_enc.flush()?, &mut muxer, audio_cfg)?;

    progress.report("Muxing MP4 file...", MUX_PERCENT);
    let buffer = muxer.finalize()?;

    progress.report("Export complete!", COMPLETE_PERCENT);
    tracing::info!(bytes = buffer.len(), "export complete");
    Ok(buffer)
}

fn apply_video_events(
    events: Vec<VideoEvent>,
    muxer: &mut Mp4Muxer,
    canvas: Canvas,
) -> TalkieResult<()> {
    for event in events {
        match event {
            VideoEvent::Config(meta) => muxer.configure_video(canvas, FPS, &meta)?,
            VideoEvent::Chunk(chunk) => muxer.add_video_chunk(&chunk)?,
        }
    }
    Ok(())
}

fn apply_audio_events(
    events: Vec<AudioEvent>,
    muxer: &mut Mp4Muxer,
    cfg: AudioEncoderConfig,
) -> TalkieResult<()> {
    for event in events {
        match event {
            AudioEvent::Config(meta) => muxer.configure_audio(cfg, &meta)?,
            AudioEvent::Chunk(chunk) => muxer.add_audio_chunk(&chunk)?,
        }
    }
    Ok(())
}

/// Narration fetch failures surface as audio errors, not visual-media ones.
fn narration_error(e: TalkieError) -> TalkieError {
    match e {
        TalkieError::MediaLoad(msg) => TalkieError::audio_decode(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaKind, TimeRange};

    fn seg(start: f64, end: f64) -> Segment {
        Segment {
            id: "s".to_string(),
            timestamp: TimeRange { start, end },
            duration: end - start,
            text: "caption".to_string(),
            media_url: Some("x.png".to_string()),
            media_type: Some(MediaKind::StockImage),
        }
    }

    #[test]
    fn export_rejects_missing_narration_reference() {
        let mut cb = |_: &str, _: f64| {};
        let err = export(
            &[seg(0.0, 1.0)],
            "  ",
            AspectRatio::Landscape16x9,
            &ExportOpts::default(),
            &mut cb,
        )
        .unwrap_err();
        // Capability check runs first, so environments without ffmpeg
        // report that instead.
        assert!(matches!(
            err,
            TalkieError::Input(_) | TalkieError::Capability(_)
        ));
    }

    #[test]
    fn export_rejects_empty_segment_list() {
        let mut cb = |_: &str, _: f64| {};
        let err = export(
            &[],
            "narration.wav",
            AspectRatio::Landscape16x9,
            &ExportOpts::default(),
            &mut cb,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TalkieError::Input(_) | TalkieError::Capability(_)
        ));
    }

    #[test]
    fn narration_error_reclassifies_media_load() {
        let err = narration_error(TalkieError::media_load("missing narration.wav"));
        assert!(matches!(err, TalkieError::AudioDecode(_)));

        let err = narration_error(TalkieError::encoder("boom"));
        assert!(matches!(err, TalkieError::Encoder(_)));
    }
}
