//! Narration slicing.
//!
//! The output audio track is built by cutting the decoded narration at each
//! segment's window and appending the slices back to back. Unit timestamps
//! are the running total of previously emitted audio, not the original
//! segment start times; this re-timed, gapless sequence is what keeps audio
//! aligned 1:1 with the video segment sequence. Narration that falls in a
//! gap between segments is dropped, not replaced with silence.

use crate::assets::media::AudioPcm;
use crate::foundation::core::sample_timestamp_us;
use crate::model::Segment;

/// One gapless slice of narration, channel 0 only.
#[derive(Clone, Debug)]
pub(crate) struct AudioUnit {
    pub(crate) samples: Vec<f32>,
    /// Presentation timestamp in microseconds within the re-timed stream.
    pub(crate) timestamp_us: u64,
}

/// The full re-timed narration stream for an export.
#[derive(Clone, Debug)]
pub(crate) struct AudioTimeline {
    pub(crate) sample_rate: u32,
    pub(crate) units: Vec<AudioUnit>,
}

impl AudioTimeline {
    pub(crate) fn total_samples(&self) -> u64 {
        self.units.iter().map(|u| u.samples.len() as u64).sum()
    }
}

/// Slice the decoded narration along the segment windows.
///
/// Sample ranges are `[floor(start*rate), floor(end*rate))` clamped to the
/// decoded length. A segment whose range rounds to empty contributes no unit
/// and does not advance the running timestamp.
pub(crate) fn slice_narration(pcm: &AudioPcm, segments: &[Segment]) -> AudioTimeline {
    let rate = f64::from(pcm.sample_rate);
    let frames = pcm.frames();
    let channels = usize::from(pcm.channels.max(1));

    let mut units = Vec::new();
    let mut cursor_samples = 0u64;

    for seg in segments {
        let start = ((seg.timestamp.start * rate).floor().max(0.0) as usize).min(frames);
        let end = ((seg.timestamp.end * rate).floor().max(0.0) as usize).min(frames);
        if start >= end {
            continue;
        }

        // Mono policy: channel 0 only, whatever the source layout.
        let mut samples = Vec::with_capacity(end - start);
        for frame in start..end {
            samples.push(pcm.interleaved_f32[frame * channels]);
        }

        let timestamp_us = sample_timestamp_us(pcm.sample_rate, cursor_samples);
        cursor_samples += samples.len() as u64;
        units.push(AudioUnit {
            samples,
            timestamp_us,
        });
    }

    AudioTimeline {
        sample_rate: pcm.sample_rate,
        units,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaKind, TimeRange};

    fn seg(start: f64, end: f64) -> Segment {
        Segment {
            id: format!("{start}-{end}"),
            timestamp: TimeRange { start, end },
            duration: end - start,
            text: "t".to_string(),
            media_url: Some("x.png".to_string()),
            media_type: Some(MediaKind::StockImage),
        }
    }

    fn stereo_ramp(frames: usize, rate: u32) -> AudioPcm {
        // Channel 0 is a ramp, channel 1 is its negation, so channel
        // selection mistakes are loud.
        let mut pcm = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let v = i as f32;
            pcm.push(v);
            pcm.push(-v);
        }
        AudioPcm {
            sample_rate: rate,
            channels: 2,
            interleaved_f32: pcm,
        }
    }

    #[test]
    fn slices_are_gapless_and_retimed() {
        let pcm = stereo_ramp(1000, 100);
        // Segments with a deliberate gap between them.
        let timeline = slice_narration(&pcm, &[seg(0.0, 2.0), seg(5.0, 6.0)]);

        assert_eq!(timeline.units.len(), 2);
        assert_eq!(timeline.units[0].samples.len(), 200);
        assert_eq!(timeline.units[1].samples.len(), 100);

        // Re-timed: second unit starts where the first ends, the 3s gap in
        // narration time is gone.
        assert_eq!(timeline.units[0].timestamp_us, 0);
        assert_eq!(timeline.units[1].timestamp_us, 2_000_000);
        assert_eq!(timeline.total_samples(), 300);

        // Channel 0 content, original positions.
        assert_eq!(timeline.units[0].samples[0], 0.0);
        assert_eq!(timeline.units[0].samples[199], 199.0);
        assert_eq!(timeline.units[1].samples[0], 500.0);
    }

    #[test]
    fn timestamps_accumulate_durations_exactly() {
        let pcm = stereo_ramp(44_100 * 4, 44_100);
        let timeline = slice_narration(
            &pcm,
            &[seg(0.0, 1.0), seg(1.0, 1.5), seg(1.5, 3.25)],
        );
        assert_eq!(timeline.units.len(), 3);
        let mut expected_ts = 0u64;
        let mut cursor = 0u64;
        for unit in &timeline.units {
            assert_eq!(unit.timestamp_us, expected_ts);
            cursor += unit.samples.len() as u64;
            expected_ts = sample_timestamp_us(44_100, cursor);
        }
    }

    #[test]
    fn empty_sample_range_is_skipped_without_perturbing_timestamps() {
        let pcm = stereo_ramp(1000, 100);
        // The middle segment is far shorter than one sample period.
        let timeline = slice_narration(
            &pcm,
            &[seg(0.0, 1.0), seg(1.0, 1.004), seg(1.01, 2.0)],
        );
        assert_eq!(timeline.units.len(), 2);
        assert_eq!(timeline.units[0].samples.len(), 100);
        assert_eq!(timeline.units[1].timestamp_us, 1_000_000);
    }

    #[test]
    fn ranges_clamp_to_decoded_length() {
        let pcm = stereo_ramp(150, 100);
        let timeline = slice_narration(&pcm, &[seg(0.0, 1.0), seg(1.0, 5.0)]);
        assert_eq!(timeline.units.len(), 2);
        assert_eq!(timeline.units[1].samples.len(), 50);
    }

    #[test]
    fn segment_past_end_of_narration_contributes_nothing() {
        let pcm = stereo_ramp(100, 100);
        let timeline = slice_narration(&pcm, &[seg(2.0, 3.0)]);
        assert!(timeline.units.is_empty());
        assert_eq!(timeline.total_samples(), 0);
    }
}
