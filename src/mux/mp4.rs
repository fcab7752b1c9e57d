//! In-memory MP4 container writing.
//!
//! Thin wrapper over the `mp4` crate: one H.264 track and one AAC track,
//! tracks configured lazily when each encoder surfaces its codec metadata,
//! chunks accepted in any order across streams. Timestamps are normalized
//! per stream so the first chunk defines that stream's zero point, then
//! converted from microseconds to track ticks (video timescale = fps, so a
//! frame is one tick; audio timescale = sample rate).

use std::io::Cursor;

use mp4::{
    AacConfig, AudioObjectType, AvcConfig, ChannelConfig, MediaConfig, Mp4Config, Mp4Sample,
    Mp4Writer, SampleFreqIndex, TrackConfig, TrackType,
};

use crate::encode::aac::AudioStreamMeta;
use crate::encode::chunk::{AudioEncoderConfig, EncodedChunk};
use crate::encode::h264::VideoStreamMeta;
use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkieError, TalkieResult};

struct TrackState {
    track_id: u32,
    timescale: u32,
    first_ts_us: Option<u64>,
}

pub(crate) struct Mp4Muxer {
    writer: Option<Mp4Writer<Cursor<Vec<u8>>>>,
    next_track_id: u32,
    video: Option<TrackState>,
    audio: Option<TrackState>,
}

fn ticks(us: u64, timescale: u32) -> u64 {
    ((u128::from(us) * u128::from(timescale) + 500_000) / 1_000_000) as u64
}

fn fourcc(s: &str) -> TalkieResult<mp4::FourCC> {
    s.parse()
        .map_err(|e| TalkieError::mux(format!("invalid fourcc '{s}': {e}")))
}

impl Mp4Muxer {
    pub(crate) fn new() -> TalkieResult<Self> {
        let config = Mp4Config {
            major_brand: fourcc("isom")?,
            minor_version: 512,
            compatible_brands: vec![
                fourcc("isom")?,
                fourcc("iso2")?,
                fourcc("avc1")?,
                fourcc("mp41")?,
            ],
            timescale: 1000,
        };
        let writer = Mp4Writer::write_start(Cursor::new(Vec::new()), &config)
            .map_err(|e| TalkieError::mux(format!("failed to start MP4 container: {e}")))?;
        Ok(Self {
            writer: Some(writer),
            next_track_id: 1,
            video: None,
            audio: None,
        })
    }

    fn writer_mut(&mut self) -> TalkieResult<&mut Mp4Writer<Cursor<Vec<u8>>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| TalkieError::mux("MP4 container already finalized"))
    }

    pub(crate) fn configure_video(
        &mut self,
        canvas: Canvas,
        fps: u32,
        meta: &VideoStreamMeta,
    ) -> TalkieResult<()> {
        if self.video.is_some() {
            return Err(TalkieError::mux("video track already configured"));
        }
        let track = TrackConfig {
            track_type: TrackType::Video,
            timescale: fps,
            language: "und".to_string(),
            media_conf: MediaConfig::AvcConfig(AvcConfig {
                width: canvas.width as u16,
                height: canvas.height as u16,
                seq_param_set: meta.sps.clone(),
                pic_param_set: meta.pps.clone(),
            }),
        };
        self.writer_mut()?
            .add_track(&track)
            .map_err(|e| TalkieError::mux(format!("failed to add video track: {e}")))?;
        self.video = Some(TrackState {
            track_id: self.next_track_id,
            timescale: fps,
            first_ts_us: None,
        });
        self.next_track_id += 1;
        Ok(())
    }

    pub(crate) fn configure_audio(
        &mut self,
        cfg: AudioEncoderConfig,
        meta: &AudioStreamMeta,
    ) -> TalkieResult<()> {
        if self.audio.is_some() {
            return Err(TalkieError::mux("audio track already configured"));
        }
        let profile = match meta.object_type {
            2 => AudioObjectType::AacLowComplexity,
            other => {
                return Err(TalkieError::mux(format!(
                    "unsupported AAC object type {other} (expected AAC-LC)"
                )));
            }
        };
        let freq_index = match meta.freq_index {
            3 => SampleFreqIndex::Freq48000,
            4 => SampleFreqIndex::Freq44100,
            other => {
                return Err(TalkieError::mux(format!(
                    "unsupported AAC sampling frequency index {other}"
                )));
            }
        };
        let chan_conf = match meta.channel_config {
            1 => ChannelConfig::Mono,
            2 => ChannelConfig::Stereo,
            other => {
                return Err(TalkieError::mux(format!(
                    "unsupported AAC channel configuration {other}"
                )));
            }
        };

        let track = TrackConfig {
            track_type: TrackType::Audio,
            timescale: cfg.sample_rate,
            language: "und".to_string(),
            media_conf: MediaConfig::AacConfig(AacConfig {
                bitrate: cfg.bitrate,
                profile,
                freq_index,
                chan_conf,
            }),
        };
        self.writer_mut()?
            .add_track(&track)
            .map_err(|e| TalkieError::mux(format!("failed to add audio track: {e}")))?;
        self.audio = Some(TrackState {
            track_id: self.next_track_id,
            timescale: cfg.sample_rate,
            first_ts_us: None,
        });
        self.next_track_id += 1;
        Ok(())
    }

    pub(crate) fn add_video_chunk(&mut self, chunk: &EncodedChunk) -> TalkieResult<()> {
        let state = self
            .video
            .as_mut()
            .ok_or_else(|| TalkieError::mux("video chunk before video track configuration"))?;
        let sample = normalized_sample(state, chunk);
        let track_id = state.track_id;
        self.writer_mut()?
            .write_sample(track_id, &sample)
            .map_err(|e| TalkieError::mux(format!("failed to write video sample: {e}")))
    }

    pub(crate) fn add_audio_chunk(&mut self, chunk: &EncodedChunk) -> TalkieResult<()> {
        let state = self
            .audio
            .as_mut()
            .ok_or_else(|| TalkieError::mux("audio chunk before audio track configuration"))?;
        let sample = normalized_sample(state, chunk);
        let track_id = state.track_id;
        self.writer_mut()?
            .write_sample(track_id, &sample)
            .map_err(|e| TalkieError::mux(format!("failed to write audio sample: {e}")))
    }

    /// Write the index and hand back the finished container. Consumes the
    /// muxer, so no chunk can be added afterwards.
    pub(crate) fn finalize(mut self) -> TalkieResult<Vec<u8>> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| TalkieError::mux("MP4 container already finalized"))?;
        writer
            .write_end()
            .map_err(|e| TalkieError::mux(format!("failed to finalize MP4 container: {e}")))?;
        Ok(writer.into_writer().into_inner())
    }
}

fn normalized_sample(state: &mut TrackState, chunk: &EncodedChunk) -> Mp4Sample {
    let zero = *state.first_ts_us.get_or_insert(chunk.timestamp_us);
    let start_time = ticks(chunk.timestamp_us.saturating_sub(zero), state.timescale);
    let duration = ticks(chunk.duration_us, state.timescale) as u32;
    Mp4Sample {
        start_time,
        duration,
        rendering_offset: 0,
        is_sync: chunk.key,
        bytes: chunk.data.clone(),
    }
}
