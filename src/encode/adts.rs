//! Incremental ADTS (Audio Data Transport Stream) frame splitting.
//!
//! The audio encoder emits AAC wrapped in ADTS headers. The muxer wants raw
//! AAC frames with the AudioSpecificConfig carried in the track's `esds`
//! box, so this module strips headers as bytes arrive and exposes the codec
//! parameters from the first header.

use crate::foundation::error::{TalkieError, TalkieResult};

/// Samples per AAC-LC frame.
pub(crate) const SAMPLES_PER_FRAME: u64 = 1024;

const HEADER_LEN: usize = 7;
const HEADER_LEN_CRC: usize = 9;

/// One de-framed AAC payload plus the header fields the muxer needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AdtsFrame {
    pub(crate) payload: Vec<u8>,
    /// MPEG-4 audio object type (2 = AAC-LC).
    pub(crate) object_type: u8,
    /// Sampling frequency index (4 = 44.1 kHz).
    pub(crate) freq_index: u8,
    /// Channel configuration (1 = mono).
    pub(crate) channel_config: u8,
}

/// Two-byte AudioSpecificConfig for the given header fields.
pub(crate) fn audio_specific_config(object_type: u8, freq_index: u8, channel_config: u8) -> [u8; 2] {
    [
        (object_type << 3) | (freq_index >> 1),
        ((freq_index & 0x1) << 7) | (channel_config << 3),
    ]
}

/// Streaming ADTS parser: feed bytes, receive completed frames.
#[derive(Default)]
pub(crate) struct AdtsSplitter {
    buf: Vec<u8>,
}

impl AdtsSplitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed stream bytes; returns every frame completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> TalkieResult<Vec<AdtsFrame>> {
        self.buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let h = &self.buf[..HEADER_LEN];
            if h[0] != 0xFF || (h[1] & 0xF0) != 0xF0 {
                return Err(TalkieError::encoder(
                    "lost ADTS sync in encoded audio stream",
                ));
            }
            let protection_absent = h[1] & 0x1;
            let object_type = ((h[2] >> 6) & 0x3) + 1;
            let freq_index = (h[2] >> 2) & 0xF;
            let channel_config = ((h[2] & 0x1) << 2) | (h[3] >> 6);
            let frame_len = (usize::from(h[3] & 0x3) << 11)
                | (usize::from(h[4]) << 3)
                | usize::from(h[5] >> 5);
            let header_len = if protection_absent == 1 {
                HEADER_LEN
            } else {
                HEADER_LEN_CRC
            };
            if frame_len < header_len {
                return Err(TalkieError::encoder(
                    "ADTS frame length smaller than its header",
                ));
            }
            if self.buf.len() < frame_len {
                break;
            }

            out.push(AdtsFrame {
                payload: self.buf[header_len..frame_len].to_vec(),
                object_type,
                freq_index,
                channel_config,
            });
            self.buf.drain(..frame_len);
        }
        Ok(out)
    }

    /// Signal end of stream; leftover bytes mean a truncated frame.
    pub(crate) fn finish(self) -> TalkieResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(TalkieError::encoder(format!(
                "encoded audio stream ended mid-frame ({} trailing bytes)",
                self.buf.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adts_frame(payload: &[u8]) -> Vec<u8> {
        // AAC-LC, 44.1 kHz (index 4), mono, protection absent.
        let frame_len = HEADER_LEN + payload.len();
        let mut out = vec![
            0xFF,
            0xF1,
            (1 << 6) | (4 << 2),
            (1 << 6) | ((frame_len >> 11) as u8 & 0x3),
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 0x7) as u8) << 5) | 0x1F,
            0xFC,
        ];
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_frames_and_header_fields() {
        let mut bytes = adts_frame(&[1, 2, 3, 4]);
        bytes.extend_from_slice(&adts_frame(&[9, 8]));

        let mut splitter = AdtsSplitter::new();
        let frames = splitter.push(&bytes).unwrap();
        splitter.finish().unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, vec![1, 2, 3, 4]);
        assert_eq!(frames[1].payload, vec![9, 8]);
        assert_eq!(frames[0].object_type, 2);
        assert_eq!(frames[0].freq_index, 4);
        assert_eq!(frames[0].channel_config, 1);
    }

    #[test]
    fn frames_split_across_pushes_reassemble() {
        let mut bytes = adts_frame(&[7; 20]);
        bytes.extend_from_slice(&adts_frame(&[3; 5]));

        for chunk_size in [1, 3, 6, 11] {
            let mut splitter = AdtsSplitter::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                frames.extend(splitter.push(chunk).unwrap());
            }
            splitter.finish().unwrap();
            assert_eq!(frames.len(), 2, "chunk_size={chunk_size}");
            assert_eq!(frames[0].payload, vec![7; 20]);
            assert_eq!(frames[1].payload, vec![3; 5]);
        }
    }

    #[test]
    fn lost_sync_is_an_encoder_error() {
        let mut splitter = AdtsSplitter::new();
        let err = splitter.push(&[0x00; 16]).unwrap_err();
        assert!(matches!(err, TalkieError::Encoder(_)));
    }

    #[test]
    fn truncated_stream_fails_at_finish() {
        let bytes = adts_frame(&[5; 10]);
        let mut splitter = AdtsSplitter::new();
        splitter.push(&bytes[..bytes.len() - 2]).unwrap();
        assert!(splitter.finish().is_err());
    }

    #[test]
    fn audio_specific_config_for_lc_mono_44100() {
        assert_eq!(audio_specific_config(2, 4, 1), [0x12, 0x08]);
    }
}
