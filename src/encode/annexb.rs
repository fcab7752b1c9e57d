//! Incremental H.264 Annex-B bitstream splitting.
//!
//! The video encoder emits an Annex-B elementary stream (start-code
//! delimited NAL units). The muxer wants AVCC access units (4-byte
//! length-prefixed NALs) plus the SPS/PPS parameter sets carried out of
//! band, so this module groups NALs into access units as bytes arrive,
//! captures SPS/PPS, and flags IDR units as keyframes.

use bytes::Bytes;

pub(crate) const NAL_IDR: u8 = 5;
pub(crate) const NAL_SEI: u8 = 6;
pub(crate) const NAL_SPS: u8 = 7;
pub(crate) const NAL_PPS: u8 = 8;
pub(crate) const NAL_AUD: u8 = 9;

fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map_or(0, |b| b & 0x1F)
}

/// A VCL NAL with `first_mb_in_slice == 0` starts a new picture. The field
/// is the leading `ue(v)` of the slice header, so value 0 encodes as a set
/// first bit.
fn starts_new_picture(nal: &[u8]) -> bool {
    nal.get(1).is_some_and(|b| b & 0x80 != 0)
}

fn is_vcl(t: u8) -> bool {
    (1..=5).contains(&t)
}

/// One coded picture: the NALs that decode to a single frame.
#[derive(Clone, Debug)]
pub(crate) struct AccessUnit {
    pub(crate) nals: Vec<Vec<u8>>,
    pub(crate) key: bool,
}

impl AccessUnit {
    /// Convert to an AVCC sample: each NAL prefixed with its 4-byte
    /// big-endian length. Parameter sets travel in the track config, not in
    /// samples.
    pub(crate) fn to_avcc(&self) -> Bytes {
        let total: usize = self.nals.iter().map(|n| 4 + n.len()).sum();
        let mut out = Vec::with_capacity(total);
        for nal in &self.nals {
            out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            out.extend_from_slice(nal);
        }
        Bytes::from(out)
    }
}

/// Find the next start code at or after `from`.
///
/// Returns `(code_start, code_len)` where `code_start` includes the extra
/// leading zero of a 4-byte code, so the previous NAL's payload ends exactly
/// at `code_start`.
fn find_start_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    if buf.len() < 3 {
        return None;
    }
    let mut i = from;
    while i + 2 < buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            if i > from && buf[i - 1] == 0 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// Streaming Annex-B parser: feed bytes, receive completed access units.
#[derive(Default)]
pub(crate) struct AnnexBSplitter {
    buf: Vec<u8>,
    current: Vec<Vec<u8>>,
    current_has_vcl: bool,
    current_key: bool,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl AnnexBSplitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sps(&self) -> Option<&[u8]> {
        self.sps.as_deref()
    }

    pub(crate) fn pps(&self) -> Option<&[u8]> {
        self.pps.as_deref()
    }

    /// Feed stream bytes; returns every access unit completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<AccessUnit> {
        self.buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        loop {
            let Some((first_start, first_len)) = find_start_code(&self.buf, 0) else {
                break;
            };
            let payload_from = first_start + first_len;
            let Some((next_start, _)) = find_start_code(&self.buf, payload_from) else {
                // The trailing NAL is incomplete until more bytes (or EOF).
                break;
            };
            let nal = self.buf[payload_from..next_start].to_vec();
            self.buf.drain(..next_start);
            self.accept_nal(nal, &mut out);
        }
        out
    }

    /// Signal end of stream: completes the trailing NAL and the open access
    /// unit, and hands back the captured parameter sets.
    pub(crate) fn finish(mut self) -> (Vec<AccessUnit>, Option<Vec<u8>>, Option<Vec<u8>>) {
        let mut out = Vec::new();
        if let Some((start, len)) = find_start_code(&self.buf, 0) {
            let nal = self.buf[start + len..].to_vec();
            self.accept_nal(nal, &mut out);
        }
        if self.current_has_vcl {
            out.push(AccessUnit {
                nals: std::mem::take(&mut self.current),
                key: self.current_key,
            });
        }
        (out, self.sps, self.pps)
    }

    fn close_current(&mut self, out: &mut Vec<AccessUnit>) {
        if self.current_has_vcl {
            out.push(AccessUnit {
                nals: std::mem::take(&mut self.current),
                key: self.current_key,
            });
        } else {
            self.current.clear();
        }
        self.current_has_vcl = false;
        self.current_key = false;
    }

    fn accept_nal(&mut self, nal: Vec<u8>, out: &mut Vec<AccessUnit>) {
        if nal.is_empty() {
            return;
        }
        let t = nal_type(&nal);
        match t {
            NAL_SPS => {
                if self.current_has_vcl {
                    self.close_current(out);
                }
                self.sps = Some(nal);
            }
            NAL_PPS => {
                if self.current_has_vcl {
                    self.close_current(out);
                }
                self.pps = Some(nal);
            }
            NAL_AUD => {
                if self.current_has_vcl {
                    self.close_current(out);
                }
            }
            NAL_SEI => {
                if self.current_has_vcl {
                    self.close_current(out);
                }
                self.current.push(nal);
            }
            t if is_vcl(t) => {
                if self.current_has_vcl && starts_new_picture(&nal) {
                    self.close_current(out);
                }
                if t == NAL_IDR {
                    self.current_key = true;
                }
                self.current.push(nal);
                self.current_has_vcl = true;
            }
            _ => {
                self.current.push(nal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NAL header bytes: forbidden_zero(1) | nal_ref_idc(2) | nal_type(5).
    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1F, 0xAA];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
    const SEI: &[u8] = &[0x06, 0x05, 0x11, 0x22];
    // First slice-header byte 0x88: leading bit set ⇒ first_mb_in_slice == 0.
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33];
    const NON_IDR: &[u8] = &[0x41, 0x9A, 0x24, 0x6C];

    fn stream(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, nal) in nals.iter().enumerate() {
            // Alternate 4- and 3-byte start codes like real encoder output.
            if i % 2 == 0 {
                out.extend_from_slice(&[0, 0, 0, 1]);
            } else {
                out.extend_from_slice(&[0, 0, 1]);
            }
            out.extend_from_slice(nal);
        }
        out
    }

    fn collect_all(bytes: &[u8], chunk_size: usize) -> (Vec<AccessUnit>, Option<Vec<u8>>, Option<Vec<u8>>) {
        let mut splitter = AnnexBSplitter::new();
        let mut units = Vec::new();
        for chunk in bytes.chunks(chunk_size.max(1)) {
            units.extend(splitter.push(chunk));
        }
        let (tail, sps, pps) = splitter.finish();
        units.extend(tail);
        (units, sps, pps)
    }

    #[test]
    fn splits_into_access_units_and_captures_parameter_sets() {
        let bytes = stream(&[SPS, PPS, SEI, IDR, NON_IDR, NON_IDR]);
        let (units, sps, pps) = collect_all(&bytes, bytes.len());

        assert_eq!(units.len(), 3);
        assert!(units[0].key);
        assert!(!units[1].key);
        assert!(!units[2].key);
        // SEI rides with the IDR's access unit.
        assert_eq!(units[0].nals.len(), 2);
        assert_eq!(sps.as_deref(), Some(SPS));
        assert_eq!(pps.as_deref(), Some(PPS));
    }

    #[test]
    fn incremental_pushes_match_single_push() {
        let bytes = stream(&[SPS, PPS, IDR, NON_IDR, NON_IDR, IDR, NON_IDR]);
        let (all_at_once, ..) = collect_all(&bytes, bytes.len());
        for chunk_size in [1, 2, 3, 5, 7] {
            let (units, sps, pps) = collect_all(&bytes, chunk_size);
            assert_eq!(units.len(), all_at_once.len(), "chunk_size={chunk_size}");
            for (a, b) in units.iter().zip(all_at_once.iter()) {
                assert_eq!(a.nals, b.nals);
                assert_eq!(a.key, b.key);
            }
            assert_eq!(sps.as_deref(), Some(SPS));
            assert_eq!(pps.as_deref(), Some(PPS));
        }
    }

    #[test]
    fn access_unit_delimiters_split_units() {
        let aud: &[u8] = &[0x09, 0xF0];
        let bytes = stream(&[SPS, PPS, IDR, aud, NON_IDR]);
        let (units, ..) = collect_all(&bytes, 4);
        assert_eq!(units.len(), 2);
        // The AUD itself is dropped from the sample payload.
        assert!(units.iter().all(|u| u.nals.iter().all(|n| n[0] & 0x1F != NAL_AUD)));
    }

    #[test]
    fn avcc_conversion_length_prefixes_every_nal() {
        let au = AccessUnit {
            nals: vec![SEI.to_vec(), IDR.to_vec()],
            key: true,
        };
        let avcc = au.to_avcc();
        assert_eq!(avcc.len(), 4 + SEI.len() + 4 + IDR.len());
        assert_eq!(&avcc[..4], &(SEI.len() as u32).to_be_bytes());
        assert_eq!(&avcc[4..4 + SEI.len()], SEI);
        let idr_off = 4 + SEI.len();
        assert_eq!(
            &avcc[idr_off..idr_off + 4],
            &(IDR.len() as u32).to_be_bytes()
        );
    }

    #[test]
    fn sps_pps_are_not_included_in_samples() {
        let bytes = stream(&[SPS, PPS, IDR]);
        let (units, ..) = collect_all(&bytes, bytes.len());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nals, vec![IDR.to_vec()]);
    }
}
