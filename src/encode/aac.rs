//! AAC audio encoding through a system `ffmpeg` child process.
//!
//! Sliced narration PCM streams into the child's stdin; a drain thread
//! de-frames the ADTS output into timestamped chunks and forwards them over
//! a channel, mirroring the video encoder's output-callback shape.

use std::io::Read as _;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;

use crate::audio::slice::AudioUnit;
use crate::encode::adts::{AdtsSplitter, SAMPLES_PER_FRAME};
use crate::encode::chunk::{AudioEncoderConfig, EncodedChunk};
use crate::foundation::core::sample_timestamp_us;
use crate::foundation::error::{TalkieError, TalkieResult};

/// Output-side events from the audio encoder.
pub(crate) enum AudioEvent {
    /// Emitted once, before the first chunk: codec metadata for the muxer.
    Config(AudioStreamMeta),
    Chunk(EncodedChunk),
}

/// AAC codec parameters captured from the first ADTS header.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AudioStreamMeta {
    pub(crate) object_type: u8,
    pub(crate) freq_index: u8,
    pub(crate) channel_config: u8,
}

pub(crate) struct AacEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_drain: Option<std::thread::JoinHandle<TalkieResult<()>>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    rx: mpsc::Receiver<TalkieResult<AudioEvent>>,
    units_submitted: u64,
}

impl AacEncoder {
    pub(crate) fn spawn(cfg: AudioEncoderConfig) -> TalkieResult<Self> {
        cfg.validate()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "f32le",
            "-ar",
            &cfg.sample_rate.to_string(),
            "-ac",
            &cfg.channels.to_string(),
            "-i",
            "pipe:0",
            "-vn",
            "-c:a",
            "aac",
            "-b:a",
            &cfg.bitrate.to_string(),
            "-ar",
            &cfg.sample_rate.to_string(),
            "-ac",
            &cfg.channels.to_string(),
            "-f",
            "adts",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            TalkieError::encoder(format!(
                "failed to spawn ffmpeg audio encoder (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open audio encoder stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open audio encoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open audio encoder stderr"))?;

        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        let (tx, rx) = mpsc::channel::<TalkieResult<AudioEvent>>();
        let sample_rate = cfg.sample_rate;
        let stdout_drain = std::thread::spawn(move || drain_stdout(stdout, sample_rate, &tx));

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout_drain: Some(stdout_drain),
            stderr_drain: Some(stderr_drain),
            rx,
            units_submitted: 0,
        })
    }

    /// Submit one re-timed narration unit. Units must arrive in timestamp
    /// order; the concatenated PCM defines the output timeline.
    pub(crate) fn encode_unit(&mut self, unit: &AudioUnit) -> TalkieResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TalkieError::encoder("audio encoder is already flushed"));
        };
        let mut bytes = Vec::<u8>::with_capacity(unit.samples.len() * 4);
        for &sample in &unit.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        use std::io::Write as _;
        stdin.write_all(&bytes).map_err(|e| {
            TalkieError::encoder(format!("failed to write audio to encoder: {e}"))
        })?;
        self.units_submitted += 1;
        Ok(())
    }

    pub(crate) fn units_submitted(&self) -> u64 {
        self.units_submitted
    }

    /// Collect whatever output events have arrived so far, without blocking.
    pub(crate) fn poll(&mut self) -> TalkieResult<Vec<AudioEvent>> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(ev)) => out.push(ev),
                Ok(Err(e)) => return Err(e),
                Err(mpsc::TryRecvError::Empty) | Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        Ok(out)
    }

    /// Close the input side and block until every in-flight chunk has been
    /// emitted. Returns the tail events.
    pub(crate) fn flush(&mut self) -> TalkieResult<Vec<AudioEvent>> {
        drop(self.stdin.take());

        let drain_result = match self.stdout_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TalkieError::encoder("audio encoder drain thread panicked"))?,
            None => Ok(()),
        };

        let mut child = self
            .child
            .take()
            .ok_or_else(|| TalkieError::encoder("audio encoder already finished"))?;
        let status = child.wait().map_err(|e| {
            TalkieError::encoder(format!("failed to wait for ffmpeg audio encoder: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TalkieError::encoder("audio encoder stderr thread panicked"))?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(TalkieError::encoder(format!(
                "ffmpeg audio encoder exited with {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }

        // The channel error (when present) carries more detail than the
        // drain thread's return value; poll first so it wins.
        let events = self.poll()?;
        drain_result?;
        Ok(events)
    }
}

impl Drop for AacEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn drain_stdout(
    mut stdout: std::process::ChildStdout,
    sample_rate: u32,
    tx: &mpsc::Sender<TalkieResult<AudioEvent>>,
) -> TalkieResult<()> {
    let mut splitter = AdtsSplitter::new();
    let mut frame_index = 0u64;
    let mut config_sent = false;

    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let msg = format!("failed to read audio encoder output: {e}");
                let _ = tx.send(Err(TalkieError::encoder(msg.clone())));
                return Err(TalkieError::encoder(msg));
            }
        };
        let frames = match splitter.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                let _ = tx.send(Err(e));
                return Err(TalkieError::encoder("audio bitstream parsing failed"));
            }
        };
        for frame in frames {
            if !config_sent {
                let send = tx.send(Ok(AudioEvent::Config(AudioStreamMeta {
                    object_type: frame.object_type,
                    freq_index: frame.freq_index,
                    channel_config: frame.channel_config,
                })));
                if send.is_err() {
                    return Ok(());
                }
                config_sent = true;
            }

            let start_sample = frame_index * SAMPLES_PER_FRAME;
            let ts = sample_timestamp_us(sample_rate, start_sample);
            let duration =
                sample_timestamp_us(sample_rate, start_sample + SAMPLES_PER_FRAME) - ts;
            frame_index += 1;
            let send = tx.send(Ok(AudioEvent::Chunk(EncodedChunk {
                data: bytes::Bytes::from(frame.payload),
                timestamp_us: ts,
                duration_us: duration,
                key: true,
            })));
            if send.is_err() {
                return Ok(());
            }
        }
    }

    splitter.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_rejects_invalid_config_before_any_process_starts() {
        let cfg = AudioEncoderConfig {
            sample_rate: 0,
            channels: 1,
            bitrate: 128_000,
        };
        assert!(matches!(
            AacEncoder::spawn(cfg),
            Err(TalkieError::Encoder(_))
        ));
    }
}
