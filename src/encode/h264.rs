//! H.264 video encoding through a system `ffmpeg` child process.
//!
//! Raw RGBA frames stream into the child's stdin; a drain thread parses the
//! Annex-B elementary stream off stdout into timestamped access units and
//! forwards them over a channel. The channel is the asynchronous encoder's
//! output callback: the pipeline polls it between submissions and the muxer
//! receives chunks as the encoder finishes them, not when frames go in.

use std::io::Read as _;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;

use crate::compose::frame::FrameRGBA;
use crate::encode::annexb::{AccessUnit, AnnexBSplitter};
use crate::encode::chunk::{EncodedChunk, VideoEncoderConfig};
use crate::foundation::core::{KEYFRAME_INTERVAL, frame_timestamp_us};
use crate::foundation::error::{TalkieError, TalkieResult};

/// Output-side events from the video encoder.
pub(crate) enum VideoEvent {
    /// Emitted once, before the first chunk: codec metadata for the muxer.
    Config(VideoStreamMeta),
    Chunk(EncodedChunk),
}

/// H.264 parameter sets captured from the bitstream.
#[derive(Clone, Debug)]
pub(crate) struct VideoStreamMeta {
    pub(crate) sps: Vec<u8>,
    pub(crate) pps: Vec<u8>,
}

pub(crate) struct H264Encoder {
    cfg: VideoEncoderConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_drain: Option<std::thread::JoinHandle<TalkieResult<()>>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    rx: mpsc::Receiver<TalkieResult<VideoEvent>>,
    frames_submitted: u64,
}

impl H264Encoder {
    /// Configure and start the encoder. Keyframes are forced every
    /// [`KEYFRAME_INTERVAL`] frames; constrained baseline forbids B-frames,
    /// so output access units arrive in presentation order.
    pub(crate) fn spawn(cfg: VideoEncoderConfig) -> TalkieResult<Self> {
        cfg.validate()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.canvas.width, cfg.canvas.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-profile:v",
            "baseline",
            "-level:v",
            "3.1",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            &cfg.bitrate.to_string(),
            "-g",
            &KEYFRAME_INTERVAL.to_string(),
            "-keyint_min",
            &KEYFRAME_INTERVAL.to_string(),
            "-sc_threshold",
            "0",
            "-force_key_frames",
            &format!("expr:eq(mod(n,{KEYFRAME_INTERVAL}),0)"),
            "-f",
            "h264",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            TalkieError::encoder(format!(
                "failed to spawn ffmpeg video encoder (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open video encoder stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open video encoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TalkieError::encoder("failed to open video encoder stderr"))?;

        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        let (tx, rx) = mpsc::channel::<TalkieResult<VideoEvent>>();
        let fps = cfg.fps;
        let stdout_drain = std::thread::spawn(move || drain_stdout(stdout, fps, &tx));

        Ok(Self {
            cfg,
            child: Some(child),
            stdin: Some(stdin),
            stdout_drain: Some(stdout_drain),
            stderr_drain: Some(stderr_drain),
            rx,
            frames_submitted: 0,
        })
    }

    /// Submit one frame. Frames must arrive in strictly increasing
    /// presentation order; the frame counter is the timestamp source.
    pub(crate) fn encode_frame(&mut self, frame: &FrameRGBA) -> TalkieResult<()> {
        if frame.width != self.cfg.canvas.width || frame.height != self.cfg.canvas.height {
            return Err(TalkieError::encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.canvas.width, self.cfg.canvas.height
            )));
        }
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected {
            return Err(TalkieError::encoder(
                "frame data size mismatch with width*height*4",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TalkieError::encoder("video encoder is already flushed"));
        };
        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            TalkieError::encoder(format!("failed to write frame to video encoder: {e}"))
        })?;
        self.frames_submitted += 1;
        Ok(())
    }

    pub(crate) fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Collect whatever output events have arrived so far, without blocking.
    pub(crate) fn poll(&mut self) -> TalkieResult<Vec<VideoEvent>> {
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
    /// emitted. Returns the tail events (config, if it never surfaced via
    /// `poll`, plus remaining chunks).
    pub(crate) fn flush(&mut self) -> TalkieResult<Vec<VideoEvent>> {
        drop(self.stdin.take());

        let drain_result = match self.stdout_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TalkieError::encoder("video encoder drain thread panicked"))?,
            None => Ok(()),
        };

        let mut child = self
            .child
            .take()
            .ok_or_else(|| TalkieError::encoder("video encoder already finished"))?;
        let status = child.wait().map_err(|e| {
            TalkieError::encoder(format!("failed to wait for ffmpeg video encoder: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TalkieError::encoder("video encoder stderr thread panicked"))?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(TalkieError::encoder(format!(
                "ffmpeg video encoder exited with {}: {}",
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

impl Drop for H264Encoder {
    fn drop(&mut self) {
        // Abandonment path: discard the pipeline, kill the child.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn drain_stdout(
    mut stdout: std::process::ChildStdout,
    fps: u32,
    tx: &mpsc::Sender<TalkieResult<VideoEvent>>,
) -> TalkieResult<()> {
    let mut splitter = AnnexBSplitter::new();
    let mut emitter = AuEmitter {
        fps,
        au_index: 0,
        config_sent: false,
    };

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let msg = format!("failed to read video encoder output: {e}");
                let _ = tx.send(Err(TalkieError::encoder(msg.clone())));
                return Err(TalkieError::encoder(msg));
            }
        };
        for au in splitter.push(&buf[..n]) {
            if emitter
                .emit(tx, &au, splitter.sps(), splitter.pps())
                .is_err()
            {
                // Receiver dropped: the export was abandoned.
                return Ok(());
            }
        }
    }

    let (tail, sps, pps) = splitter.finish();
    for au in &tail {
        if emitter.emit(tx, au, sps.as_deref(), pps.as_deref()).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

struct AuEmitter {
    fps: u32,
    au_index: u64,
    config_sent: bool,
}

impl AuEmitter {
    fn emit(
        &mut self,
        tx: &mpsc::Sender<TalkieResult<VideoEvent>>,
        au: &AccessUnit,
        sps: Option<&[u8]>,
        pps: Option<&[u8]>,
    ) -> Result<(), mpsc::SendError<TalkieResult<VideoEvent>>> {
        if !self.config_sent {
            match (sps, pps) {
                (Some(sps), Some(pps)) => {
                    tx.send(Ok(VideoEvent::Config(VideoStreamMeta {
                        sps: sps.to_vec(),
                        pps: pps.to_vec(),
                    })))?;
                    self.config_sent = true;
                }
                _ => {
                    tx.send(Err(TalkieError::encoder(
                        "video bitstream carried no SPS/PPS before the first access unit",
                    )))?;
                    return Ok(());
                }
            }
        }

        let ts = frame_timestamp_us(self.fps, self.au_index);
        let duration = frame_timestamp_us(self.fps, self.au_index + 1) - ts;
        self.au_index += 1;
        tx.send(Ok(VideoEvent::Chunk(EncodedChunk {
            data: au.to_avcc(),
            timestamp_us: ts,
            duration_us: duration,
            key: au.key,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Canvas;

    #[test]
    fn spawn_rejects_invalid_config_before_any_process_starts() {
        let cfg = VideoEncoderConfig {
            canvas: Canvas {
                width: 0,
                height: 720,
            },
            fps: 30,
            bitrate: 2_000_000,
        };
        assert!(matches!(
            H264Encoder::spawn(cfg),
            Err(TalkieError::Encoder(_))
        ));
    }
}
