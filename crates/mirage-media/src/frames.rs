//! Raw frame pipes to and from FFmpeg.
//!
//! These run on blocking threads: the compression loop pulls RGB24 frames
//! from a decoder's stdout and pushes processed frames into an encoder's
//! stdin.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::motion::GrayFrame;

/// Pixel format exchanged over the pipes.
pub const PIPE_PIX_FMT: &str = "rgb24";

/// Interleaved 8-bit RGB frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbFrame {
    /// Wrap raw RGB24 bytes. Returns `None` when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != frame_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Frame of a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(frame_len(width, height))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Luma conversion with BT.601 weights.
    pub fn to_gray(&self) -> GrayFrame {
        let luma = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                ((y + 500) / 1000) as u8
            })
            .collect();
        GrayFrame::from_raw(self.width, self.height, luma)
            .unwrap_or_else(|| GrayFrame::filled(self.width, self.height, 0))
    }
}

/// Bytes in one RGB24 frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Drain a child's stderr on a thread so the pipe never fills.
fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    }))
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> Option<String> {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn spawn_ffmpeg(cmd: &FfmpegCommand, stdin: Stdio, stdout: Stdio) -> MediaResult<Child> {
    check_ffmpeg()?;
    let args = cmd.build_args();
    debug!("Spawning FFmpeg: ffmpeg {}", args.join(" "));

    Command::new("ffmpeg")
        .args(&args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))
}

/// Anything that yields decoded frames in order.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbFrame>>;
}

/// Anything that consumes frames for encoding.
pub trait FrameSink {
    fn push_frame(&mut self, frame: &RgbFrame) -> MediaResult<()>;
}

/// Decoder producing RGB24 frames from a video file.
///
/// The FFmpeg process is killed when the reader is dropped before
/// [`FrameReader::finish`].
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_read: u64,
    reaped: bool,
}

impl FrameReader {
    /// Start decoding the first video stream of `input` at its native size.
    pub fn spawn(input: &Path, width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_video("Video stream has no dimensions"));
        }

        // Rotation metadata would otherwise swap the decoded dimensions.
        let cmd = FfmpegCommand::with_output("-")
            .add_input(input)
            .input_arg("-noautorotate")
            .map("0:v:0")
            .rawvideo_output(PIPE_PIX_FMT)
            .progress(false);

        let child = spawn_ffmpeg(&cmd, Stdio::null(), Stdio::piped())?;
        Self::from_child(child, width, height)
    }

    /// Read `width`x`height` RGB24 frames from a running process's stdout.
    pub fn from_child(mut child: Child, width: u32, height: u32) -> MediaResult<Self> {
        let stderr = collect_stderr(&mut child);
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::internal("Decoder stdout not captured"));
        };

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(frame_len(width, height).min(1 << 22), stdout),
            stderr,
            width,
            height,
            frames_read: 0,
            reaped: false,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Process id of the decoder.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Read the next frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> MediaResult<Option<RgbFrame>> {
        let len = frame_len(self.width, self.height);
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MediaError::Io(e)),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < len {
            warn!(
                bytes = filled,
                expected = len,
                "Decoder ended mid-frame, dropping partial frame"
            );
            return Ok(None);
        }

        self.frames_read += 1;
        Ok(RgbFrame::from_raw(self.width, self.height, buf))
    }

    /// Wait for the decoder to exit and check its status.
    pub fn finish(mut self) -> MediaResult<()> {
        let status = self.child.wait()?;
        self.reaped = true;
        let stderr = join_stderr(self.stderr.take());
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "Decoder exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }

    /// Stop the decoder without waiting for the rest of the stream.
    pub fn kill(self) {
        drop(self);
    }
}

impl FrameSource for FrameReader {
    fn next_frame(&mut self) -> MediaResult<Option<RgbFrame>> {
        self.read_frame()
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if !self.reaped {
            debug!(pid = self.child.id(), "Killing decoder");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Encoder consuming RGB24 frames on stdin.
///
/// The FFmpeg process is killed when the writer is dropped before
/// [`FrameWriter::finish`].
pub struct FrameWriter {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_written: u64,
    reaped: bool,
}

impl FrameWriter {
    /// Spawn an encoder. `cmd` must read rawvideo of `width`x`height`
    /// from stdin.
    pub fn spawn(cmd: &FfmpegCommand, width: u32, height: u32) -> MediaResult<Self> {
        if !cmd.reads_stdin() {
            return Err(MediaError::internal("Encoder command does not read stdin"));
        }

        let child = spawn_ffmpeg(cmd, Stdio::piped(), Stdio::null())?;
        Self::from_child(child, width, height)
    }

    /// Write `width`x`height` RGB24 frames to a running process's stdin.
    pub fn from_child(mut child: Child, width: u32, height: u32) -> MediaResult<Self> {
        let stderr = collect_stderr(&mut child);
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::internal("Encoder stdin not captured"));
        };

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(frame_len(width, height).min(1 << 22), stdin)),
            stderr,
            width,
            height,
            frames_written: 0,
            reaped: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Process id of the encoder.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Write one frame. Its size must match the encoder's input size.
    pub fn write_frame(&mut self, frame: &RgbFrame) -> MediaResult<()> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(MediaError::internal(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("Encoder stdin already closed"))?;

        if let Err(e) = stdin.write_all(&frame.data) {
            // A broken pipe means the encoder died; its stderr says why.
            if e.kind() == ErrorKind::BrokenPipe {
                self.stdin = None;
                let _ = self.child.wait();
                self.reaped = true;
                let stderr = join_stderr(self.stderr.take());
                return Err(MediaError::ffmpeg_failed("Encoder closed its input", stderr, None));
            }
            return Err(MediaError::Io(e));
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Close stdin and wait for the encoder to finish the file.
    pub fn finish(mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }

        let status = self.child.wait()?;
        self.reaped = true;
        let stderr = join_stderr(self.stderr.take());
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "Encoder exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }

    /// Abort the encode.
    pub fn kill(self) {
        drop(self);
    }
}

impl FrameSink for FrameWriter {
    fn push_frame(&mut self, frame: &RgbFrame) -> MediaResult<()> {
        self.write_frame(frame)
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if !self.reaped {
            debug!(pid = self.child.id(), "Killing encoder");
            // Closing stdin first keeps a blocked write from holding the pipe
            self.stdin = None;
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(4, 2), 24);
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(RgbFrame::from_raw(2, 2, vec![0; 11]).is_none());
        assert!(RgbFrame::from_raw(2, 2, vec![0; 12]).is_some());
    }

    #[test]
    fn test_filled_frame_layout() {
        let frame = RgbFrame::filled(2, 1, [1, 2, 3]);
        assert_eq!(frame.data(), &[1, 2, 3, 1, 2, 3]);
    }

    /// A process id that has been reaped no longer shows up in /proc.
    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_reader_kills_decoder() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let reader = FrameReader::from_child(child, 2, 2).unwrap();
        let pid = reader.id();
        assert!(is_running(pid));

        drop(reader);
        assert!(!is_running(pid));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_writer_kills_encoder() {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let writer = FrameWriter::from_child(child, 2, 2).unwrap();
        let pid = writer.id();

        drop(writer);
        assert!(!is_running(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_reader_from_process_output() {
        // Two 2x1 frames, then end of stream
        let child = Command::new("printf")
            .arg(r"\001\002\003\004\005\006\007\010\011\012\013\014")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut reader = FrameReader::from_child(child, 2, 1).unwrap();

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.data(), &[1, 2, 3, 4, 5, 6]);
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.frames_read(), 2);
        reader.finish().unwrap();
    }

    #[test]
    fn test_to_gray_weights() {
        let white = RgbFrame::filled(2, 2, [255, 255, 255]).to_gray();
        assert!(white.data().iter().all(|&v| v == 255));

        let red = RgbFrame::filled(1, 1, [255, 0, 0]).to_gray();
        assert_eq!(red.data(), &[76]);

        let green = RgbFrame::filled(1, 1, [0, 255, 0]).to_gray();
        assert_eq!(green.data(), &[150]);
    }
}
