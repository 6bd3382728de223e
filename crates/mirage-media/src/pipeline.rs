//! Idle-aware compression pipeline.
//!
//! 1. Probe the input and reject files without a video stream.
//! 2. Extract the audio track (if any) to a WAV in a work directory.
//! 3. Decode RGB24 frames, compare each with its successor, degrade frames
//!    that sit in a long enough idle run, downscale every frame.
//! 4. Encode the frames together with the WAV and move the result into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use mirage_models::{CompressionReport, CompressionSettings};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::degrade::render_frame;
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameReader, FrameSink, FrameSource, FrameWriter, PIPE_PIX_FMT};
use crate::fs_utils::move_file;
use crate::idle::{FrameDecision, IdleTracker};
use crate::motion::MotionDetector;
use crate::probe::{probe_video, VideoInfo};
use crate::progress::{CompressionProgress, CompressionProgressCallback};

/// Frames between progress callbacks.
const PROGRESS_INTERVAL: u64 = 30;

/// Compress `input` into `output` with the given settings.
pub async fn compress_video(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    settings: &CompressionSettings,
) -> MediaResult<CompressionReport> {
    Compressor::new(settings.clone()).run(input, output).await
}

/// Cancels a running [`Compressor`].
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    fn new() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Cancels a job whose future is dropped mid-run.
struct CancelOnDrop<'a> {
    handle: &'a CancelHandle,
    armed: bool,
}

impl<'a> CancelOnDrop<'a> {
    fn new(handle: &'a CancelHandle) -> Self {
        Self {
            handle,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Compression abandoned before completion, cancelling");
            self.handle.cancel();
        }
    }
}

/// Configurable compression job runner.
pub struct Compressor {
    settings: CompressionSettings,
    timeout_secs: Option<u64>,
    progress: Option<Arc<CompressionProgressCallback>>,
    cancel: CancelHandle,
}

impl Compressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            settings,
            timeout_secs: None,
            progress: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Abort the whole job after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Receive frame-level progress updates.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(CompressionProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Handle that aborts the running job.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Run the pipeline.
    ///
    /// Dropping the returned future before it completes cancels the job, so
    /// the decoder and encoder do not outlive the caller.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> MediaResult<CompressionReport> {
        let guard = CancelOnDrop::new(&self.cancel);
        let result = self.run_job(input.as_ref(), output.as_ref()).await;
        guard.disarm();
        result
    }

    async fn run_job(&self, input: &Path, output: &Path) -> MediaResult<CompressionReport> {
        let started = Instant::now();
        let deadline = self
            .timeout_secs
            .map(|secs| started + Duration::from_secs(secs));

        self.settings
            .validate()
            .map_err(MediaError::InvalidSettings)?;
        if self.cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let info = probe_video(input).await?;
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::invalid_video("Video stream has no dimensions"));
        }

        let out_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(out_dir).await?;

        // Same filesystem as the destination, so the final move is a rename.
        let work = tempfile::Builder::new()
            .prefix(".mirage-work-")
            .tempdir_in(out_dir)?;

        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();
        let encoded = work.path().join(format!("encoded.{}", extension));

        let audio = if info.has_audio {
            let wav = work.path().join("audio.wav");
            match self.extract_audio(input, &wav, remaining(deadline)?).await {
                Ok(()) => Some(wav),
                Err(MediaError::Timeout(_)) => {
                    return Err(MediaError::Timeout(self.timeout_secs.unwrap_or_default()))
                }
                Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
                Err(e) => {
                    warn!(input = %input.display(), "Audio extraction failed, output will be silent: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            input = %input.display(),
            output = %output.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            has_audio = audio.is_some(),
            "Starting compression"
        );

        let job = TranscodeJob {
            input: input.to_path_buf(),
            audio,
            encoded: encoded.clone(),
            info: info.clone(),
            settings: self.settings.clone(),
            cancel: self.cancel.subscribe(),
            progress: self.progress.clone(),
        };

        let mut handle = tokio::task::spawn_blocking(move || job.run());

        let joined = match remaining(deadline)? {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.cancel.cancel();
                    let _ = handle.await;
                    let secs = self.timeout_secs.unwrap_or_default();
                    warn!("Compression timed out after {} seconds", secs);
                    return Err(MediaError::Timeout(secs));
                }
            },
            None => handle.await,
        };

        let mut report =
            joined.map_err(|e| MediaError::internal(format!("Transcode task failed: {}", e)))??;

        move_file(&encoded, output).await?;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            output = %output.display(),
            frames = report.frames_total,
            idle = report.frames_idle,
            degraded = report.frames_degraded,
            elapsed_ms = report.elapsed_ms,
            "Compression finished"
        );

        Ok(report)
    }

    async fn extract_audio(
        &self,
        input: &Path,
        wav: &Path,
        limit: Option<Duration>,
    ) -> MediaResult<()> {
        let cmd = audio_command(input, wav, &self.settings);

        let mut runner = FfmpegRunner::new().with_cancel(self.cancel.subscribe());
        if let Some(limit) = limit {
            runner = runner.with_timeout(limit.as_secs().max(1));
        }
        runner.run(&cmd).await
    }
}

/// Time left before the deadline. An expired deadline is a timeout.
fn remaining(deadline: Option<Instant>) -> MediaResult<Option<Duration>> {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                Err(MediaError::Timeout(0))
            } else {
                Ok(Some(deadline - now))
            }
        }
        None => Ok(None),
    }
}

/// Command extracting the audio track as PCM WAV.
fn audio_command(input: &Path, wav: &Path, settings: &CompressionSettings) -> FfmpegCommand {
    FfmpegCommand::new(input, wav)
        .map("0:a:0")
        .no_video()
        .audio_codec("pcm_s16le")
        .audio_format(settings.audio_sample_rate, settings.audio_channels)
}

/// Command encoding piped frames (and optional audio) into `output`.
fn encoder_command(
    output: &Path,
    audio: Option<&Path>,
    width: u32,
    height: u32,
    fps: f64,
    settings: &CompressionSettings,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::with_output(output.to_string_lossy())
        .add_rawvideo_input(PIPE_PIX_FMT, width, height, fps)
        .progress(false)
        .map("0:v:0")
        .output_args(settings.video_args());

    if let Some(audio) = audio {
        cmd = cmd
            .add_input(audio)
            .map("1:a:0")
            .output_args(settings.audio_args())
            .output_arg("-shortest");
    }

    let faststart = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "mp4" | "mov"))
        .unwrap_or(false);
    if faststart {
        cmd = cmd.output_arg("-movflags").output_arg("+faststart");
    }

    cmd
}

/// State moved onto the blocking thread.
struct TranscodeJob {
    input: PathBuf,
    audio: Option<PathBuf>,
    encoded: PathBuf,
    info: VideoInfo,
    settings: CompressionSettings,
    cancel: watch::Receiver<bool>,
    progress: Option<Arc<CompressionProgressCallback>>,
}

impl TranscodeJob {
    fn run(self) -> MediaResult<CompressionReport> {
        let (width, height) = (self.info.width, self.info.height);
        let (out_width, out_height) = self.settings.output_dimensions(width, height);

        let mut reader = FrameReader::spawn(&self.input, width, height)?;

        let encoder = encoder_command(
            &self.encoded,
            self.audio.as_deref(),
            out_width,
            out_height,
            self.info.fps,
            &self.settings,
        );
        let mut writer = match FrameWriter::spawn(&encoder, out_width, out_height) {
            Ok(writer) => writer,
            Err(e) => {
                reader.kill();
                return Err(e);
            }
        };

        let frame_loop = FrameLoop {
            settings: &self.settings,
            out_width,
            out_height,
            frames_expected: self.info.estimated_frames(),
            cancel: &self.cancel,
            progress: self.progress.as_deref(),
        };

        match frame_loop.run(&mut reader, &mut writer) {
            Ok(report) => {
                debug!(
                    frames = report.frames_total,
                    decoded = reader.frames_read(),
                    encoded = writer.frames_written(),
                    "Transcode loop finished"
                );
                reader.finish()?;
                writer.finish()?;
                Ok(report)
            }
            Err(e) => {
                reader.kill();
                writer.kill();
                Err(e)
            }
        }
    }
}

/// Motion analysis, idle tracking and rendering over a stream of frames.
struct FrameLoop<'a> {
    settings: &'a CompressionSettings,
    out_width: u32,
    out_height: u32,
    frames_expected: u64,
    cancel: &'a watch::Receiver<bool>,
    progress: Option<&'a CompressionProgressCallback>,
}

impl FrameLoop<'_> {
    /// Each frame is compared with its successor; the final frame keeps the
    /// decision of the pair before it.
    fn run<S, K>(&self, source: &mut S, sink: &mut K) -> MediaResult<CompressionReport>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let detector = MotionDetector::from_settings(self.settings);
        let mut tracker = IdleTracker::new(self.settings.idle_criteria);
        let mut report = CompressionReport::default();

        let mut current = source
            .next_frame()?
            .ok_or_else(|| MediaError::invalid_video("No frames could be decoded"))?;
        let mut current_gray = current.to_gray();
        let mut decision = FrameDecision::active();

        loop {
            if *self.cancel.borrow() {
                return Err(MediaError::Cancelled);
            }

            let next = source.next_frame()?;
            let next_gray = next.as_ref().map(|f| f.to_gray());

            if let Some(next_gray) = &next_gray {
                let motion = detector.analyze(&current_gray, next_gray);
                decision = tracker.observe(motion.has_motion);
            }

            let rendered = render_frame(&current, decision.scale, self.out_width, self.out_height)?;
            sink.push_frame(&rendered)?;

            report.frames_total += 1;
            if decision.idle {
                report.frames_idle += 1;
            }
            if decision.scale.is_some() {
                report.frames_degraded += 1;
            }

            if let Some(progress) = self.progress {
                if report.frames_total % PROGRESS_INTERVAL == 0 {
                    progress(CompressionProgress {
                        frames_done: report.frames_total,
                        frames_expected: self.frames_expected,
                        frames_idle: report.frames_idle,
                    });
                }
            }

            match (next, next_gray) {
                (Some(frame), Some(gray)) => {
                    current = frame;
                    current_gray = gray;
                }
                _ => break,
            }
        }

        if let Some(progress) = self.progress {
            progress(CompressionProgress {
                frames_done: report.frames_total,
                frames_expected: self.frames_expected.max(report.frames_total),
                frames_idle: report.frames_idle,
            });
        }

        Ok(report)
    }
}
