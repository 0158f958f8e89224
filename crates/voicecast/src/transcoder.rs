//! Audio transcoding to the Ogg/Opus stream the voice transport accepts.
//!
//! ffmpeg runs as a child process: the input buffer is written to its stdin
//! from a separate task, stdout is streamed lazily, and the exit status is
//! checked once stdout hits EOF. Dropping the stream kills the process.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use sortconf::VoiceConfig;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

use crate::error::{Result, VoiceError};

/// Lazily produced Ogg/Opus bytes.
pub struct OpusStream {
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl OpusStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Wait for the first chunk so a broken input fails before playback.
    pub async fn primed(mut self, timeout: Duration) -> Result<OpusStream> {
        let first = tokio::time::timeout(timeout, self.inner.next())
            .await
            .map_err(|_| {
                VoiceError::TranscodeError(format!("no output within {:?}", timeout))
            })?;

        match first {
            Some(Ok(chunk)) => Ok(OpusStream::new(
                stream::once(async move { Ok(chunk) }).chain(self.inner),
            )),
            Some(Err(e)) => Err(VoiceError::TranscodeError(e.to_string())),
            None => Err(VoiceError::TranscodeError(
                "transcoder produced no output".to_string(),
            )),
        }
    }

    /// Adapt into an `AsyncRead` for consumers that want a reader.
    pub fn into_reader(self) -> impl tokio::io::AsyncRead + Send + Unpin {
        StreamReader::new(self)
    }
}

impl Stream for OpusStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for OpusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusStream").finish_non_exhaustive()
    }
}

/// Turns arbitrary audio bytes into a primed Opus stream.
#[async_trait]
pub trait Transcode: Send + Sync {
    async fn transcode(&self, input: Bytes) -> Result<OpusStream>;
}

/// ffmpeg-backed transcoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    bitrate_kbps: u32,
    sample_rate: u32,
    channels: u16,
    first_output_timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            bitrate_kbps: config.bitrate_kbps,
            sample_rate: config.sample_rate,
            channels: config.channels,
            first_output_timeout: config.first_output_timeout(),
        }
    }

    pub fn with_first_output_timeout(mut self, timeout: Duration) -> Self {
        self.first_output_timeout = timeout;
        self
    }

    /// Command line: no duration pre-scan, drop video, resample, Opus in Ogg on stdout.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-analyzeduration".into(),
            "0".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            "pipe:0".into(),
            "-vn".into(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-ac".into(),
            self.channels.to_string(),
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            format!("{}k", self.bitrate_kbps),
            "-vbr".into(),
            "on".into(),
            "-f".into(),
            "ogg".into(),
            "pipe:1".into(),
        ]
    }

    fn spawn(&self, input: Bytes) -> Result<OpusStream> {
        let mut child = Command::new(&self.ffmpeg)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VoiceError::TranscodeError(format!(
                    "failed to start {}: {}",
                    self.ffmpeg.display(),
                    e
                ))
            })?;

        let missing = |pipe: &str| VoiceError::TranscodeError(format!("ffmpeg {} not captured", pipe));
        let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let input_len = input.len();
        tokio::spawn(async move {
            // ffmpeg may stop reading early on bad input; that shows up as a
            // non-zero exit, not here.
            match stdin.write_all(&input).await {
                Ok(()) => debug!("wrote {} bytes to ffmpeg", input_len),
                Err(e) => debug!("ffmpeg stdin closed early: {}", e),
            }
        });

        let (exit_tx, exit_rx) = oneshot::channel::<io::Result<(ExitStatus, String)>>();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut diagnostics = String::new();
            let finished = tokio::select! {
                status = async {
                    let _ = stderr.read_to_string(&mut diagnostics).await;
                    child.wait().await
                } => Some(status),
                _ = cancel_rx => None,
            };

            match finished {
                Some(status) => {
                    let _ = exit_tx.send(status.map(|s| (s, diagnostics)));
                }
                None => {
                    debug!("ffmpeg output abandoned, killing process");
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill ffmpeg: {}", e);
                    }
                }
            }
        });

        Ok(OpusStream::new(ffmpeg_output(stdout, exit_rx, cancel_tx)))
    }
}

struct Running {
    stdout: ReaderStream<ChildStdout>,
    exit: oneshot::Receiver<io::Result<(ExitStatus, String)>>,
    /// Dropped with the stream; tells the waiter to kill ffmpeg.
    _cancel: oneshot::Sender<()>,
}

fn ffmpeg_output(
    stdout: ChildStdout,
    exit: oneshot::Receiver<io::Result<(ExitStatus, String)>>,
    cancel: oneshot::Sender<()>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let running = Running {
        stdout: ReaderStream::new(stdout),
        exit,
        _cancel: cancel,
    };

    stream::unfold(Some(running), |state| async move {
        let mut running = state?;
        match running.stdout.next().await {
            Some(Ok(chunk)) => Some((Ok(chunk), Some(running))),
            Some(Err(e)) => Some((Err(e), None)),
            None => match (&mut running.exit).await {
                Ok(Ok((status, _))) if status.success() => None,
                Ok(Ok((status, diagnostics))) => Some((
                    Err(io::Error::other(format!(
                        "ffmpeg exited with {}: {}",
                        status,
                        diagnostics.trim()
                    ))),
                    None,
                )),
                Ok(Err(e)) => Some((Err(e), None)),
                Err(_) => Some((Err(io::Error::other("ffmpeg waiter went away")), None)),
            },
        }
    })
}

#[async_trait]
impl Transcode for FfmpegTranscoder {
    async fn transcode(&self, input: Bytes) -> Result<OpusStream> {
        self.spawn(input)?.primed(self.first_output_timeout).await
    }
}
