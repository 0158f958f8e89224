//! Feed an [`OpusStream`] to songbird as a live Ogg input.

use async_trait::async_trait;
use songbird::input::{AsyncAdapterStream, AsyncMediaSource, AudioStream, AudioStreamError, Input, LiveInput};
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use symphonia_core::io::MediaSource;
use symphonia_core::probe::Hint;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::transcoder::OpusStream;

/// Bytes buffered between the async reader and songbird's decoder thread.
const ADAPTER_BUFFER: usize = 64 * 1024;

/// Forward-only async source. The mutex only makes the reader `Sync`;
/// reads go through `get_mut`.
struct OpusSource<R>(Mutex<R>);

impl<R: AsyncRead + Unpin> AsyncRead for OpusSource<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let reader = self
            .get_mut()
            .0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        Pin::new(reader).poll_read(cx, buf)
    }
}

impl<R> AsyncSeek for OpusSource<R> {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "opus stream is not seekable"))
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(0))
    }
}

#[async_trait]
impl<R: AsyncRead + Send + Unpin + 'static> AsyncMediaSource for OpusSource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    async fn byte_len(&self) -> Option<u64> {
        None
    }

    async fn try_resume(&mut self, _offset: u64) -> Result<Box<dyn AsyncMediaSource>, AudioStreamError> {
        Err(AudioStreamError::Unsupported)
    }
}

/// Wrap a transcoded stream as a songbird input.
///
/// Must be called from within a tokio runtime; the adapter spawns the task
/// that pumps the stream.
pub fn opus_input(stream: OpusStream) -> Input {
    let source = OpusSource(Mutex::new(stream.into_reader()));
    let adapter: Box<dyn MediaSource> =
        Box::new(AsyncAdapterStream::new(Box::new(source), ADAPTER_BUFFER));

    let mut hint = Hint::new();
    hint.with_extension("ogg").mime_type("audio/ogg");

    Input::Live(
        LiveInput::Raw(AudioStream {
            input: adapter,
            hint: Some(hint),
        }),
        None,
    )
}
