use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decode::FrameDecoder;

const CHANNEL_CAPACITY: usize = 64;

/// How a delta stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Cancelled,
    Failed(String),
}

enum Frame {
    Delta(String),
    End(StreamEnd),
}

/// Ordered, finite stream of text fragments from one backend response.
///
/// Once the token is cancelled the stream yields nothing more, whatever the
/// producer still has buffered. Dropping the stream cancels it.
pub struct DeltaStream {
    rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    end: Arc<Mutex<Option<StreamEnd>>>,
    yielded: usize,
}

impl DeltaStream {
    /// Spawns a producer that drives `body` through `decoder`. `cancel` is
    /// usually a child of the request token.
    pub fn spawn<S, E, D>(body: S, decoder: D, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        D: FrameDecoder + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(produce(Box::pin(body), decoder, tx, cancel.clone()));
        Self {
            rx,
            cancel,
            end: Arc::new(Mutex::new(None)),
            yielded: 0,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `None` while the stream is still live.
    pub fn outcome(&self) -> Option<StreamEnd> {
        self.end.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Drains the stream and joins the fragments.
    pub async fn collect_text(mut self) -> (String, StreamEnd) {
        let mut text = String::new();
        while let Some(delta) = self.next().await {
            text.push_str(&delta);
        }
        let end = self.outcome().unwrap_or(StreamEnd::Completed);
        (text, end)
    }

    fn finish(&mut self, end: StreamEnd) {
        let mut slot = self.end.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            debug!(outcome = ?end, deltas = self.yielded, "Delta stream ended");
            *slot = Some(end);
        }
        drop(slot);
        self.rx.close();
    }
}

impl Stream for DeltaStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if self.outcome().is_some() {
            return Poll::Ready(None);
        }
        if self.cancel.is_cancelled() {
            self.finish(StreamEnd::Cancelled);
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Frame::Delta(text))) => {
                self.yielded += 1;
                Poll::Ready(Some(text))
            }
            Poll::Ready(Some(Frame::End(end))) => {
                self.finish(end);
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                let end = if self.cancel.is_cancelled() {
                    StreamEnd::Cancelled
                } else {
                    StreamEnd::Completed
                };
                self.finish(end);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream")
            .field("yielded", &self.yielded)
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl Drop for DeltaStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn produce<E, D>(
    mut body: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, E>> + Send>>,
    mut decoder: D,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) where
    E: std::fmt::Display,
    D: FrameDecoder,
{
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.try_send(Frame::End(StreamEnd::Cancelled));
                return;
            }
            chunk = body.next() => chunk,
        };

        let decoded = match chunk {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(e)) => {
                warn!(error = %e, "Stream transport failed");
                emit(&tx, &cancel, Frame::End(StreamEnd::Failed(e.to_string()))).await;
                return;
            }
            None => decoder.finish(),
        };

        for delta in decoded.deltas {
            if !emit(&tx, &cancel, Frame::Delta(delta)).await {
                return;
            }
        }
        if decoded.done {
            emit(&tx, &cancel, Frame::End(StreamEnd::Completed)).await;
            return;
        }
    }
}

/// False once the consumer is gone or the stream was cancelled.
async fn emit(tx: &mpsc::Sender<Frame>, cancel: &CancellationToken, frame: Frame) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(frame) => sent.is_ok(),
    }
}
