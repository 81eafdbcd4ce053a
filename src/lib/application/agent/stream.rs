use super::chunk::{ProgressChunk, RunTranscript};
use super::errors::AgentError;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The single consumer end of a run. Dropping it cancels the run.
pub struct ChunkStream {
    receiver: mpsc::Receiver<ProgressChunk>,
    cancel: CancellationToken,
}

impl ChunkStream {
    pub(crate) fn channel(capacity: usize) -> (Emitter, ChunkStream) {
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let emitter = Emitter {
            sender,
            cancel: cancel.clone(),
        };
        (emitter, ChunkStream { receiver, cancel })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains the run and folds it into a transcript.
    pub async fn into_transcript(mut self) -> RunTranscript {
        let mut transcript = RunTranscript::default();
        while let Some(chunk) = self.receiver.recv().await {
            transcript.push(&chunk);
        }
        transcript
    }
}

impl Stream for ChunkStream {
    type Item = ProgressChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Producer side. Every await it performs yields to cancellation first.
pub(crate) struct Emitter {
    sender: mpsc::Sender<ProgressChunk>,
    cancel: CancellationToken,
}

impl Emitter {
    pub(crate) async fn emit(&self, chunk: ProgressChunk) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.sender.send(chunk) => sent.map_err(|_| AgentError::Cancelled),
        }
    }

    /// Runs `future` unless the run is cancelled first; a cancelled
    /// future is dropped and its output never observed.
    pub(crate) async fn guard<F: Future>(&self, future: F) -> Result<F::Output, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            output = future => Ok(output),
        }
    }
}
