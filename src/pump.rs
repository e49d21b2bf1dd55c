//! Background task driving one read call.

use crate::error::StreamError;
use crate::message::{decode, StreamMessage};
use crate::transport::{CallOptions, ConnectionResolver, ReadReq};
use crate::types::ReadState;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub(crate) type RelayItem = Result<StreamMessage, StreamError>;
pub(crate) type ReadStateCell = Option<Result<ReadState, StreamError>>;

/// Drives a single read call end to end.
///
/// Every response is decoded and written into the relay, whose capacity of
/// one is what keeps the pump from reading ahead of the consumer. The call
/// is owned by [`Pump::pump`] and released on every exit path.
pub(crate) struct Pump {
    pub(crate) resolver: Arc<dyn ConnectionResolver>,
    pub(crate) request: ReadReq,
    pub(crate) options: CallOptions,
    pub(crate) cancel: CancellationToken,
    pub(crate) relay: mpsc::Sender<RelayItem>,
    /// Set for single-stream reads only.
    pub(crate) read_state: Option<watch::Sender<ReadStateCell>>,
}

impl Pump {
    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let stream = self.request.stream_name().unwrap_or("$all").to_string();

        match self.pump().await {
            Ok(()) => debug!(%stream, "read completed"),
            Err(err) => {
                self.resolve_state(Err(err.clone()));

                if self.cancel.is_cancelled() || self.relay.is_closed() {
                    // the consumer observes cancellation on its own
                    debug!(%stream, error = %err, "read cancelled");
                    return;
                }

                warn!(%stream, error = %err, "read failed");
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = self.relay.send(Err(err)) => {}
                }
            }
        }
    }

    async fn pump(&self) -> Result<(), StreamError> {
        debug!(stream = ?self.request.stream_name(), "resolving connection");

        let channel = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            channel = self.resolver.resolve(&self.cancel) => channel?,
        };

        let mut call = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            call = channel.read(self.request.clone(), self.options.clone()) => call?,
        };

        let mut first = true;
        loop {
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                response = call.next() => response,
            };

            let Some(response) = response else {
                break;
            };

            let message = decode(response?)?;
            if first {
                first = false;
                self.on_first_message(Some(&message)).await?;
            }

            trace!(?message, "relaying message");
            self.forward(Ok(message)).await?;
        }

        if first {
            self.on_first_message(None).await?;
        }

        Ok(())
    }

    /// Resolve the read state and emit the `Ok` sentinel for stream reads.
    async fn on_first_message(&self, message: Option<&StreamMessage>) -> Result<(), StreamError> {
        if self.read_state.is_none() {
            return Ok(());
        }

        if let Some(StreamMessage::NotFound) = message {
            self.resolve_state(Ok(ReadState::StreamNotFound));
            return Ok(());
        }

        self.resolve_state(Ok(ReadState::Ok));
        self.forward(Ok(StreamMessage::Ok)).await
    }

    fn resolve_state(&self, state: Result<ReadState, StreamError>) {
        if let Some(tx) = &self.read_state {
            tx.send_if_modified(|current| {
                if current.is_some() {
                    return false;
                }
                *current = Some(state);
                true
            });
        }
    }

    async fn forward(&self, item: RelayItem) -> Result<(), StreamError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            // a closed relay means the consumer went away
            sent = self.relay.send(item) => sent.map_err(|_| StreamError::Cancelled),
        }
    }
}
