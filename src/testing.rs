//! Scripted transport for unit tests.

use crate::error::StreamError;
use crate::transport::{
    AllStreamPosition, CallOptions, Checkpoint, ConnectionResolver, ReadCall, ReadContent,
    ReadEvent, ReadReq, ReadResp, RecordedEvent, StreamNotFound, StreamsChannel, WireUuid,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) type Script = mpsc::UnboundedSender<Result<ReadResp, StreamError>>;

/// A channel serving one read from a script the test feeds.
pub(crate) struct ScriptedChannel {
    responses: Mutex<Option<mpsc::UnboundedReceiver<Result<ReadResp, StreamError>>>>,
    pub(crate) requests: Mutex<Vec<(ReadReq, CallOptions)>>,
    pub(crate) pulled: Arc<AtomicUsize>,
    pub(crate) disposed: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> (Arc<Self>, Script) {
        let (tx, rx) = mpsc::unbounded();
        let channel = Arc::new(Self {
            responses: Mutex::new(Some(rx)),
            requests: Mutex::new(Vec::new()),
            pulled: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicUsize::new(0)),
        });
        (channel, tx)
    }

    pub(crate) fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub(crate) fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<(ReadReq, CallOptions)> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl StreamsChannel for ScriptedChannel {
    async fn read(&self, request: ReadReq, options: CallOptions) -> Result<ReadCall, StreamError> {
        self.requests.lock().push((request, options));

        let responses = self.responses.lock().take().ok_or(StreamError::ServerError {
            code: crate::error::StatusCode::Internal,
            message: "script already consumed".to_string(),
        })?;

        let pulled = self.pulled.clone();
        let disposed = self.disposed.clone();
        Ok(ReadCall::new(responses.inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        }))
        .on_dispose(move || {
            disposed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Resolver handing out one scripted channel, or failing.
pub(crate) struct TestResolver {
    channel: Arc<ScriptedChannel>,
    failure: Option<StreamError>,
    pub(crate) resolves: Arc<AtomicUsize>,
}

impl TestResolver {
    pub(crate) fn new(channel: Arc<ScriptedChannel>) -> Self {
        Self {
            channel,
            failure: None,
            resolves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing(channel: Arc<ScriptedChannel>, failure: StreamError) -> Self {
        Self {
            channel,
            failure: Some(failure),
            resolves: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ConnectionResolver for TestResolver {
    async fn resolve(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn StreamsChannel>, StreamError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.channel.clone() as Arc<dyn StreamsChannel>),
        }
    }
}

/// Send every response then close the script.
pub(crate) fn play(script: Script, responses: Vec<ReadResp>) {
    for response in responses {
        let _ = script.unbounded_send(Ok(response));
    }
}

pub(crate) fn event(stream: &str, revision: u64) -> ReadResp {
    event_at(stream, revision, None)
}

pub(crate) fn event_at(stream: &str, revision: u64, commit_position: Option<u64>) -> ReadResp {
    let mut metadata = HashMap::new();
    metadata.insert("type".to_string(), "test-event".to_string());
    metadata.insert("content-type".to_string(), "application/json".to_string());

    ReadResp {
        content: Some(ReadContent::Event(ReadEvent {
            event: Some(RecordedEvent {
                id: Some(WireUuid::Structured {
                    most_significant_bits: revision as i64,
                    least_significant_bits: 1,
                }),
                stream_identifier: stream.to_string(),
                stream_revision: revision,
                prepare_position: revision * 10,
                commit_position: revision * 10,
                metadata,
                custom_metadata: Bytes::new(),
                data: Bytes::from_static(b"{}"),
            }),
            link: None,
            commit_position,
        })),
    }
}

pub(crate) fn not_found(stream: &str) -> ReadResp {
    ReadResp {
        content: Some(ReadContent::StreamNotFound(StreamNotFound {
            stream_identifier: stream.to_string(),
        })),
    }
}

pub(crate) fn first_position(revision: u64) -> ReadResp {
    ReadResp {
        content: Some(ReadContent::FirstStreamPosition(revision)),
    }
}

pub(crate) fn last_position(revision: u64) -> ReadResp {
    ReadResp {
        content: Some(ReadContent::LastStreamPosition(revision)),
    }
}

pub(crate) fn last_all_position(commit: u64, prepare: u64) -> ReadResp {
    ReadResp {
        content: Some(ReadContent::LastAllStreamPosition(AllStreamPosition {
            commit_position: commit,
            prepare_position: prepare,
        })),
    }
}

pub(crate) fn checkpoint(commit: u64, prepare: u64) -> ReadResp {
    ReadResp {
        content: Some(ReadContent::Checkpoint(Checkpoint {
            commit_position: commit,
            prepare_position: prepare,
        })),
    }
}

/// Wait for `condition`, giving the pump time to run.
pub(crate) async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
