//! Wire messages and the transport seam.
//!
//! The RPC transport, credential attachment and node discovery live outside
//! this crate. They are reached through [`ConnectionResolver`] and
//! [`StreamsChannel`]; everything the read pipeline sends or receives is one
//! of the wire types below.

use crate::error::StreamError;
use crate::types::UserCredentials;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Control option compatibility level sent with every read.
pub const CONTROL_COMPATIBILITY: u32 = 1;

/// Resolves the channel a call should be issued on.
///
/// Implementations may retry or rediscover nodes internally; the read
/// pipeline calls `resolve` once per read and never retries it.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn StreamsChannel>, StreamError>;
}

#[async_trait]
impl<T> ConnectionResolver for Arc<T>
where
    T: ConnectionResolver + ?Sized,
{
    async fn resolve(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn StreamsChannel>, StreamError> {
        (**self).resolve(cancel).await
    }
}

/// A live channel able to open server-streaming read calls.
#[async_trait]
pub trait StreamsChannel: Send + Sync {
    async fn read(&self, request: ReadReq, options: CallOptions) -> Result<ReadCall, StreamError>;
}

/// Per-call options, forwarded to the transport as-is.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    pub deadline: Option<Duration>,
    pub credentials: Option<UserCredentials>,
    pub requires_leader: bool,
}

type DisposeHook = Box<dyn FnOnce() + Send>;

/// An in-flight read call.
///
/// Yields raw responses in arrival order. Dropping the call runs its dispose
/// hook exactly once, which aborts the call on the server side.
pub struct ReadCall {
    responses: BoxStream<'static, Result<ReadResp, StreamError>>,
    on_dispose: Option<DisposeHook>,
}

impl ReadCall {
    pub fn new<S>(responses: S) -> Self
    where
        S: Stream<Item = Result<ReadResp, StreamError>> + Send + 'static,
    {
        Self {
            responses: responses.boxed(),
            on_dispose: None,
        }
    }

    /// Set the hook run when the call is released.
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_dispose = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for ReadCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCall")
            .field("has_dispose_hook", &self.on_dispose.is_some())
            .finish()
    }
}

impl Stream for ReadCall {
    type Item = Result<ReadResp, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.responses.poll_next_unpin(cx)
    }
}

impl Drop for ReadCall {
    fn drop(&mut self) {
        if let Some(hook) = self.on_dispose.take() {
            hook();
        }
    }
}

/// A read request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadReq {
    pub options: ReadOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    pub read_direction: ReadDirection,
    pub resolve_links: bool,
    pub stream_option: StreamOption,
    pub count_option: CountOption,
    pub filter_option: FilterOption,
    pub uuid_option: UuidOption,
    pub control_option: ControlOption,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadDirection {
    Forwards,
    Backwards,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOption {
    Stream(StreamOptions),
    All(AllOptions),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    pub stream_identifier: String,
    pub revision_option: RevisionOption,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionOption {
    Start,
    End,
    Revision(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllOptions {
    pub all_option: AllOption,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllOption {
    Start,
    End,
    Position {
        commit_position: u64,
        prepare_position: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountOption {
    Count(u64),
    Subscription,
}

/// Filter selector. `NoFilter` must be sent explicitly for unfiltered reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterOption {
    NoFilter,
    Filter(FilterOptions),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterOptions {
    pub filter: FilterKind,
    pub window: FilterWindow,
    pub checkpoint_interval_multiplier: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterKind {
    StreamIdentifier(Expression),
    EventType(Expression),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expression {
    pub regex: String,
    pub prefix: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterWindow {
    Max(u32),
    Count,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UuidOption {
    Structured,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlOption {
    pub compatibility: u32,
}

impl ReadReq {
    /// Check the request is well formed before it is sent.
    pub fn validate(&self) -> Result<(), StreamError> {
        let options = &self.options;

        if let CountOption::Count(0) = options.count_option {
            return Err(StreamError::invalid_argument(
                "max count must be greater than 0",
            ));
        }

        match (&options.stream_option, &options.filter_option) {
            (StreamOption::Stream(stream), FilterOption::NoFilter) => {
                if stream.stream_identifier.is_empty() {
                    return Err(StreamError::invalid_argument(
                        "stream name must not be empty",
                    ));
                }
            }
            (StreamOption::Stream(_), FilterOption::Filter(_)) => {
                return Err(StreamError::invalid_argument(
                    "filters only apply to $all reads",
                ));
            }
            (StreamOption::All(_), FilterOption::Filter(filter)) => {
                let expression = match &filter.filter {
                    FilterKind::StreamIdentifier(e) | FilterKind::EventType(e) => e,
                };
                // exactly one of regex or prefixes
                if expression.regex.is_empty() == expression.prefix.is_empty() {
                    return Err(StreamError::invalid_argument(
                        "filter needs either a regex or prefixes, not both",
                    ));
                }
                if filter.checkpoint_interval_multiplier == 0 {
                    return Err(StreamError::invalid_argument(
                        "checkpoint interval multiplier must be greater than 0",
                    ));
                }
            }
            (StreamOption::All(_), FilterOption::NoFilter) => {}
        }

        Ok(())
    }

    /// Name of the stream being read, `None` for `$all` reads.
    pub fn stream_name(&self) -> Option<&str> {
        match &self.options.stream_option {
            StreamOption::Stream(stream) => Some(stream.stream_identifier.as_str()),
            StreamOption::All(_) => None,
        }
    }
}

/// A single response on a read call.
///
/// `content` is `None` when the server sent a case this client does not know.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadResp {
    pub content: Option<ReadContent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadContent {
    Event(ReadEvent),
    Confirmation(SubscriptionConfirmation),
    Checkpoint(Checkpoint),
    StreamNotFound(StreamNotFound),
    FirstStreamPosition(u64),
    LastStreamPosition(u64),
    LastAllStreamPosition(AllStreamPosition),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadEvent {
    pub event: Option<RecordedEvent>,
    pub link: Option<RecordedEvent>,
    /// Present for `$all` reads only.
    pub commit_position: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordedEvent {
    pub id: Option<WireUuid>,
    pub stream_identifier: String,
    pub stream_revision: u64,
    pub prepare_position: u64,
    pub commit_position: u64,
    pub metadata: HashMap<String, String>,
    pub custom_metadata: Bytes,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireUuid {
    Structured {
        most_significant_bits: i64,
        least_significant_bits: i64,
    },
    String(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionConfirmation {
    pub subscription_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub commit_position: u64,
    pub prepare_position: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamNotFound {
    pub stream_identifier: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllStreamPosition {
    pub commit_position: u64,
    pub prepare_position: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stream_request(name: &str, count: u64) -> ReadReq {
        ReadReq {
            options: ReadOptions {
                read_direction: ReadDirection::Forwards,
                resolve_links: false,
                stream_option: StreamOption::Stream(StreamOptions {
                    stream_identifier: name.to_string(),
                    revision_option: RevisionOption::Start,
                }),
                count_option: CountOption::Count(count),
                filter_option: FilterOption::NoFilter,
                uuid_option: UuidOption::Structured,
                control_option: ControlOption {
                    compatibility: CONTROL_COMPATIBILITY,
                },
            },
        }
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let err = stream_request("orders", 0).validate().unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_rejects_empty_stream_name() {
        assert!(stream_request("", 1).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_filter_on_stream_read() {
        let mut request = stream_request("orders", 1);
        request.options.filter_option = FilterOption::Filter(FilterOptions {
            filter: FilterKind::EventType(Expression {
                regex: "^a".into(),
                prefix: vec![],
            }),
            window: FilterWindow::Count,
            checkpoint_interval_multiplier: 1,
        });
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_expression_with_both_regex_and_prefix() {
        let mut request = stream_request("orders", 1);
        request.options.stream_option = StreamOption::All(AllOptions {
            all_option: AllOption::Start,
        });
        request.options.filter_option = FilterOption::Filter(FilterOptions {
            filter: FilterKind::StreamIdentifier(Expression {
                regex: "^a".into(),
                prefix: vec!["a".into()],
            }),
            window: FilterWindow::Max(32),
            checkpoint_interval_multiplier: 1,
        });
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn test_read_call_runs_dispose_hook_once_on_drop() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = disposed.clone();

        let mut call = ReadCall::new(futures::stream::iter(vec![Ok(ReadResp::default())]))
            .on_dispose(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert!(call.next().await.is_some());
        assert!(call.next().await.is_none());
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        drop(call);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
