//! Read builders and result handles.

use crate::client::Client;
use crate::error::StreamError;
use crate::event::ResolvedEvent;
use crate::filter::{FilterExpression, FilterTarget, SubscriptionFilter};
use crate::message::StreamMessage;
use crate::pump::{Pump, ReadStateCell, RelayItem};
use crate::transport::{
    AllOption, AllOptions, CallOptions, ControlOption, CountOption, Expression, FilterKind,
    FilterOption, FilterOptions, FilterWindow, ReadDirection, ReadOptions, ReadReq,
    RevisionOption, StreamOption, StreamOptions, UuidOption, CONTROL_COMPATIBILITY,
};
use crate::types::{Direction, Position, ReadState, StreamPosition, UserCredentials};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Default upper bound on the number of events returned by a read.
pub const DEFAULT_MAX_COUNT: u64 = i64::MAX as u64;

/// Builder for configuring a single-stream read.
#[must_use = "builders do nothing unless you call .send()"]
pub struct ReadStreamBuilder {
    client: Client,
    stream_name: String,
    direction: Direction,
    from: StreamPosition,
    max_count: u64,
    resolve_links: bool,
    credentials: Option<UserCredentials>,
    deadline: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl ReadStreamBuilder {
    pub(crate) fn new(client: Client, stream_name: String) -> Self {
        Self {
            client,
            stream_name,
            direction: Direction::Forwards,
            from: StreamPosition::START,
            max_count: DEFAULT_MAX_COUNT,
            resolve_links: false,
            credentials: None,
            deadline: None,
            cancellation: None,
        }
    }

    /// Set the read direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn forwards(self) -> Self {
        self.direction(Direction::Forwards)
    }

    pub fn backwards(self) -> Self {
        self.direction(Direction::Backwards)
    }

    /// Set the revision to start reading from.
    pub fn from(mut self, revision: impl Into<StreamPosition>) -> Self {
        self.from = revision.into();
        self
    }

    /// Set the maximum number of events to read. Must be greater than zero.
    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    /// Follow link events to the events they point at.
    pub fn resolve_links(mut self, resolve: bool) -> Self {
        self.resolve_links = resolve;
        self
    }

    /// Credentials for this read, overriding the client default.
    pub fn credentials(mut self, credentials: UserCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Deadline for this read, overriding the client default.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Token that aborts the read when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the request without starting a read.
    pub fn request(&self) -> ReadReq {
        let revision_option = if self.from.is_start() {
            RevisionOption::Start
        } else if self.from.is_end() {
            RevisionOption::End
        } else {
            RevisionOption::Revision(self.from.value())
        };

        ReadReq {
            options: ReadOptions {
                read_direction: wire_direction(self.direction),
                resolve_links: self.resolve_links,
                stream_option: StreamOption::Stream(StreamOptions {
                    stream_identifier: self.stream_name.clone(),
                    revision_option,
                }),
                count_option: CountOption::Count(self.max_count),
                filter_option: FilterOption::NoFilter,
                uuid_option: UuidOption::Structured,
                control_option: ControlOption {
                    compatibility: CONTROL_COMPATIBILITY,
                },
            },
        }
    }

    /// Start the read.
    ///
    /// Returns as soon as the background read is spawned; nothing has been
    /// received yet. Invalid arguments fail here, before any connection is
    /// resolved. Must be called within a Tokio runtime.
    pub fn send(self) -> Result<ReadStreamResult, StreamError> {
        let request = self.request();
        request.validate()?;

        let options = self.client.call_options(self.credentials, self.deadline);
        let (state_tx, state_rx) = watch::channel(None);
        let shared = start_read(
            &self.client,
            request,
            options,
            self.cancellation,
            Some(state_tx),
        );

        Ok(ReadStreamResult {
            stream_name: self.stream_name,
            shared,
            read_state: state_rx,
        })
    }
}

impl fmt::Debug for ReadStreamBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStreamBuilder")
            .field("stream_name", &self.stream_name)
            .field("direction", &self.direction)
            .field("from", &self.from)
            .field("max_count", &self.max_count)
            .field("resolve_links", &self.resolve_links)
            .finish()
    }
}

/// Builder for configuring a read of `$all`.
#[must_use = "builders do nothing unless you call .send()"]
pub struct ReadAllBuilder {
    client: Client,
    direction: Direction,
    from: Position,
    max_count: u64,
    resolve_links: bool,
    filter: Option<SubscriptionFilter>,
    credentials: Option<UserCredentials>,
    deadline: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl ReadAllBuilder {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            direction: Direction::Forwards,
            from: Position::START,
            max_count: DEFAULT_MAX_COUNT,
            resolve_links: false,
            filter: None,
            credentials: None,
            deadline: None,
            cancellation: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn forwards(self) -> Self {
        self.direction(Direction::Forwards)
    }

    pub fn backwards(self) -> Self {
        self.direction(Direction::Backwards)
    }

    /// Set the position to start reading from.
    pub fn from(mut self, position: Position) -> Self {
        self.from = position;
        self
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn resolve_links(mut self, resolve: bool) -> Self {
        self.resolve_links = resolve;
        self
    }

    /// Only return events matching `filter`. The server sends checkpoints
    /// while it scans.
    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn credentials(mut self, credentials: UserCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the request without starting a read.
    pub fn request(&self) -> ReadReq {
        let all_option = if self.from.is_start() {
            AllOption::Start
        } else if self.from.is_end() {
            AllOption::End
        } else {
            AllOption::Position {
                commit_position: self.from.commit,
                prepare_position: self.from.prepare,
            }
        };

        let filter_option = match &self.filter {
            Some(filter) => FilterOption::Filter(wire_filter(filter)),
            None => FilterOption::NoFilter,
        };

        ReadReq {
            options: ReadOptions {
                read_direction: wire_direction(self.direction),
                resolve_links: self.resolve_links,
                stream_option: StreamOption::All(AllOptions { all_option }),
                count_option: CountOption::Count(self.max_count),
                filter_option,
                uuid_option: UuidOption::Structured,
                control_option: ControlOption {
                    compatibility: CONTROL_COMPATIBILITY,
                },
            },
        }
    }

    /// Start the read. See [`ReadStreamBuilder::send`].
    pub fn send(self) -> Result<ReadAllStreamResult, StreamError> {
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        let request = self.request();
        request.validate()?;

        let options = self.client.call_options(self.credentials, self.deadline);
        let shared = start_read(&self.client, request, options, self.cancellation, None);

        Ok(ReadAllStreamResult { shared })
    }
}

impl fmt::Debug for ReadAllBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAllBuilder")
            .field("direction", &self.direction)
            .field("from", &self.from)
            .field("max_count", &self.max_count)
            .field("resolve_links", &self.resolve_links)
            .field("filter", &self.filter)
            .finish()
    }
}

fn wire_direction(direction: Direction) -> ReadDirection {
    match direction {
        Direction::Forwards => ReadDirection::Forwards,
        Direction::Backwards => ReadDirection::Backwards,
    }
}

fn wire_filter(filter: &SubscriptionFilter) -> FilterOptions {
    let expression = match filter.expression() {
        FilterExpression::Prefixes(prefixes) => Expression {
            regex: String::new(),
            prefix: prefixes.clone(),
        },
        FilterExpression::Regex(regex) => Expression {
            regex: regex.clone(),
            prefix: Vec::new(),
        },
    };

    FilterOptions {
        filter: match filter.target() {
            FilterTarget::StreamName => FilterKind::StreamIdentifier(expression),
            FilterTarget::EventType => FilterKind::EventType(expression),
        },
        window: match filter.window() {
            Some(max) => FilterWindow::Max(max),
            None => FilterWindow::Count,
        },
        checkpoint_interval_multiplier: filter.multiplier(),
    }
}

/// Position bookmarks observed while enumerating messages.
#[derive(Debug, Default)]
struct Bookmarks {
    first_stream_position: Option<StreamPosition>,
    last_stream_position: Option<StreamPosition>,
    last_position: Option<Position>,
}

impl Bookmarks {
    fn observe(&mut self, message: &StreamMessage) {
        match message {
            StreamMessage::FirstStreamPosition(position) => {
                self.first_stream_position = Some(*position)
            }
            StreamMessage::LastStreamPosition(position) => {
                self.last_stream_position = Some(*position)
            }
            StreamMessage::LastAllStreamPosition(position)
            | StreamMessage::Checkpoint(position) => self.last_position = Some(*position),
            StreamMessage::Event(_)
            | StreamMessage::NotFound
            | StreamMessage::Ok
            | StreamMessage::SubscriptionConfirmation(_)
            | StreamMessage::Unknown => {}
        }
    }
}

/// State shared between a result handle and the sequences taken from it.
///
/// The read is cancelled once the last holder is dropped.
struct ReadShared {
    receiver: Mutex<Option<mpsc::Receiver<RelayItem>>>,
    enumerated: AtomicBool,
    bookmarks: Mutex<Bookmarks>,
    cancel: CancellationToken,
    _release: DropGuard,
}

impl ReadShared {
    /// Claim the one-shot enumeration permit.
    fn claim(&self) -> Result<mpsc::Receiver<RelayItem>, StreamError> {
        if self.enumerated.swap(true, Ordering::AcqRel) {
            return Err(StreamError::AlreadyEnumerated);
        }
        self.receiver
            .lock()
            .take()
            .ok_or(StreamError::AlreadyEnumerated)
    }
}

fn start_read(
    client: &Client,
    request: ReadReq,
    options: CallOptions,
    parent: Option<CancellationToken>,
    read_state: Option<watch::Sender<ReadStateCell>>,
) -> Arc<ReadShared> {
    let cancel = parent.map(|token| token.child_token()).unwrap_or_default();
    let (relay, receiver) = mpsc::channel(1);

    Pump {
        resolver: client.resolver.clone(),
        request,
        options,
        cancel: cancel.clone(),
        relay,
        read_state,
    }
    .spawn();

    Arc::new(ReadShared {
        receiver: Mutex::new(Some(receiver)),
        enumerated: AtomicBool::new(false),
        bookmarks: Mutex::new(Bookmarks::default()),
        _release: cancel.clone().drop_guard(),
        cancel,
    })
}

fn relay_messages(shared: Arc<ReadShared>) -> Result<Messages, StreamError> {
    let mut receiver = shared.claim()?;

    let stream = async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => Some(Err(StreamError::Cancelled)),
                next = receiver.recv() => next,
            };

            match next {
                Some(Ok(message)) => {
                    shared.bookmarks.lock().observe(&message);
                    yield Ok(message);
                }
                Some(Err(err)) => {
                    yield Err(err);
                    break;
                }
                None => break,
            }
        }
    };

    Ok(Messages {
        inner: Box::pin(stream),
    })
}

/// The raw message sequence of a read.
///
/// Ends after the server finishes, after an error, or on cancellation.
pub struct Messages {
    inner: Pin<Box<dyn Stream<Item = Result<StreamMessage, StreamError>> + Send>>,
}

impl Stream for Messages {
    type Item = Result<StreamMessage, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for Messages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messages").finish_non_exhaustive()
    }
}

/// The events of a read, with every other message filtered out.
pub struct Events {
    inner: Pin<Box<dyn Stream<Item = Result<ResolvedEvent, StreamError>> + Send>>,
}

impl Events {
    /// `not_found` names the stream to report when the server says it does
    /// not exist.
    fn new(mut messages: Messages, not_found: Option<String>) -> Self {
        let stream = async_stream::stream! {
            while let Some(item) = messages.next().await {
                match item {
                    Ok(StreamMessage::Event(event)) => yield Ok(event),
                    Ok(StreamMessage::NotFound) => {
                        if let Some(stream) = &not_found {
                            yield Err(StreamError::StreamNotFound { stream: stream.clone() });
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };

        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for Events {
    type Item = Result<ResolvedEvent, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events").finish_non_exhaustive()
    }
}

/// Result of a single-stream read.
///
/// Either [`messages`](Self::messages) or [`events`](Self::events) may be
/// taken, once. Position bookmarks are only filled in as the matching
/// messages pass through that sequence; dropping it unread leaves them
/// empty. Dropping the handle and its sequence aborts the read.
pub struct ReadStreamResult {
    stream_name: String,
    shared: Arc<ReadShared>,
    read_state: watch::Receiver<ReadStateCell>,
}

impl ReadStreamResult {
    /// Name of the stream being read.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Wait until the server says whether the stream exists.
    ///
    /// Resolves as soon as the first message arrives, without consuming the
    /// sequence. Fails with the read's error if it failed before then.
    pub async fn read_state(&self) -> Result<ReadState, StreamError> {
        let mut receiver = self.read_state.clone();
        let state = receiver
            .wait_for(|state| state.is_some())
            .await
            .map_err(|_| StreamError::Cancelled)?;

        match &*state {
            Some(state) => state.clone(),
            None => Err(StreamError::Cancelled),
        }
    }

    /// Take the raw message sequence.
    ///
    /// Fails with [`StreamError::AlreadyEnumerated`] if a sequence was
    /// already taken from this result.
    pub fn messages(&self) -> Result<Messages, StreamError> {
        relay_messages(self.shared.clone())
    }

    /// Take the event-only sequence.
    ///
    /// Yields [`StreamError::StreamNotFound`] if the stream does not exist.
    pub fn events(&self) -> Result<Events, StreamError> {
        let messages = self.messages()?;
        Ok(Events::new(messages, Some(self.stream_name.clone())))
    }

    /// Revision of the first event in the stream, once seen.
    pub fn first_stream_position(&self) -> Option<StreamPosition> {
        self.shared.bookmarks.lock().first_stream_position
    }

    /// Revision of the last event in the stream, once seen.
    pub fn last_stream_position(&self) -> Option<StreamPosition> {
        self.shared.bookmarks.lock().last_stream_position
    }

    /// Whether a sequence has been taken from this result.
    pub fn is_enumerated(&self) -> bool {
        self.shared.enumerated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ReadStreamResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStreamResult")
            .field("stream_name", &self.stream_name)
            .field("enumerated", &self.is_enumerated())
            .finish()
    }
}

/// Result of a read of `$all`.
pub struct ReadAllStreamResult {
    shared: Arc<ReadShared>,
}

impl ReadAllStreamResult {
    /// Take the raw message sequence. May only be called once.
    pub fn messages(&self) -> Result<Messages, StreamError> {
        relay_messages(self.shared.clone())
    }

    /// Take the event-only sequence. May only be called once.
    pub fn events(&self) -> Result<Events, StreamError> {
        Ok(Events::new(self.messages()?, None))
    }

    /// Most recent `$all` position or checkpoint seen so far.
    pub fn last_position(&self) -> Option<Position> {
        self.shared.bookmarks.lock().last_position
    }

    pub fn is_enumerated(&self) -> bool {
        self.shared.enumerated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ReadAllStreamResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAllStreamResult")
            .field("enumerated", &self.is_enumerated())
            .field("last_position", &self.last_position())
            .finish()
    }
}
