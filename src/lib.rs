//! Event Log Rust Client
//!
//! A client for reading append-only event logs served over a streaming RPC
//! transport. Each read runs as a background task feeding a single-slot
//! relay, so the server is never read faster than the caller consumes.
//!
//! The transport itself is supplied by the application through
//! [`ConnectionResolver`] and [`StreamsChannel`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use event_log_client::{Client, ConnectionResolver, ReadState};
//! use futures::StreamExt;
//!
//! async fn print_orders(resolver: impl ConnectionResolver + 'static)
//!     -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let client = Client::new(resolver);
//!
//!     let result = client.read_stream("orders").max_count(100).send()?;
//!     if result.read_state().await? == ReadState::StreamNotFound {
//!         return Ok(());
//!     }
//!
//!     let mut events = result.events()?;
//!     while let Some(event) = events.next().await {
//!         let event = event?;
//!         println!("{} {}", event.original_event_number(), event.event.event_type);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod event;
mod filter;
mod message;
mod metadata;
mod pump;
mod read;
mod retry;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, ClientSettings};
pub use error::{StatusCode, StreamError};
pub use event::{EventRecord, ResolvedEvent, CONTENT_TYPE_JSON};
pub use filter::{FilterExpression, FilterTarget, SubscriptionFilter};
pub use message::{decode, StreamMessage};
pub use metadata::{metastream_of, StreamAcl, StreamMetadata, StreamMetadataResult};
pub use read::{
    Events, Messages, ReadAllBuilder, ReadAllStreamResult, ReadStreamBuilder, ReadStreamResult,
    DEFAULT_MAX_COUNT,
};
pub use retry::{JitterMode, RetryConfig, RetryingResolver};
pub use transport::{CallOptions, ConnectionResolver, ReadCall, StreamsChannel};
pub use types::{Direction, Position, ReadState, StreamPosition, UserCredentials};

/// Wire-level request and response messages.
pub mod wire {
    pub use crate::transport::{
        AllOption, AllOptions, AllStreamPosition, Checkpoint, ControlOption, CountOption,
        Expression, FilterKind, FilterOption, FilterOptions, FilterWindow, ReadContent,
        ReadDirection, ReadEvent, ReadOptions, ReadReq, ReadResp, RecordedEvent,
        RevisionOption, StreamNotFound, StreamOption, StreamOptions, SubscriptionConfirmation,
        UuidOption, WireUuid, CONTROL_COMPATIBILITY,
    };
}

pub use tokio_util::sync::CancellationToken;
