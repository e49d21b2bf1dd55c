//! Event records as delivered to readers.

use crate::types::{Position, StreamPosition};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// System metadata keys carried on every recorded event.
pub(crate) const METADATA_TYPE: &str = "type";
pub(crate) const METADATA_CONTENT_TYPE: &str = "content-type";
pub(crate) const METADATA_CREATED: &str = "created";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// An event as it was written to a stream.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct EventRecord {
    /// Stream the event was written to.
    pub stream_id: String,
    pub id: Uuid,
    /// Revision of the event within its stream.
    pub revision: StreamPosition,
    /// Position of the event in `$all`.
    pub position: Position,
    pub event_type: String,
    pub content_type: String,
    /// Creation time, if the server reported one.
    pub created: Option<DateTime<Utc>>,
    /// Raw system metadata.
    pub metadata: HashMap<String, String>,
    pub custom_metadata: Bytes,
    pub data: Bytes,
}

impl EventRecord {
    /// Whether the payload is JSON.
    pub fn is_json(&self) -> bool {
        self.content_type == CONTENT_TYPE_JSON
    }

    /// Deserialize the payload as JSON.
    #[cfg(feature = "json")]
    pub fn as_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::StreamError> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// An event as delivered to a reader.
///
/// When the read resolved a link, `event` is the target record and `link` is
/// the pointer that was read.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEvent {
    pub event: EventRecord,
    pub link: Option<EventRecord>,
    /// Commit position of the original event, `$all` reads only.
    pub commit_position: Option<u64>,
}

impl ResolvedEvent {
    /// The record that was actually read from the stream: the link if there
    /// is one, otherwise the event.
    pub fn original_event(&self) -> &EventRecord {
        self.link.as_ref().unwrap_or(&self.event)
    }

    pub fn original_stream_id(&self) -> &str {
        &self.original_event().stream_id
    }

    pub fn original_event_number(&self) -> StreamPosition {
        self.original_event().revision
    }

    /// Position of the original record in `$all`, when known.
    pub fn original_position(&self) -> Option<Position> {
        self.commit_position.map(|commit| Position {
            commit,
            prepare: self.original_event().position.prepare,
        })
    }

    /// Whether a link was followed to reach `event`.
    pub fn is_resolved(&self) -> bool {
        self.link.is_some()
    }
}
