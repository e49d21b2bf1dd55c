//! Decoded read messages.

use crate::error::StreamError;
use crate::event::{
    EventRecord, ResolvedEvent, METADATA_CONTENT_TYPE, METADATA_CREATED, METADATA_TYPE,
};
use crate::transport::{ReadContent, ReadEvent, ReadResp, RecordedEvent, WireUuid};
use crate::types::{Position, StreamPosition};
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// A message on a read.
///
/// Single-stream reads start with exactly one `Ok` or `NotFound`. The
/// position bookmarks may appear anywhere after it.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    Event(ResolvedEvent),
    NotFound,
    Ok,
    FirstStreamPosition(StreamPosition),
    LastStreamPosition(StreamPosition),
    LastAllStreamPosition(Position),
    /// Safe resume point emitted during filtered `$all` reads.
    Checkpoint(Position),
    SubscriptionConfirmation(String),
    /// A message kind this client does not understand.
    Unknown,
}

impl StreamMessage {
    /// The event carried by this message, if any.
    pub fn event(&self) -> Option<&ResolvedEvent> {
        match self {
            StreamMessage::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<ResolvedEvent> {
        match self {
            StreamMessage::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, StreamMessage::Event(_))
    }
}

/// Decode a raw response into a [`StreamMessage`].
///
/// Unknown response kinds decode to [`StreamMessage::Unknown`]. Only a
/// malformed event payload is an error.
pub fn decode(response: ReadResp) -> Result<StreamMessage, StreamError> {
    let Some(content) = response.content else {
        return Ok(StreamMessage::Unknown);
    };

    let message = match content {
        ReadContent::Event(event) => StreamMessage::Event(decode_event(event)?),
        ReadContent::StreamNotFound(_) => StreamMessage::NotFound,
        ReadContent::FirstStreamPosition(revision) => {
            StreamMessage::FirstStreamPosition(StreamPosition::new(revision))
        }
        ReadContent::LastStreamPosition(revision) => {
            StreamMessage::LastStreamPosition(StreamPosition::new(revision))
        }
        ReadContent::LastAllStreamPosition(position) => StreamMessage::LastAllStreamPosition(
            Position::new(position.commit_position, position.prepare_position),
        ),
        ReadContent::Checkpoint(checkpoint) => StreamMessage::Checkpoint(Position::new(
            checkpoint.commit_position,
            checkpoint.prepare_position,
        )),
        ReadContent::Confirmation(confirmation) => {
            StreamMessage::SubscriptionConfirmation(confirmation.subscription_id)
        }
    };

    Ok(message)
}

fn decode_event(event: ReadEvent) -> Result<ResolvedEvent, StreamError> {
    let record = event
        .event
        .ok_or_else(|| StreamError::Decode("event response without a record".to_string()))?;

    Ok(ResolvedEvent {
        event: decode_record(record)?,
        link: event.link.map(decode_record).transpose()?,
        commit_position: event.commit_position,
    })
}

fn decode_record(record: RecordedEvent) -> Result<EventRecord, StreamError> {
    let id = match record.id {
        Some(id) => decode_uuid(id)?,
        None => return Err(StreamError::Decode("event record without an id".to_string())),
    };

    let event_type = record
        .metadata
        .get(METADATA_TYPE)
        .cloned()
        .unwrap_or_default();
    let content_type = record
        .metadata
        .get(METADATA_CONTENT_TYPE)
        .cloned()
        .unwrap_or_default();
    let created = record
        .metadata
        .get(METADATA_CREATED)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(from_ticks_since_epoch);

    Ok(EventRecord {
        stream_id: record.stream_identifier,
        id,
        revision: StreamPosition::new(record.stream_revision),
        position: Position::new(record.commit_position, record.prepare_position),
        event_type,
        content_type,
        created,
        metadata: record.metadata,
        custom_metadata: record.custom_metadata,
        data: record.data,
    })
}

fn decode_uuid(id: WireUuid) -> Result<Uuid, StreamError> {
    match id {
        WireUuid::Structured {
            most_significant_bits,
            least_significant_bits,
        } => {
            let high = most_significant_bits as u64 as u128;
            let low = least_significant_bits as u64 as u128;
            Ok(Uuid::from_u128((high << 64) | low))
        }
        WireUuid::String(s) => Uuid::parse_str(&s)
            .map_err(|e| StreamError::Decode(format!("invalid event id {:?}: {}", s, e))),
    }
}

fn from_ticks_since_epoch(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::<Utc>::from_timestamp(secs, nanos as u32)
}
