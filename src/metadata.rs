//! Stream metadata documents.

use crate::types::StreamPosition;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of the stream holding another stream's metadata.
pub const METASTREAM_PREFIX: &str = "$$";

/// Name of the stream holding the metadata of `stream_name`.
pub fn metastream_of(stream_name: &str) -> String {
    format!("{}{}", METASTREAM_PREFIX, stream_name)
}

/// Metadata attached to a stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(rename = "$maxCount", default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,

    /// Maximum age of events, in seconds.
    #[serde(rename = "$maxAge", default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,

    #[serde(rename = "$tb", default, skip_serializing_if = "Option::is_none")]
    pub truncate_before: Option<u64>,

    /// Cache lifetime for the stream, in seconds.
    #[serde(
        rename = "$cacheControl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_control_secs: Option<u64>,

    #[serde(rename = "$acl", default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<StreamAcl>,

    /// User-defined properties.
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl StreamMetadata {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn cache_control(&self) -> Option<Duration> {
        self.cache_control_secs.map(Duration::from_secs)
    }

    pub fn truncate_before(&self) -> Option<StreamPosition> {
        self.truncate_before.map(StreamPosition::new)
    }
}

/// Access control list of a stream. Each entry lists the roles allowed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAcl {
    #[serde(
        rename = "$r",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_roles: Option<Vec<String>>,

    #[serde(
        rename = "$w",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub write_roles: Option<Vec<String>>,

    #[serde(
        rename = "$d",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub delete_roles: Option<Vec<String>>,

    #[serde(
        rename = "$mr",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta_read_roles: Option<Vec<String>>,

    #[serde(
        rename = "$mw",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta_write_roles: Option<Vec<String>>,
}

// A role list may be written as a single string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|roles| match roles {
        OneOrMany::One(role) => vec![role],
        OneOrMany::Many(roles) => roles,
    }))
}

/// Metadata of a stream as last written.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadataResult {
    pub stream_name: String,
    /// Revision of the metadata event in the metastream, `None` when the
    /// stream has no metadata.
    pub metastream_revision: Option<StreamPosition>,
    pub metadata: StreamMetadata,
}

impl StreamMetadataResult {
    pub(crate) fn new(
        stream_name: &str,
        revision: StreamPosition,
        metadata: StreamMetadata,
    ) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            metastream_revision: Some(revision),
            metadata,
        }
    }

    pub(crate) fn none(stream_name: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            metastream_revision: None,
            metadata: StreamMetadata::default(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.metastream_revision.is_none()
    }
}
