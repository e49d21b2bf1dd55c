//! Client and configuration.

use crate::error::StreamError;
use crate::metadata::{metastream_of, StreamMetadata, StreamMetadataResult};
use crate::message::StreamMessage;
use crate::read::{ReadAllBuilder, ReadStreamBuilder};
use crate::retry::{RetryConfig, RetryingResolver};
use crate::transport::{CallOptions, ConnectionResolver};
use crate::types::{StreamPosition, UserCredentials};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An event log client.
///
/// The client is cloneable and can be shared across threads. Every read is
/// issued on the channel returned by its [`ConnectionResolver`].
#[derive(Clone)]
pub struct Client {
    pub(crate) resolver: Arc<dyn ConnectionResolver>,
    pub(crate) settings: Arc<ClientSettings>,
}

/// Defaults applied to every call made by a [`Client`].
#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
    pub default_deadline: Option<Duration>,
    pub default_credentials: Option<UserCredentials>,
    pub requires_leader: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with default settings.
    pub fn new<R>(resolver: R) -> Self
    where
        R: ConnectionResolver + 'static,
    {
        Self {
            resolver: Arc::new(resolver),
            settings: Arc::new(ClientSettings::default()),
        }
    }

    /// Create a client builder for customization.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Create a builder for reading one stream.
    ///
    /// No network request is made until [`ReadStreamBuilder::send`].
    pub fn read_stream(&self, stream_name: impl Into<String>) -> ReadStreamBuilder {
        ReadStreamBuilder::new(self.clone(), stream_name.into())
    }

    /// Create a builder for reading `$all`.
    pub fn read_all(&self) -> ReadAllBuilder {
        ReadAllBuilder::new(self.clone())
    }

    /// Read the current metadata of a stream.
    ///
    /// Returns an empty result if the stream has no metadata.
    pub async fn stream_metadata(
        &self,
        stream_name: &str,
    ) -> Result<StreamMetadataResult, StreamError> {
        debug!(stream = stream_name, "reading stream metadata");

        let result = self
            .read_stream(metastream_of(stream_name))
            .backwards()
            .from(StreamPosition::END)
            .max_count(1)
            .send()?;

        let mut messages = result.messages()?;
        while let Some(message) = messages.next().await {
            let StreamMessage::Event(event) = message? else {
                continue;
            };

            let metadata: StreamMetadata = serde_json::from_slice(&event.event.data)?;
            return Ok(StreamMetadataResult::new(
                stream_name,
                event.original_event_number(),
                metadata,
            ));
        }

        warn!(stream = stream_name, "stream metadata not found");
        Ok(StreamMetadataResult::none(stream_name))
    }

    /// Call options for one call, falling back to the client defaults.
    pub(crate) fn call_options(
        &self,
        credentials: Option<UserCredentials>,
        deadline: Option<Duration>,
    ) -> CallOptions {
        CallOptions {
            deadline: deadline.or(self.settings.default_deadline),
            credentials: credentials.or_else(|| self.settings.default_credentials.clone()),
            requires_leader: self.settings.requires_leader,
        }
    }
}

/// Builder for configuring a Client.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ClientBuilder {
    resolver: Option<Arc<dyn ConnectionResolver>>,
    settings: ClientSettings,
    retry: Option<RetryConfig>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            resolver: None,
            settings: ClientSettings::default(),
            retry: None,
        }
    }

    /// Set the resolver that supplies connections.
    pub fn resolver<R>(mut self, resolver: R) -> Self
    where
        R: ConnectionResolver + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the default deadline for each call.
    pub fn default_deadline(mut self, deadline: Duration) -> Self {
        self.settings.default_deadline = Some(deadline);
        self
    }

    /// Set the credentials used when a read does not supply its own.
    pub fn default_credentials(mut self, credentials: UserCredentials) -> Self {
        self.settings.default_credentials = Some(credentials);
        self
    }

    /// Require reads to be served by the cluster leader.
    pub fn requires_leader(mut self, required: bool) -> Self {
        self.settings.requires_leader = required;
        self
    }

    /// Retry connection resolution with the given policy.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Build the client.
    ///
    /// Returns an error if no resolver was configured.
    pub fn build(self) -> Result<Client, StreamError> {
        let resolver = self
            .resolver
            .ok_or_else(|| StreamError::invalid_argument("a connection resolver is required"))?;

        let resolver: Arc<dyn ConnectionResolver> = match self.retry {
            Some(config) => Arc::new(RetryingResolver::new(resolver, config)),
            None => resolver,
        };

        Ok(Client {
            resolver,
            settings: Arc::new(self.settings),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, not_found, play, ScriptedChannel, TestResolver};
    use crate::transport::{ReadContent, RevisionOption, StreamOption, StreamOptions};
    use crate::wire::ReadDirection;
    use bytes::Bytes;

    #[test]
    fn test_builder_requires_resolver() {
        let err = Client::builder().build().unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[test]
    fn test_builder_settings() {
        let (channel, _script) = ScriptedChannel::new();
        let client = Client::builder()
            .resolver(TestResolver::new(channel))
            .default_deadline(Duration::from_secs(3))
            .retry(RetryConfig::default())
            .build()
            .unwrap();

        assert_eq!(client.settings().default_deadline, Some(Duration::from_secs(3)));
        assert!(client.settings().default_credentials.is_none());
        assert!(!client.settings().requires_leader);
    }

    #[tokio::test]
    async fn test_stream_metadata() {
        let (channel, script) = ScriptedChannel::new();
        let client = Client::new(TestResolver::new(channel.clone()));

        let mut response = event("$$orders", 4);
        if let Some(ReadContent::Event(read)) = &mut response.content {
            if let Some(record) = &mut read.event {
                record.data = Bytes::from_static(br#"{"$maxCount": 20, "owner": "billing"}"#);
            }
        }
        play(script, vec![response]);

        let result = client.stream_metadata("orders").await.unwrap();
        assert_eq!(result.stream_name, "orders");
        assert_eq!(result.metastream_revision, Some(StreamPosition::new(4)));
        assert_eq!(result.metadata.max_count, Some(20));
        assert!(result.metadata.custom.contains_key("owner"));

        let (request, _) = channel.last_request().unwrap();
        assert_eq!(request.options.read_direction, ReadDirection::Backwards);
        assert_eq!(
            request.options.stream_option,
            StreamOption::Stream(StreamOptions {
                stream_identifier: "$$orders".to_string(),
                revision_option: RevisionOption::End,
            })
        );
        assert_eq!(
            request.options.count_option,
            crate::transport::CountOption::Count(1)
        );
    }

    #[tokio::test]
    async fn test_stream_metadata_not_found() {
        let (channel, script) = ScriptedChannel::new();
        let client = Client::new(TestResolver::new(channel));
        play(script, vec![not_found("$$orders")]);

        let result = client.stream_metadata("orders").await.unwrap();
        assert!(result.is_none());
        assert_eq!(result.metadata, StreamMetadata::default());
    }

    #[tokio::test]
    async fn test_stream_metadata_empty_document() {
        let (channel, script) = ScriptedChannel::new();
        let client = Client::new(TestResolver::new(channel));
        play(script, vec![event("$$orders", 0)]);

        let result = client.stream_metadata("orders").await.unwrap();
        assert_eq!(result.metastream_revision, Some(StreamPosition::new(0)));
        assert_eq!(result.metadata, StreamMetadata::default());
    }

    #[tokio::test]
    async fn test_stream_metadata_invalid_document() {
        let (channel, script) = ScriptedChannel::new();
        let client = Client::new(TestResolver::new(channel));

        let mut response = event("$$orders", 0);
        if let Some(ReadContent::Event(read)) = &mut response.content {
            if let Some(record) = &mut read.event {
                record.data = Bytes::from_static(b"not json");
            }
        }
        play(script, vec![response]);

        let err = client.stream_metadata("orders").await.unwrap_err();
        assert!(matches!(err, StreamError::Json(_)));
    }
}
