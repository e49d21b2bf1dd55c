//! Server-side filters for `$all` reads.

use crate::error::StreamError;

/// What a filter expression is matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterTarget {
    StreamName,
    EventType,
}

/// How a filter matches.
///
/// Prefixes and a regex are mutually exclusive; pick one constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterExpression {
    Prefixes(Vec<String>),
    Regex(String),
}

/// Filter applied by the server while reading `$all`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionFilter {
    target: FilterTarget,
    expression: FilterExpression,
    max_search_window: Option<u32>,
    checkpoint_interval_multiplier: u32,
}

impl SubscriptionFilter {
    /// Match stream names starting with any of the given prefixes.
    pub fn stream_prefixes<I, S>(prefixes: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::prefixes(FilterTarget::StreamName, prefixes)
    }

    /// Match event types starting with any of the given prefixes.
    pub fn event_type_prefixes<I, S>(prefixes: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::prefixes(FilterTarget::EventType, prefixes)
    }

    /// Match stream names against a regular expression.
    pub fn stream_regex(regex: impl Into<String>) -> Result<Self, StreamError> {
        Self::regex(FilterTarget::StreamName, regex)
    }

    /// Match event types against a regular expression.
    pub fn event_type_regex(regex: impl Into<String>) -> Result<Self, StreamError> {
        Self::regex(FilterTarget::EventType, regex)
    }

    /// Exclude system events (event types starting with `$`).
    pub fn exclude_system_events() -> Self {
        SubscriptionFilter {
            target: FilterTarget::EventType,
            expression: FilterExpression::Regex(r"^[^\$].*".to_string()),
            max_search_window: None,
            checkpoint_interval_multiplier: 1,
        }
    }

    fn prefixes<I, S>(target: FilterTarget, prefixes: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        if prefixes.is_empty() {
            return Err(StreamError::invalid_argument(
                "filter requires at least one prefix",
            ));
        }
        if prefixes.iter().any(|p| p.is_empty()) {
            return Err(StreamError::invalid_argument("filter prefix must not be empty"));
        }

        Ok(SubscriptionFilter {
            target,
            expression: FilterExpression::Prefixes(prefixes),
            max_search_window: None,
            checkpoint_interval_multiplier: 1,
        })
    }

    fn regex(target: FilterTarget, regex: impl Into<String>) -> Result<Self, StreamError> {
        let regex = regex.into();
        if regex.is_empty() {
            return Err(StreamError::invalid_argument("filter regex must not be empty"));
        }

        Ok(SubscriptionFilter {
            target,
            expression: FilterExpression::Regex(regex),
            max_search_window: None,
            checkpoint_interval_multiplier: 1,
        })
    }

    /// Set how many events the server may scan before sending a checkpoint.
    pub fn max_search_window(mut self, window: u32) -> Self {
        self.max_search_window = Some(window);
        self
    }

    /// Set the multiplier applied to the search window between checkpoints.
    pub fn checkpoint_interval_multiplier(mut self, multiplier: u32) -> Self {
        self.checkpoint_interval_multiplier = multiplier;
        self
    }

    pub fn target(&self) -> &FilterTarget {
        &self.target
    }

    pub fn expression(&self) -> &FilterExpression {
        &self.expression
    }

    pub fn window(&self) -> Option<u32> {
        self.max_search_window
    }

    pub fn multiplier(&self) -> u32 {
        self.checkpoint_interval_multiplier
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.checkpoint_interval_multiplier == 0 {
            return Err(StreamError::invalid_argument(
                "checkpoint interval multiplier must be greater than 0",
            ));
        }
        if self.max_search_window == Some(0) {
            return Err(StreamError::invalid_argument(
                "max search window must be greater than 0",
            ));
        }
        Ok(())
    }
}
