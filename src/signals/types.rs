use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed market signal (a headline, trend, announcement, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Name of the source that produced it
    #[serde(default)]
    pub source: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default = "Utc::now")]
    pub collected_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            url: None,
            snippet: String::new(),
            collected_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}
