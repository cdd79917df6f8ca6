//! Competitor lookup used by the validation stage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::shell::{run_shell_json, shell_quote};

pub const QUERY_PLACEHOLDER: &str = "{query}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait CompetitorSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Competitor>>;
}

/// Shell command with a `{query}` placeholder, printing a JSON array.
pub struct CommandCompetitorSearch {
    template: String,
    timeout: Duration,
}

impl CommandCompetitorSearch {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            template: template.into(),
            timeout,
        }
    }

    pub fn render(&self, query: &str) -> String {
        self.template.replace(QUERY_PLACEHOLDER, &shell_quote(query))
    }
}

fn parse_competitors(value: Value) -> Vec<Competitor> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("competitors") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(Competitor {
                name,
                url: None,
                snippet: String::new(),
            }),
            other => serde_json::from_value(other).ok(),
        })
        .collect()
}

#[async_trait]
impl CompetitorSearch for CommandCompetitorSearch {
    async fn search(&self, query: &str) -> Result<Vec<Competitor>> {
        let command = self.render(query);
        let value = run_shell_json(&command, self.timeout)
            .await
            .context("Competitor search failed")?;
        Ok(parse_competitors(value))
    }
}

/// Used when no competitor command is configured.
#[derive(Debug, Default, Clone)]
pub struct NoCompetitorSearch;

#[async_trait]
impl CompetitorSearch for NoCompetitorSearch {
    async fn search(&self, _query: &str) -> Result<Vec<Competitor>> {
        Ok(Vec::new())
    }
}
