//! Outbound notifications (Discord-style webhook embeds).
//!
//! Sending is fire-and-forget from the pipeline's point of view: `send`
//! reports success as a bool and never returns an error.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::candidate::Candidate;
use crate::engine_config::NotifySection;
use crate::errors::truncate_chars;
use crate::invoker::{RetryPolicy, Sleeper, TokioSleeper};
use crate::scoring::Grade;

pub const WEBHOOK_URL_ENV: &str = "IDEATION_WEBHOOK_URL";
pub const SYSTEM_ALERT_COLOR: u32 = 0xFF4500;
const SYSTEM_ALERT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Notification {
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "embeds": [{
                "title": self.title,
                "description": self.description,
                "color": self.color,
                "fields": self.fields,
                "timestamp": Utc::now().to_rfc3339(),
            }]
        })
    }
}

fn grade_style(grade: Grade) -> (&'static str, u32) {
    match grade {
        Grade::S => ("🏆", 0xFFD700),
        Grade::A => ("⭐", 0x00BFFF),
        Grade::B => ("🔹", 0x7289DA),
        Grade::C => ("▫️", 0x99AAB5),
        Grade::D => ("·", 0x2C2F33),
    }
}

/// Alert for a newly graded idea. Only S and A grades produce one.
pub fn idea_alert(idea: &Candidate, batch_id: &str) -> Option<Notification> {
    let grade = idea.grade().filter(|g| g.is_alert_worthy())?;
    let (emoji, color) = grade_style(grade);

    let mut fields = vec![
        EmbedField::new("Problem", truncate_chars(&idea.problem, 300), false),
        EmbedField::new("Solution", truncate_chars(&idea.solution, 300), false),
        EmbedField::new("Target", &idea.target_buyer, true),
        EmbedField::new("Revenue", &idea.revenue_model, true),
    ];

    if let Some(scoring) = &idea.scoring {
        let s = &scoring.scores;
        fields.push(EmbedField::new(
            "Scores",
            format!(
                "N {:.1} / U {:.1} / M {:.1} / R {:.1} / V {:.1} → **{:.2}**",
                s.n, s.u, s.m, s.r, s.v, scoring.weighted_score
            ),
            false,
        ));
    }

    if let Some(matching) = &idea.matching {
        let apis: Vec<&str> = matching
            .resources
            .iter()
            .take(3)
            .map(|r| r.name.as_str())
            .collect();
        if !apis.is_empty() {
            fields.push(EmbedField::new("APIs", apis.join(", "), false));
        }
    }

    fields.push(EmbedField::new(
        "Competitors",
        idea.competitors_count().to_string(),
        true,
    ));
    let validation = idea
        .validation_score()
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "skipped".to_string());
    fields.push(EmbedField::new(
        "Feasibility / Validation",
        format!("{:.1} / {}", idea.feasibility_score(), validation),
        true,
    ));

    Some(Notification {
        title: format!("{} {} idea: {}", emoji, grade, idea.service_name),
        description: format!("Batch `{}` · {}", batch_id, idea.id),
        color,
        fields,
    })
}

pub fn system_alert(description: &str) -> Notification {
    Notification {
        title: "⚠️ Ideation engine alert".to_string(),
        description: truncate_chars(description, SYSTEM_ALERT_MAX_CHARS),
        color: SYSTEM_ALERT_COLOR,
        fields: Vec::new(),
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> bool;
}

/// Drops everything. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send(&self, notification: &Notification) -> bool {
        info!(title = %notification.title, "No webhook configured, notification dropped");
        false
    }
}

pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            policy,
            sleeper,
        }
    }

    async fn post_once(&self, payload: &serde_json::Value) -> Result<(), String> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(10))
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        match resp.status().as_u16() {
            200 | 204 => Ok(()),
            code => Err(format!("webhook returned HTTP {}", code)),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &Notification) -> bool {
        let payload = notification.to_payload();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => {
                    info!(title = %notification.title, attempt, "Notification sent");
                    return true;
                }
                Err(e) if attempt <= self.policy.max_retries => {
                    let wait = self.policy.delay_for(attempt);
                    warn!(attempt, error = %e, wait_sec = wait.as_secs(), "Notification failed, retrying");
                    self.sleeper.sleep(wait).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, title = %notification.title, "Notification failed");
                    return false;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookFile {
    #[serde(default)]
    discord_webhook_url: Option<String>,
}

/// Webhook URL from the config file, else from `IDEATION_WEBHOOK_URL`.
pub fn resolve_webhook_url(config_path: &Path) -> Option<String> {
    let from_file = std::fs::read_to_string(config_path)
        .ok()
        .and_then(|content| serde_json::from_str::<WebhookFile>(&content).ok())
        .and_then(|f| f.discord_webhook_url)
        .filter(|url| !url.trim().is_empty());
    from_file.or_else(|| {
        std::env::var(WEBHOOK_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
    })
}

pub fn build_sink(config_path: &Path, section: &NotifySection) -> Arc<dyn NotificationSink> {
    match resolve_webhook_url(config_path) {
        Some(url) => Arc::new(WebhookSink::new(
            url,
            RetryPolicy::new(
                section.max_retries,
                Duration::from_secs(section.wait_base_sec),
                Duration::from_secs(section.wait_max_sec),
            ),
            Arc::new(TokioSleeper),
        )),
        None => Arc::new(NullSink),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every notification it is asked to send.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        pub fn titles(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.title.clone())
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, notification: &Notification) -> bool {
            self.sent.lock().unwrap().push(notification.clone());
            true
        }
    }
}
