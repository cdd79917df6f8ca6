//! Offline stand-in for the reasoning service used by `--dry-run`.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Purpose, ReasoningService};
use crate::errors::PipelineError;

const DRY_RUN_IDEAS: [(&str, &str, &str, &str); 5] = [
    (
        "Commute Air Alerts",
        "air quality",
        "citizen",
        "subscription",
    ),
    (
        "Accident Hotspot Map",
        "traffic accident",
        "municipal government",
        "API usage fees",
    ),
    (
        "Storefront Footfall Forecast",
        "population statistics",
        "small business",
        "SaaS",
    ),
    (
        "Clinic Finder",
        "hospital location",
        "citizen",
        "advertising",
    ),
    (
        "Research Weather Archive",
        "weather observation",
        "research institute",
        "premium tier",
    ),
];

/// Returns deterministic canned JSON for every purpose.
#[derive(Debug, Default, Clone)]
pub struct DryRunReasoning;

impl DryRunReasoning {
    pub fn new() -> Self {
        Self
    }

    fn response(purpose: Purpose) -> Value {
        match purpose {
            Purpose::Assumptions => json!([
                {"keyword": "delivery fee relief platform", "context": "small merchants squeezed by delivery app fees"},
                {"keyword": "AI medical imaging", "context": "hospitals accelerating diagnostic AI adoption"},
                {"keyword": "single-household portion delivery", "context": "growth of one-person households"}
            ]),
            Purpose::Generation => {
                let hypotheses: Vec<Value> = DRY_RUN_IDEAS
                    .iter()
                    .enumerate()
                    .map(|(i, (name, need, target, revenue))| {
                        json!({
                            "id": format!("H-{:03}", i + 1),
                            "service_name": name,
                            "problem": format!("No easy way to act on {} data", need),
                            "solution": format!("{} built on public {} data", name, need),
                            "target_buyer": target,
                            "revenue_model": revenue,
                            "opportunity_area": need,
                            "data_needs": [
                                {"field_name": need, "description": format!("{} by region", need), "priority": "required"}
                            ]
                        })
                    })
                    .collect();
                json!({ "hypotheses": hypotheses })
            }
            Purpose::Validation => json!({
                "timing_fit": 0.85,
                "revenue_reference": 0.75,
                "mvp_difficulty": 0.7
            }),
            Purpose::BatchValidation => Value::Array(
                (0..15)
                    .map(|i| {
                        let step = (i % 5) as f64 * 0.1;
                        json!({
                            "id": format!("H-{:03}", i + 1),
                            "timing_fit": 0.5 + step,
                            "revenue_reference": 0.4 + step,
                            "mvp_difficulty": 0.6
                        })
                    })
                    .collect(),
            ),
            Purpose::Scoring => Value::Array(
                (0..15)
                    .map(|i| {
                        json!({
                            "id": format!("H-{:03}", i + 1),
                            "N": 2 + (i % 4),
                            "U": 5 - (i % 3),
                            "M": 3 + (i % 2),
                            "R": 4 - (i % 3)
                        })
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ReasoningService for DryRunReasoning {
    async fn invoke(&self, _prompt: &str, purpose: Purpose) -> Result<Value, PipelineError> {
        tracing::debug!(purpose = purpose.as_str(), "Dry-run reasoning response");
        Ok(Self::response(purpose))
    }
}
