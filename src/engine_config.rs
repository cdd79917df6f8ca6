//! Layered configuration for the ideation engine.
//!
//! Settings are read from `ideation.toml` in the project directory, then
//! selected values can be overridden from the environment and the CLI.
//! Every field has a default, so an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [budget]
//! total_sec = 3600
//! variable_pool_sec = 1440
//! base_sec = [300, 600, 300, 480, 120, 60]
//! variable_max_sec = [300, 300, 300, 720, 180, 60]
//! simplify_threshold_sec = 600
//! skip_threshold_sec = 300
//!
//! [gates]
//! feasibility_threshold = 0.40
//! validation_threshold = 50.0
//! dedup_threshold = 0.85
//!
//! [reasoning]
//! command = "claude"
//! args = ["-p"]
//! timeout_sec = 600
//! max_retries = 2
//!
//! [concurrency]
//! max_concurrent = 2
//!
//! [signals]
//! always = ["google_trends"]
//! pool = ["news", "tech", "policy", "funding"]
//! pick = 2
//!
//! [signals.commands]
//! google_trends = "crawlers/trends --json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::budget::Stage;

/// File name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "ideation.toml";

/// Environment variable that replaces the reasoning command when the file does not set one.
pub const REASONING_CMD_ENV: &str = "IDEATION_REASONING_CMD";

/// Time budget allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSection {
    /// Total wall-clock budget for one run
    #[serde(default = "default_total_sec")]
    pub total_sec: u64,
    /// Headroom left over once every stage base and the pool are allocated.
    /// Not handed to any stage; `validate` warns when the allocation overflows `total_sec`.
    #[serde(default = "default_buffer_sec")]
    pub buffer_sec: u64,
    /// Shared pool drawn down by stages that overrun their base
    #[serde(default = "default_variable_pool_sec")]
    pub variable_pool_sec: u64,
    /// Fixed base per stage, indexed by stage number - 1
    #[serde(default = "default_base_sec")]
    pub base_sec: Vec<u64>,
    /// Maximum draw from the pool per stage, indexed by stage number - 1
    #[serde(default = "default_variable_max_sec")]
    pub variable_max_sec: Vec<u64>,
    /// Below this many remaining seconds validation runs without reasoning calls
    #[serde(default = "default_simplify_threshold_sec")]
    pub simplify_threshold_sec: u64,
    /// Below this many remaining seconds validation is skipped
    #[serde(default = "default_skip_threshold_sec")]
    pub skip_threshold_sec: u64,
    /// Candidate count at or below which validation runs deep
    #[serde(default = "default_deep_max_candidates")]
    pub deep_max_candidates: usize,
    /// Candidate count at or below which validation runs standard
    #[serde(default = "default_standard_max_candidates")]
    pub standard_max_candidates: usize,
}

fn default_total_sec() -> u64 {
    3600
}

fn default_buffer_sec() -> u64 {
    300
}

fn default_variable_pool_sec() -> u64 {
    1440
}

fn default_base_sec() -> Vec<u64> {
    vec![300, 600, 300, 480, 120, 60]
}

fn default_variable_max_sec() -> Vec<u64> {
    vec![300, 300, 300, 720, 180, 60]
}

fn default_simplify_threshold_sec() -> u64 {
    600
}

fn default_skip_threshold_sec() -> u64 {
    300
}

fn default_deep_max_candidates() -> usize {
    3
}

fn default_standard_max_candidates() -> usize {
    6
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            total_sec: default_total_sec(),
            buffer_sec: default_buffer_sec(),
            variable_pool_sec: default_variable_pool_sec(),
            base_sec: default_base_sec(),
            variable_max_sec: default_variable_max_sec(),
            simplify_threshold_sec: default_simplify_threshold_sec(),
            skip_threshold_sec: default_skip_threshold_sec(),
            deep_max_candidates: default_deep_max_candidates(),
            standard_max_candidates: default_standard_max_candidates(),
        }
    }
}

impl BudgetSection {
    pub fn base_for(&self, stage: Stage) -> u64 {
        self.base_sec
            .get(stage.number() as usize - 1)
            .copied()
            .unwrap_or(0)
    }

    pub fn variable_max_for(&self, stage: Stage) -> u64 {
        self.variable_max_sec
            .get(stage.number() as usize - 1)
            .copied()
            .unwrap_or(0)
    }
}

/// Pass/fail thresholds for the quality gates and dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesSection {
    /// Feasibility pass ratio (0.40 means a score of 40 passes)
    #[serde(default = "default_feasibility_threshold")]
    pub feasibility_threshold: f64,
    /// Validation pass score out of 100
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,
    /// Cosine similarity at or above which a candidate is a duplicate
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,
}

fn default_feasibility_threshold() -> f64 {
    0.40
}

fn default_validation_threshold() -> f64 {
    50.0
}

fn default_dedup_threshold() -> f64 {
    0.85
}

impl Default for GatesSection {
    fn default() -> Self {
        Self {
            feasibility_threshold: default_feasibility_threshold(),
            validation_threshold: default_validation_threshold(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

/// Grade floors and percentile cut-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingSection {
    #[serde(default = "default_s_floor")]
    pub s_floor: f64,
    #[serde(default = "default_a_floor")]
    pub a_floor: f64,
    #[serde(default = "default_b_floor")]
    pub b_floor: f64,
    #[serde(default = "default_c_floor")]
    pub c_floor: f64,
    /// Top percentile eligible for S
    #[serde(default = "default_s_percentile")]
    pub s_percentile: f64,
    /// Top percentile eligible for A
    #[serde(default = "default_a_percentile")]
    pub a_percentile: f64,
}

fn default_s_floor() -> f64 {
    4.0
}

fn default_a_floor() -> f64 {
    3.2
}

fn default_b_floor() -> f64 {
    2.5
}

fn default_c_floor() -> f64 {
    1.5
}

fn default_s_percentile() -> f64 {
    10.0
}

fn default_a_percentile() -> f64 {
    30.0
}

impl Default for GradingSection {
    fn default() -> Self {
        Self {
            s_floor: default_s_floor(),
            a_floor: default_a_floor(),
            b_floor: default_b_floor(),
            c_floor: default_c_floor(),
            s_percentile: default_s_percentile(),
            a_percentile: default_a_percentile(),
        }
    }
}

/// Composite score weights (N, U, M, R, V). Should sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsSection {
    #[serde(default = "default_weight_n")]
    pub n: f64,
    #[serde(default = "default_weight_u")]
    pub u: f64,
    #[serde(default = "default_weight_m")]
    pub m: f64,
    #[serde(default = "default_weight_r")]
    pub r: f64,
    #[serde(default = "default_weight_v")]
    pub v: f64,
}

fn default_weight_n() -> f64 {
    0.10
}

fn default_weight_u() -> f64 {
    0.20
}

fn default_weight_m() -> f64 {
    0.20
}

fn default_weight_r() -> f64 {
    0.25
}

fn default_weight_v() -> f64 {
    0.25
}

impl Default for WeightsSection {
    fn default() -> Self {
        Self {
            n: default_weight_n(),
            u: default_weight_u(),
            m: default_weight_m(),
            r: default_weight_r(),
            v: default_weight_v(),
        }
    }
}

impl WeightsSection {
    pub fn total(&self) -> f64 {
        self.n + self.u + self.m + self.r + self.v
    }
}

/// External reasoning CLI integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSection {
    /// Command to run (file -> IDEATION_REASONING_CMD -> "claude")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments passed before the prompt is written to stdin
    #[serde(default = "default_reasoning_args")]
    pub args: Vec<String>,
    #[serde(default = "default_reasoning_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_reasoning_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_reasoning_wait_base_sec")]
    pub wait_base_sec: u64,
    #[serde(default = "default_reasoning_wait_max_sec")]
    pub wait_max_sec: u64,
}

fn default_reasoning_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_reasoning_timeout_sec() -> u64 {
    600
}

fn default_reasoning_max_retries() -> u32 {
    2
}

fn default_reasoning_wait_base_sec() -> u64 {
    2
}

fn default_reasoning_wait_max_sec() -> u64 {
    30
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_reasoning_args(),
            timeout_sec: default_reasoning_timeout_sec(),
            max_retries: default_reasoning_max_retries(),
            wait_base_sec: default_reasoning_wait_base_sec(),
            wait_max_sec: default_reasoning_wait_max_sec(),
        }
    }
}

/// Cross-run admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Lock directory, relative to the project directory
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_lock_dir() -> String {
    "output/locks".to_string()
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            lock_dir: default_lock_dir(),
        }
    }
}

/// Signal collection for the context stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsSection {
    /// Sources run on every collection
    #[serde(default = "default_signals_always")]
    pub always: Vec<String>,
    /// Sources rotated round-robin
    #[serde(default = "default_signals_pool")]
    pub pool: Vec<String>,
    /// How many pool sources run per collection
    #[serde(default = "default_signals_pick")]
    pub pick: usize,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
    #[serde(default = "default_source_timeout_sec")]
    pub source_timeout_sec: u64,
    /// Source name -> shell command printing a JSON array of signals
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

fn default_signals_always() -> Vec<String> {
    vec!["google_trends".to_string()]
}

fn default_signals_pool() -> Vec<String> {
    ["news", "tech", "policy", "funding"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_signals_pick() -> usize {
    2
}

fn default_cache_ttl_hours() -> i64 {
    24
}

fn default_source_timeout_sec() -> u64 {
    180
}

impl Default for SignalsSection {
    fn default() -> Self {
        Self {
            always: default_signals_always(),
            pool: default_signals_pool(),
            pick: default_signals_pick(),
            cache_ttl_hours: default_cache_ttl_hours(),
            source_timeout_sec: default_source_timeout_sec(),
            commands: BTreeMap::new(),
        }
    }
}

/// Resource matching for stage 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSection {
    /// Hits requested per data requirement
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Resources kept on a passing candidate
    #[serde(default = "default_keep_top")]
    pub keep_top: usize,
    /// Parameter-name fragments that identify joinable keys
    #[serde(default = "default_known_join_keys")]
    pub known_join_keys: Vec<String>,
}

fn default_top_k() -> usize {
    20
}

fn default_keep_top() -> usize {
    10
}

fn default_known_join_keys() -> Vec<String> {
    [
        "시군구코드",
        "법정동코드",
        "행정동코드",
        "시도코드",
        "사업자번호",
        "사업자등록번호",
        "날짜",
        "기준일",
        "기준년월",
        "좌표",
        "위도",
        "경도",
        "우편번호",
        "도로명주소",
        "region_code",
        "district_code",
        "business_number",
        "date",
        "latitude",
        "longitude",
        "postal_code",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keep_top: default_keep_top(),
            known_join_keys: default_known_join_keys(),
        }
    }
}

/// Market validation for stage 4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Shell command with a `{query}` placeholder printing a JSON array of competitors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor_command: Option<String>,
    #[serde(default = "default_competitor_timeout_sec")]
    pub competitor_timeout_sec: u64,
    /// Target keywords implying a large community
    #[serde(default = "default_large_keywords")]
    pub large_community_keywords: Vec<String>,
    /// Target keywords implying a small community
    #[serde(default = "default_small_keywords")]
    pub small_community_keywords: Vec<String>,
    /// V sub-score used when validation is skipped
    #[serde(default = "default_skipped_v")]
    pub skipped_v: f64,
}

fn default_competitor_timeout_sec() -> u64 {
    15
}

fn default_large_keywords() -> Vec<String> {
    [
        "public",
        "nationwide",
        "government",
        "municipal",
        "citizen",
        "공공",
        "전국",
        "정부",
        "지자체",
        "시민",
        "국민",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_small_keywords() -> Vec<String> {
    ["research", "specialist", "niche", "연구", "전문", "특정", "니치"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skipped_v() -> f64 {
    3.0
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            competitor_command: None,
            competitor_timeout_sec: default_competitor_timeout_sec(),
            large_community_keywords: default_large_keywords(),
            small_community_keywords: default_small_keywords(),
            skipped_v: default_skipped_v(),
        }
    }
}

/// Webhook notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    /// JSON file holding `discord_webhook_url`, relative to the project directory
    #[serde(default = "default_webhook_config")]
    pub webhook_config: String,
    #[serde(default = "default_notify_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_notify_wait_base_sec")]
    pub wait_base_sec: u64,
    #[serde(default = "default_notify_wait_max_sec")]
    pub wait_max_sec: u64,
}

fn default_webhook_config() -> String {
    "data/webhook_config.json".to_string()
}

fn default_notify_max_retries() -> u32 {
    3
}

fn default_notify_wait_base_sec() -> u64 {
    1
}

fn default_notify_wait_max_sec() -> u64 {
    10
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            webhook_config: default_webhook_config(),
            max_retries: default_notify_max_retries(),
            wait_base_sec: default_notify_wait_base_sec(),
            wait_max_sec: default_notify_wait_max_sec(),
        }
    }
}

/// Filesystem layout, relative to the project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_catalog_db")]
    pub catalog_db: String,
    /// Directory of prompt template overrides
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_log_dir() -> String {
    "output/logs".to_string()
}

fn default_catalog_db() -> String {
    "data/public_api_catalog.sqlite3".to_string()
}

fn default_prompts_dir() -> String {
    "prompts".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            catalog_db: default_catalog_db(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

/// The complete ideation.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineToml {
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub gates: GatesSection,
    #[serde(default)]
    pub grading: GradingSection,
    #[serde(default)]
    pub weights: WeightsSection,
    #[serde(default)]
    pub reasoning: ReasoningSection,
    #[serde(default)]
    pub concurrency: ConcurrencySection,
    #[serde(default)]
    pub signals: SignalsSection,
    #[serde(default)]
    pub matching: MatchingSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub paths: PathsSection,
}

impl EngineToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ideation.toml")
    }

    /// Load `ideation.toml` from the project directory, or defaults if absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize ideation.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Get the reasoning command, with fallback to environment variable.
    pub fn reasoning_cmd(&self) -> String {
        self.reasoning
            .command
            .clone()
            .or_else(|| std::env::var(REASONING_CMD_ENV).ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let total = self.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            warnings.push(format!(
                "Composite weights sum to {:.4}, expected 1.0",
                total
            ));
        }

        if !(0.0..=1.0).contains(&self.gates.feasibility_threshold) {
            warnings.push(format!(
                "Invalid feasibility_threshold {}: should be a ratio between 0 and 1",
                self.gates.feasibility_threshold
            ));
        }
        if !(0.0..=100.0).contains(&self.gates.validation_threshold) {
            warnings.push(format!(
                "Invalid validation_threshold {}: should be between 0 and 100",
                self.gates.validation_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.gates.dedup_threshold) {
            warnings.push(format!(
                "Invalid dedup_threshold {}: should be between 0 and 1",
                self.gates.dedup_threshold
            ));
        }

        if self.budget.base_sec.len() != Stage::ALL.len()
            || self.budget.variable_max_sec.len() != Stage::ALL.len()
        {
            warnings.push("base_sec and variable_max_sec need exactly 6 entries".to_string());
        }
        let allocated: u64 = self.budget.base_sec.iter().sum::<u64>()
            + self.budget.variable_pool_sec
            + self.budget.buffer_sec;
        if allocated > self.budget.total_sec {
            warnings.push(format!(
                "Stage bases + variable pool + buffer_sec ({}s) exceed total_sec ({}s)",
                allocated, self.budget.total_sec
            ));
        }
        if self.budget.skip_threshold_sec >= self.budget.simplify_threshold_sec {
            warnings.push(format!(
                "skip_threshold_sec ({}) should be below simplify_threshold_sec ({})",
                self.budget.skip_threshold_sec, self.budget.simplify_threshold_sec
            ));
        }
        if self.budget.deep_max_candidates >= self.budget.standard_max_candidates {
            warnings.push(format!(
                "deep_max_candidates ({}) should be below standard_max_candidates ({})",
                self.budget.deep_max_candidates, self.budget.standard_max_candidates
            ));
        }

        if self.concurrency.max_concurrent == 0 {
            warnings.push("max_concurrent is 0: no run can ever start".to_string());
        }

        if self.signals.pick > self.signals.pool.len() {
            warnings.push(format!(
                "signals.pick ({}) exceeds rotation pool size ({})",
                self.signals.pick,
                self.signals.pool.len()
            ));
        }

        let g = &self.grading;
        if !(g.s_floor >= g.a_floor && g.a_floor >= g.b_floor && g.b_floor >= g.c_floor) {
            warnings.push("Grade floors should be non-increasing from S to C".to_string());
        }

        warnings
    }
}
