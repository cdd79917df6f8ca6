//! Daily and weekly summaries built from the run artifact log.

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::truncate_chars;
use crate::publish::BatchRecord;
use crate::scoring::Grade;
use crate::util::atomic_json_write;

const TOP_IDEAS: usize = 10;
const PROBLEM_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopIdea {
    pub name: String,
    pub grade: Option<Grade>,
    pub score: f64,
    pub problem: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub date: NaiveDate,
    pub total_batches: usize,
    pub total_ideas: usize,
    pub grade_distribution: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_batches: usize,
    pub total_ideas: usize,
    pub grade_distribution: BTreeMap<String, usize>,
    pub sa_count: usize,
    pub top_ideas: Vec<TopIdea>,
    pub generated_at: DateTime<Utc>,
}

fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

fn grade_distribution<'a>(batches: impl Iterator<Item = &'a BatchRecord>) -> BTreeMap<String, usize> {
    let mut dist: BTreeMap<String, usize> = Grade::ALL
        .iter()
        .map(|g| (g.to_string(), 0))
        .collect();
    for batch in batches {
        for idea in &batch.ideas {
            if let Some(grade) = idea.grade() {
                *dist.entry(grade.to_string()).or_insert(0) += 1;
            }
        }
    }
    dist
}

pub fn daily_report(batches: &[BatchRecord], date: NaiveDate, now: DateTime<Utc>) -> DailyReport {
    let day: Vec<&BatchRecord> = batches
        .iter()
        .filter(|b| local_date(b.timestamp) == date)
        .collect();
    DailyReport {
        kind: "daily",
        date,
        total_batches: day.len(),
        total_ideas: day.iter().map(|b| b.ideas.len()).sum(),
        grade_distribution: grade_distribution(day.iter().copied()),
        generated_at: now,
    }
}

/// The seven days ending on `end` (inclusive).
pub fn weekly_report(batches: &[BatchRecord], end: NaiveDate, now: DateTime<Utc>) -> WeeklyReport {
    let start = end - Duration::days(6);
    let week: Vec<&BatchRecord> = batches
        .iter()
        .filter(|b| {
            let d = local_date(b.timestamp);
            d >= start && d <= end
        })
        .collect();

    let grade_distribution = grade_distribution(week.iter().copied());
    let sa_count = grade_distribution.get("S").copied().unwrap_or(0)
        + grade_distribution.get("A").copied().unwrap_or(0);

    let mut ideas: Vec<_> = week.iter().flat_map(|b| b.ideas.iter()).collect();
    ideas.sort_by(|a, b| {
        b.weighted_score()
            .partial_cmp(&a.weighted_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top_ideas = ideas
        .into_iter()
        .take(TOP_IDEAS)
        .map(|idea| TopIdea {
            name: idea.service_name.clone(),
            grade: idea.grade(),
            score: idea.weighted_score(),
            problem: truncate_chars(&idea.problem, PROBLEM_PREVIEW_CHARS),
            target: idea.target_buyer.clone(),
        })
        .collect();

    WeeklyReport {
        kind: "weekly",
        period_start: start,
        period_end: end,
        total_batches: week.len(),
        total_ideas: week.iter().map(|b| b.ideas.len()).sum(),
        grade_distribution,
        sa_count,
        top_ideas,
        generated_at: now,
    }
}

/// Write a report as `{reports_dir}/{prefix}_{date}.json`, atomically.
pub fn write_report<T: Serialize>(
    reports_dir: &Path,
    prefix: &str,
    date: NaiveDate,
    report: &T,
) -> Result<PathBuf> {
    let path = reports_dir.join(format!("{}_{}.json", prefix, date.format("%Y-%m-%d")));
    atomic_json_write(&path, report)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, ScoreSource, ScoringFacts};
    use crate::scoring::SubScores;
    use tempfile::tempdir;

    fn idea(name: &str, score: f64, grade: Grade) -> Candidate {
        let mut c = Candidate::new(name, name);
        c.problem = "p".repeat(150);
        c.scoring = Some(ScoringFacts {
            scores: SubScores {
                n: score,
                u: score,
                m: score,
                r: score,
                v: score,
            },
            weighted_score: score,
            source: ScoreSource::Reasoning,
            max_similarity: 0.0,
            is_duplicate: false,
            grade: Some(grade),
        });
        c
    }

    fn batch(id: &str, ts: DateTime<Utc>, ideas: Vec<Candidate>) -> BatchRecord {
        BatchRecord {
            schema_version: "1.0".into(),
            batch_id: id.into(),
            timestamp: ts,
            ideas,
        }
    }

    #[test]
    fn test_daily_counts_only_that_day() {
        let now = Utc::now();
        let batches = vec![
            batch("a", now, vec![idea("x", 4.5, Grade::S), idea("y", 2.0, Grade::C)]),
            batch("b", now - Duration::days(3), vec![idea("z", 3.0, Grade::B)]),
        ];
        let report = daily_report(&batches, local_date(now), now);
        assert_eq!(report.total_batches, 1);
        assert_eq!(report.total_ideas, 2);
        assert_eq!(report.grade_distribution["S"], 1);
        assert_eq!(report.grade_distribution["C"], 1);
        assert_eq!(report.grade_distribution["D"], 0);
    }

    #[test]
    fn test_weekly_top_ideas_and_sa_count() {
        let now = Utc::now();
        let batches = vec![
            batch("a", now, vec![idea("low", 2.0, Grade::C), idea("top", 4.6, Grade::S)]),
            batch("b", now - Duration::days(2), vec![idea("mid", 3.5, Grade::A)]),
            batch("old", now - Duration::days(20), vec![idea("ancient", 5.0, Grade::S)]),
        ];
        let report = weekly_report(&batches, local_date(now), now);
        assert_eq!(report.total_batches, 2);
        assert_eq!(report.sa_count, 2);
        assert_eq!(report.top_ideas[0].name, "top");
        assert_eq!(report.top_ideas[1].name, "mid");
        assert_eq!(report.top_ideas[0].problem.chars().count(), 100);
        assert_eq!(report.period_start, local_date(now) - Duration::days(6));
    }

    #[test]
    fn test_write_report_file_name() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let report = daily_report(&[], date, Utc::now());
        let path = write_report(dir.path(), "daily", date, &report).unwrap();
        assert!(path.ends_with("daily_2026-03-01.json"));
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["type"], "daily");
        assert_eq!(raw["total_batches"], 0);
    }
}
