use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::engine_config::GradingSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub const ALL: [Grade; 5] = [Grade::S, Grade::A, Grade::B, Grade::C, Grade::D];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    /// Grades worth an immediate notification.
    pub fn is_alert_worthy(self) -> bool {
        matches!(self, Grade::S | Grade::A)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hybrid grading: S and A need both a top percentile and a score floor;
/// B, C and D are absolute floors.
///
/// Percentile is `rank / n * 100` with no special case, so the only item of a
/// one-item batch sits at 100% and can never reach S or A.
#[derive(Debug, Clone)]
pub struct Grader {
    config: GradingSection,
}

impl Grader {
    pub fn new(config: GradingSection) -> Self {
        Self { config }
    }

    /// Grades for `scores`, returned in input order.
    pub fn classify(&self, scores: &[f64]) -> Vec<Grade> {
        let n = scores.len();
        if n == 0 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
        });

        let mut ranks = vec![0usize; n];
        for (position, &index) in order.iter().enumerate() {
            // ties share the rank of the first equal score in sorted order
            let first = order
                .iter()
                .position(|&other| scores[other] == scores[index])
                .unwrap_or(position);
            ranks[index] = first + 1;
        }

        scores
            .iter()
            .zip(&ranks)
            .map(|(&score, &rank)| {
                let percentile = rank as f64 * 100.0 / n as f64;
                self.grade_for(score, percentile)
            })
            .collect()
    }

    pub fn grade_for(&self, score: f64, percentile: f64) -> Grade {
        let c = &self.config;
        if percentile <= c.s_percentile && score >= c.s_floor {
            Grade::S
        } else if percentile <= c.a_percentile && score >= c.a_floor {
            Grade::A
        } else if score >= c.b_floor {
            Grade::B
        } else if score >= c.c_floor {
            Grade::C
        } else {
            Grade::D
        }
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(GradingSection::default())
    }
}
