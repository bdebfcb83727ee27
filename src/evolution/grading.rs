//! Health grading over the recent memory window.
//!
//! Each check adds a fixed amount to an integer score; there is no partial
//! credit. The grade is a threshold lookup on that score and each grade maps
//! to a fixed advisory string.

use crate::error::{EvolutionError, Result};
use crate::evolution::memory::MemoryStore;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

pub const DEFAULT_GRADING_WINDOW: usize = 20;
pub const MAX_SCORE: u32 = 7;

const STABLE_RETURN_STD: f64 = 3.0;
const LEARNING_SCORE_MIN: u32 = 4;
const FAIL_COUNT_MAX: u64 = 10;

/// Ordered health grade, `C < B < A < S+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    B,
    A,
    #[serde(rename = "S+")]
    SPlus,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 6 => Grade::SPlus,
            s if s >= 4 => Grade::A,
            s if s >= 2 => Grade::B,
            _ => Grade::C,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::C => "C",
            Grade::B => "B",
            Grade::A => "A",
            Grade::SPlus => "S+",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Grade::SPlus => {
                "At target performance: hold parameters and consider a small live trial."
            }
            Grade::A => "Promising trajectory: keep fine-tuning and validate in a sandbox.",
            Grade::B => "Mixed results: continue evolving with moderate mutation.",
            Grade::C => "Underperforming: reset strategy parameters and keep observing.",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    /// Fewer than two samples; never counts as favorable.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub return_trend: TrendDirection,
    pub drawdown_trend: TrendDirection,
    pub return_std: f64,
    pub fail_count: u64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: Grade,
    pub score: u32,
    pub trend_report: TrendReport,
    pub advice: String,
}

/// Self-evaluation record written next to the agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfEvaluation {
    pub evolution_grade: Grade,
    pub trend_score: u32,
    pub trend_report: TrendReport,
    pub evolution_advice: String,
}

impl From<&GradeResult> for SelfEvaluation {
    fn from(result: &GradeResult) -> Self {
        Self {
            evolution_grade: result.grade,
            trend_score: result.score,
            trend_report: result.trend_report.clone(),
            evolution_advice: result.advice.clone(),
        }
    }
}

impl From<SelfEvaluation> for GradeResult {
    fn from(eval: SelfEvaluation) -> Self {
        Self {
            grade: eval.evolution_grade,
            score: eval.trend_score,
            trend_report: eval.trend_report,
            advice: eval.evolution_advice,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Most recent history entries considered
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    DEFAULT_GRADING_WINDOW
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_GRADING_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradingEngine {
    config: GradingConfig,
}

impl GradingEngine {
    pub fn new(config: GradingConfig) -> Self {
        Self { config }
    }

    pub fn grade(&self, memory: &MemoryStore) -> Result<GradeResult> {
        let report = self.trend_report(memory)?;

        let mut score = 0;
        if report.return_trend == TrendDirection::Up {
            score += 2;
        }
        if report.drawdown_trend == TrendDirection::Down {
            score += 2;
        }
        if report.return_std < STABLE_RETURN_STD {
            score += 1;
        }
        if memory.learning_score() >= LEARNING_SCORE_MIN {
            score += 1;
        }
        if report.fail_count < FAIL_COUNT_MAX {
            score += 1;
        }

        let grade = Grade::from_score(score);
        Ok(GradeResult {
            grade,
            score,
            trend_report: report,
            advice: grade.advice().to_string(),
        })
    }

    pub fn trend_report(&self, memory: &MemoryStore) -> Result<TrendReport> {
        let window = memory.recent(self.config.window);
        if window.is_empty() {
            return Err(EvolutionError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let returns: Vec<f64> = window.iter().map(|e| e.performance.return_pct).collect();
        let drawdowns: Vec<f64> = window.iter().map(|e| e.performance.drawdown).collect();

        let return_trend = match (returns.first(), returns.last()) {
            (Some(oldest), Some(newest)) if returns.len() >= 2 => {
                if newest > oldest {
                    TrendDirection::Up
                } else {
                    TrendDirection::Down
                }
            }
            _ => TrendDirection::Unknown,
        };

        let drawdown_trend = match (drawdowns.first(), drawdowns.last()) {
            (Some(oldest), Some(newest)) if drawdowns.len() >= 2 => {
                if newest < oldest {
                    TrendDirection::Down
                } else {
                    TrendDirection::Up
                }
            }
            _ => TrendDirection::Unknown,
        };

        let return_std = if returns.len() >= 2 {
            returns.iter().std_dev()
        } else {
            0.0
        };

        Ok(TrendReport {
            return_trend,
            drawdown_trend,
            return_std,
            fail_count: memory.total_fail_count(),
            samples: window.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::memory::RoundContext;
    use crate::models::fixtures::{agent, record};
    use chrono::Utc;

    fn store_with(rounds: &[(f64, f64)]) -> MemoryStore {
        let mut store = MemoryStore::default();
        for (ret, dd) in rounds {
            store
                .append(&record(*ret, *dd), RoundContext::from_agent(&agent(), Utc::now()))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_empty_history_is_insufficient_data() {
        let err = GradingEngine::default()
            .grade(&MemoryStore::default())
            .unwrap_err();
        assert!(matches!(err, EvolutionError::InsufficientData { .. }));
    }

    #[test]
    fn test_perfect_trajectory_scores_seven() {
        let store = store_with(&[(1.0, 5.0), (2.0, 4.0), (3.0, 3.0), (4.0, 2.0), (5.0, 1.0)]);
        let result = GradingEngine::default().grade(&store).unwrap();
        assert_eq!(result.trend_report.return_trend, TrendDirection::Up);
        assert_eq!(result.trend_report.drawdown_trend, TrendDirection::Down);
        assert!(result.trend_report.return_std < 3.0);
        assert_eq!(result.score, 7);
        assert_eq!(result.grade, Grade::SPlus);
        assert_eq!(result.advice, Grade::SPlus.advice());
    }

    #[test]
    fn test_single_sample_trends_unknown() {
        let store = store_with(&[(2.0, 1.0)]);
        let result = GradingEngine::default().grade(&store).unwrap();
        assert_eq!(result.trend_report.return_trend, TrendDirection::Unknown);
        assert_eq!(result.trend_report.drawdown_trend, TrendDirection::Unknown);
        assert_eq!(result.trend_report.return_std, 0.0);
        // std < 3 and fail_count < 10 only
        assert_eq!(result.score, 2);
        assert_eq!(result.grade, Grade::B);
    }

    #[test]
    fn test_declining_volatile_history_grades_c() {
        let mut store = MemoryStore::default();
        for (ret, dd) in [(10.0, 1.0), (-8.0, 6.0), (4.0, 7.0), (-9.0, 9.0)] {
            store
                .append(
                    &record(ret, dd).with_fail_indicators(["RSI", "MACD", "MA"]),
                    RoundContext::from_agent(&agent(), Utc::now()),
                )
                .unwrap();
        }
        let result = GradingEngine::default().grade(&store).unwrap();
        assert_eq!(result.trend_report.fail_count, 12);
        assert_eq!(result.score, 0);
        assert_eq!(result.grade, Grade::C);
    }

    #[test]
    fn test_window_limits_samples() {
        let rounds: Vec<(f64, f64)> = (0..25).map(|i| (i as f64 * 0.1, 2.0)).collect();
        let store = store_with(&rounds);
        let report = GradingEngine::default().trend_report(&store).unwrap();
        assert_eq!(report.samples, 20);
    }

    #[test]
    fn test_grade_ordering_and_thresholds() {
        assert!(Grade::C < Grade::B && Grade::B < Grade::A && Grade::A < Grade::SPlus);
        assert_eq!(Grade::from_score(7), Grade::SPlus);
        assert_eq!(Grade::from_score(6), Grade::SPlus);
        assert_eq!(Grade::from_score(5), Grade::A);
        assert_eq!(Grade::from_score(3), Grade::B);
        assert_eq!(Grade::from_score(1), Grade::C);
        assert_eq!(serde_json::to_string(&Grade::SPlus).unwrap(), "\"S+\"");
    }

    #[test]
    fn test_self_evaluation_conversion() {
        let store = store_with(&[(1.0, 2.0), (2.0, 1.0)]);
        let result = GradingEngine::default().grade(&store).unwrap();
        let eval = SelfEvaluation::from(&result);
        assert_eq!(eval.evolution_grade, result.grade);
        assert_eq!(GradeResult::from(eval), result);
    }
}
