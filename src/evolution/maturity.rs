//! Seven-check maturity rating used to decide whether an agent is ready to
//! leave simulation. Independent of the health grade; it looks at stability
//! of style and emotion as well as raw results.

use crate::evolution::memory::MemoryStore;
use serde::{Deserialize, Serialize};

const RECENT_ROUNDS: usize = 5;
const EXPLOSIVE_RETURN_PCT: f64 = 8.0;
const MAX_RECENT_DRAWDOWN_PCT: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Eligible for a small live trial
    LiveTrial,
    /// Worth validating in a sandbox or with small size
    Sandbox,
    KeepEvolving,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaturityCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaturityReport {
    pub score: u32,
    pub checks: Vec<MaturityCheck>,
    pub recommendation: Recommendation,
}

impl MaturityReport {
    pub fn assess(memory: &MemoryStore) -> Self {
        let snap = memory.snapshot();
        let recent = memory.recent(RECENT_ROUNDS);
        let mut checks = Vec::with_capacity(7);

        let learning = memory.learning_score();
        checks.push(MaturityCheck {
            name: "learning",
            passed: learning >= 4,
            detail: format!("{}/{} recent rounds profitable", learning, RECENT_ROUNDS),
        });

        let last_three = memory.recent(3);
        let streak = last_three.len() == 3
            && last_three.iter().all(|e| e.performance.return_pct > 0.0);
        checks.push(MaturityCheck {
            name: "return_streak",
            passed: streak,
            detail: "last three rounds all positive".to_string(),
        });

        let mut styles: Vec<_> = recent.iter().map(|e| e.context.style).collect();
        let samples = styles.len();
        styles.sort();
        styles.dedup();
        checks.push(MaturityCheck {
            name: "style_stability",
            passed: samples >= 3 && styles.len() <= 2,
            detail: format!("{} distinct style(s) over {} round(s)", styles.len(), samples),
        });

        let emotions: Vec<_> = recent.iter().map(|e| e.context.emotion).collect();
        let emotion_stable = emotions
            .last()
            .map(|latest| emotions.iter().filter(|e| *e == latest).count() >= 3)
            .unwrap_or(false);
        checks.push(MaturityCheck {
            name: "emotion_stability",
            passed: emotion_stable,
            detail: match emotions.last() {
                Some(latest) => format!("latest emotion {}", latest),
                None => "no rounds recorded".to_string(),
            },
        });

        let seals = memory.sealed_indicators();
        checks.push(MaturityCheck {
            name: "no_seals",
            passed: seals.is_empty(),
            detail: if seals.is_empty() {
                "no sealed indicators".to_string()
            } else {
                format!(
                    "sealed: {}",
                    seals.into_iter().collect::<Vec<_>>().join(", ")
                )
            },
        });

        let explosive = snap
            .history
            .iter()
            .filter(|e| e.performance.return_pct >= EXPLOSIVE_RETURN_PCT)
            .count();
        checks.push(MaturityCheck {
            name: "explosive_rounds",
            passed: explosive > 0,
            detail: format!("{} round(s) at or above +{}%", explosive, EXPLOSIVE_RETURN_PCT),
        });

        let max_drawdown = recent
            .iter()
            .map(|e| e.performance.drawdown)
            .fold(0.0_f64, f64::max);
        checks.push(MaturityCheck {
            name: "drawdown_control",
            passed: max_drawdown <= MAX_RECENT_DRAWDOWN_PCT,
            detail: format!("max recent drawdown {:.2}%", max_drawdown),
        });

        let score = checks.iter().filter(|c| c.passed).count() as u32;
        let recommendation = match score {
            s if s >= 6 => Recommendation::LiveTrial,
            s if s >= 4 => Recommendation::Sandbox,
            _ => Recommendation::KeepEvolving,
        };

        Self {
            score,
            checks,
            recommendation,
        }
    }

    /// Star rendering, e.g. `★★★★☆☆☆`.
    pub fn stars(&self) -> String {
        let filled = self.score.min(7) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(7 - filled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::memory::RoundContext;
    use crate::models::fixtures::{agent, record};
    use crate::models::EmotionalTendency;
    use chrono::Utc;

    #[test]
    fn test_empty_memory_only_passes_structural_checks() {
        let report = MaturityReport::assess(&MemoryStore::default());
        // no seals and zero drawdown hold vacuously
        assert_eq!(report.score, 2);
        assert_eq!(report.recommendation, Recommendation::KeepEvolving);
        assert_eq!(report.stars(), "★★☆☆☆☆☆");
    }

    #[test]
    fn test_mature_agent_is_live_ready() {
        let mut store = MemoryStore::default();
        let mut a = agent();
        a.emotional_tendency = EmotionalTendency::Confident;
        for ret in [2.0, 3.0, 9.0, 2.5, 4.0] {
            store
                .append(&record(ret, 2.0), RoundContext::from_agent(&a, Utc::now()))
                .unwrap();
        }
        let report = MaturityReport::assess(&store);
        assert_eq!(report.score, 7);
        assert_eq!(report.recommendation, Recommendation::LiveTrial);
    }

    #[test]
    fn test_sealed_indicator_fails_check() {
        let mut store = MemoryStore::default();
        for _ in 0..10 {
            store
                .append(
                    &record(-1.0, 5.0).with_fail_indicators(["RSI"]),
                    RoundContext::from_agent(&agent(), Utc::now()),
                )
                .unwrap();
        }
        let report = MaturityReport::assess(&store);
        let seal = report.checks.iter().find(|c| c.name == "no_seals").unwrap();
        assert!(!seal.passed);
        assert_eq!(seal.detail, "sealed: RSI");
    }
}
