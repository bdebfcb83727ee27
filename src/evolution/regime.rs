//! Market regime classification from volatility and trend signals.

use crate::models::MarketRegimeInput;
use serde::{Deserialize, Serialize};
use std::fmt;

const TREND_SCORE_HIGH: f64 = 0.6;
const TREND_VOLATILITY_MIN: f64 = 5.0;
const VOLATILE_THRESHOLD: f64 = 6.0;
const TREND_SCORE_LOW: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeType {
    Trend,
    Volatile,
    Sideway,
    Stable,
}

impl RegimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeType::Trend => "trend",
            RegimeType::Volatile => "volatile",
            RegimeType::Sideway => "sideway",
            RegimeType::Stable => "stable",
        }
    }
}

impl fmt::Display for RegimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RegimeClassifier;

impl RegimeClassifier {
    /// First matching rule wins: a strong trend takes priority over raw
    /// volatility even when both thresholds are met.
    ///
    /// Total over all reals. NaN fails every comparison.
    pub fn classify(btc_volatility: f64, trend_score: f64) -> RegimeType {
        if trend_score > TREND_SCORE_HIGH && btc_volatility > TREND_VOLATILITY_MIN {
            RegimeType::Trend
        } else if btc_volatility > VOLATILE_THRESHOLD {
            RegimeType::Volatile
        } else if trend_score < TREND_SCORE_LOW {
            RegimeType::Sideway
        } else {
            RegimeType::Stable
        }
    }

    /// Classify a market status record. A missing record or a missing field
    /// means no signal, which is a stable market.
    pub fn classify_input(input: Option<&MarketRegimeInput>) -> RegimeType {
        match input {
            Some(MarketRegimeInput {
                btc_volatility: Some(vol),
                trend_score: Some(trend),
            }) => Self::classify(*vol, *trend),
            _ => RegimeType::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_beats_volatile() {
        assert_eq!(RegimeClassifier::classify(7.0, 0.7), RegimeType::Trend);
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(RegimeClassifier::classify(7.0, 0.3), RegimeType::Volatile);
        assert_eq!(RegimeClassifier::classify(3.0, 0.3), RegimeType::Sideway);
        assert_eq!(RegimeClassifier::classify(3.0, 0.5), RegimeType::Stable);
    }

    #[test]
    fn test_boundaries_are_strict() {
        // trend_score exactly 0.6 is not a trend
        assert_eq!(RegimeClassifier::classify(5.5, 0.6), RegimeType::Stable);
        // volatility exactly 6 is not volatile
        assert_eq!(RegimeClassifier::classify(6.0, 0.5), RegimeType::Stable);
        // trend_score exactly 0.4 is not sideway
        assert_eq!(RegimeClassifier::classify(1.0, 0.4), RegimeType::Stable);
    }

    #[test]
    fn test_total_over_odd_inputs() {
        assert_eq!(RegimeClassifier::classify(-3.0, 0.5), RegimeType::Stable);
        assert_eq!(RegimeClassifier::classify(f64::NAN, f64::NAN), RegimeType::Stable);
        assert_eq!(RegimeClassifier::classify(f64::INFINITY, 0.5), RegimeType::Volatile);
    }

    #[test]
    fn test_missing_input_is_stable() {
        assert_eq!(RegimeClassifier::classify_input(None), RegimeType::Stable);
        let partial = MarketRegimeInput {
            btc_volatility: Some(8.0),
            trend_score: None,
        };
        assert_eq!(
            RegimeClassifier::classify_input(Some(&partial)),
            RegimeType::Stable
        );
        let full = MarketRegimeInput::new(8.0, 0.2);
        assert_eq!(
            RegimeClassifier::classify_input(Some(&full)),
            RegimeType::Volatile
        );
    }
}
