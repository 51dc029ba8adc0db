//! Buy/Hold/Sell classification of a composite score

use serde::Serialize;

use crate::models::{RiskProfile, Scorecard, Signal};
use crate::scoring::round2;

/// Composite cut-offs for one risk profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub buy: f64,
    pub sell: f64,
}

impl Thresholds {
    pub fn for_profile(profile: RiskProfile) -> Self {
        match profile {
            RiskProfile::Aggressive => Self { buy: 65.0, sell: 40.0 },
            RiskProfile::Moderate => Self { buy: 70.0, sell: 45.0 },
            RiskProfile::Conservative => Self { buy: 75.0, sell: 50.0 },
        }
    }

    fn midpoint(self) -> f64 {
        (self.buy + self.sell) / 2.0
    }
}

/// Classify a scorecard and attach a confidence in [0, 100]
///
/// Buy confidence is the composite itself, Sell confidence its complement.
/// Hold starts at 60 and grows with the distance from the band midpoint.
pub fn generate_signal(scorecard: &Scorecard, risk_profile: RiskProfile) -> (Signal, f64) {
    let thresholds = Thresholds::for_profile(risk_profile);
    let score = scorecard.composite;

    if score >= thresholds.buy {
        (Signal::Buy, round2(score).min(100.0))
    } else if score <= thresholds.sell {
        (Signal::Sell, round2(100.0 - score).min(100.0))
    } else {
        (
            Signal::Hold,
            round2(60.0 + (score - thresholds.midpoint()).abs() / 2.0),
        )
    }
}
