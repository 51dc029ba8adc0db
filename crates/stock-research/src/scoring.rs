//! Deterministic scorecard from a metrics table
//!
//! Every sub-score lies in [0, 100]. Unknown inputs score a neutral 50 so a
//! sparse table still produces a scorecard.

use crate::config::ScoringWeights;
use crate::models::{MetricsTable, Scorecard};

const NEUTRAL: f64 = 50.0;

/// Round half away from zero to two decimals
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lower is better: 100 at or below `good_below`, 0 at or above `bad_above`
fn score_inverse(value: Option<f64>, good_below: f64, bad_above: f64) -> f64 {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return NEUTRAL;
    };
    if value <= good_below {
        100.0
    } else if value >= bad_above {
        0.0
    } else {
        (100.0 - (value - good_below) / (bad_above - good_below) * 100.0).max(0.0)
    }
}

/// Higher is better: 0 at or below `bad_below`, 100 at or above `good_above`
fn score_direct(value: Option<f64>, bad_below: f64, good_above: f64) -> f64 {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return NEUTRAL;
    };
    if value <= bad_below {
        0.0
    } else if value >= good_above {
        100.0
    } else {
        ((value - bad_below) / (good_above - bad_below) * 100.0).min(100.0)
    }
}

fn mean_rounded(scores: &[f64]) -> f64 {
    round2(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Cheap valuation multiples score higher
pub fn score_value(metrics: &MetricsTable) -> f64 {
    mean_rounded(&[
        score_inverse(metrics.pe, 12.0, 45.0),
        score_inverse(metrics.ps, 1.5, 15.0),
        score_inverse(metrics.ev_ebitda, 8.0, 40.0),
    ])
}

pub fn score_growth(metrics: &MetricsTable) -> f64 {
    mean_rounded(&[
        score_direct(metrics.revenue_yoy, -5.0, 30.0),
        score_direct(metrics.eps_yoy, -10.0, 35.0),
        score_direct(metrics.forward_eps_growth, 0.0, 25.0),
        score_direct(metrics.revenue_cagr_3y, 0.0, 20.0),
    ])
}

/// Profitability and leverage
pub fn score_quality(metrics: &MetricsTable) -> f64 {
    mean_rounded(&[
        score_direct(metrics.net_margin, 0.05, 0.25),
        score_direct(metrics.roe, 0.05, 0.3),
        score_inverse(metrics.debt_equity, 0.3, 2.0),
    ])
}

/// Proxy from drawdown and volatility; no trend signal is used
pub fn score_momentum(metrics: &MetricsTable) -> f64 {
    mean_rounded(&[
        score_inverse(metrics.drawdown_risk, 10.0, 60.0),
        score_inverse(metrics.volatility_proxy, 1.5, 7.0),
    ])
}

/// Higher means less risky
pub fn score_risk(metrics: &MetricsTable) -> f64 {
    mean_rounded(&[
        score_inverse(metrics.beta, 0.8, 2.0),
        score_inverse(metrics.drawdown_risk, 10.0, 70.0),
        score_inverse(metrics.debt_equity, 0.4, 2.5),
    ])
}

/// All five sub-scores and their weighted composite
pub fn composite_score(metrics: &MetricsTable, weights: &ScoringWeights) -> Scorecard {
    let value = score_value(metrics);
    let growth = score_growth(metrics);
    let quality = score_quality(metrics);
    let momentum = score_momentum(metrics);
    let risk = score_risk(metrics);

    let weighted = value * weights.value
        + growth * weights.growth
        + quality * weights.quality
        + momentum * weights.momentum
        + risk * weights.risk;

    Scorecard {
        value,
        growth,
        quality,
        momentum,
        risk,
        composite: round2(weighted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong() -> MetricsTable {
        MetricsTable {
            pe: Some(10.0),
            ps: Some(1.0),
            ev_ebitda: Some(6.0),
            revenue_yoy: Some(35.0),
            eps_yoy: Some(40.0),
            forward_eps_growth: Some(30.0),
            revenue_cagr_3y: Some(25.0),
            net_margin: Some(0.3),
            roe: Some(0.35),
            debt_equity: Some(0.2),
            drawdown_risk: Some(5.0),
            volatility_proxy: Some(1.0),
            beta: Some(0.7),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_metrics_are_neutral() {
        let card = composite_score(&MetricsTable::default(), &ScoringWeights::default());
        assert_eq!(card.value, 50.0);
        assert_eq!(card.growth, 50.0);
        assert_eq!(card.quality, 50.0);
        assert_eq!(card.momentum, 50.0);
        assert_eq!(card.risk, 50.0);
        assert_eq!(card.composite, 50.0);
    }

    #[test]
    fn test_strong_metrics_max_out() {
        let card = composite_score(&strong(), &ScoringWeights::default());
        assert_eq!(card.value, 100.0);
        assert_eq!(card.growth, 100.0);
        assert_eq!(card.quality, 100.0);
        assert_eq!(card.momentum, 100.0);
        assert_eq!(card.risk, 100.0);
        assert_eq!(card.composite, 100.0);
    }

    #[test]
    fn test_linear_interpolation() {
        assert_eq!(score_inverse(Some(28.5), 12.0, 45.0), 50.0);
        assert_eq!(score_direct(Some(12.5), -5.0, 30.0), 50.0);
        assert_eq!(score_inverse(Some(100.0), 12.0, 45.0), 0.0);
        assert_eq!(score_direct(Some(-20.0), -5.0, 30.0), 0.0);
    }

    #[test]
    fn test_non_finite_inputs_are_neutral() {
        assert_eq!(score_direct(Some(f64::NAN), 0.0, 20.0), 50.0);
        assert_eq!(score_inverse(Some(f64::NAN), 12.0, 45.0), 50.0);
        assert_eq!(score_direct(Some(f64::INFINITY), 0.0, 20.0), 50.0);

        let metrics = MetricsTable {
            revenue_cagr_3y: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(score_growth(&metrics), 50.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let extremes = [-1e9, -50.0, 0.0, 0.5, 15.0, 1e9];
        for &v in &extremes {
            let metrics = MetricsTable {
                pe: Some(v),
                ps: Some(v),
                revenue_yoy: Some(v),
                net_margin: Some(v),
                debt_equity: Some(v),
                drawdown_risk: Some(v),
                volatility_proxy: Some(v),
                beta: Some(v),
                ..Default::default()
            };
            let card = composite_score(&metrics, &ScoringWeights::default());
            for score in [card.value, card.growth, card.quality, card.momentum, card.risk, card.composite] {
                assert!((0.0..=100.0).contains(&score), "{score} out of range for input {v}");
            }
        }
    }

    #[test]
    fn test_composite_is_deterministic_and_rounded() {
        let metrics = MetricsTable {
            pe: Some(23.0),
            revenue_yoy: Some(7.3),
            roe: Some(0.17),
            drawdown_risk: Some(18.2),
            ..Default::default()
        };
        let weights = ScoringWeights::default();

        let first = composite_score(&metrics, &weights);
        let second = composite_score(&metrics, &weights);
        assert_eq!(first, second);
        assert_eq!(first.composite, round2(first.composite));
        assert_eq!(first.value, round2(first.value));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(63.745_000_1), 63.75);
        assert_eq!(round2(58.0), 58.0);
        assert_eq!(round2(-1.234), -1.23);
    }
}
