//! Normalization of fundamentals and price history into a [`MetricsTable`]

use crate::models::{FundamentalsSnapshot, MetricsTable, PriceBar, sorted_closes};

/// Compound annual growth rate in percent over the trailing `years`
///
/// Uses `values[len - years - 1]` as the start and the last value as the end.
/// `None` when the history is too short, the start is not positive, or the
/// series changes sign.
pub fn safe_cagr(values: &[f64], years: usize) -> Option<f64> {
    if years == 0 || values.len() < years + 1 {
        return None;
    }

    let start = values[values.len() - years - 1];
    let end = *values.last()?;
    if start <= 0.0 || end / start <= 0.0 {
        return None;
    }

    let cagr = ((end / start).powf(1.0 / years as f64) - 1.0) * 100.0;
    cagr.is_finite().then_some(cagr)
}

/// Mean of whichever margins are known
pub fn margin_trend(
    gross_margin: Option<f64>,
    operating_margin: Option<f64>,
    net_margin: Option<f64>,
) -> Option<f64> {
    let margins: Vec<f64> = [gross_margin, operating_margin, net_margin]
        .into_iter()
        .flatten()
        .collect();

    if margins.is_empty() {
        None
    } else {
        Some(margins.iter().sum::<f64>() / margins.len() as f64)
    }
}

/// Mean absolute day-over-day close change in percent
pub fn volatility_proxy(bars: &[PriceBar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }

    let returns: Vec<f64> = sorted_closes(bars)
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| ((pair[1] - pair[0]) / pair[0]).abs() * 100.0)
        .collect();

    if returns.is_empty() {
        return None;
    }
    Some(returns.iter().sum::<f64>() / returns.len() as f64)
}

/// Largest peak-to-trough decline in percent
pub fn drawdown_risk(bars: &[PriceBar]) -> Option<f64> {
    let closes = sorted_closes(bars);
    let mut peak = *closes.first()?;
    let mut max_drawdown = 0.0_f64;

    for close in closes {
        peak = peak.max(close);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - close) / peak * 100.0);
        }
    }

    Some(max_drawdown)
}

/// Build the metrics table from whatever data is available
///
/// Without fundamentals only the price-derived fields are filled in.
pub fn compute_metrics(fundamentals: Option<&FundamentalsSnapshot>, bars: &[PriceBar]) -> MetricsTable {
    let volatility_proxy = volatility_proxy(bars);
    let drawdown_risk = drawdown_risk(bars);

    let Some(f) = fundamentals else {
        return MetricsTable {
            volatility_proxy,
            drawdown_risk,
            ..MetricsTable::default()
        };
    };

    MetricsTable {
        revenue_yoy: f.revenue_yoy,
        revenue_cagr_3y: safe_cagr(&f.revenue_history, 3),
        revenue_cagr_5y: safe_cagr(&f.revenue_history, 5),
        eps_yoy: f.eps_yoy,
        forward_eps_growth: f.forward_eps_growth,
        margin_trend: margin_trend(f.gross_margin, f.operating_margin, f.net_margin),
        gross_margin: f.gross_margin,
        operating_margin: f.operating_margin,
        net_margin: f.net_margin,
        roe: f.roe,
        // No separate ROIC feed; ROE stands in.
        roic: f.roe,
        debt_equity: f.debt_to_equity,
        pe: f.pe,
        forward_pe: f.forward_pe,
        ps: f.ps,
        ev_ebitda: f.ev_ebitda,
        beta: f.beta,
        volatility_proxy,
        drawdown_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .zip(0u64..)
            .map(|(&close, i)| PriceBar {
                date: start.checked_add_days(Days::new(i)).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_safe_cagr() {
        let history = [100.0, 110.0, 121.0, 133.1];
        let cagr = safe_cagr(&history, 3).unwrap();
        assert!((cagr - 10.0).abs() < 1e-9);

        assert_eq!(safe_cagr(&history, 5), None);
        assert_eq!(safe_cagr(&[0.0, 1.0, 2.0, 3.0], 3), None);
        assert_eq!(safe_cagr(&[], 3), None);
    }

    #[test]
    fn test_safe_cagr_rejects_sign_change() {
        assert_eq!(safe_cagr(&[100.0, 50.0, 20.0, -10.0], 3), None);
        assert_eq!(safe_cagr(&[100.0, 50.0, 20.0, 0.0], 3), None);

        let fundamentals = FundamentalsSnapshot {
            revenue_history: vec![100.0, 50.0, 20.0, -10.0],
            ..Default::default()
        };
        let table = compute_metrics(Some(&fundamentals), &[]);
        assert_eq!(table.revenue_cagr_3y, None);
    }

    #[test]
    fn test_margin_trend() {
        assert_eq!(margin_trend(None, None, None), None);
        let trend = margin_trend(Some(0.4), None, Some(0.2)).unwrap();
        assert!((trend - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_proxy() {
        assert_eq!(volatility_proxy(&bars(&[100.0])), None);
        assert_eq!(volatility_proxy(&bars(&[0.0, 5.0])), None);

        let vol = volatility_proxy(&bars(&[100.0, 110.0, 99.0])).unwrap();
        assert!((vol - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_risk() {
        assert_eq!(drawdown_risk(&[]), None);

        let drawdown = drawdown_risk(&bars(&[100.0, 102.0, 99.0, 105.0, 103.0, 108.0, 107.0])).unwrap();
        assert!(drawdown >= 0.0);
        // worst decline is 102 -> 99
        assert!((drawdown - 3.0 / 102.0 * 100.0).abs() < 1e-9);

        assert_eq!(drawdown_risk(&bars(&[1.0, 2.0, 3.0, 4.0])), Some(0.0));
    }

    #[test]
    fn test_drawdown_ignores_input_order() {
        let mut shuffled = bars(&[100.0, 80.0, 90.0]);
        shuffled.swap(0, 2);
        assert_eq!(drawdown_risk(&shuffled), Some(20.0));
    }

    #[test]
    fn test_compute_metrics_without_fundamentals() {
        let table = compute_metrics(None, &bars(&[100.0, 90.0]));
        assert_eq!(table.drawdown_risk, Some(10.0));
        assert!(table.volatility_proxy.is_some());
        assert_eq!(table.pe, None);
        assert_eq!(table.revenue_cagr_3y, None);
    }

    #[test]
    fn test_compute_metrics_with_fundamentals() {
        let fundamentals = FundamentalsSnapshot {
            ticker: "AAPL".to_string(),
            pe: Some(28.0),
            roe: Some(0.45),
            debt_to_equity: Some(1.5),
            gross_margin: Some(0.44),
            net_margin: Some(0.25),
            revenue_history: vec![200.0, 220.0, 240.0, 260.0],
            ..Default::default()
        };

        let table = compute_metrics(Some(&fundamentals), &[]);
        assert_eq!(table.pe, Some(28.0));
        assert_eq!(table.roic, table.roe);
        assert_eq!(table.debt_equity, Some(1.5));
        assert!(table.revenue_cagr_3y.unwrap() > 0.0);
        assert_eq!(table.revenue_cagr_5y, None);
        assert_eq!(table.drawdown_risk, None);
        assert!((table.margin_trend.unwrap() - 0.345).abs() < 1e-12);
    }
}
