//! Technical indicators over closing prices
//!
//! All functions are pure. A series too short for an indicator yields `None`
//! rather than a partial value.

use crate::models::{PriceBar, TechnicalSnapshot, sorted_closes};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const MACD_MIN_LEN: usize = MACD_SLOW + MACD_SIGNAL;

/// EMA smoothing factor
fn ema_multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Running EMA, `None` until `period` values have been seen
///
/// Element `i` equals the EMA of `values[..=i]`: seeded with the SMA of the
/// first `period` values, then `ema = (v - ema) * k + ema`.
fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }

    let multiplier = ema_multiplier(period);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(ema);

    for (i, &value) in values.iter().enumerate().skip(period) {
        ema = (value - ema) * multiplier + ema;
        result[i] = Some(ema);
    }

    result
}

/// Exponential moving average of the whole series
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied().flatten()
}

/// Relative Strength Index with Wilder smoothing
///
/// Needs more than `period` values. A window without losses reads 100.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = values
        .windows(2)
        .map(|pair| {
            let delta = pair[1] - pair[0];
            (delta.max(0.0), (-delta).max(0.0))
        })
        .unzip();

    let periods = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / periods;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / periods;

    for (gain, loss) in gains.iter().zip(&losses).skip(period) {
        avg_gain = (avg_gain * (periods - 1.0) + gain) / periods;
        avg_loss = (avg_loss * (periods - 1.0) + loss) / periods;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line (EMA12 - EMA26) and its EMA9 signal line
///
/// Both are `None` below 35 values.
pub fn macd(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.len() < MACD_MIN_LEN {
        return (None, None);
    }

    let fast = ema_series(values, MACD_FAST);
    let slow = ema_series(values, MACD_SLOW);
    let series: Vec<f64> = fast
        .iter()
        .zip(&slow)
        .filter_map(|(fast, slow)| Some((*fast)? - (*slow)?))
        .collect();

    match series.last() {
        Some(&line) => (Some(line), ema(&series, MACD_SIGNAL)),
        None => (None, None),
    }
}

/// Indicator snapshot for a bar series, in date order regardless of input order
pub fn compute_technicals(bars: &[PriceBar], source: impl Into<String>) -> TechnicalSnapshot {
    let closes = sorted_closes(bars);
    let (macd, macd_signal) = macd(&closes);

    TechnicalSnapshot {
        rsi: rsi(&closes, RSI_PERIOD),
        macd,
        macd_signal,
        ema_20: ema(&closes, 20),
        ema_50: ema(&closes, 50),
        ema_200: ema(&closes, 200),
        source: source.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn rising(n: usize) -> Vec<f64> {
        (1..=n).map(|v| v as f64).collect()
    }

    #[test]
    fn test_ema_needs_full_period() {
        assert_eq!(ema(&[1.0, 2.0], 3), None);
        assert_eq!(ema(&[1.0, 2.0, 3.0], 3), Some(2.0));
        assert_eq!(ema(&[1.0, 2.0, 3.0], 0), None);
    }

    #[test]
    fn test_ema_smoothing() {
        // seed 2.0, k = 0.5: (5 - 2) * 0.5 + 2
        assert_eq!(ema(&[1.0, 2.0, 3.0, 5.0], 3), Some(3.5));
    }

    #[test]
    fn test_rsi_uptrend_is_high() {
        let value = rsi(&rising(39), 14).unwrap();
        assert!(value > 60.0);
    }

    #[test]
    fn test_rsi_short_series() {
        assert_eq!(rsi(&rising(14), 14), None);
        assert!(rsi(&rising(15), 14).is_some());
    }

    #[test]
    fn test_rsi_mixed_series_is_bounded() {
        let values = [44.0, 44.3, 44.1, 43.6, 44.3, 44.8, 45.1, 45.4, 45.8, 46.1, 45.9, 46.3, 46.0, 46.4, 46.2, 45.6];
        let value = rsi(&values, 14).unwrap();
        assert!(value > 0.0 && value < 100.0);
    }

    #[test]
    fn test_macd_requires_35_values() {
        assert_eq!(macd(&rising(34)), (None, None));

        let (line, signal) = macd(&rising(35));
        assert!(line.unwrap() > 0.0);
        assert!(signal.is_some());
    }

    #[test]
    fn test_compute_technicals_sorts_bars() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut bars: Vec<PriceBar> = (0..60u64)
            .map(|i| {
                let close = 100.0 + i as f64;
                PriceBar {
                    date: start.checked_add_days(Days::new(i)).unwrap(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 0.0,
                }
            })
            .collect();
        bars.reverse();

        let snapshot = compute_technicals(&bars, "computed");
        assert_eq!(snapshot.source, "computed");
        assert_eq!(snapshot.rsi, Some(100.0));
        assert!(snapshot.ema_20.unwrap() > snapshot.ema_50.unwrap());
        assert_eq!(snapshot.ema_200, None);
        assert!(snapshot.macd.is_some());
    }
}
