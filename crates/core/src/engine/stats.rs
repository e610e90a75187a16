//! Slice-based statistics and ranking primitives shared by the metrics
//! computer and the risk scorer.

/// Arithmetic mean. None on empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). None when fewer than two
/// observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Day-over-day percent changes: return[T] = (close[T] - close[T-1]) / close[T-1].
///
/// The first day has no prior close and therefore no return; output length
/// is input length - 1. The shift keeps day T's close out of day T's own
/// return (look-ahead bias).
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// Last `window` elements, or the whole slice when shorter.
pub fn trailing(values: &[f64], window: usize) -> &[f64] {
    &values[values.len().saturating_sub(window)..]
}

/// Worst peak-to-trough decline over the given prices, as a fraction <= 0.
///
/// Drawdown on each day is (price - running_max) / running_max; the result
/// is the most negative value observed. 0.0 for non-decreasing (or empty)
/// input.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for &price in prices {
        if price > peak {
            peak = price;
        }
        let drawdown = (price - peak) / peak;
        if drawdown < worst {
            worst = drawdown;
        }
    }
    worst
}

/// Fractional ascending rank of each value within the slice: 1.0 for the
/// single largest value, 1/n for the single smallest. Tied values receive
/// the average of their tied positions, so two values tied at ascending
/// positions 3 and 4 of 10 both get 0.35.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut out = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based positions i+1..=j+1 share their average position.
        let avg_position = (i + j + 2) as f64 / 2.0;
        for k in i..=j {
            out[order[k]] = avg_position / n as f64;
        }
        i = j + 1;
    }
    out
}

/// Competition (minimum-method) rank in descending order: the largest value
/// gets rank 1, ties share the lowest ordinal of their group, and the
/// sequence skips ahead by the group size.
pub fn competition_ranks(values: &[f64]) -> Vec<i32> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let mut out = vec![0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        for k in i..=j {
            out[order[k]] = (i + 1) as i32;
        }
        i = j + 1;
    }
    out
}
