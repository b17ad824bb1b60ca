//! Small descriptive statistics shared by the calibration stages.

/// Arithmetic mean and sample (n - 1) standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Moments {
    pub mean: f64,
    pub std: f64,
}

pub(crate) fn moments(values: &[f64]) -> Option<Moments> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(Moments {
        mean,
        std: (sum_sq / (n - 1.0)).sqrt(),
    })
}

/// Linearly interpolated quantile over an ascending slice, `pct` in [0, 100].
pub(crate) fn quantile_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let position = (sorted.len() - 1) as f64 * pct / 100.0;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub(crate) fn sorted_finite(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}
