//! Vector similarity and summary statistics.

/// Cosine similarity `(a·b)/(‖a‖·‖b‖)`.
///
/// Returns 0.0 ("no signal") when the dimensions differ, either vector is
/// empty, or either has zero magnitude. Never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() { sim as f32 } else { 0.0 }
}

/// Cosine distance `1 - cosine_similarity`, the metric the stores report.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

/// Population standard deviation, `None` for an empty slice.
pub fn std_dev(values: &[f32]) -> Option<f32> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f32>() / values.len() as f32;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identical_vectors() {
        assert!(approx(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0));
        assert!(approx(cosine_distance(&[0.3, 0.4], &[0.3, 0.4]), 0.0));
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0));
        assert!(approx(cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]), 2.0));
    }

    #[test]
    fn test_no_signal_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert!(approx(mean(&[0.9, 0.9, 0.9]).unwrap(), 0.9));
        assert!(approx(std_dev(&[0.9, 0.9, 0.9]).unwrap(), 0.0));
        // Population form: [2, 4, 4, 4, 5, 5, 7, 9] has sigma exactly 2.
        assert!(approx(
            std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap(),
            2.0
        ));
    }
}
