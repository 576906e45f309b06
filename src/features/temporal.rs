/// Fraction of adjacent sample pairs whose sign differs; zero counts as positive.
pub(crate) fn zero_crossing_rate(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / frame.len() as f64
}

pub(crate) fn rms(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f64 = frame.iter().map(|&s| (s as f64).powi(2)).sum();
    (energy / frame.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_signal_crosses_every_sample() {
        let frame: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((zero_crossing_rate(&frame) - 0.99).abs() < 1e-12);
        assert!((rms(&frame) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn silence_has_no_crossings() {
        assert_eq!(zero_crossing_rate(&[0.0; 64]), 0.0);
        assert_eq!(rms(&[0.0; 64]), 0.0);
    }
}
