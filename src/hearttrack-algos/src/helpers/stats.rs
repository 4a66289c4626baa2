pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0_f64
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation (divides by `n`, not `n - 1`).
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        0_f64
    } else {
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn mean_basic() {
        assert!((mean(&[70.0, 71.0, 69.0]) - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn std_dev_is_population() {
        // [2,4,4,4,5,5,7,9]: population sd = 2, sample sd would be ~2.14
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert!((std_dev(&values, m) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn std_dev_of_constant_is_zero() {
        assert_eq!(std_dev(&[98.0, 98.0, 98.0], 98.0), 0.0);
    }

    #[test]
    fn std_dev_of_empty_is_zero() {
        assert_eq!(std_dev(&[], 0.0), 0.0);
    }
}
