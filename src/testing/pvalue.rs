//! P-value calculation from test statistics

use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

/// Two-sided p-value of a standard normal statistic.
pub fn normal_pvalue(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

/// Upper-tail p-value of a chi-squared statistic with `df` degrees of freedom.
///
/// `df == 0` means the models are identical and yields 1.
pub fn chi_squared_pvalue(stat: f64, df: usize) -> f64 {
    if !stat.is_finite() {
        return f64::NAN;
    }
    if df == 0 {
        return 1.0;
    }
    match ChiSquared::new(df as f64) {
        Ok(dist) => dist.sf(stat.max(0.0)),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_pvalue_symmetric() {
        assert!((normal_pvalue(2.0) - normal_pvalue(-2.0)).abs() < 1e-15);
    }

    #[test]
    fn test_normal_pvalue_known() {
        assert!((normal_pvalue(0.0) - 1.0).abs() < 1e-12);
        assert!((normal_pvalue(1.959964) - 0.05).abs() < 1e-6);
        assert!(normal_pvalue(f64::NAN).is_nan());
    }

    #[test]
    fn test_chi_squared_pvalue() {
        assert!((chi_squared_pvalue(3.841459, 1) - 0.05).abs() < 1e-6);
        assert!((chi_squared_pvalue(5.991465, 2) - 0.05).abs() < 1e-6);
        assert!((chi_squared_pvalue(0.0, 1) - 1.0).abs() < 1e-12);
        assert_eq!(chi_squared_pvalue(12.0, 0), 1.0);
    }
}
