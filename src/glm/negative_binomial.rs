//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Lower bound on fitted means during IRLS
pub const MIN_MU: f64 = 0.5;

/// Any |beta| above this (natural log scale) marks the fit as diverging
pub const MAX_BETA: f64 = 30.0;

/// Clamp on the linear predictor to keep `exp` finite
const MAX_ETA: f64 = 700.0;

/// Mean from linear predictor and size factor: `mu = s * exp(eta)`
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// Log probability of `y` under NB with mean `mu` and dispersion `alpha`.
///
/// Uses size `r = 1 / alpha`:
/// `lgamma(y + r) - lgamma(r) - lgamma(y + 1) - r * ln(1 + alpha mu) + y * ln(alpha mu / (1 + alpha mu))`
pub fn nb_log_likelihood(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let r = 1.0 / alpha;
    let am = alpha * mu;
    ln_gamma(y + r) - ln_gamma(r) - ln_gamma(y + 1.0) - r * am.ln_1p() + y * (am.ln() - am.ln_1p())
}

/// IRLS weight `mu / (1 + alpha mu)`; `mu` already floored at [`MIN_MU`].
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0_f64.exp()).abs() < 1e-10);
    }

    #[test]
    fn test_poisson_limit() {
        // alpha -> 0 approaches the Poisson log pmf
        let y: f64 = 5.0;
        let mu: f64 = 4.0;
        let poisson = y * mu.ln() - mu - ln_gamma(y + 1.0);
        let nb = nb_log_likelihood(y, mu, 1e-6);
        assert!((nb - poisson).abs() < 1e-4, "{} vs {}", nb, poisson);
    }

    #[test]
    fn test_geometric_case() {
        // alpha = 1 is geometric: P(0) = 1 / (1 + mu)
        let ll = nb_log_likelihood(0.0, 3.0, 1.0);
        assert!((ll - (0.25f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_nb_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-10);
    }
}
