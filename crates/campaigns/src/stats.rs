use crate::types::SignificanceResult;

/// Standard normal CDF via the Abramowitz-Stegun approximation, accurate to
/// ~1e-7 — enough for a confidence-level cutoff, no stats crate needed.
fn normal_cdf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * z.abs());
    let poly = t * (0.319381530 + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let phi = 1.0 - (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt() * poly;
    if z >= 0.0 {
        phi
    } else {
        1.0 - phi
    }
}

fn z_critical_for_confidence(confidence_level: f64) -> f64 {
    // two-tailed critical value: Phi(z) = 1 - (1 - confidence) / 2
    let target = 1.0 - (1.0 - confidence_level) / 2.0;
    // bisection over normal_cdf, which is monotonic
    let (mut lo, mut hi) = (0.0_f64, 6.0_f64);
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        if normal_cdf(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Two-proportion z-test for conversion rate between two campaign variants
/// (spec §4.10 step 4). `conversions`/`n` are per-variant counts; declares a
/// winner when the pooled z-score exceeds the critical value for
/// `confidence_level` (e.g. 0.95).
pub fn two_proportion_test(
    key_a: &str,
    conversions_a: u64,
    n_a: u64,
    key_b: &str,
    conversions_b: u64,
    n_b: u64,
    confidence_level: f64,
) -> Option<SignificanceResult> {
    if n_a == 0 || n_b == 0 {
        return None;
    }
    let (ca, cb) = (conversions_a as f64, conversions_b as f64);
    let (na, nb) = (n_a as f64, n_b as f64);
    let p_a = ca / na;
    let p_b = cb / nb;
    let pooled = (ca + cb) / (na + nb);
    let se = (pooled * (1.0 - pooled) * (1.0 / na + 1.0 / nb)).sqrt();
    if se == 0.0 {
        return None;
    }
    let z = (p_a - p_b) / se;
    let critical = z_critical_for_confidence(confidence_level);
    let significant = z.abs() >= critical;
    let winner = if significant {
        Some(if p_a > p_b { key_a.to_string() } else { key_b.to_string() })
    } else {
        None
    };
    Some(SignificanceResult { z_score: z, confidence_level, significant, winner })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_clear_winner() {
        let result = two_proportion_test("a", 5, 500, "b", 80, 500, 0.95).unwrap();
        assert!(result.significant);
        assert_eq!(result.winner.as_deref(), Some("b"));
    }

    #[test]
    fn no_winner_when_close() {
        let result = two_proportion_test("a", 50, 500, "b", 52, 500, 0.95).unwrap();
        assert!(!result.significant);
        assert!(result.winner.is_none());
    }
}
