//! Two-proportion z-test with a minimum-sample and minimum-effect-size
//! gate, per the significance decision rule. Pure numeric functions, no
//! I/O -- easy to check against known values.

use crate::domain::ABGroup;
use crate::config::ABTestSettings;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SignificanceResult {
    pub z: f64,
    pub p_value: f64,
    pub effect_size: f64,
    pub ctr_control: f64,
    pub ctr_treatment: f64,
    pub significant: bool,
    pub winner: Option<ABGroup>,
    pub reason: &'static str,
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 approximation
/// to the complementary error function (accurate to ~1.5e-7).
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Two-proportion z-test on CTR, with the minimum-sample and
/// minimum-relative-effect gates from the decision rule.
pub fn significance_test(
    n_control: u64,
    x_control: u64,
    n_treatment: u64,
    x_treatment: u64,
    settings: &ABTestSettings,
) -> SignificanceResult {
    let n1 = n_control as f64;
    let x1 = x_control as f64;
    let n2 = n_treatment as f64;
    let x2 = x_treatment as f64;

    let ctr_control = if n1 > 0.0 { x1 / n1 } else { 0.0 };
    let ctr_treatment = if n2 > 0.0 { x2 / n2 } else { 0.0 };

    if n_control < settings.min_sample_per_group || n_treatment < settings.min_sample_per_group {
        return SignificanceResult {
            z: 0.0,
            p_value: 1.0,
            effect_size: relative_effect(ctr_control, ctr_treatment),
            ctr_control,
            ctr_treatment,
            significant: false,
            winner: None,
            reason: "insufficient_sample",
        };
    }

    let p_pooled = (x1 + x2) / (n1 + n2);
    let se = (p_pooled * (1.0 - p_pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    let z = if se > 0.0 { (ctr_treatment - ctr_control) / se } else { 0.0 };
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));
    let effect_size = relative_effect(ctr_control, ctr_treatment);

    let significant =
        p_value < settings.significance_alpha && effect_size.abs() >= settings.min_relative_effect;

    let winner = if !significant {
        None
    } else if ctr_treatment > ctr_control {
        Some(ABGroup::Treatment)
    } else {
        Some(ABGroup::Control)
    };

    SignificanceResult {
        z,
        p_value,
        effect_size,
        ctr_control,
        ctr_treatment,
        significant,
        winner,
        reason: if significant { "significant" } else { "not_significant" },
    }
}

fn relative_effect(ctr_control: f64, ctr_treatment: f64) -> f64 {
    if ctr_control == 0.0 {
        return 0.0;
    }
    (ctr_treatment - ctr_control) / ctr_control
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ABTestSettings {
        ABTestSettings {
            default_control_pct: 50,
            min_sample_per_group: 100,
            significance_alpha: 0.05,
            min_relative_effect: 0.05,
        }
    }

    #[test]
    fn normal_cdf_matches_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.9750).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.0250).abs() < 1e-3);
    }

    #[test]
    fn scenario_s3_significant_treatment_win() {
        let result = significance_test(14964, 778, 15468, 1051, &settings());
        assert!((result.ctr_control - 0.0520).abs() < 1e-3);
        assert!((result.ctr_treatment - 0.0680).abs() < 1e-3);
        assert!((result.z - 5.82).abs() < 0.05);
        assert!(result.p_value < 1e-7);
        assert!((result.effect_size - 0.308).abs() < 0.01);
        assert!(result.significant);
        assert_eq!(result.winner, Some(ABGroup::Treatment));
    }

    #[test]
    fn scenario_s4_insufficient_sample() {
        let result = significance_test(45, 5, 52, 8, &settings());
        assert!(!result.significant);
        assert_eq!(result.reason, "insufficient_sample");
        assert_eq!(result.winner, None);
    }

    #[test]
    fn identical_ctrs_are_never_significant() {
        let result = significance_test(1000, 100, 1000, 100, &settings());
        assert!(!result.significant);
        assert!((result.z).abs() < 1e-9);
    }

    #[test]
    fn p_value_shrinks_as_sample_size_scales_with_fixed_ratios() {
        let small = significance_test(200, 20, 200, 30, &settings());
        let large = significance_test(2000, 200, 2000, 300, &settings());
        assert!(large.p_value < small.p_value);
    }
}
