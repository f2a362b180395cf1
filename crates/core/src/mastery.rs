use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::model::OutcomeId;

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Steady-state smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.3;
/// Smoothing factor used while an outcome has few observations.
pub const DEFAULT_BOOTSTRAP_ALPHA: f64 = 0.5;
/// Observation count at which the steady-state factor takes over.
pub const DEFAULT_BOOTSTRAP_THRESHOLD: u32 = 3;

/// Default estimator settings.
pub const DEFAULT_MASTERY_CONFIG: MasteryConfig = MasteryConfig {
    alpha: DEFAULT_ALPHA,
    bootstrap_alpha: DEFAULT_BOOTSTRAP_ALPHA,
    bootstrap_threshold: DEFAULT_BOOTSTRAP_THRESHOLD,
    min_value: 0.0,
    max_value: 1.0,
};

/// Settings for the EMA mastery estimator.
///
/// # Fields
///
/// * `alpha` - weight of a new observation once past the bootstrap phase (0.3)
/// * `bootstrap_alpha` - weight used while `count < bootstrap_threshold` (0.5)
/// * `bootstrap_threshold` - observations before steady state (3)
/// * `min_value` / `max_value` - clamp bounds for the estimate (0 and 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    pub alpha: f64,
    pub bootstrap_alpha: f64,
    pub bootstrap_threshold: u32,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        DEFAULT_MASTERY_CONFIG
    }
}

impl MasteryConfig {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if a smoothing factor is not in
    /// `(0, 1]` or the clamp bounds are not finite and strictly ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [("alpha", self.alpha), ("bootstrap_alpha", self.bootstrap_alpha)] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ValidationError::config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            return Err(ValidationError::config("mastery bounds must be finite"));
        }
        if self.min_value >= self.max_value {
            return Err(ValidationError::config(format!(
                "min_value ({}) must be below max_value ({})",
                self.min_value, self.max_value
            )));
        }
        Ok(())
    }

    /// Smoothing factor for an outcome with `observation_count` prior observations.
    #[must_use]
    pub fn effective_alpha(&self, observation_count: u32) -> f64 {
        if observation_count < self.bootstrap_threshold {
            self.bootstrap_alpha
        } else {
            self.alpha
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        value.max(self.min_value).min(self.max_value)
    }
}

//
// ─── UPDATE ────────────────────────────────────────────────────────────────────
//

/// Result of folding one observation into a mastery estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteryUpdate {
    pub new_value: f64,
    pub effective_alpha: f64,
    pub was_bootstrapped: bool,
    /// Change from the prior; on bootstrap the prior counts as 0.
    pub delta: f64,
}

/// Folds `observed_score` into `prior_value` with an exponential moving average.
///
/// With no prior (or zero observations) the estimate jumps straight to the
/// observed score, clamped to the configured bounds. Otherwise the bootstrap factor applies until
/// `bootstrap_threshold` observations exist, then the steady-state `alpha`.
///
/// # Errors
///
/// Returns `ValidationError::ScoreOutOfRange` if `observed_score` is not a
/// finite value in `[0, 1]`, and `ValidationError::PriorOutOfRange` if a
/// prior in use is not finite or lies outside `[min_value, max_value]`.
///
/// # Examples
///
/// ```
/// # use progress_core::mastery::{update_mastery, MasteryConfig};
/// let update = update_mastery(Some(0.8), 0.3, 5, &MasteryConfig::default())?;
/// assert!((update.new_value - 0.65).abs() < 1e-9);
/// # Ok::<(), progress_core::ValidationError>(())
/// ```
pub fn update_mastery(
    prior_value: Option<f64>,
    observed_score: f64,
    observation_count: u32,
    config: &MasteryConfig,
) -> Result<MasteryUpdate, ValidationError> {
    if !observed_score.is_finite() || !(0.0..=1.0).contains(&observed_score) {
        return Err(ValidationError::ScoreOutOfRange {
            provided: observed_score,
        });
    }

    let prior = match prior_value {
        Some(prior) if observation_count > 0 => prior,
        _ => {
            let new_value = config.clamp(observed_score);
            return Ok(MasteryUpdate {
                new_value,
                effective_alpha: 1.0,
                was_bootstrapped: true,
                delta: new_value,
            });
        }
    };
    if !prior.is_finite() || prior < config.min_value || prior > config.max_value {
        return Err(ValidationError::PriorOutOfRange { provided: prior });
    }

    let alpha = config.effective_alpha(observation_count);
    let new_value = config.clamp(alpha * observed_score + (1.0 - alpha) * prior);

    Ok(MasteryUpdate {
        new_value,
        effective_alpha: alpha,
        was_bootstrapped: false,
        delta: new_value - prior,
    })
}

/// Updates every outcome present in `observations`, independently.
///
/// Outcomes that only appear in `priors` are not echoed back; callers keep
/// their stored values untouched. A missing count is treated as 0.
///
/// # Errors
///
/// Returns the first `ValidationError` raised by `update_mastery`.
pub fn update_mastery_batch(
    priors: &BTreeMap<OutcomeId, f64>,
    observations: &BTreeMap<OutcomeId, f64>,
    counts: &BTreeMap<OutcomeId, u32>,
    config: &MasteryConfig,
) -> Result<BTreeMap<OutcomeId, MasteryUpdate>, ValidationError> {
    observations
        .iter()
        .map(|(outcome, &score)| {
            let prior = priors.get(outcome).copied();
            let count = counts.get(outcome).copied().unwrap_or(0);
            update_mastery(prior, score, count, config).map(|update| (outcome.clone(), update))
        })
        .collect()
}

/// Number of observations after which a prior's weight halves.
///
/// Diagnostic only: `ln(0.5) / ln(1 - alpha)`.
///
/// # Errors
///
/// Returns `ValidationError::AlphaOutOfRange` unless `0 < alpha < 1`.
pub fn half_life(alpha: f64) -> Result<f64, ValidationError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ValidationError::AlphaOutOfRange { provided: alpha });
    }
    Ok(0.5_f64.ln() / (1.0 - alpha).ln())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn outcome(id: &str) -> OutcomeId {
        OutcomeId::parse(id).unwrap()
    }

    #[test]
    fn first_observation_bootstraps() {
        let config = MasteryConfig::default();
        for score in [0.0, 0.4, 1.0] {
            let update = update_mastery(None, score, 0, &config).unwrap();
            assert_eq!(update.new_value, score);
            assert_eq!(update.effective_alpha, 1.0);
            assert!(update.was_bootstrapped);
            assert_eq!(update.delta, score);
        }
    }

    #[test]
    fn zero_count_ignores_prior() {
        let update = update_mastery(Some(0.9), 0.2, 0, &MasteryConfig::default()).unwrap();
        assert!(update.was_bootstrapped);
        assert_eq!(update.new_value, 0.2);
    }

    #[test]
    fn early_observations_use_bootstrap_alpha() {
        let update = update_mastery(Some(0.4), 0.8, 1, &MasteryConfig::default()).unwrap();
        assert_eq!(update.effective_alpha, DEFAULT_BOOTSTRAP_ALPHA);
        assert!(!update.was_bootstrapped);
        assert!((update.new_value - 0.6).abs() < EPS);
        assert!((update.delta - 0.2).abs() < EPS);
    }

    #[test]
    fn steady_state_matches_worked_example() {
        let update = update_mastery(Some(0.8), 0.3, 5, &MasteryConfig::default()).unwrap();
        assert_eq!(update.effective_alpha, DEFAULT_ALPHA);
        assert!((update.new_value - 0.65).abs() < EPS);
        assert!((update.delta + 0.15).abs() < EPS);
    }

    #[test]
    fn result_is_clamped_to_configured_bounds() {
        let config = MasteryConfig {
            min_value: 0.1,
            max_value: 0.9,
            ..MasteryConfig::default()
        };
        let high = update_mastery(Some(0.9), 1.0, 10, &config).unwrap();
        assert!((high.new_value - 0.9).abs() < EPS);
        let low = update_mastery(Some(0.1), 0.0, 10, &config).unwrap();
        assert!((low.new_value - 0.1).abs() < EPS);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let config = MasteryConfig::default();
        for bad in [-0.1, 1.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                update_mastery(Some(0.5), bad, 4, &config),
                Err(ValidationError::ScoreOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn corrupt_prior_is_rejected() {
        let config = MasteryConfig::default();
        for bad in [f64::NAN, 3.0, -0.1] {
            assert!(matches!(
                update_mastery(Some(bad), 0.5, 5, &config),
                Err(ValidationError::PriorOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn prior_outside_narrowed_bounds_is_rejected() {
        let config = MasteryConfig {
            min_value: 0.2,
            ..MasteryConfig::default()
        };
        assert!(matches!(
            update_mastery(Some(0.1), 0.5, 5, &config),
            Err(ValidationError::PriorOutOfRange { .. })
        ));
    }

    #[test]
    fn bootstrap_value_respects_bounds() {
        let config = MasteryConfig {
            min_value: 0.2,
            max_value: 0.9,
            ..MasteryConfig::default()
        };
        let low = update_mastery(None, 0.0, 0, &config).unwrap();
        assert!(low.was_bootstrapped);
        assert!((low.new_value - 0.2).abs() < EPS);
        assert!((low.delta - 0.2).abs() < EPS);
        let high = update_mastery(Some(0.5), 1.0, 0, &config).unwrap();
        assert!((high.new_value - 0.9).abs() < EPS);
    }

    #[test]
    fn repeated_score_converges_with_shrinking_steps() {
        let config = MasteryConfig::default();
        let target = 0.9;
        let mut value = 0.2;
        let mut count = 5;
        let mut last_delta = f64::INFINITY;

        for _ in 0..20 {
            let update = update_mastery(Some(value), target, count, &config).unwrap();
            assert!(update.new_value > value);
            assert!(update.new_value <= target);
            assert!(update.delta.abs() < last_delta);
            last_delta = update.delta.abs();
            value = update.new_value;
            count += 1;
        }
        assert!((target - value).abs() < 0.01);
    }

    #[test]
    fn batch_only_returns_observed_outcomes() {
        let priors = BTreeMap::from([(outcome("fractions"), 0.8), (outcome("ratios"), 0.4)]);
        let counts = BTreeMap::from([(outcome("fractions"), 5), (outcome("ratios"), 2)]);
        let observations =
            BTreeMap::from([(outcome("fractions"), 0.3), (outcome("decimals"), 0.7)]);

        let updates =
            update_mastery_batch(&priors, &observations, &counts, &MasteryConfig::default())
                .unwrap();

        assert_eq!(updates.len(), 2);
        assert!(!updates.contains_key(&outcome("ratios")));
        assert!((updates[&outcome("fractions")].new_value - 0.65).abs() < EPS);
        assert!(updates[&outcome("decimals")].was_bootstrapped);
    }

    #[test]
    fn half_life_domain() {
        assert!((half_life(0.5).unwrap() - 1.0).abs() < EPS);
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            assert!(matches!(
                half_life(bad),
                Err(ValidationError::AlphaOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(MasteryConfig::default().validate().is_ok());
        let zero_alpha = MasteryConfig {
            alpha: 0.0,
            ..MasteryConfig::default()
        };
        assert!(zero_alpha.validate().is_err());
        let inverted = MasteryConfig {
            min_value: 1.0,
            max_value: 0.0,
            ..MasteryConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    proptest! {
        #[test]
        fn steady_state_is_plain_ema(
            prior in 0.0f64..=1.0,
            score in 0.0f64..=1.0,
            count in 3u32..1_000,
        ) {
            let config = MasteryConfig::default();
            let update = update_mastery(Some(prior), score, count, &config).unwrap();
            let expected = config.alpha * score + (1.0 - config.alpha) * prior;
            prop_assert_eq!(update.effective_alpha, config.alpha);
            prop_assert!((update.new_value - expected).abs() < EPS);
            prop_assert!((0.0..=1.0).contains(&update.new_value));
        }

        #[test]
        fn bootstrap_always_returns_observation(
            score in 0.0f64..=1.0,
            prior in proptest::option::of(0.0f64..=1.0),
        ) {
            let update = update_mastery(prior, score, 0, &MasteryConfig::default()).unwrap();
            prop_assert!(update.was_bootstrapped);
            prop_assert_eq!(update.new_value, score);
        }
    }
}
