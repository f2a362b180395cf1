use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{AnswerEvent, DifficultyLevel, DifficultyState, StudentHistory};

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Lowest weight a single correct answer can contribute.
pub const MIN_CONFIDENCE_WEIGHT: f64 = 0.5;
/// Highest weight a single correct answer can contribute.
pub const MAX_CONFIDENCE_WEIGHT: f64 = 1.5;
/// Personalization never lowers the upgrade threshold below this.
pub const MIN_PERSONALIZED_UPGRADE_THRESHOLD: u32 = 2;

/// History-based threshold tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationConfig {
    pub enabled: bool,
    pub min_questions_for_personalization: u32,
    pub high_accuracy_threshold: f64,
    pub low_accuracy_threshold: f64,
}

/// Answer-confidence weighting of the correct streak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub enabled: bool,
    pub fast_response_threshold: f64,
    pub slow_response_threshold: f64,
    pub confident_answer_bonus: f64,
    pub uncertain_answer_penalty: f64,
}

/// Settings for the adaptive difficulty controller.
///
/// Use one of the named constants below and override fields explicitly:
///
/// ```
/// # use progress_core::difficulty::{AdaptiveConfig, PERSONALIZED_CONFIG};
/// let config = AdaptiveConfig {
///     downgrade_threshold: 3,
///     ..PERSONALIZED_CONFIG
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub upgrade_threshold: u32,
    pub downgrade_threshold: u32,
    pub personalization: PersonalizationConfig,
    pub confidence: ConfidenceConfig,
}

const PERSONALIZATION_OFF: PersonalizationConfig = PersonalizationConfig {
    enabled: false,
    min_questions_for_personalization: 10,
    high_accuracy_threshold: 0.75,
    low_accuracy_threshold: 0.50,
};

const CONFIDENCE_OFF: ConfidenceConfig = ConfidenceConfig {
    enabled: false,
    fast_response_threshold: 15.0,
    slow_response_threshold: 45.0,
    confident_answer_bonus: 0.5,
    uncertain_answer_penalty: 0.5,
};

/// Streak thresholds 3 up / 2 down, no personalization, no confidence weighting.
pub const DEFAULT_ADAPTIVE_CONFIG: AdaptiveConfig = AdaptiveConfig {
    upgrade_threshold: 3,
    downgrade_threshold: 2,
    personalization: PERSONALIZATION_OFF,
    confidence: CONFIDENCE_OFF,
};

/// Default thresholds, tuned by the learner's historical accuracy.
pub const PERSONALIZED_CONFIG: AdaptiveConfig = AdaptiveConfig {
    personalization: PersonalizationConfig {
        enabled: true,
        ..PERSONALIZATION_OFF
    },
    ..DEFAULT_ADAPTIVE_CONFIG
};

/// Default thresholds with confidence-weighted upgrades.
pub const CONFIDENCE_CONFIG: AdaptiveConfig = AdaptiveConfig {
    confidence: ConfidenceConfig {
        enabled: true,
        ..CONFIDENCE_OFF
    },
    ..DEFAULT_ADAPTIVE_CONFIG
};

impl Default for PersonalizationConfig {
    fn default() -> Self {
        PERSONALIZATION_OFF
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        CONFIDENCE_OFF
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        DEFAULT_ADAPTIVE_CONFIG
    }
}

impl AdaptiveConfig {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for zero thresholds, accuracy
    /// bands outside `[0, 1]` or inverted, inverted response-time bounds, or
    /// negative/non-finite weights.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.upgrade_threshold == 0 || self.downgrade_threshold == 0 {
            return Err(ValidationError::config("streak thresholds must be at least 1"));
        }

        let p = &self.personalization;
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(p.high_accuracy_threshold) || !in_unit(p.low_accuracy_threshold) {
            return Err(ValidationError::config("accuracy thresholds must be in [0, 1]"));
        }
        if p.low_accuracy_threshold > p.high_accuracy_threshold {
            return Err(ValidationError::config(
                "low_accuracy_threshold must not exceed high_accuracy_threshold",
            ));
        }

        let c = &self.confidence;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(c.fast_response_threshold) || !non_negative(c.slow_response_threshold) {
            return Err(ValidationError::config("response-time thresholds must be >= 0"));
        }
        if c.fast_response_threshold >= c.slow_response_threshold {
            return Err(ValidationError::config(
                "fast_response_threshold must be below slow_response_threshold",
            ));
        }
        if !non_negative(c.confident_answer_bonus) || !non_negative(c.uncertain_answer_penalty) {
            return Err(ValidationError::config("confidence weights must be >= 0"));
        }
        Ok(())
    }

    #[must_use]
    pub fn base_thresholds(&self) -> Thresholds {
        Thresholds {
            upgrade: self.upgrade_threshold,
            downgrade: self.downgrade_threshold,
        }
    }
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Streak lengths that trigger a level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub upgrade: u32,
    pub downgrade: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Upgrade,
    Downgrade,
    #[serde(rename = "none")]
    Unchanged,
}

/// Outcome of checking a state against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyStep {
    pub new_level: DifficultyLevel,
    pub did_change: bool,
    pub change_type: ChangeType,
    /// Counters (and the confidence score) must be zeroed.
    pub reset_counters: bool,
}

impl DifficultyStep {
    fn unchanged(level: DifficultyLevel) -> Self {
        Self {
            new_level: level,
            did_change: false,
            change_type: ChangeType::Unchanged,
            reset_counters: false,
        }
    }

    fn changed(level: DifficultyLevel, change_type: ChangeType) -> Self {
        Self {
            new_level: level,
            did_change: true,
            change_type,
            reset_counters: true,
        }
    }
}

/// Thresholds adjusted for the learner's track record.
///
/// Only applies with personalization enabled and at least
/// `min_questions_for_personalization` answers; otherwise `base` is returned.
#[must_use]
pub fn personalized_thresholds(
    base: Thresholds,
    config: &PersonalizationConfig,
    history: Option<&StudentHistory>,
) -> Thresholds {
    if !config.enabled {
        return base;
    }
    let Some(history) = history else {
        return base;
    };
    if history.total_questions < config.min_questions_for_personalization {
        return base;
    }
    let Some(accuracy) = history.accuracy() else {
        return base;
    };

    if accuracy >= config.high_accuracy_threshold {
        Thresholds {
            upgrade: base
                .upgrade
                .saturating_sub(1)
                .max(MIN_PERSONALIZED_UPGRADE_THRESHOLD),
            downgrade: base.downgrade,
        }
    } else if accuracy < config.low_accuracy_threshold {
        Thresholds {
            upgrade: base.upgrade.saturating_add(1),
            downgrade: base.downgrade.saturating_add(1),
        }
    } else {
        base
    }
}

/// Weight of one answer toward the confidence score, in `[0.5, 1.5]`.
///
/// Hints cost a penalty, a fast unaided answer earns a bonus and a slow
/// answer costs a penalty. A missing response time earns neither.
#[must_use]
pub fn confidence_weight(answer: &AnswerEvent, config: &ConfidenceConfig) -> f64 {
    let hints = answer.hints_used.unwrap_or(0);
    let mut weight = 1.0;

    if hints >= 1 {
        weight -= config.uncertain_answer_penalty;
    }
    if let Some(seconds) = answer.response_time_seconds {
        if seconds <= config.fast_response_threshold && hints == 0 {
            weight += config.confident_answer_bonus;
        }
        if seconds >= config.slow_response_threshold {
            weight -= config.uncertain_answer_penalty;
        }
    }

    weight.clamp(MIN_CONFIDENCE_WEIGHT, MAX_CONFIDENCE_WEIGHT)
}

/// Updates the streak counters for one answer.
///
/// Runs before every transition check. With confidence weighting enabled a
/// correct answer also adds its weight to the confidence score; any incorrect
/// answer resets the score.
#[must_use]
pub fn record_answer(
    state: &DifficultyState,
    answer: &AnswerEvent,
    config: &AdaptiveConfig,
) -> DifficultyState {
    let mut next = *state;
    if answer.is_correct {
        next.consecutive_correct = next.consecutive_correct.saturating_add(1);
        next.consecutive_incorrect = 0;
        if config.confidence.enabled {
            next.confidence_score += confidence_weight(answer, &config.confidence);
        }
    } else {
        next.consecutive_correct = 0;
        next.consecutive_incorrect = next.consecutive_incorrect.saturating_add(1);
        next.confidence_score = 0.0;
    }
    next
}

/// Decides whether the level moves.
///
/// Upgrades compare the confidence score when `confidence_weighted`, the
/// integer correct streak otherwise; downgrades always use the incorrect
/// streak. Upgrade is checked first.
#[must_use]
pub fn step(
    state: &DifficultyState,
    thresholds: Thresholds,
    confidence_weighted: bool,
) -> DifficultyStep {
    let upgrade_due = if confidence_weighted {
        state.confidence_score >= f64::from(thresholds.upgrade)
    } else {
        state.consecutive_correct >= thresholds.upgrade
    };

    if upgrade_due {
        if let Some(level) = state.level.upgrade() {
            return DifficultyStep::changed(level, ChangeType::Upgrade);
        }
    }

    if state.consecutive_incorrect >= thresholds.downgrade {
        if let Some(level) = state.level.downgrade() {
            return DifficultyStep::changed(level, ChangeType::Downgrade);
        }
    }

    DifficultyStep::unchanged(state.level)
}

/// Applies a step's level and counter reset to a state.
#[must_use]
pub fn apply_step(state: &DifficultyState, step: &DifficultyStep) -> DifficultyState {
    if step.reset_counters {
        DifficultyState::at_level(step.new_level)
    } else {
        DifficultyState {
            level: step.new_level,
            ..*state
        }
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Result of processing one answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyTransition {
    pub previous_level: DifficultyLevel,
    pub state: DifficultyState,
    pub step: DifficultyStep,
    pub thresholds: Thresholds,
    /// Weight credited for this answer when confidence weighting is on.
    pub confidence_weight: Option<f64>,
}

/// Adaptive difficulty controller bound to one validated config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyController {
    config: AdaptiveConfig,
}

impl DifficultyController {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if `config` fails validation.
    pub fn new(config: AdaptiveConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Thresholds in effect for a learner with the given history.
    #[must_use]
    pub fn thresholds_for(&self, history: Option<&StudentHistory>) -> Thresholds {
        personalized_thresholds(
            self.config.base_thresholds(),
            &self.config.personalization,
            history,
        )
    }

    /// Records the answer, checks the thresholds and returns the new state.
    ///
    /// # Examples
    ///
    /// ```
    /// # use progress_core::difficulty::{DifficultyController, DEFAULT_ADAPTIVE_CONFIG};
    /// # use progress_core::model::{AnswerEvent, DifficultyLevel, DifficultyState};
    /// let controller = DifficultyController::new(DEFAULT_ADAPTIVE_CONFIG)?;
    /// let mut state = DifficultyState::default();
    /// for _ in 0..3 {
    ///     state = controller.process_answer(&state, &AnswerEvent::correct(), None).state;
    /// }
    /// assert_eq!(state.level, DifficultyLevel::Medium);
    /// # Ok::<(), progress_core::ValidationError>(())
    /// ```
    #[must_use]
    pub fn process_answer(
        &self,
        state: &DifficultyState,
        answer: &AnswerEvent,
        history: Option<&StudentHistory>,
    ) -> DifficultyTransition {
        let thresholds = self.thresholds_for(history);
        let confidence_enabled = self.config.confidence.enabled;

        let recorded = record_answer(state, answer, &self.config);
        let outcome = step(&recorded, thresholds, confidence_enabled);
        let next = apply_step(&recorded, &outcome);

        DifficultyTransition {
            previous_level: state.level,
            state: next,
            step: outcome,
            thresholds,
            confidence_weight: (confidence_enabled && answer.is_correct)
                .then(|| confidence_weight(answer, &self.config.confidence)),
        }
    }
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self {
            config: DEFAULT_ADAPTIVE_CONFIG,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
