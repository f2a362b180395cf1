use serde::{Deserialize, Serialize};

use progress_core::ValidationError;
use progress_core::difficulty::{AdaptiveConfig, CONFIDENCE_CONFIG, PERSONALIZED_CONFIG};
use progress_core::mastery::MasteryConfig;

/// Estimator and controller settings used by the progress pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mastery: MasteryConfig,
    pub adaptive: AdaptiveConfig,
}

impl EngineConfig {
    /// Default estimator with the adaptive controller's optional features
    /// switched on as requested.
    #[must_use]
    pub fn with_features(personalized: bool, confidence_weighted: bool) -> Self {
        let mut adaptive = AdaptiveConfig::default();
        if personalized {
            adaptive.personalization = PERSONALIZED_CONFIG.personalization;
        }
        if confidence_weighted {
            adaptive.confidence = CONFIDENCE_CONFIG.confidence;
        }
        Self {
            mastery: MasteryConfig::default(),
            adaptive,
        }
    }

    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if either section is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.mastery.validate()?;
        self.adaptive.validate()
    }
}
