use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::ValidationError;
use crate::mastery::{MasteryConfig, MasteryUpdate, update_mastery_batch};
use crate::model::ids::{CourseId, LearnerId, OutcomeId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum MasteryRecordError {
    #[error("stored mastery for outcome {outcome} is outside [0, 1]: {value}")]
    ValueOutOfRange { outcome: OutcomeId, value: f64 },
}

/// Estimate and observation count for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMastery {
    pub value: f64,
    pub observations: u32,
}

/// Per-(learner, course) mastery estimates, keyed by outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    learner_id: LearnerId,
    course_id: CourseId,
    outcomes: BTreeMap<OutcomeId, OutcomeMastery>,
    updated_at: Option<DateTime<Utc>>,
}

impl MasteryRecord {
    /// An empty record: every outcome has no prior.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId) -> Self {
        Self {
            learner_id,
            course_id,
            outcomes: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Rehydrate a record from the store.
    ///
    /// # Errors
    ///
    /// Returns `MasteryRecordError::ValueOutOfRange` if any stored value is not
    /// a finite number in `[0, 1]`.
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        outcomes: BTreeMap<OutcomeId, OutcomeMastery>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Self, MasteryRecordError> {
        if let Some((outcome, entry)) = outcomes
            .iter()
            .find(|(_, entry)| !entry.value.is_finite() || !(0.0..=1.0).contains(&entry.value))
        {
            return Err(MasteryRecordError::ValueOutOfRange {
                outcome: outcome.clone(),
                value: entry.value,
            });
        }

        Ok(Self {
            learner_id,
            course_id,
            outcomes,
            updated_at,
        })
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn outcomes(&self) -> &BTreeMap<OutcomeId, OutcomeMastery> {
        &self.outcomes
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    #[must_use]
    pub fn value(&self, outcome: &OutcomeId) -> Option<f64> {
        self.outcomes.get(outcome).map(|entry| entry.value)
    }

    /// Observation count for an outcome; 0 when absent.
    #[must_use]
    pub fn observations(&self, outcome: &OutcomeId) -> u32 {
        self.outcomes.get(outcome).map_or(0, |entry| entry.observations)
    }

    /// Folds new scores into the record and returns the per-outcome updates.
    ///
    /// Outcomes not in `observations` are left untouched. The record is only
    /// modified if every score is valid.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyObservations` for an empty map and
    /// `ValidationError::ScoreOutOfRange` for any invalid score.
    pub fn apply_observations(
        &mut self,
        observations: &BTreeMap<OutcomeId, f64>,
        config: &MasteryConfig,
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<OutcomeId, MasteryUpdate>, ValidationError> {
        if observations.is_empty() {
            return Err(ValidationError::EmptyObservations);
        }

        let priors: BTreeMap<OutcomeId, f64> = self
            .outcomes
            .iter()
            .map(|(id, entry)| (id.clone(), entry.value))
            .collect();
        let counts: BTreeMap<OutcomeId, u32> = self
            .outcomes
            .iter()
            .map(|(id, entry)| (id.clone(), entry.observations))
            .collect();

        let updates = update_mastery_batch(&priors, observations, &counts, config)?;

        for (outcome, update) in &updates {
            let entry = self.outcomes.entry(outcome.clone()).or_insert(OutcomeMastery {
                value: update.new_value,
                observations: 0,
            });
            entry.value = update.new_value;
            entry.observations = entry.observations.saturating_add(1);
        }
        self.updated_at = Some(at);

        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn outcome(id: &str) -> OutcomeId {
        OutcomeId::parse(id).unwrap()
    }

    fn record() -> MasteryRecord {
        MasteryRecord::new(
            LearnerId::parse("learner-1").unwrap(),
            CourseId::parse("course-1").unwrap(),
        )
    }

    #[test]
    fn apply_counts_observations_and_leaves_others() {
        let mut rec = record();
        let config = MasteryConfig::default();
        rec.apply_observations(
            &BTreeMap::from([(outcome("a"), 0.4), (outcome("b"), 1.0)]),
            &config,
            fixed_now(),
        )
        .unwrap();
        let updates = rec
            .apply_observations(&BTreeMap::from([(outcome("a"), 0.8)]), &config, fixed_now())
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(rec.observations(&outcome("a")), 2);
        assert_eq!(rec.observations(&outcome("b")), 1);
        assert!((rec.value(&outcome("a")).unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(rec.value(&outcome("b")), Some(1.0));
        assert_eq!(rec.observations(&outcome("missing")), 0);
        assert_eq!(rec.updated_at(), Some(fixed_now()));
    }

    #[test]
    fn invalid_score_leaves_record_untouched() {
        let mut rec = record();
        let err = rec
            .apply_observations(
                &BTreeMap::from([(outcome("a"), 0.5), (outcome("b"), 2.0)]),
                &MasteryConfig::default(),
                fixed_now(),
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::ScoreOutOfRange { .. }));
        assert!(rec.outcomes().is_empty());
    }

    #[test]
    fn first_observation_is_stored_within_bounds() {
        let mut rec = record();
        let config = MasteryConfig {
            min_value: 0.2,
            ..MasteryConfig::default()
        };
        rec.apply_observations(&BTreeMap::from([(outcome("a"), 0.0)]), &config, fixed_now())
            .unwrap();
        assert!((rec.value(&outcome("a")).unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn empty_observations_are_rejected() {
        let mut rec = record();
        assert_eq!(
            rec.apply_observations(&BTreeMap::new(), &MasteryConfig::default(), fixed_now()),
            Err(ValidationError::EmptyObservations)
        );
    }

    #[test]
    fn from_persisted_rejects_out_of_range_values() {
        let outcomes = BTreeMap::from([(
            outcome("a"),
            OutcomeMastery {
                value: 1.4,
                observations: 3,
            },
        )]);
        let err = MasteryRecord::from_persisted(
            LearnerId::parse("l").unwrap(),
            CourseId::parse("c").unwrap(),
            outcomes,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MasteryRecordError::ValueOutOfRange { .. }));
    }
}
