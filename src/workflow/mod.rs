//! Annotation session state and its transitions.
//!
//! A session moves `Presenting(i) -> Submitting(i) -> Presenting(i + 1)`
//! until every item has been submitted, at which point it is `Done`.
//! `Submitting` only exists for the duration of [`SessionState::submit`]:
//! the index moves only after the store accepted the row.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{FieldError, FormField, StorageError, SubmitError, ValidationError};
use crate::model::{Annotation, Progress, SampledItem};
use crate::store::AnnotationStore;
use crate::util::utc_string;


/// Inclusive bounds for the score field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRange {
    min: u32,
    max: u32,
}

impl ScoreRange {
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (min < max).then_some(Self { min, max })
    }

    pub fn min(self) -> u32 {
        self.min
    }

    pub fn max(self) -> u32 {
        self.max
    }

    pub fn contains(self, score: i64) -> bool {
        score >= i64::from(self.min) && score <= i64::from(self.max)
    }

    /// Neutral default shown before a rater picks a score.
    pub fn midpoint(self) -> u32 {
        self.min + (self.max - self.min) / 2
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Presenting(usize),
    Done,
}

/// Raw form values as submitted. Nothing here is trusted yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationForm {
    #[serde(default)]
    pub rater_id: String,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub rater_id: String,
    pub score: u32,
    pub justification: String,
}

pub fn validate(form: &AnnotationForm, range: ScoreRange) -> Result<Submission, ValidationError> {
    let mut errors = Vec::new();

    let rater_id = form.rater_id.trim();
    if rater_id.is_empty() {
        errors.push(FieldError {
            field: FormField::RaterId,
            message: "Rater ID is required".to_string(),
        });
    }

    let score = match form.score.trim().parse::<i64>() {
        Ok(value) if range.contains(value) => Some(value as u32),
        Ok(_) => {
            errors.push(FieldError {
                field: FormField::Score,
                message: format!(
                    "Score must be between {} and {}",
                    range.min(),
                    range.max()
                ),
            });
            None
        }
        Err(_) => {
            errors.push(FieldError {
                field: FormField::Score,
                message: "Score must be a whole number".to_string(),
            });
            None
        }
    };

    let justification = form.justification.trim();
    if justification.is_empty() {
        errors.push(FieldError {
            field: FormField::Justification,
            message: "Please provide a justification for your score".to_string(),
        });
    }

    match score {
        Some(score) if errors.is_empty() => Ok(Submission {
            rater_id: rater_id.to_string(),
            score,
            justification: justification.to_string(),
        }),
        _ => Err(ValidationError { errors }),
    }
}

/// One rater's browsing session over a fixed pool.
#[derive(Debug, Clone)]
pub struct SessionState {
    current_index: usize,
    pool: Vec<SampledItem>,
    rater_id: Option<String>,
}

impl SessionState {
    pub fn new(pool: Vec<SampledItem>) -> Self {
        Self {
            current_index: 0,
            pool,
            rater_id: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.current_index < self.pool.len() {
            Phase::Presenting(self.current_index)
        } else {
            Phase::Done
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn pool(&self) -> &[SampledItem] {
        &self.pool
    }

    pub fn current_item(&self) -> Option<&SampledItem> {
        self.pool.get(self.current_index)
    }

    /// Rater id of the last accepted submission.
    pub fn rater_id(&self) -> Option<&str> {
        self.rater_id.as_deref()
    }

    pub fn previous(&mut self) {
        if self.current_index > 0 {
            self.current_index = self.current_index.min(self.pool.len()) - 1;
        }
    }

    pub fn next(&mut self) {
        if self.current_index + 1 < self.pool.len() {
            self.current_index += 1;
        }
    }

    pub fn restart(&mut self) {
        self.current_index = 0;
    }

    /// Validates `form`, appends it for the current item, then advances.
    ///
    /// On any error the index is left where it was.
    pub fn submit(
        &mut self,
        form: &AnnotationForm,
        range: ScoreRange,
        store: &mut dyn AnnotationStore,
        now: DateTime<Utc>,
    ) -> Result<Phase, SubmitError> {
        let Phase::Presenting(index) = self.phase() else {
            return Err(SubmitError::Finished);
        };
        let item = &self.pool[index];

        let submission = validate(form, range).inspect_err(|err| {
            info!(item_id = %item.id, index, error = %err, "submission rejected");
        })?;

        let record = Annotation {
            item_id: item.id.clone(),
            rater_id: submission.rater_id.clone(),
            score: submission.score,
            justification: submission.justification,
            context: item.context_column(),
            statement: item.statement.clone(),
            timestamp: utc_string(now),
        };

        store.append(&record).inspect_err(|err| {
            warn!(
                item_id = %record.item_id,
                index,
                path = %store.location().display(),
                error = %err,
                "failed to store annotation"
            );
        })?;

        info!(
            item_id = %record.item_id,
            rater_id = %record.rater_id,
            score = record.score,
            index,
            "annotation stored"
        );

        self.rater_id = Some(submission.rater_id);
        self.current_index = index + 1;
        Ok(self.phase())
    }

    pub fn progress(
        &self,
        rater_id: &str,
        store: &dyn AnnotationStore,
    ) -> Result<Progress, StorageError> {
        let completed_ids = store.completed_item_ids(rater_id)?;
        let completed = self
            .pool
            .iter()
            .filter(|item| completed_ids.contains(&item.id))
            .count();

        Ok(Progress {
            rater_id: rater_id.to_string(),
            completed,
            total: self.pool.len(),
            current_index: self.current_index,
            done: self.phase() == Phase::Done,
        })
    }
}
