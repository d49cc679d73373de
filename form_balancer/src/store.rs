// ********* Counter and submission storage ***********

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use serde::Serialize;

use crate::config::{FormId, QUESTIONS_PER_FORM};
use crate::error::StoreError;

/// Identifier assigned by the store to a new submission.
pub type SubmissionId = i64;

/// The per-form counter driving the load balancing.
///
/// `last_assigned` is the time (unix milliseconds) the form was last handed
/// out for display, whether or not it was submitted afterwards.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct FormCounter {
    pub form_id: FormId,
    pub submission_count: u64,
    pub last_assigned: Option<i64>,
}

impl FormCounter {
    pub fn new(form_id: FormId) -> FormCounter {
        FormCounter {
            form_id,
            submission_count: 0,
            last_assigned: None,
        }
    }
}

/// A validated response, ready to be written.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewSubmission {
    pub form_id: FormId,
    pub session_id: String,
    pub submitted_at_ms: i64,
    pub answers: Vec<String>,
    pub top_choice: Option<String>,
    pub bottom_choice: Option<String>,
}

/// A stored response. Never updated once written.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub form_id: FormId,
    pub session_id: String,
    pub submission_datetime: i64,
    pub answers: Vec<String>,
    pub top_choice: Option<String>,
    pub bottom_choice: Option<String>,
}

/// Persistence for the counter store and the submission log.
///
/// Implementations are the only serialization point between concurrent
/// visitors: `insert_submission` must append the submission and increment the
/// form counter as one atomic unit, and must not lose increments when called
/// concurrently.
pub trait SurveyStore {
    /// Creates a zeroed counter for every id that has none yet and returns how
    /// many were created. Existing counters are left untouched.
    fn ensure_counters(&self, form_ids: &[FormId]) -> Result<usize, StoreError>;

    /// All counters, ordered by form id.
    fn form_counters(&self) -> Result<Vec<FormCounter>, StoreError>;

    fn mark_assigned(&self, form_id: FormId, at_ms: i64) -> Result<(), StoreError>;

    /// Appends the submission and increments its form counter atomically.
    /// Fails with [StoreError::MissingCounter] (and writes nothing) when the
    /// form has no counter, and with [StoreError::MalformedSubmission] when
    /// the submission does not carry exactly [QUESTIONS_PER_FORM] answers.
    fn insert_submission(&self, submission: &NewSubmission) -> Result<SubmissionId, StoreError>;

    /// Stored submissions in insertion order, optionally for one form only.
    fn submissions(&self, form_id: Option<FormId>) -> Result<Vec<Submission>, StoreError>;

    /// Vote counts per answer value for the question at `question_index`
    /// (0-based), in no particular order.
    fn answer_tally(&self, question_index: usize) -> Result<Vec<(String, u64)>, StoreError>;

    /// Maintenance: zero every counter and forget assignment times.
    fn reset_counters(&self) -> Result<(), StoreError>;
}

/// Rejects a submission whose answers do not fill the answer columns exactly.
pub fn check_answer_count(
    operation: &'static str,
    submission: &NewSubmission,
) -> Result<(), StoreError> {
    if submission.answers.len() != QUESTIONS_PER_FORM {
        return Err(StoreError::MalformedSubmission {
            operation,
            form_id: submission.form_id,
            expected: QUESTIONS_PER_FORM,
            actual: submission.answers.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    counters: BTreeMap<FormId, FormCounter>,
    submissions: Vec<Submission>,
}

/// An in-process store, used as a fake in tests and for dry runs.
///
/// A single mutex guards both tables, which makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Poisoned { operation })
    }
}

impl SurveyStore for MemoryStore {
    fn ensure_counters(&self, form_ids: &[FormId]) -> Result<usize, StoreError> {
        let mut state = self.lock("ensure_counters")?;
        let mut created = 0;
        for form_id in form_ids {
            if !state.counters.contains_key(form_id) {
                state.counters.insert(*form_id, FormCounter::new(*form_id));
                created += 1;
            }
        }
        Ok(created)
    }

    fn form_counters(&self) -> Result<Vec<FormCounter>, StoreError> {
        let state = self.lock("form_counters")?;
        Ok(state.counters.values().cloned().collect())
    }

    fn mark_assigned(&self, form_id: FormId, at_ms: i64) -> Result<(), StoreError> {
        let operation = "mark_assigned";
        let mut state = self.lock(operation)?;
        match state.counters.get_mut(&form_id) {
            Some(counter) => {
                counter.last_assigned = Some(at_ms);
                Ok(())
            }
            None => Err(StoreError::MissingCounter { operation, form_id }),
        }
    }

    fn insert_submission(&self, submission: &NewSubmission) -> Result<SubmissionId, StoreError> {
        let operation = "insert_submission";
        check_answer_count(operation, submission)?;
        let mut state = self.lock(operation)?;
        let form_id = submission.form_id;
        let id = state.submissions.last().map(|s| s.id + 1).unwrap_or(1);
        match state.counters.get_mut(&form_id) {
            Some(counter) => counter.submission_count += 1,
            None => return Err(StoreError::MissingCounter { operation, form_id }),
        }
        state.submissions.push(Submission {
            id,
            form_id,
            session_id: submission.session_id.clone(),
            submission_datetime: submission.submitted_at_ms,
            answers: submission.answers.clone(),
            top_choice: submission.top_choice.clone(),
            bottom_choice: submission.bottom_choice.clone(),
        });
        debug!("insert_submission: stored submission {} for form {}", id, form_id);
        Ok(id)
    }

    fn submissions(&self, form_id: Option<FormId>) -> Result<Vec<Submission>, StoreError> {
        let state = self.lock("submissions")?;
        Ok(state
            .submissions
            .iter()
            .filter(|s| form_id.map_or(true, |f| s.form_id == f))
            .cloned()
            .collect())
    }

    fn answer_tally(&self, question_index: usize) -> Result<Vec<(String, u64)>, StoreError> {
        let state = self.lock("answer_tally")?;
        let mut tally: BTreeMap<String, u64> = BTreeMap::new();
        for answer in state
            .submissions
            .iter()
            .filter_map(|s| s.answers.get(question_index))
        {
            *tally.entry(answer.clone()).or_insert(0) += 1;
        }
        Ok(tally.into_iter().collect())
    }

    fn reset_counters(&self) -> Result<(), StoreError> {
        let mut state = self.lock("reset_counters")?;
        for counter in state.counters.values_mut() {
            counter.submission_count = 0;
            counter.last_assigned = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(form_id: FormId) -> NewSubmission {
        NewSubmission {
            form_id,
            session_id: "session".to_string(),
            submitted_at_ms: 1_000,
            answers: vec!["A".to_string(); 5],
            top_choice: None,
            bottom_choice: None,
        }
    }

    #[test]
    fn ensure_counters_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.ensure_counters(&[1, 2]).unwrap(), 2);
        store.insert_submission(&submission(1)).unwrap();
        assert_eq!(store.ensure_counters(&[1, 2, 3]).unwrap(), 1);
        let counters = store.form_counters().unwrap();
        assert_eq!(counters.len(), 3);
        assert_eq!(counters[0].submission_count, 1);
    }

    #[test]
    fn missing_counter_writes_nothing() {
        let store = MemoryStore::new();
        store.ensure_counters(&[1]).unwrap();
        let err = store.insert_submission(&submission(2)).unwrap_err();
        assert!(matches!(err, StoreError::MissingCounter { form_id: 2, .. }));
        assert!(store.submissions(None).unwrap().is_empty());
    }

    #[test]
    fn malformed_submission_writes_nothing() {
        let store = MemoryStore::new();
        store.ensure_counters(&[1]).unwrap();
        for len in [4, 6] {
            let mut short = submission(1);
            short.answers = vec!["A".to_string(); len];
            let err = store.insert_submission(&short).unwrap_err();
            assert!(matches!(
                err,
                StoreError::MalformedSubmission { expected: 5, actual, .. } if actual == len
            ));
        }
        assert!(store.submissions(None).unwrap().is_empty());
        assert_eq!(store.form_counters().unwrap()[0].submission_count, 0);
    }

    #[test]
    fn ids_increase() {
        let store = MemoryStore::new();
        store.ensure_counters(&[1, 2]).unwrap();
        let a = store.insert_submission(&submission(1)).unwrap();
        let b = store.insert_submission(&submission(2)).unwrap();
        assert!(b > a);
        assert_eq!(store.submissions(Some(2)).unwrap()[0].id, b);
    }

    #[test]
    fn reset_keeps_submissions() {
        let store = MemoryStore::new();
        store.ensure_counters(&[1]).unwrap();
        store.insert_submission(&submission(1)).unwrap();
        store.mark_assigned(1, 5).unwrap();
        store.reset_counters().unwrap();
        assert_eq!(store.form_counters().unwrap(), vec![FormCounter::new(1)]);
        assert_eq!(store.submissions(None).unwrap().len(), 1);
    }
}
