use log::{info, warn};
use snafu::{ensure, OptionExt, ResultExt};

use crate::config::{FormId, SurveyConfig};
use crate::error::{
    AnswerCountSnafu, InvalidFieldSnafu, MissingAnswersSnafu, StorageSnafu, SurveyError,
    UnknownFormSnafu,
};
use crate::store::{NewSubmission, SubmissionId, SurveyStore};

const OPERATION: &str = "record_submission";

/// Longest accepted answer or session id, in characters.
pub const MAX_FIELD_CHARS: usize = 255;

/// Longest accepted optional comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Everything a visitor sends when submitting a form.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SurveyResponse {
    pub form_id: FormId,
    pub session_id: String,
    /// One answer per configured question, in question order.
    pub answers: Vec<String>,
    /// "Which is your top choice and what stood out to you about it?"
    pub top_choice: Option<String>,
    /// "Were there any names that felt confusing, untrustworthy, or
    /// off-putting?"
    pub bottom_choice: Option<String>,
}

/// Validates responses and hands them to the store.
pub struct SubmissionRecorder<'a, S: SurveyStore + ?Sized> {
    config: &'a SurveyConfig,
    store: &'a S,
}

impl<'a, S: SurveyStore + ?Sized> SubmissionRecorder<'a, S> {
    pub fn new(config: &'a SurveyConfig, store: &'a S) -> SubmissionRecorder<'a, S> {
        SubmissionRecorder { config, store }
    }

    pub fn record_submission(
        &self,
        form_id: FormId,
        session_id: &str,
        answers: &[String],
    ) -> Result<SubmissionId, SurveyError> {
        self.record_response(&SurveyResponse {
            form_id,
            session_id: session_id.to_string(),
            answers: answers.to_vec(),
            top_choice: None,
            bottom_choice: None,
        })
    }

    pub fn record_response(&self, response: &SurveyResponse) -> Result<SubmissionId, SurveyError> {
        self.record_response_at(response, crate::now_ms())
    }

    /// Records one response submitted at `now_ms`.
    ///
    /// Nothing is written when validation fails. Otherwise the submission and
    /// the counter increment are committed together by the store, and a
    /// storage failure leaves neither behind.
    pub fn record_response_at(
        &self,
        response: &SurveyResponse,
        now_ms: i64,
    ) -> Result<SubmissionId, SurveyError> {
        let submission = self.validate(response, now_ms)?;
        let form_id = submission.form_id;
        let id = self
            .store
            .insert_submission(&submission)
            .context(StorageSnafu {
                operation: OPERATION,
                form_id,
            })?;
        info!(
            "Submission {} saved for form {} with session {}",
            id, form_id, submission.session_id
        );
        Ok(id)
    }

    fn validate(&self, response: &SurveyResponse, now_ms: i64) -> Result<NewSubmission, SurveyError> {
        let form_id = response.form_id;
        let form = self.config.form(form_id).context(UnknownFormSnafu {
            operation: OPERATION,
            form_id,
        })?;

        let expected = self.config.questions().len();
        ensure!(
            response.answers.len() == expected,
            AnswerCountSnafu {
                operation: OPERATION,
                form_id,
                expected,
                actual: response.answers.len(),
            }
        );

        let missing: Vec<usize> = response
            .answers
            .iter()
            .enumerate()
            .filter(|(_, a)| a.trim().is_empty())
            .map(|(idx, _)| idx + 1)
            .collect();
        ensure!(
            missing.is_empty(),
            MissingAnswersSnafu {
                operation: OPERATION,
                form_id,
                questions: missing,
            }
        );

        ensure!(
            !response.session_id.trim().is_empty(),
            InvalidFieldSnafu {
                operation: OPERATION,
                form_id,
                field: "session_id",
                reason: "is empty",
            }
        );
        ensure!(
            response.session_id.chars().count() <= MAX_FIELD_CHARS,
            InvalidFieldSnafu {
                operation: OPERATION,
                form_id,
                field: "session_id",
                reason: format!("is longer than {} characters", MAX_FIELD_CHARS),
            }
        );

        for (idx, answer) in response.answers.iter().enumerate() {
            ensure!(
                answer.chars().count() <= MAX_FIELD_CHARS,
                InvalidFieldSnafu {
                    operation: OPERATION,
                    form_id,
                    field: "answer",
                    reason: format!(
                        "to question {} is longer than {} characters",
                        idx + 1,
                        MAX_FIELD_CHARS
                    ),
                }
            );
        }
        let top_choice = comment(form_id, "top_choice", &response.top_choice)?;
        let bottom_choice = comment(form_id, "bottom_choice", &response.bottom_choice)?;

        // Membership in the form's names is not enforced; only flagged once
        // everything else has been accepted.
        for (idx, answer) in response.answers.iter().enumerate() {
            if !form.names.iter().any(|n| n == answer) {
                warn!(
                    "record_submission: form {}: answer {:?} to question {} is not one of {:?}",
                    form_id,
                    answer,
                    idx + 1,
                    form.names
                );
            }
        }

        Ok(NewSubmission {
            form_id,
            session_id: response.session_id.clone(),
            submitted_at_ms: now_ms,
            answers: response.answers.clone(),
            top_choice,
            bottom_choice,
        })
    }
}

// Blank comments are stored as absent.
fn comment(
    form_id: FormId,
    field: &'static str,
    text: &Option<String>,
) -> Result<Option<String>, SurveyError> {
    match text {
        Some(t) if !t.trim().is_empty() => {
            ensure!(
                t.chars().count() <= MAX_COMMENT_CHARS,
                InvalidFieldSnafu {
                    operation: OPERATION,
                    form_id,
                    field,
                    reason: format!("is longer than {} characters", MAX_COMMENT_CHARS),
                }
            );
            Ok(Some(t.clone()))
        }
        _ => Ok(None),
    }
}
