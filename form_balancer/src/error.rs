use snafu::Snafu;

use crate::config::FormId;

/// Failures reported by a [crate::SurveyStore] implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("{operation}: {source}"))]
    Backend {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("{operation}: storage did not answer within {timeout_ms} ms"))]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[snafu(display("{operation}: no counter row exists for form {form_id}"))]
    MissingCounter {
        operation: &'static str,
        form_id: FormId,
    },

    #[snafu(display("{operation}: form {form_id}: a submission needs {expected} answers, got {actual}"))]
    MalformedSubmission {
        operation: &'static str,
        form_id: FormId,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("{operation}: store lock poisoned"))]
    Poisoned { operation: &'static str },
}

/// The three families of failures a caller has to tell apart.
///
/// Configuration errors are fatal at startup, validation errors are the
/// visitor's to fix, and storage errors may be retried as a whole.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Storage,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SurveyError {
    #[snafu(display("invalid survey configuration: {message}"))]
    InvalidConfig { message: String },

    #[snafu(display("{operation}: no form counters are initialized for the configured forms"))]
    NoCounters { operation: &'static str },

    #[snafu(display("{operation}: configured forms {form_ids:?} have no counter, run the initialization again"))]
    UninitializedForms {
        operation: &'static str,
        form_ids: Vec<FormId>,
    },

    #[snafu(display("{operation}: form {form_id} is not a configured form"))]
    UnknownForm {
        operation: &'static str,
        form_id: FormId,
    },

    #[snafu(display("{operation}: form {form_id} expects {expected} answers, got {actual}"))]
    AnswerCount {
        operation: &'static str,
        form_id: FormId,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("{operation}: form {form_id} is missing answers to questions {questions:?}"))]
    MissingAnswers {
        operation: &'static str,
        form_id: FormId,
        questions: Vec<usize>,
    },

    #[snafu(display("{operation}: form {form_id}: {field} {reason}"))]
    InvalidField {
        operation: &'static str,
        form_id: FormId,
        field: &'static str,
        reason: String,
    },

    #[snafu(display("{operation} failed (form {form_id:?}): {source}"))]
    Storage {
        operation: &'static str,
        form_id: Option<FormId>,
        source: StoreError,
    },
}

impl SurveyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SurveyError::InvalidConfig { .. }
            | SurveyError::NoCounters { .. }
            | SurveyError::UninitializedForms { .. } => ErrorKind::Configuration,
            SurveyError::UnknownForm { .. }
            | SurveyError::AnswerCount { .. }
            | SurveyError::MissingAnswers { .. }
            | SurveyError::InvalidField { .. } => ErrorKind::Validation,
            SurveyError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// The form the failing operation was about, when there is one.
    pub fn form_id(&self) -> Option<FormId> {
        match self {
            SurveyError::InvalidConfig { .. }
            | SurveyError::NoCounters { .. }
            | SurveyError::UninitializedForms { .. } => None,
            SurveyError::UnknownForm { form_id, .. }
            | SurveyError::AnswerCount { form_id, .. }
            | SurveyError::MissingAnswers { form_id, .. }
            | SurveyError::InvalidField { form_id, .. } => Some(*form_id),
            SurveyError::Storage { form_id, .. } => *form_id,
        }
    }
}
