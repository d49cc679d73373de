pub use crate::config::*;
use crate::error::SurveyError;

/// A builder for survey configurations.
///
/// Forms and questions can be added in any order; everything is validated at
/// once by [Builder::build].
///
/// ```
/// use form_balancer::builder::Builder;
/// # use form_balancer::SurveyError;
///
/// let config = Builder::new()
///     .question("q1", "Which name is the most memorable?")
///     .question("q2", "Which name is the most trustworthy?")
///     .question("q3", "Which name sounds the most professional?")
///     .question("q4", "Which name would you be most likely to recommend?")
///     .question("q5", "Which name do you like most overall?")
///     .form(1, "Survey Form A", &["Aurora", "Beacon", "Catalyst", "Delta"])
///     .build()?;
///
/// assert_eq!(config.form_ids(), vec![1]);
///
/// # Ok::<(), SurveyError>(())
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    pub(crate) _forms: Vec<FormDefinition>,
    pub(crate) _questions: Vec<Question>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Adds a question. Questions are asked in the order they are added.
    pub fn question(mut self, id: &str, text: &str) -> Builder {
        self._questions.push(Question {
            id: id.to_string(),
            text: text.to_string(),
        });
        self
    }

    pub fn form(mut self, form_id: FormId, title: &str, names: &[&str]) -> Builder {
        self._forms.push(FormDefinition {
            form_id,
            title: title.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        });
        self
    }

    pub fn add_form(&mut self, form: FormDefinition) {
        self._forms.push(form);
    }

    pub fn add_question(&mut self, question: Question) {
        self._questions.push(question);
    }

    pub fn build(self) -> Result<SurveyConfig, SurveyError> {
        SurveyConfig::new(self._forms, self._questions)
    }
}
