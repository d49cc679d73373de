// ********* Survey configuration ***********

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidConfigSnafu, SurveyError};
use snafu::ensure;

/// Identifier of a survey form. Forms are a small fixed set (1..N).
pub type FormId = u32;

/// Every form presents exactly this many candidate names.
pub const NAMES_PER_FORM: usize = 4;

/// Every form asks exactly this many questions, and every submission carries
/// one answer per question.
pub const QUESTIONS_PER_FORM: usize = 5;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
}

/// One survey form: a display title and the candidate names shown together.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormDefinition {
    pub form_id: FormId,
    pub title: String,
    pub names: Vec<String>,
}

/// The immutable table of forms and questions.
///
/// It is loaded once at start and handed explicitly to the selector, the
/// recorder and the statistics reader. Forms are kept sorted by id.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct SurveyConfig {
    forms: Vec<FormDefinition>,
    questions: Vec<Question>,
}

impl SurveyConfig {
    /// Validates and assembles a configuration.
    ///
    /// Rejects an empty form table, duplicate form ids, forms without exactly
    /// [NAMES_PER_FORM] distinct non-empty names, and question lists without
    /// exactly [QUESTIONS_PER_FORM] entries with unique ids.
    pub fn new(
        mut forms: Vec<FormDefinition>,
        questions: Vec<Question>,
    ) -> Result<SurveyConfig, SurveyError> {
        ensure!(
            !forms.is_empty(),
            InvalidConfigSnafu {
                message: "no forms are configured"
            }
        );
        forms.sort_by_key(|f| f.form_id);

        let mut seen_ids: HashSet<FormId> = HashSet::new();
        for form in forms.iter() {
            ensure!(
                seen_ids.insert(form.form_id),
                InvalidConfigSnafu {
                    message: format!("form {} is configured twice", form.form_id)
                }
            );
            ensure!(
                !form.title.trim().is_empty(),
                InvalidConfigSnafu {
                    message: format!("form {} has an empty title", form.form_id)
                }
            );
            ensure!(
                form.names.len() == NAMES_PER_FORM,
                InvalidConfigSnafu {
                    message: format!(
                        "form {} has {} names, expected {}",
                        form.form_id,
                        form.names.len(),
                        NAMES_PER_FORM
                    )
                }
            );
            let distinct: HashSet<&str> = form.names.iter().map(|n| n.trim()).collect();
            ensure!(
                distinct.len() == form.names.len() && !distinct.contains(""),
                InvalidConfigSnafu {
                    message: format!("form {} has blank or duplicate names", form.form_id)
                }
            );
        }

        ensure!(
            questions.len() == QUESTIONS_PER_FORM,
            InvalidConfigSnafu {
                message: format!(
                    "{} questions are configured, expected {}",
                    questions.len(),
                    QUESTIONS_PER_FORM
                )
            }
        );
        let mut seen_questions: HashSet<&str> = HashSet::new();
        for q in questions.iter() {
            ensure!(
                !q.id.trim().is_empty() && !q.text.trim().is_empty(),
                InvalidConfigSnafu {
                    message: "questions need a non-empty id and text"
                }
            );
            ensure!(
                seen_questions.insert(q.id.as_str()),
                InvalidConfigSnafu {
                    message: format!("question id {:?} is used twice", q.id)
                }
            );
        }

        Ok(SurveyConfig { forms, questions })
    }

    /// The four forms and five questions the survey ships with.
    pub fn default_forms() -> SurveyConfig {
        let form = |form_id: FormId, title: &str, names: [&str; NAMES_PER_FORM]| FormDefinition {
            form_id,
            title: title.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        };
        let question = |id: &str, text: &str| Question {
            id: id.to_string(),
            text: text.to_string(),
        };
        SurveyConfig {
            forms: vec![
                form(1, "Survey Form A", ["Aurora", "Beacon", "Catalyst", "Delta"]),
                form(2, "Survey Form B", ["Evergreen", "Fusion", "Genesis", "Harmony"]),
                form(3, "Survey Form C", ["Innovate", "Journey", "Keystone", "Legacy"]),
                form(4, "Survey Form D", ["Momentum", "Nexus", "Odyssey", "Pinnacle"]),
            ],
            questions: vec![
                question("q1", "Which name is the most memorable?"),
                question("q2", "Which name is the most trustworthy?"),
                question("q3", "Which name sounds the most professional?"),
                question("q4", "Which name would you be most likely to recommend?"),
                question("q5", "Which name do you like most overall?"),
            ],
        }
    }

    pub fn forms(&self) -> &[FormDefinition] {
        &self.forms
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn form(&self, form_id: FormId) -> Option<&FormDefinition> {
        self.forms.iter().find(|f| f.form_id == form_id)
    }

    pub fn contains_form(&self, form_id: FormId) -> bool {
        self.form(form_id).is_some()
    }

    pub fn form_ids(&self) -> Vec<FormId> {
        self.forms.iter().map(|f| f.form_id).collect()
    }

    /// The candidate names of a form, or nothing for an unknown form.
    pub fn form_names(&self, form_id: FormId) -> &[String] {
        self.form(form_id).map(|f| f.names.as_slice()).unwrap_or(&[])
    }

    /// The display title of a form. Unknown forms get a generic title so that
    /// counters left behind by an older deployment can still be reported.
    pub fn form_title(&self, form_id: FormId) -> String {
        match self.form(form_id) {
            Some(f) => f.title.clone(),
            None => format!("Survey Form {}", form_id),
        }
    }
}
