use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;
use snafu::ResultExt;

use crate::config::{FormId, SurveyConfig};
use crate::error::{StorageSnafu, SurveyError};
use crate::store::{Submission, SurveyStore};

/// How many names the rankings keep per question.
pub const TOP_NAMES: usize = 3;

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct FormStatistics {
    pub form_id: FormId,
    pub title: String,
    pub submission_count: u64,
    pub last_assigned: Option<i64>,
}

/// A snapshot of the counter store.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct Statistics {
    pub forms: Vec<FormStatistics>,
    pub total_submissions: u64,
}

impl Statistics {
    /// Submission count per form id.
    pub fn counts(&self) -> BTreeMap<FormId, u64> {
        self.forms
            .iter()
            .map(|f| (f.form_id, f.submission_count))
            .collect()
    }

    pub fn count(&self, form_id: FormId) -> Option<u64> {
        self.forms
            .iter()
            .find(|f| f.form_id == form_id)
            .map(|f| f.submission_count)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct NameTally {
    pub name: String,
    pub count: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct QuestionRanking {
    pub question_id: String,
    pub question_text: String,
    pub top: Vec<NameTally>,
}

/// Most voted names first; equal counts in name order.
pub fn top_names(tally: Vec<(String, u64)>, limit: usize) -> Vec<NameTally> {
    let mut tally = tally;
    tally.sort_by(|(name_a, count_a), (name_b, count_b)| {
        count_b.cmp(count_a).then_with(|| name_a.cmp(name_b))
    });
    tally
        .into_iter()
        .take(limit)
        .map(|(name, count)| NameTally { name, count })
        .collect()
}

/// Read-only views over both stores.
pub struct StatisticsReader<'a, S: SurveyStore + ?Sized> {
    config: &'a SurveyConfig,
    store: &'a S,
}

impl<'a, S: SurveyStore + ?Sized> StatisticsReader<'a, S> {
    pub fn new(config: &'a SurveyConfig, store: &'a S) -> StatisticsReader<'a, S> {
        StatisticsReader { config, store }
    }

    /// Every counter row, including forms no longer configured.
    pub fn get_statistics(&self) -> Result<Statistics, SurveyError> {
        let counters = self.store.form_counters().context(StorageSnafu {
            operation: "get_statistics",
            form_id: None::<FormId>,
        })?;
        let forms: Vec<FormStatistics> = counters
            .into_iter()
            .map(|c| FormStatistics {
                form_id: c.form_id,
                title: self.config.form_title(c.form_id),
                submission_count: c.submission_count,
                last_assigned: c.last_assigned,
            })
            .collect();
        let total_submissions: u64 = forms.iter().map(|f| f.submission_count).sum();
        Ok(Statistics {
            forms,
            total_submissions,
        })
    }

    /// The [TOP_NAMES] most chosen names for every configured question.
    pub fn get_question_rankings(&self) -> Result<Vec<QuestionRanking>, SurveyError> {
        let mut rankings = Vec::new();
        for (idx, question) in self.config.questions().iter().enumerate() {
            let tally = self.store.answer_tally(idx).context(StorageSnafu {
                operation: "get_question_rankings",
                form_id: None::<FormId>,
            })?;
            debug!("get_question_rankings: {}: {:?}", question.id, tally);
            rankings.push(QuestionRanking {
                question_id: question.id.clone(),
                question_text: question.text.clone(),
                top: top_names(tally, TOP_NAMES),
            });
        }
        Ok(rankings)
    }

    /// Stored submissions in insertion order, optionally for one form only.
    pub fn list_submissions(&self, form_id: Option<FormId>) -> Result<Vec<Submission>, SurveyError> {
        self.store.submissions(form_id).context(StorageSnafu {
            operation: "list_submissions",
            form_id,
        })
    }
}
