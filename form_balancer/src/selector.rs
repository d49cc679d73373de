use std::cmp::Ordering;

use log::{debug, info};
use snafu::{ensure, OptionExt, ResultExt};

use crate::config::{FormId, SurveyConfig};
use crate::error::{NoCountersSnafu, StorageSnafu, SurveyError, UninitializedFormsSnafu};
use crate::store::{FormCounter, SurveyStore};

const OPERATION: &str = "select_form";

/// Orders counters from most to least deserving of the next visitor.
///
/// Fewest submissions first. Among equal counts a form that was never
/// assigned comes first, then the one assigned longest ago, then the lowest
/// form id.
pub fn selection_order(a: &FormCounter, b: &FormCounter) -> Ordering {
    a.submission_count
        .cmp(&b.submission_count)
        .then_with(|| a.last_assigned.cmp(&b.last_assigned))
        .then_with(|| a.form_id.cmp(&b.form_id))
}

/// The least-served counter, or `None` for an empty slice.
pub fn least_served(counters: &[FormCounter]) -> Option<&FormCounter> {
    counters.iter().min_by(|a, b| selection_order(a, b))
}

/// Picks the form to show to the next visitor.
pub struct FormSelector<'a, S: SurveyStore + ?Sized> {
    config: &'a SurveyConfig,
    store: &'a S,
}

impl<'a, S: SurveyStore + ?Sized> FormSelector<'a, S> {
    pub fn new(config: &'a SurveyConfig, store: &'a S) -> FormSelector<'a, S> {
        FormSelector { config, store }
    }

    pub fn select_form(&self) -> Result<FormId, SurveyError> {
        self.select_form_at(crate::now_ms())
    }

    /// Selects the least-served configured form and stamps it as assigned at
    /// `now_ms`.
    ///
    /// The read and the stamp are two separate store calls: two visitors
    /// arriving together may both get the same form, which only delays the
    /// balancing by one submission.
    pub fn select_form_at(&self, now_ms: i64) -> Result<FormId, SurveyError> {
        let counters = self.store.form_counters().context(StorageSnafu {
            operation: OPERATION,
            form_id: None::<FormId>,
        })?;
        debug!("select_form: current form_counters state: {:?}", counters);

        let uninitialized: Vec<FormId> = self
            .config
            .form_ids()
            .into_iter()
            .filter(|id| !counters.iter().any(|c| c.form_id == *id))
            .collect();
        // Only a partly initialized store is reported here; an empty one is NoCounters.
        ensure!(
            uninitialized.is_empty() || uninitialized.len() == self.config.forms().len(),
            UninitializedFormsSnafu {
                operation: OPERATION,
                form_ids: uninitialized,
            }
        );

        let candidates: Vec<FormCounter> = counters
            .into_iter()
            .filter(|c| self.config.contains_form(c.form_id))
            .collect();
        let form_id = least_served(&candidates)
            .context(NoCountersSnafu {
                operation: OPERATION,
            })?
            .form_id;

        self.store
            .mark_assigned(form_id, now_ms)
            .context(StorageSnafu {
                operation: OPERATION,
                form_id,
            })?;
        info!("Assigning form {} (least submitted)", form_id);
        Ok(form_id)
    }
}
