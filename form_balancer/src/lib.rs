mod config;
mod error;
mod recorder;
mod selector;
mod stats;
mod store;

pub mod builder;
pub mod manual;

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use snafu::ResultExt;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::recorder::*;
pub use crate::selector::*;
pub use crate::stats::*;
pub use crate::store::*;

/// Current UTC time in unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Creates the counter of every configured form that does not have one yet.
///
/// Safe to run at every start: existing counters keep their values, and
/// counters of forms that left the configuration are kept as well.
/// Returns the number of counters created.
pub fn initialize_counters<S: SurveyStore + ?Sized>(
    config: &SurveyConfig,
    store: &S,
) -> Result<usize, SurveyError> {
    let created = store
        .ensure_counters(&config.form_ids())
        .context(StorageSnafu {
            operation: "initialize_counters",
            form_id: None::<FormId>,
        })?;
    info!(
        "initialize_counters: {} forms configured, {} counters created",
        config.forms().len(),
        created
    );
    Ok(created)
}

/// Maintenance: puts every counter back to zero. Submissions are kept, so the
/// counts no longer match the submission log afterwards.
pub fn reset_counters<S: SurveyStore + ?Sized>(store: &S) -> Result<(), SurveyError> {
    store.reset_counters().context(StorageSnafu {
        operation: "reset_counters",
        form_id: None::<FormId>,
    })?;
    info!("reset_counters: all form counters set to zero");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn initialization_twice_keeps_counts() {
        init_logs();
        let config = SurveyConfig::default_forms();
        let store = MemoryStore::new();
        assert_eq!(initialize_counters(&config, &store).unwrap(), 4);

        let answers: Vec<String> = config.form_names(1).iter().cycle().take(5).cloned().collect();
        SubmissionRecorder::new(&config, &store)
            .record_submission(1, "s", &answers)
            .unwrap();

        assert_eq!(initialize_counters(&config, &store).unwrap(), 0);
        let counters = store.form_counters().unwrap();
        assert_eq!(counters.len(), 4);
        assert_eq!(counters[0].submission_count, 1);
    }

    // 4 forms at zero: form 1 first, and after 3 submissions to form 1 some
    // other form.
    #[test]
    fn balancing_scenario() {
        init_logs();
        let config = SurveyConfig::default_forms();
        let store = MemoryStore::new();
        initialize_counters(&config, &store).unwrap();
        let selector = FormSelector::new(&config, &store);
        let recorder = SubmissionRecorder::new(&config, &store);

        let first = selector.select_form().unwrap();
        assert_eq!(first, 1);

        let answers: Vec<String> = config.form_names(1).iter().cycle().take(5).cloned().collect();
        for visitor in 0..3 {
            recorder
                .record_submission(first, &format!("visitor-{}", visitor), &answers)
                .unwrap();
        }
        let next = selector.select_form().unwrap();
        assert!([2, 3, 4].contains(&next));
    }

    #[test]
    fn reset_zeroes_counters() {
        init_logs();
        let config = SurveyConfig::default_forms();
        let store = MemoryStore::new();
        initialize_counters(&config, &store).unwrap();
        let answers: Vec<String> = config.form_names(2).iter().cycle().take(5).cloned().collect();
        SubmissionRecorder::new(&config, &store)
            .record_submission(2, "s", &answers)
            .unwrap();

        reset_counters(&store).unwrap();
        let stats = StatisticsReader::new(&config, &store).get_statistics().unwrap();
        assert_eq!(stats.total_submissions, 0);
        assert_eq!(store.submissions(None).unwrap().len(), 1);
    }
}
