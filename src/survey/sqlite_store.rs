// ********* SQLite storage for counters and submissions ***********

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use form_balancer::*;
use log::{debug, info};
use rusqlite::{params, Connection, ErrorCode, Row, TransactionBehavior};

use crate::survey::DatabaseLocation;

const ANSWER_COLUMNS: [&str; QUESTIONS_PER_FORM] = [
    "question_1_answer",
    "question_2_answer",
    "question_3_answer",
    "question_4_answer",
    "question_5_answer",
];

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS form_counters (
      form_id INTEGER PRIMARY KEY,
      submission_count INTEGER NOT NULL DEFAULT 0,
      last_assigned INTEGER
    );

    CREATE TABLE IF NOT EXISTS submissions (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      form_id INTEGER NOT NULL,
      session_id TEXT NOT NULL,
      submission_datetime INTEGER NOT NULL,
      question_1_answer TEXT NOT NULL,
      question_2_answer TEXT NOT NULL,
      question_3_answer TEXT NOT NULL,
      question_4_answer TEXT NOT NULL,
      question_5_answer TEXT NOT NULL,
      top_choice TEXT,
      bottom_choice TEXT
    );

    CREATE INDEX IF NOT EXISTS submissions_form_id ON submissions(form_id);
"#;

/// A [SurveyStore] backed by one SQLite connection.
///
/// Several processes (or several handles in one process) may open the same
/// file. Writers take the database lock up front, and wait for it at most
/// `timeout_ms` before failing with [StoreError::Timeout].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    timeout_ms: u64,
}

impl SqliteStore {
    pub fn open(location: &DatabaseLocation, timeout_ms: u64) -> Result<SqliteStore, StoreError> {
        match location {
            DatabaseLocation::Memory => SqliteStore::open_in_memory(timeout_ms),
            DatabaseLocation::File(path) => SqliteStore::open_path(path, timeout_ms),
        }
    }

    pub fn open_path(path: impl AsRef<Path>, timeout_ms: u64) -> Result<SqliteStore, StoreError> {
        let operation = "open";
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                operation,
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(path).map_err(sql_error(operation, timeout_ms))?;
        info!("open: survey database at {}", path.display());
        SqliteStore::install(conn, timeout_ms)
    }

    pub fn open_in_memory(timeout_ms: u64) -> Result<SqliteStore, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_error("open", timeout_ms))?;
        info!("open: in-memory survey database");
        SqliteStore::install(conn, timeout_ms)
    }

    fn install(conn: Connection, timeout_ms: u64) -> Result<SqliteStore, StoreError> {
        let operation = "install_schema";
        conn.busy_timeout(Duration::from_millis(timeout_ms))
            .map_err(sql_error(operation, timeout_ms))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(sql_error(operation, timeout_ms))?;
        debug!("install_schema: journal mode {}", mode);
        conn.execute_batch("PRAGMA synchronous=NORMAL;")
            .map_err(sql_error(operation, timeout_ms))?;
        conn.execute_batch(SCHEMA)
            .map_err(sql_error(operation, timeout_ms))?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            timeout_ms,
        })
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Poisoned { operation })
    }

    fn fail(&self, operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
        sql_error(operation, self.timeout_ms)
    }
}

fn sql_error(operation: &'static str, timeout_ms: u64) -> impl Fn(rusqlite::Error) -> StoreError {
    move |err| match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
        {
            StoreError::Timeout {
                operation,
                timeout_ms,
            }
        }
        err => StoreError::Backend {
            operation,
            source: Box::new(err),
        },
    }
}

fn read_counter(row: &Row<'_>) -> rusqlite::Result<FormCounter> {
    let count: i64 = row.get(1)?;
    Ok(FormCounter {
        form_id: row.get(0)?,
        submission_count: count.max(0) as u64,
        last_assigned: row.get(2)?,
    })
}

fn read_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let mut answers = Vec::with_capacity(QUESTIONS_PER_FORM);
    for idx in 0..QUESTIONS_PER_FORM {
        answers.push(row.get(4 + idx)?);
    }
    Ok(Submission {
        id: row.get(0)?,
        form_id: row.get(1)?,
        session_id: row.get(2)?,
        submission_datetime: row.get(3)?,
        answers,
        top_choice: row.get(9)?,
        bottom_choice: row.get(10)?,
    })
}

impl SurveyStore for SqliteStore {
    fn ensure_counters(&self, form_ids: &[FormId]) -> Result<usize, StoreError> {
        let operation = "ensure_counters";
        let mut conn = self.lock(operation)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.fail(operation))?;
        let mut created = 0;
        for form_id in form_ids {
            created += tx
                .execute(
                    "INSERT OR IGNORE INTO form_counters (form_id, submission_count, last_assigned)
                     VALUES (?1, 0, NULL)",
                    params![form_id],
                )
                .map_err(self.fail(operation))?;
        }
        tx.commit().map_err(self.fail(operation))?;
        debug!("ensure_counters: {} created out of {}", created, form_ids.len());
        Ok(created)
    }

    fn form_counters(&self) -> Result<Vec<FormCounter>, StoreError> {
        let operation = "form_counters";
        let conn = self.lock(operation)?;
        let mut stmt = conn
            .prepare(
                "SELECT form_id, submission_count, last_assigned
                 FROM form_counters ORDER BY form_id",
            )
            .map_err(self.fail(operation))?;
        let rows = stmt
            .query_map([], read_counter)
            .map_err(self.fail(operation))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(self.fail(operation))
    }

    fn mark_assigned(&self, form_id: FormId, at_ms: i64) -> Result<(), StoreError> {
        let operation = "mark_assigned";
        let conn = self.lock(operation)?;
        let updated = conn
            .execute(
                "UPDATE form_counters SET last_assigned = ?2 WHERE form_id = ?1",
                params![form_id, at_ms],
            )
            .map_err(self.fail(operation))?;
        if updated == 0 {
            return Err(StoreError::MissingCounter { operation, form_id });
        }
        Ok(())
    }

    fn insert_submission(&self, submission: &NewSubmission) -> Result<SubmissionId, StoreError> {
        let operation = "insert_submission";
        let form_id = submission.form_id;
        check_answer_count(operation, submission)?;
        let answers = &submission.answers;

        let mut conn = self.lock(operation)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.fail(operation))?;
        tx.execute(
            "INSERT INTO submissions (
               form_id, session_id, submission_datetime,
               question_1_answer, question_2_answer, question_3_answer,
               question_4_answer, question_5_answer, top_choice, bottom_choice
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                form_id,
                submission.session_id,
                submission.submitted_at_ms,
                answers[0],
                answers[1],
                answers[2],
                answers[3],
                answers[4],
                submission.top_choice,
                submission.bottom_choice,
            ],
        )
        .map_err(self.fail(operation))?;
        let id = tx.last_insert_rowid();

        let updated = tx
            .execute(
                "UPDATE form_counters SET submission_count = submission_count + 1
                 WHERE form_id = ?1",
                params![form_id],
            )
            .map_err(self.fail(operation))?;
        if updated == 0 {
            // Dropping the transaction rolls the insert back.
            return Err(StoreError::MissingCounter { operation, form_id });
        }
        tx.commit().map_err(self.fail(operation))?;
        debug!("insert_submission: stored submission {} for form {}", id, form_id);
        Ok(id)
    }

    fn submissions(&self, form_id: Option<FormId>) -> Result<Vec<Submission>, StoreError> {
        let operation = "submissions";
        let conn = self.lock(operation)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, form_id, session_id, submission_datetime,
                        question_1_answer, question_2_answer, question_3_answer,
                        question_4_answer, question_5_answer, top_choice, bottom_choice
                 FROM submissions
                 WHERE ?1 IS NULL OR form_id = ?1
                 ORDER BY id",
            )
            .map_err(self.fail(operation))?;
        let rows = stmt
            .query_map(params![form_id], read_submission)
            .map_err(self.fail(operation))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(self.fail(operation))
    }

    fn answer_tally(&self, question_index: usize) -> Result<Vec<(String, u64)>, StoreError> {
        let operation = "answer_tally";
        let column = match ANSWER_COLUMNS.get(question_index) {
            Some(column) => *column,
            None => return Ok(Vec::new()),
        };
        let conn = self.lock(operation)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {column}, COUNT(*) FROM submissions GROUP BY {column}"
            ))
            .map_err(self.fail(operation))?;
        let rows = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count.max(0) as u64))
            })
            .map_err(self.fail(operation))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(self.fail(operation))
    }

    fn reset_counters(&self) -> Result<(), StoreError> {
        let operation = "reset_counters";
        let conn = self.lock(operation)?;
        let reset = conn
            .execute(
                "UPDATE form_counters SET submission_count = 0, last_assigned = NULL",
                [],
            )
            .map_err(self.fail(operation))?;
        info!("reset_counters: {} counters reset", reset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn answers() -> Vec<String> {
        ["Aurora", "Beacon", "Catalyst", "Delta", "Aurora"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn response(form_id: FormId, session: &str) -> SurveyResponse {
        SurveyResponse {
            form_id,
            session_id: session.to_string(),
            answers: answers(),
            ..Default::default()
        }
    }

    fn new_submission(form_id: FormId) -> NewSubmission {
        NewSubmission {
            form_id,
            session_id: "s".to_string(),
            submitted_at_ms: 1,
            answers: answers(),
            top_choice: None,
            bottom_choice: None,
        }
    }

    #[test]
    fn initialize_twice_keeps_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let config = SurveyConfig::default_forms();

        let store = SqliteStore::open_path(&path, 1000).unwrap();
        assert_eq!(initialize_counters(&config, &store).unwrap(), 4);
        SubmissionRecorder::new(&config, &store)
            .record_response(&response(2, "a"))
            .unwrap();
        drop(store);

        let store = SqliteStore::open_path(&path, 1000).unwrap();
        assert_eq!(initialize_counters(&config, &store).unwrap(), 0);
        let stats = StatisticsReader::new(&config, &store)
            .get_statistics()
            .unwrap();
        assert_eq!(stats.count(2), Some(1));
        assert_eq!(stats.total_submissions, 1);
    }

    #[test]
    fn record_stores_the_row() {
        let config = SurveyConfig::default_forms();
        let store = SqliteStore::open_in_memory(1000).unwrap();
        initialize_counters(&config, &store).unwrap();

        let resp = SurveyResponse {
            top_choice: Some("Aurora, short and bright".to_string()),
            ..response(1, "visitor-1")
        };
        let id = SubmissionRecorder::new(&config, &store)
            .record_response_at(&resp, 42)
            .unwrap();

        let rows = store.submissions(Some(1)).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, id);
        assert_eq!(row.session_id, "visitor-1");
        assert_eq!(row.submission_datetime, 42);
        assert_eq!(row.answers, answers());
        assert_eq!(row.top_choice.as_deref(), Some("Aurora, short and bright"));
        assert_eq!(row.bottom_choice, None);
        assert!(store.submissions(Some(2)).unwrap().is_empty());

        let counters = store.form_counters().unwrap();
        assert_eq!(counters[0].submission_count, 1);
        assert!(counters[1..].iter().all(|c| c.submission_count == 0));
    }

    #[test]
    fn missing_counter_rolls_back() {
        let store = SqliteStore::open_in_memory(1000).unwrap();
        store.ensure_counters(&[1]).unwrap();
        let err = store.insert_submission(&new_submission(9)).unwrap_err();
        assert!(matches!(err, StoreError::MissingCounter { form_id: 9, .. }));
        assert!(store.submissions(None).unwrap().is_empty());

        let err = store.mark_assigned(9, 5).unwrap_err();
        assert!(matches!(err, StoreError::MissingCounter { form_id: 9, .. }));
    }

    #[test]
    fn malformed_submission_is_rejected() {
        let store = SqliteStore::open_in_memory(1000).unwrap();
        store.ensure_counters(&[1]).unwrap();
        for len in [4, 6] {
            let mut sub = new_submission(1);
            sub.answers = vec!["Aurora".to_string(); len];
            let err = store.insert_submission(&sub).unwrap_err();
            assert!(matches!(
                err,
                StoreError::MalformedSubmission { form_id: 1, actual, .. } if actual == len
            ));
        }
        assert!(store.submissions(None).unwrap().is_empty());
        assert_eq!(store.form_counters().unwrap()[0].submission_count, 0);
    }

    #[test]
    fn locked_database_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let store = SqliteStore::open_path(&path, 100).unwrap();
        store.ensure_counters(&[1]).unwrap();

        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let err = store.insert_submission(&new_submission(1)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                operation: "insert_submission",
                timeout_ms: 100
            }
        ));

        holder.execute_batch("ROLLBACK;").unwrap();
        assert!(store.submissions(None).unwrap().is_empty());
        assert_eq!(store.form_counters().unwrap()[0].submission_count, 0);

        let err = SurveyError::Storage {
            operation: "record_submission",
            form_id: Some(1),
            source: err,
        };
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn selection_rotates_and_stamps() {
        let config = SurveyConfig::default_forms();
        let store = SqliteStore::open_in_memory(1000).unwrap();
        initialize_counters(&config, &store).unwrap();
        let selector = FormSelector::new(&config, &store);
        let picks: Vec<FormId> = (100..105)
            .map(|t| selector.select_form_at(t).unwrap())
            .collect();
        assert_eq!(picks, vec![1, 2, 3, 4, 1]);
        let counters = store.form_counters().unwrap();
        assert_eq!(counters[0].last_assigned, Some(104));
        assert_eq!(counters[3].last_assigned, Some(103));
    }

    #[test]
    fn concurrent_handles_lose_no_increment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let config = Arc::new(SurveyConfig::default_forms());
        initialize_counters(&config, &SqliteStore::open_path(&path, 5000).unwrap()).unwrap();

        let workers = 8;
        let per_worker = 5;
        let stores: Vec<SqliteStore> = (0..workers)
            .map(|_| SqliteStore::open_path(&path, 5000).unwrap())
            .collect();
        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(w, store)| {
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    let recorder = SubmissionRecorder::new(&config, &store);
                    (0..per_worker)
                        .map(|i| {
                            recorder
                                .record_response(&response(3, &format!("w{}-{}", w, i)))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<SubmissionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), workers * per_worker);

        let store = SqliteStore::open_path(&path, 5000).unwrap();
        let counters = store.form_counters().unwrap();
        assert_eq!(counters[2].submission_count, (workers * per_worker) as u64);
        assert_eq!(store.submissions(Some(3)).unwrap().len(), workers * per_worker);
    }

    #[test]
    fn shared_handle_across_threads() {
        let config = Arc::new(SurveyConfig::default_forms());
        let store = Arc::new(SqliteStore::open_in_memory(1000).unwrap());
        initialize_counters(&config, store.as_ref()).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let config = Arc::clone(&config);
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    SubmissionRecorder::new(&config, store.as_ref())
                        .record_response(&response(4, &format!("t{}", i)))
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.form_counters().unwrap()[3].submission_count, 16);
    }

    #[test]
    fn rankings_and_reset() {
        let config = SurveyConfig::default_forms();
        let store = SqliteStore::open_in_memory(1000).unwrap();
        initialize_counters(&config, &store).unwrap();
        let recorder = SubmissionRecorder::new(&config, &store);
        recorder.record_response(&response(1, "a")).unwrap();
        recorder.record_response(&response(1, "b")).unwrap();
        let mut other = response(1, "c");
        other.answers[0] = "Beacon".to_string();
        recorder.record_response(&other).unwrap();

        let mut tally = store.answer_tally(0).unwrap();
        tally.sort();
        assert_eq!(
            tally,
            vec![("Aurora".to_string(), 2), ("Beacon".to_string(), 1)]
        );
        assert!(store.answer_tally(7).unwrap().is_empty());

        let rankings = StatisticsReader::new(&config, &store)
            .get_question_rankings()
            .unwrap();
        assert_eq!(rankings.len(), 5);
        assert_eq!(rankings[0].top[0].name, "Aurora");
        assert_eq!(rankings[0].top[0].count, 2);

        store.mark_assigned(1, 99).unwrap();
        store.reset_counters().unwrap();
        let counters = store.form_counters().unwrap();
        assert!(counters.iter().all(|c| c.submission_count == 0 && c.last_assigned.is_none()));
        assert_eq!(store.submissions(None).unwrap().len(), 3);
    }
}
