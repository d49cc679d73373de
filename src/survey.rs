use log::{debug, info};

use form_balancer::*;
use snafu::{prelude::*, Snafu};

use serde::Serialize;

use std::env;
use std::path::PathBuf;

use crate::args::{Args, Command};
use crate::survey::config_reader::*;
use crate::survey::sqlite_store::SqliteStore;

pub mod config_reader;
pub mod sqlite_store;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("DATABASE_URL is not set and --database-url was not given"))]
    MissingDatabaseUrl {},

    #[snafu(display("Unsupported database url {url:?}: expected sqlite://<path>, sqlite::memory: or a file path"))]
    InvalidDatabaseUrl { url: String },

    #[snafu(display("Invalid storage timeout {value:?}"))]
    InvalidTimeout {
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Error opening forms file {path}"))]
    OpeningForms {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Error parsing forms file {path}"))]
    ParsingForms {
        source: serde_json::Error,
        path: String,
    },

    #[snafu(display("Error opening the survey database"))]
    OpeningStore { source: StoreError },

    #[snafu(display("{source}"))]
    Survey { source: SurveyError },

    #[snafu(display("Error writing the output"))]
    WritingOutput { source: serde_json::Error },

    #[snafu(display("Refusing to reset the counters without --yes"))]
    ResetNotConfirmed {},
}

pub type CliResult<T> = Result<T, CliError>;

/// Where the survey data lives.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

/// Deployment settings, resolved once at start.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Settings {
    pub database: DatabaseLocation,
    pub forms_path: Option<String>,
    pub timeout_ms: u64,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

// The form a visitor is asked to fill in.
#[derive(Serialize)]
struct PresentedForm<'a> {
    #[serde(rename = "formId")]
    form_id: FormId,
    title: &'a str,
    names: &'a [String],
    questions: &'a [Question],
}

#[derive(Serialize)]
struct RecordedSubmission {
    #[serde(rename = "submissionId")]
    submission_id: SubmissionId,
    #[serde(rename = "formId")]
    form_id: FormId,
}

pub fn run(args: &Args) -> CliResult<()> {
    let settings = load_settings(args, |key| env::var(key).ok())?;
    info!("settings: {:?}", settings);

    let config = match &settings.forms_path {
        Some(path) => read_forms(path)?,
        None => SurveyConfig::default_forms(),
    };
    debug!("config: {:?}", config);

    let store = SqliteStore::open(&settings.database, settings.timeout_ms)
        .context(OpeningStoreSnafu {})?;

    run_command(&args.command, &config, &store)
}

pub fn run_command<S: SurveyStore + ?Sized>(
    command: &Command,
    config: &SurveyConfig,
    store: &S,
) -> CliResult<()> {
    match command {
        Command::Init => {
            let created = initialize_counters(config, store).context(SurveySnafu {})?;
            println!("initialized {} form counters ({} new)", config.forms().len(), created);
        }
        Command::Next => {
            let form_id = FormSelector::new(config, store)
                .select_form()
                .context(SurveySnafu {})?;
            print_json(&present_form(config, form_id))?;
        }
        Command::Submit {
            form,
            session,
            answers,
            top_choice,
            bottom_choice,
        } => {
            let response = SurveyResponse {
                form_id: *form,
                session_id: session.clone(),
                answers: answers.clone(),
                top_choice: top_choice.clone(),
                bottom_choice: bottom_choice.clone(),
            };
            let submission_id = SubmissionRecorder::new(config, store)
                .record_response(&response)
                .context(SurveySnafu {})?;
            print_json(&RecordedSubmission {
                submission_id,
                form_id: *form,
            })?;
        }
        Command::Stats => {
            let stats = StatisticsReader::new(config, store)
                .get_statistics()
                .context(SurveySnafu {})?;
            print_json(&stats)?;
        }
        Command::Rankings => {
            let rankings = StatisticsReader::new(config, store)
                .get_question_rankings()
                .context(SurveySnafu {})?;
            print_json(&rankings)?;
        }
        Command::Submissions { form } => {
            let submissions = StatisticsReader::new(config, store)
                .list_submissions(*form)
                .context(SurveySnafu {})?;
            print_json(&submissions)?;
        }
        Command::Reset { yes } => {
            ensure!(*yes, ResetNotConfirmedSnafu {});
            reset_counters(store).context(SurveySnafu {})?;
            println!("all form counters reset to zero");
        }
    }
    Ok(())
}

fn present_form(config: &SurveyConfig, form_id: FormId) -> PresentedForm<'_> {
    PresentedForm {
        form_id,
        title: config
            .form(form_id)
            .map(|f| f.title.as_str())
            .unwrap_or_default(),
        names: config.form_names(form_id),
        questions: config.questions(),
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let pretty = serde_json::to_string_pretty(value).context(WritingOutputSnafu {})?;
    println!("{}", pretty);
    Ok(())
}
