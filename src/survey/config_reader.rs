use crate::survey::*;

use form_balancer::builder::Builder;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const FORMS_PATH_VAR: &str = "SURVEY_FORMS_PATH";
pub const TIMEOUT_VAR: &str = "STORAGE_TIMEOUT_MS";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormEntry {
    #[serde(rename = "formId")]
    pub form_id: FormId,
    pub title: String,
    pub names: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub id: String,
    pub text: String,
}

/// The forms file. When `questions` is left out, the built-in questions are used.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormsFile {
    pub forms: Vec<FormEntry>,
    pub questions: Option<Vec<QuestionEntry>>,
}

pub fn read_forms(path: &str) -> CliResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningFormsSnafu { path })?;
    parse_forms(&contents, path)
}

fn parse_forms(contents: &str, path: &str) -> CliResult<SurveyConfig> {
    let file: FormsFile = serde_json::from_str(contents).context(ParsingFormsSnafu { path })?;
    info!(
        "read_forms: {}: {} forms, custom questions: {}",
        path,
        file.forms.len(),
        file.questions.is_some()
    );

    let mut builder = Builder::new();
    for entry in file.forms {
        builder.add_form(FormDefinition {
            form_id: entry.form_id,
            title: entry.title,
            names: entry.names,
        });
    }
    match file.questions {
        Some(questions) => {
            for q in questions {
                builder.add_question(Question {
                    id: q.id,
                    text: q.text,
                });
            }
        }
        None => {
            for q in SurveyConfig::default_forms().questions() {
                builder.add_question(q.clone());
            }
        }
    }
    builder.build().context(SurveySnafu {})
}

/// Accepts `sqlite://<path>`, `sqlite:<path>`, `file:<path>`, `sqlite::memory:`
/// and bare paths.
pub fn parse_database_url(url: &str) -> CliResult<DatabaseLocation> {
    let trimmed = url.trim();
    if trimmed == "sqlite::memory:" || trimmed == ":memory:" {
        return Ok(DatabaseLocation::Memory);
    }
    let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("file:") {
        rest
    } else if trimmed.contains("://") {
        return InvalidDatabaseUrlSnafu { url }.fail();
    } else {
        trimmed
    };
    ensure!(!path.is_empty(), InvalidDatabaseUrlSnafu { url });
    Ok(DatabaseLocation::File(PathBuf::from(path)))
}

/// Resolves the settings. Command line flags take precedence over `env`.
pub fn load_settings<F>(args: &Args, env: F) -> CliResult<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let url = match &args.database_url {
        Some(url) => url.clone(),
        None => env(DATABASE_URL_VAR).context(MissingDatabaseUrlSnafu {})?,
    };
    let database = parse_database_url(&url)?;

    let forms_path = args.forms.clone().or_else(|| env(FORMS_PATH_VAR));

    let timeout_ms = match (args.timeout_ms, env(TIMEOUT_VAR)) {
        (Some(ms), _) => ms,
        (None, Some(value)) => value
            .trim()
            .parse::<u64>()
            .context(InvalidTimeoutSnafu { value: value.clone() })?,
        (None, None) => {
            info!("{} not set, using default: {}", TIMEOUT_VAR, DEFAULT_TIMEOUT_MS);
            DEFAULT_TIMEOUT_MS
        }
    };
    if timeout_ms == 0 {
        warn!("storage timeout of 0 ms: commands fail as soon as the database is locked");
    }

    Ok(Settings {
        database,
        forms_path,
        timeout_ms,
    })
}
