use clap::{Parser, Subcommand};

/// This is a survey collection program that balances which form each visitor sees.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (connection string) The database holding the counters and submissions, for example
    /// sqlite://survey.db. Overrides the DATABASE_URL environment variable. One of the two is required.
    #[clap(long, value_parser)]
    pub database_url: Option<String>,

    /// (file path, optional) A JSON file describing the forms and the questions. If not provided,
    /// the built-in forms are used. Overrides the SURVEY_FORMS_PATH environment variable.
    #[clap(long, value_parser)]
    pub forms: Option<String>,

    /// (milliseconds, default 5000) How long a command waits for a locked database before failing.
    /// Overrides the STORAGE_TIMEOUT_MS environment variable.
    #[clap(long, value_parser)]
    pub timeout_ms: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates the tables and one counter per configured form. Safe to run repeatedly.
    Init,
    /// Picks the least-served form for a new visitor and prints it.
    Next,
    /// Records the answers of one visitor.
    Submit {
        /// The form that was answered.
        #[clap(long, value_parser)]
        form: u32,
        /// (opaque string) Identifies the visitor session.
        #[clap(long, value_parser)]
        session: String,
        /// One answer per question, in question order. Repeat the flag for each question.
        #[clap(long = "answer", value_parser)]
        answers: Vec<String>,
        /// (optional) Which is the top choice and what stood out about it.
        #[clap(long, value_parser)]
        top_choice: Option<String>,
        /// (optional) Names that felt confusing, untrustworthy or off-putting, and why.
        #[clap(long, value_parser)]
        bottom_choice: Option<String>,
    },
    /// Prints the number of submissions of every form.
    Stats,
    /// Prints the three most chosen names for every question.
    Rankings,
    /// Prints the stored submissions as JSON.
    Submissions {
        /// (optional) Only print the submissions of this form.
        #[clap(long, value_parser)]
        form: Option<u32>,
    },
    /// Puts every submission counter back to zero. Submissions are kept.
    Reset {
        /// Confirms the reset.
        #[clap(long, takes_value = false)]
        yes: bool,
    },
}
