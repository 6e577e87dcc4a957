use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)

Jobs: auto-logout, daily-processing, weekly-summary, monthly-rewards.
`run-job` executes one job immediately against the configured database,
independent of the in-process scheduler.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "worklog-server",
    version,
    about = "Worklog attendance and rewards server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server and the job scheduler (default)
    Serve,
    /// Run a single batch job now and exit
    RunJob {
        /// Job name, e.g. `daily-processing`
        job: String,
        /// Month evaluated by `monthly-rewards` (YYYY-MM); defaults to the previous month
        #[arg(long)]
        month: Option<String>,
        /// Day closed by `daily-processing`, or the day `weekly-summary` looks
        /// back from (YYYY-MM-DD); defaults to today in the scheduler timezone
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Print a bcrypt hash for use as `password_hash` in config
    HashPassword {
        password: String,
    },
}
