use worklog_server::attendance::{self, monthly::YearMonth};
use worklog_server::jobs::{JobRequest, Jobs, scheduler::Scheduler};
use worklog_server::{notify, server, storage};
mod cli;

use std::net::SocketAddr;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use worklog_shared::domain::{JobKind, JobStatus};

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();

    if let Some(cli::Command::HashPassword { password }) = &args.command {
        match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
            Ok(h) => println!("{h}"),
            Err(e) => {
                eprintln!("Hash error: {e}");
                std::process::exit(2);
            }
        }
        return;
    }

    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = match server::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load config");
            std::process::exit(2);
        }
    };

    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data/app.db".into());
    // Ensure data dir exists when using default
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match storage::Store::connect_sqlite(&db_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "Failed to connect DB");
            std::process::exit(3);
        }
    };

    if let Err(e) = store
        .seed_from_config(&config.companies, &config.users, &config.holidays)
        .await
    {
        tracing::error!(error=%e, "Failed to seed DB");
        std::process::exit(4);
    }

    let mailer = match notify::mailer_from_config(&config.mail) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error=%e, "Failed to set up mailer");
            std::process::exit(2);
        }
    };
    let jobs = Jobs::new(store.clone(), mailer);

    match args.command {
        Some(cli::Command::RunJob { job, month, date }) => {
            let code = run_job_once(&jobs, &config, &job, month.as_deref(), date).await;
            std::process::exit(code);
        }
        Some(cli::Command::Serve) | None => serve(config, store, jobs).await,
        Some(cli::Command::HashPassword { .. }) => {}
    }
}

async fn run_job_once(
    jobs: &Jobs,
    config: &server::AppConfig,
    job: &str,
    month: Option<&str>,
    date: Option<NaiveDate>,
) -> i32 {
    let kind = match job.parse::<JobKind>() {
        Ok(k) => k,
        Err(e) => {
            tracing::error!(error=%e, "Unknown job");
            return 2;
        }
    };
    let now = Utc::now();
    let tz: chrono_tz::Tz = config.scheduler.timezone.parse().unwrap_or(chrono_tz::UTC);
    let today = attendance::local_date(tz, now);
    let req = match kind {
        JobKind::AutoLogout => JobRequest::AutoLogout,
        JobKind::DailyProcessing => JobRequest::DailyProcessing(date.unwrap_or(today)),
        JobKind::WeeklySummary => JobRequest::WeeklySummary(date.unwrap_or(today)),
        JobKind::MonthlyRewards => {
            let month = match month {
                Some(m) => match m.parse::<YearMonth>() {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::error!(error=%e, "Invalid --month");
                        return 2;
                    }
                },
                None => YearMonth::of(today).previous(),
            };
            JobRequest::MonthlyRewards(month)
        }
    };

    match jobs.run(req, now).await {
        Ok(record) => {
            tracing::info!(
                job = %record.job,
                status = record.status.as_str(),
                companies_processed = record.companies_processed,
                companies_failed = record.companies_failed,
                detail = record.detail.as_deref().unwrap_or(""),
                "job finished"
            );
            if record.status == JobStatus::Completed { 0 } else { 1 }
        }
        Err(e) => {
            tracing::error!(job = %kind, error=%e, "job failed");
            1
        }
    }
}

async fn serve(config: server::AppConfig, store: storage::Store, jobs: Jobs) {
    // Decide listen port: env PORT overrides config.listen_port, default 5151
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .or(config.listen_port)
        .unwrap_or(5151);

    let shutdown_token = CancellationToken::new();

    let scheduler_task = if config.scheduler.enabled {
        let scheduler = Scheduler::new(jobs, &config.scheduler);
        Some(tokio::spawn(scheduler.run(shutdown_token.child_token())))
    } else {
        tracing::info!("scheduler disabled by config");
        None
    };

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener");

    let shutdown_token_for_server = shutdown_token.clone();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_token_for_server.cancelled_owned())
            .await
    });

    // Wait for OS signal; then trigger graceful, and if it hangs beyond timeout, force abort.
    shutdown_signal().await;
    tracing::info!("shutdown: initiating graceful stop");
    shutdown_token.cancel();
    match tokio::time::timeout(std::time::Duration::from_secs(3), &mut server_task).await {
        Ok(join_res) => match join_res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "server error"),
            Err(e) => tracing::error!(error=%e, "server task join error"),
        },
        Err(_) => {
            tracing::warn!("shutdown: forcing server abort due to timeout");
            server_task.abort();
        }
    }
    // The scheduler only observes cancellation between jobs
    if let Some(task) = scheduler_task
        && tokio::time::timeout(std::time::Duration::from_secs(3), task)
            .await
            .is_err()
    {
        tracing::warn!("shutdown: scheduler did not stop in time");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
