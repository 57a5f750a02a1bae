//! Kiln - Declarative build task runner

mod cli;
mod exit_codes;
mod signals;

use std::panic::{self, AssertUnwindSafe};

use kiln_tasks::Supervisor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn main() {
    let guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match panic::catch_unwind(AssertUnwindSafe(|| cli::run(args))) {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            cli::output::error(&format!("{:#}", e));
            exit_codes::ERROR
        }
        Err(_) => {
            let killed = Supervisor::global().kill_all();
            tracing::error!(killed, "unhandled panic, terminated child processes");
            exit_codes::ERROR
        }
    };

    drop(guard);
    std::process::exit(code);
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn, or debug with KILN_DEBUG)
/// - File: always debug-level JSON to ~/.kiln/logs/
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if std::env::var_os("KILN_DEBUG").is_some() {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "kiln.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".kiln").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
