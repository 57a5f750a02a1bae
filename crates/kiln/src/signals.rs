//! Interrupt handling
//!
//! On interrupt, hangup or terminate every registered child process gets
//! SIGTERM and the tool exits with status 1.

use kiln_tasks::Supervisor;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::exit_codes;

/// Start watching for termination signals on the current runtime
pub fn trap() -> JoinHandle<()> {
    tokio::spawn(async {
        let signal = wait_for_signal().await;
        warn!(signal, "received signal, terminating child processes");
        let killed = Supervisor::global().kill_all();
        debug!(killed, "child processes signalled");
        std::process::exit(exit_codes::ERROR);
    })
}

async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut hangup), Ok(mut terminate)) =
        (signal(SignalKind::hangup()), signal(SignalKind::terminate()))
    else {
        interrupt().await;
        return "interrupt";
    };

    tokio::select! {
        _ = interrupt() => "interrupt",
        _ = hangup.recv() => "hangup",
        _ = terminate.recv() => "terminate",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    interrupt().await;
    "interrupt"
}
