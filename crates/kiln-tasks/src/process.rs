//! Child process execution and the process-wide child supervisor

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Registry of currently running child processes.
///
/// Every spawned command registers its pid for as long as it runs, so that
/// a termination signal can take all of them down at once.
#[derive(Debug, Default)]
pub struct Supervisor {
    children: Mutex<HashMap<u32, String>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The supervisor shared by the whole process
    pub fn global() -> &'static Supervisor {
        static GLOBAL: OnceLock<Supervisor> = OnceLock::new();
        GLOBAL.get_or_init(Supervisor::new)
    }

    fn children(&self) -> std::sync::MutexGuard<'_, HashMap<u32, String>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a spawned child
    pub fn register(&self, pid: u32, command: impl Into<String>) {
        self.children().insert(pid, command.into());
    }

    /// Forget a child once it has exited
    pub fn unregister(&self, pid: u32) {
        self.children().remove(&pid);
    }

    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// Get the pids of all tracked children
    pub fn pids(&self) -> Vec<u32> {
        self.children().keys().copied().collect()
    }

    /// Terminate every registered child and clear the registry.
    ///
    /// Returns how many children were signalled.
    pub fn kill_all(&self) -> usize {
        let drained: Vec<(u32, String)> = self.children().drain().collect();
        for (pid, command) in &drained {
            match terminate(*pid) {
                Ok(()) => warn!(pid, command = %command, "killed child process"),
                Err(e) => debug!(pid, error = %e, "failed to kill child process"),
            }
        }
        drained.len()
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> io::Result<()> {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
}

/// Unregisters a pid when dropped, even if the caller is cancelled
struct Registration<'a> {
    supervisor: &'a Supervisor,
    pid: Option<u32>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(pid) = self.pid {
            self.supervisor.unregister(pid);
        }
    }
}

/// Options for [`exec`]
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Do not echo output to the terminal
    pub silent: bool,
    /// Treat a non-zero exit code as an error
    pub check: bool,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            silent: false,
            check: true,
            cwd: None,
            env: Vec::new(),
        }
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Don't echo output while the command runs
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Treat a non-zero exit as an error
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables
    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }
}

/// Collected output of a finished process
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Interleaved stdout and stderr
    pub combined: String,
}

impl ExecOutput {
    /// Check if the command exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Errors running a child process
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The process could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the process failed
    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process exited with a non-zero code
    #[error("Process exited with code: {}", display_code(.code))]
    Exit { code: Option<i32> },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Prefer a program relative to the working directory, then `PATH`
fn resolve_program(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_file() {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        return std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf());
    }
    which::which(program).unwrap_or_else(|_| path.to_path_buf())
}

/// Run a program, streaming its output unless silent.
///
/// The child is registered with the global [`Supervisor`] while it runs.
pub async fn exec<S: AsRef<str>>(
    program: &str,
    args: &[S],
    options: &ExecOptions,
) -> Result<ExecOutput, ExecError> {
    exec_with(Supervisor::global(), program, args, options).await
}

/// [`exec`] against an explicit supervisor
pub async fn exec_with<S: AsRef<str>>(
    supervisor: &Supervisor,
    program: &str,
    args: &[S],
    options: &ExecOptions,
) -> Result<ExecOutput, ExecError> {
    let resolved = resolve_program(program);
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let shown = format!("{} {}", resolved.display(), args.join(" "));
    let shown = shown.trim_end();
    debug!(command = shown, "exec");

    let mut command = Command::new(&resolved);
    command
        .args(&args)
        .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &options.cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let pid = child.id();
    if let Some(pid) = pid {
        supervisor.register(pid, shown);
    }
    let _registration = Registration { supervisor, pid };

    let combined = Mutex::new(String::new());
    let (stdout, stderr) = tokio::join!(
        pump(child.stdout.take(), false, options.silent, &combined),
        pump(child.stderr.take(), true, options.silent, &combined),
    );

    let status = child.wait().await.map_err(|source| ExecError::Wait {
        program: program.to_string(),
        source,
    })?;

    let output = ExecOutput {
        code: status.code(),
        stdout,
        stderr,
        combined: combined.into_inner().unwrap_or_else(|e| e.into_inner()),
    };

    if options.check && !status.success() {
        return Err(ExecError::Exit { code: output.code });
    }
    Ok(output)
}

/// Run a command line through the platform shell
pub async fn shell(command: &str, options: &ExecOptions) -> Result<ExecOutput, ExecError> {
    if cfg!(windows) {
        exec("cmd", &["/C", command], options).await
    } else {
        exec("sh", &["-c", command], options).await
    }
}

async fn pump<R>(reader: Option<R>, is_stderr: bool, silent: bool, combined: &Mutex<String>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return collected;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "output stream closed");
                break;
            }
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if !silent {
            if is_stderr {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
        collected.push_str(line);
        collected.push('\n');
        let mut all = combined.lock().unwrap_or_else(|e| e.into_inner());
        all.push_str(line);
        all.push('\n');
    }
    collected
}
