//! External process chains
//!
//! A `ProcessChain` owns every process spawned for one stream (a single decoder,
//! or fetcher piped into decoder) together with the tasks that bridge their pipes,
//! drain their stderr and reap them. Dropping or terminating the chain kills the
//! whole chain; no process outlives its stream.
//!
//! Termination is classified on reap: ends caused by our own teardown (killed on
//! cancel, broken pipe after the reader went away, interrupted writes) are logged
//! at debug, anything else at warn with the stderr tail attached.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// stderr lines kept per process for diagnostics
const STDERR_TAIL_LINES: usize = 8;

/// Upper bound on waiting for reapers during terminate
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// stderr fragments of terminations caused by our own teardown
const EXPECTED_TERMINATION_SIGNATURES: &[&str] = &[
    "Broken pipe",
    "EPIPE",
    "Interrupted system call",
    "received signal",
    "Error writing trailer",
];

/// SIGPIPE / SIGKILL / SIGTERM
#[cfg(unix)]
const EXPECTED_SIGNALS: &[i32] = &[13, 9, 15];

/// One process in a chain
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Short name for logs ("fetch", "decode")
    pub name: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StageSpec {
    pub fn new(name: &'static str, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name,
            program: program.into(),
            args,
        }
    }
}

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Classify a non-zero exit as one we caused
pub(crate) fn is_expected_termination(
    status: Option<&ExitStatus>,
    stderr_tail: &str,
    cancelled: bool,
) -> bool {
    if cancelled {
        return true;
    }

    #[cfg(unix)]
    if let Some(signal) = status.and_then(|s| {
        use std::os::unix::process::ExitStatusExt;
        s.signal()
    }) {
        if EXPECTED_SIGNALS.contains(&signal) {
            return true;
        }
    }
    #[cfg(not(unix))]
    let _ = status;

    EXPECTED_TERMINATION_SIGNATURES
        .iter()
        .any(|sig| stderr_tail.contains(sig))
}

/// Running chain of processes, stdout of the last stage is the chain output
pub struct ProcessChain {
    label: String,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stdout: Option<ChildStdout>,
}

impl ProcessChain {
    /// Spawn `stages` connected stdout to stdin, in order
    ///
    /// If any stage fails to spawn, the stages already started are killed.
    pub fn spawn(label: impl Into<String>, stages: Vec<StageSpec>) -> Result<Self> {
        let label = label.into();
        if stages.is_empty() {
            return Err(Error::Pipeline("process chain has no stages".to_string()));
        }

        let mut chain = Self {
            label,
            cancel: CancellationToken::new(),
            tasks: Vec::with_capacity(stages.len() * 3),
            stdout: None,
        };

        let mut upstream: Option<ChildStdout> = None;
        for stage in stages {
            let mut command = Command::new(&stage.program);
            command
                .args(&stage.args)
                .stdin(if upstream.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            // Dropping `chain` on error cancels the stages already spawned
            let mut child = command.spawn().map_err(|e| {
                Error::Pipeline(format!(
                    "{}: failed to spawn {} ({}): {}",
                    chain.label,
                    stage.name,
                    stage.program.display(),
                    e
                ))
            })?;
            debug!(
                "{}: spawned {} stage (pid {:?})",
                chain.label,
                stage.name,
                child.id()
            );

            if let (Some(mut from), Some(mut to)) = (upstream.take(), child.stdin.take()) {
                let cancel = chain.cancel.clone();
                let label = chain.label.clone();
                chain.tasks.push(tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = tokio::io::copy(&mut from, &mut to) => match result {
                            Ok(bytes) => debug!("{}: pipe closed after {} bytes", label, bytes),
                            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                                debug!("{}: downstream closed pipe", label)
                            }
                            Err(e) => warn!("{}: pipe copy failed: {}", label, e),
                        },
                    }
                }));
            }

            let tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
            let stderr_task = child
                .stderr
                .take()
                .map(|stderr| tokio::spawn(drain_stderr(stderr, tail.clone())));

            upstream = child.stdout.take();
            chain.tasks.push(tokio::spawn(reap(
                format!("{}/{}", chain.label, stage.name),
                child,
                chain.cancel.clone(),
                tail,
                stderr_task,
            )));
        }

        chain.stdout = upstream;
        Ok(chain)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Take the chain's output pipe
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Kill every process and wait (bounded) for the reapers to finish
    pub async fn terminate(mut self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        let reaped = tokio::time::timeout(REAP_TIMEOUT, futures::future::join_all(tasks)).await;
        if reaped.is_err() {
            warn!("{}: processes did not exit within {:?}", self.label, REAP_TIMEOUT);
        } else {
            debug!("{}: process chain terminated", self.label);
        }
    }
}

impl Drop for ProcessChain {
    fn drop(&mut self) {
        // Reapers own the children and kill them on cancel
        self.cancel.cancel();
    }
}

async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

async fn reap(
    name: String,
    mut child: Child,
    cancel: CancellationToken,
    tail: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
) {
    let (status, cancelled) = tokio::select! {
        status = child.wait() => (status, false),
        _ = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!("{}: kill failed: {}", name, e);
            }
            (child.wait().await, true)
        }
    };

    if let Some(task) = stderr_task {
        // A grandchild may hold stderr open; don't wait on it forever
        let _ = tokio::time::timeout(Duration::from_millis(500), task).await;
    }
    let tail = tail
        .lock()
        .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();

    match status {
        Ok(status) if status.success() => debug!("{}: exited cleanly", name),
        Ok(status) if is_expected_termination(Some(&status), &tail, cancelled) => {
            debug!("{}: terminated ({})", name, status)
        }
        Ok(status) => warn!("{}: exited with {}: {}", name, status, tail),
        Err(e) => warn!("{}: wait failed: {}", name, e),
    }
}
