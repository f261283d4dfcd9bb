//! # External process work (`CommandWork`)
//!
//! Runs one external program to completion and reports the outcome through a
//! [`Completion`] passed to a caller-supplied reporter. Stdout and stderr are merged
//! into a single log in arrival order; the log is only surfaced on failure.
//!
//! ## Report format
//! ```text
//! success:  [Success] <name> (<elapsed>ms)
//!
//! failure:  ------------------------------------------------------
//!           [Error] <name>
//!           ------------------------------------------------------
//!           <captured stdout/stderr>
//!           ------------------------------------------------------
//! ```
//!
//! Argument construction is the caller's job: the program and its arguments are
//! passed in fully formed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::WorkError;
use crate::work::work::{BoxWorkFuture, Work, WorkItem};

const SEPARATOR: &str = "------------------------------------------------------";

/// Reporter invoked once per finished command.
pub type Reporter = Arc<dyn Fn(Completion) + Send + Sync>;

/// Outcome of a single [`CommandWork`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Work name (usually the master folder name).
    pub name: String,
    /// `true` when the process exited with code 0.
    pub success: bool,
    /// Human-readable report (see module docs for the format).
    pub message: String,
    /// Wall time from spawn to exit.
    pub elapsed: Duration,
}

/// One external process invocation.
///
/// ## Example
/// ```no_run
/// use std::sync::Arc;
/// use taskdrain::{CommandWork, Completion, Dispatcher, DispatcherConfig};
///
/// # async fn demo() -> Result<(), taskdrain::DispatchError> {
/// let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(5));
/// let report = Arc::new(|c: Completion| println!("{}", c.message));
///
/// for master in ["Item", "Enemy", "Stage"] {
///     let work = CommandWork::new(master, "./MasterConverter")
///         .args(["--mode", "import", "--directory", master])
///         .on_finish(report.clone());
///     dispatcher.enqueue(work.boxed());
/// }
///
/// dispatcher.process().await
/// # }
/// ```
pub struct CommandWork {
    name: String,
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    reporter: Option<Reporter>,
}

impl CommandWork {
    /// Creates a command that runs `program` with no arguments.
    pub fn new(name: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            reporter: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the child process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets the reporter called with the [`Completion`] when the process finishes.
    pub fn on_finish(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Boxes the command into a [`WorkItem`].
    pub fn boxed(self) -> WorkItem {
        Box::new(self)
    }

    async fn execute(self) -> Result<(), WorkError> {
        let started = Instant::now();
        let result = self.spawn_and_collect().await;
        let elapsed = started.elapsed();

        let (completion, outcome) = match result {
            Ok((status, _log)) if status.success() => (
                Completion {
                    name: self.name.clone(),
                    success: true,
                    message: success_message(&self.name, elapsed),
                    elapsed,
                },
                Ok(()),
            ),
            Ok((status, log)) => (
                Completion {
                    name: self.name.clone(),
                    success: false,
                    message: failure_message(&self.name, &log),
                    elapsed,
                },
                Err(WorkError::fail(status.to_string())),
            ),
            Err(e) => (
                Completion {
                    name: self.name.clone(),
                    success: false,
                    message: failure_message(&self.name, &format!("{e}\n")),
                    elapsed,
                },
                Err(WorkError::fatal(e.to_string())),
            ),
        };

        if let Some(report) = &self.reporter {
            report(completion);
        }
        outcome
    }

    /// Spawns the process and collects stdout/stderr lines until both streams close.
    async fn spawn_and_collect(&self) -> std::io::Result<(ExitStatus, String)> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let mut log = String::new();

        let mut out = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut err = child.stderr.take().map(|s| BufReader::new(s).lines());

        loop {
            tokio::select! {
                line = next_line(&mut out), if out.is_some() => match line {
                    Some(l) => push_line(&mut log, &l),
                    None => out = None,
                },
                line = next_line(&mut err), if err.is_some() => match line {
                    Some(l) => push_line(&mut log, &l),
                    None => err = None,
                },
                else => break,
            }
        }

        let status = child.wait().await?;
        Ok((status, log))
    }
}

impl Work for CommandWork {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> BoxWorkFuture {
        Box::pin((*self).execute())
    }
}

/// Reads the next line, treating read errors as end of stream.
async fn next_line<R>(lines: &mut Option<tokio::io::Lines<R>>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match lines {
        Some(l) => l.next_line().await.ok().flatten(),
        None => None,
    }
}

fn push_line(log: &mut String, line: &str) {
    log.push_str(line);
    log.push('\n');
}

fn success_message(name: &str, elapsed: Duration) -> String {
    format!("[Success] {name} ({:.2}ms)", elapsed.as_secs_f64() * 1000.0)
}

fn failure_message(name: &str, log: &str) -> String {
    let mut block = String::new();
    push_line(&mut block, SEPARATOR);
    push_line(&mut block, &format!("[Error] {name}"));
    push_line(&mut block, SEPARATOR);
    push_line(&mut block, log);
    push_line(&mut block, SEPARATOR);
    block
}
