//! # Process Supervision Module / 进程监管模块
//!
//! Parses commands, launches auxiliary processes and remote drivers, forwards
//! their stdout/stderr line by line into the run's output, and guarantees that
//! everything started is terminated when its owner is done with it.
//!
//! 解析命令，启动辅助进程和远程驱动程序，将它们的 stdout/stderr 逐行转发到运行输出，
//! 并保证所有已启动的进程在其所有者结束时被终止。

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use crate::core::config::{CommandSpec, ProcessSpec};
use crate::core::error::{Error, Result};
use crate::core::models::Level;
use crate::core::output::OutputAggregator;

/// How long `kill_all` waits for a killed process and its output readers.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Placeholder a browser command template uses for the page URL.
pub const URL_PLACEHOLDER: &str = "{{url}}";

/// A command split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub program: String,
    pub args: Vec<String>,
    /// The command as written, for log lines and error messages.
    pub display: String,
}

impl ParsedCommand {
    /// Splits `line` shell-style after expanding `~` and environment variables.
    pub fn from_line(line: &str) -> Result<Self> {
        let expanded = shellexpand::full(line)
            .map_err(|e| Error::InvalidCommand(format!("{line}: {e}")))?
            .to_string();
        let parts =
            shlex::split(&expanded).ok_or_else(|| Error::InvalidCommand(line.to_string()))?;
        Self::from_parts(parts, line.to_string())
    }

    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        match spec {
            CommandSpec::Line(line) => Self::from_line(line),
            CommandSpec::Argv(argv) => Self::from_parts(argv.clone(), spec.display()),
        }
    }

    /// Renders a browser command template for `url`. `{{url}}` is substituted
    /// inside each argument; without it the URL becomes the last argument.
    pub fn from_template(template: &str, url: &str) -> Result<Self> {
        let mut parsed = Self::from_line(template)?;
        if template.contains(URL_PLACEHOLDER) {
            parsed.program = parsed.program.replace(URL_PLACEHOLDER, url);
            for arg in &mut parsed.args {
                *arg = arg.replace(URL_PLACEHOLDER, url);
            }
            parsed.display = template.replace(URL_PLACEHOLDER, url);
        } else {
            parsed.args.push(url.to_string());
            parsed.display = format!("{template} \"{url}\"");
        }
        Ok(parsed)
    }

    fn from_parts(mut parts: Vec<String>, display: String) -> Result<Self> {
        if parts.is_empty() || parts[0].trim().is_empty() {
            return Err(Error::InvalidCommand(display));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
            display,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// A running child whose output is being forwarded.
pub struct Supervised {
    child: Child,
    pid: Option<u32>,
    program: String,
    readers: Vec<JoinHandle<()>>,
}

impl Supervised {
    /// Spawns `command` and starts forwarding its output to `output`.
    pub fn spawn(command: &ParsedCommand, output: Arc<OutputAggregator>) -> std::io::Result<Self> {
        let mut child = command.command().spawn()?;
        let pid = child.id();
        let pid_label = pid.map_or_else(|| "?".to_string(), |p| p.to_string());
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            let prefix = format!("[{} PID: {}]> ", command.program, pid_label);
            readers.push(forward_lines(stdout, Level::Log, prefix, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            let prefix = format!("[{} PID: {}]> ", command.program, pid_label);
            readers.push(forward_lines(stderr, Level::Error, prefix, output));
        }

        Ok(Self {
            child,
            pid,
            program: command.program.clone(),
            readers,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Waits for the child to exit. Cancel-safe, so it can race a timer.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kills the child if it is still running and reaps it and its readers.
    pub async fn kill(mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.start_kill();
        }
        let _ = tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await;
        for mut reader in self.readers.drain(..) {
            // A grandchild holding the pipe open keeps a reader alive.
            if tokio::time::timeout(REAP_TIMEOUT, &mut reader).await.is_err() {
                reader.abort();
            }
        }
    }
}

fn forward_lines<R>(
    stream: R,
    level: Level,
    prefix: String,
    output: Arc<OutputAggregator>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(stream).lines());
        while let Some(Ok(line)) = lines.next().await {
            let text = format!("{prefix}{line}");
            if level.is_error() {
                output.error(text);
            } else {
                output.log(text);
            }
        }
    })
}

/// Every process started by one stage. Dropping the group kills what is left.
///
/// 一个阶段启动的所有进程。
pub struct ProcessGroup {
    output: Arc<OutputAggregator>,
    children: Vec<Supervised>,
}

impl ProcessGroup {
    pub fn new(output: Arc<OutputAggregator>) -> Self {
        Self {
            output,
            children: Vec::new(),
        }
    }

    /// Launches `spec` and waits out its start grace period.
    ///
    /// A spawn error or a non-zero exit before the grace period ends fails
    /// with `ExecCommandFailed`. A process that is still running when it ends,
    /// or that exited cleanly, lets the caller proceed.
    pub async fn start(&mut self, spec: &ProcessSpec) -> Result<()> {
        let display = spec.command.display();
        let failed = || Error::ExecCommandFailed {
            command: display.clone(),
        };
        let command = ParsedCommand::from_spec(&spec.command)?;

        let mut process = Supervised::spawn(&command, self.output.clone()).map_err(|e| {
            self.output
                .error(format!("Failed to start \"{display}\": {e}"));
            failed()
        })?;
        self.output.log(format!(
            "Child process \"{}\" started with pid {}",
            display,
            process.pid().map_or_else(|| "?".to_string(), |p| p.to_string())
        ));

        let early_exit = tokio::select! {
            status = process.wait() => Some(status),
            _ = tokio::time::sleep(spec.start_timeout()) => None,
        };
        self.children.push(process);

        match early_exit {
            Some(Ok(status)) if !status.success() => Err(failed()),
            Some(Err(_)) => Err(failed()),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().filter_map(Supervised::pid).collect()
    }

    /// Terminates every process this group started.
    pub async fn kill_all(&mut self) {
        for process in self.children.drain(..) {
            process.kill().await;
        }
    }
}
