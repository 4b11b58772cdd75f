//! Engine subprocess handling
//!
//! `EngineLauncher` starts the engine and hands back an `EngineProcess`;
//! the supervisor only talks to these traits so tests can swap in fakes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::env;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::BridgeConfig;

/// Lines of engine stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 50;

/// How an engine process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, absent when killed by a signal
    pub code: Option<i32>,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A running engine instance.
#[async_trait]
pub trait EngineProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Ask the engine to shut down (SIGTERM on unix).
    fn request_terminate(&mut self) -> io::Result<()>;

    /// Kill without waiting for cooperation.
    fn force_kill(&mut self) -> io::Result<()>;

    async fn wait(&mut self) -> io::Result<ProcessExit>;

    /// Recent stderr output, oldest line first.
    async fn stderr_tail(&mut self) -> String;
}

/// Starts engine instances.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> io::Result<Box<dyn EngineProcess>>;
}

/// Program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Split a configured command line on whitespace.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: parts.map(String::from).collect(),
        })
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Locate an executable on `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = candidate.with_extension("exe");
        exe.is_file().then_some(exe)
    })
}

/// Pick the engine command: `uv run acestep-api`, then `acestep-api`,
/// then `python -m ace_step.api`.
pub fn discover_command<F>(find: F) -> Option<LaunchCommand>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    if let Some(uv) = find("uv") {
        return Some(LaunchCommand::new(uv, &["run", "acestep-api"]));
    }
    if let Some(api) = find("acestep-api") {
        return Some(LaunchCommand::new(api, &[]));
    }
    find("python3")
        .or_else(|| find("python"))
        .map(|python| LaunchCommand::new(python, &["-m", "ace_step.api"]))
}

/// Launches the engine as a local subprocess.
pub struct CommandLauncher {
    command: Option<LaunchCommand>,
    working_dir: Option<PathBuf>,
}

impl CommandLauncher {
    /// Explicit command, or discovery from `PATH` at each launch.
    pub fn new(command: Option<LaunchCommand>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            working_dir,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let command = config.engine_command.as_deref().and_then(LaunchCommand::parse);
        let working_dir = Some(config.ace_step_path.clone()).filter(|p| p.is_dir());
        Self::new(command, working_dir)
    }

    fn resolve(&self) -> io::Result<LaunchCommand> {
        match &self.command {
            Some(command) => Ok(command.clone()),
            None => discover_command(find_in_path).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "could not find uv, acestep-api, or python to start ACE-Step",
                )
            }),
        }
    }
}

impl EngineLauncher for CommandLauncher {
    fn launch(&self) -> io::Result<Box<dyn EngineProcess>> {
        let command = self.resolve()?;
        info!(command = %command, "Starting ACE-Step with command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        Ok(Box::new(ChildProcess::new(child)))
    }
}

/// `EngineProcess` over a tokio child.
///
/// stdout and stderr are drained continuously so a chatty engine can
/// never block on a full pipe.
pub struct ChildProcess {
    child: Child,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl ChildProcess {
    pub fn new(mut child: Child) -> Self {
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "stdout", None));
        }
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, "stderr", Some(stderr_tail.clone()))));

        Self {
            child,
            stderr_tail,
            stderr_reader,
        }
    }
}

async fn forward_lines<R>(stream: R, name: &'static str, tail: Option<Arc<Mutex<VecDeque<String>>>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "nueva_bridge::engine", stream = name, "{}", line);
        if let Some(tail) = &tail {
            if let Ok(mut buf) = tail.lock() {
                if buf.len() == STDERR_TAIL_LINES {
                    buf.pop_front();
                }
                buf.push_back(line);
            }
        }
    }
}

#[async_trait]
impl EngineProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match self.child.id() {
            Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .map_err(|errno| io::Error::from_raw_os_error(errno as i32)),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        Ok(self.child.wait().await?.into())
    }

    async fn stderr_tail(&mut self) -> String {
        // Let the reader catch up with whatever the process wrote before exiting.
        if let Some(reader) = self.stderr_reader.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
        }
        match self.stderr_tail.lock() {
            Ok(buf) => buf.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }
}
