//! Command execution for the wrapped shell command.
//!
//! The executor runs one command string through a shell, waits for it and
//! reduces what happened to an [`ExecutionResult`]. It never retries; a
//! failure is reported back to the recovery loop, which decides what to do.

use anyhow::Result;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;
use tracing::{info, warn};

/// How a failed command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// The process exited with a non-zero status code.
    Code(i32),
    /// The process was killed by a signal and has no exit code.
    Signaled,
    /// The shell could not be started at all.
    SpawnFailed(String),
    /// The configured command timeout elapsed and the child was killed.
    TimedOut(Duration),
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exit code {}", code),
            ExitInfo::Signaled => write!(f, "terminated by signal"),
            ExitInfo::SpawnFailed(reason) => write!(f, "failed to start: {}", reason),
            ExitInfo::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
        }
    }
}

/// Outcome of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success { stdout: String, stderr: String },
    Failure { stderr: String, exit: ExitInfo },
}

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Trait for running a command line through a shell.
///
/// This abstraction enables testing without spawning real processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `command` to completion and returns its captured output.
    async fn run(&self, command: &str) -> Result<Output>;
}

// =============================================================================
// Default Implementations
// =============================================================================

/// Runs commands as `<shell> -c <command>` on the tokio process API.
pub struct ShellProcessRunner {
    shell: String,
    own_process_group: bool,
}

impl ShellProcessRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            own_process_group: false,
        }
    }

    /// Starts each command as the leader of a new process group and kills
    /// the whole group if the run is dropped before it finishes, so a timed
    /// out `sh -c` takes its children with it.
    ///
    /// The command is then outside the terminal's foreground group and does
    /// not receive Ctrl-C directly.
    pub fn in_own_process_group(mut self) -> Self {
        self.own_process_group = true;
        self
    }
}

#[async_trait]
impl ProcessRunner for ShellProcessRunner {
    async fn run(&self, command: &str) -> Result<Output> {
        let shell = which::which(&self.shell)?;
        let mut cmd = tokio::process::Command::new(shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.own_process_group {
            return run_in_own_group(cmd).await;
        }

        Ok(cmd.output().await?)
    }
}

#[cfg(unix)]
async fn run_in_own_group(mut cmd: tokio::process::Command) -> Result<Output> {
    cmd.process_group(0);
    let child = cmd.spawn()?;
    let group = ProcessGroupGuard(child.id());
    let output = child.wait_with_output().await?;
    group.disarm();
    Ok(output)
}

#[cfg(not(unix))]
async fn run_in_own_group(mut cmd: tokio::process::Command) -> Result<Output> {
    Ok(cmd.output().await?)
}

/// Sends SIGKILL to a process group when dropped, unless disarmed.
#[cfg(unix)]
struct ProcessGroupGuard(Option<u32>);

#[cfg(unix)]
impl ProcessGroupGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            warn!("Killing process group {}", pgid);
            // SAFETY: killpg has no memory-safety preconditions.
            unsafe {
                libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
}

// =============================================================================
// Executor Implementation
// =============================================================================

/// Runs the live command invocation and classifies the result.
///
/// # Example
///
/// ```ignore
/// let executor = Executor::new(ShellProcessRunner::new("/bin/sh"), None);
/// match executor.execute("ls /nonexistent").await {
///     ExecutionResult::Success { stdout, .. } => print!("{}", stdout),
///     ExecutionResult::Failure { stderr, .. } => eprint!("{}", stderr),
/// }
/// ```
pub struct Executor<P: ProcessRunner> {
    runner: P,
    timeout: Option<Duration>,
}

impl<P: ProcessRunner> Executor<P> {
    /// Creates a new executor.
    ///
    /// # Arguments
    ///
    /// * `runner` - Process runner used to spawn the shell
    /// * `timeout` - Upper bound on one run; `None` waits indefinitely
    pub fn new(runner: P, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// Executes a command and waits for it to finish.
    ///
    /// Spawn problems are folded into [`ExecutionResult::Failure`] with an
    /// empty stderr, because no subprocess output exists in that case.
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        info!("Executing command: {}", command);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.runner.run(command)).await {
                Ok(output) => output,
                Err(_) => {
                    warn!("Command '{}' timed out after {:?}", command, limit);
                    return ExecutionResult::Failure {
                        stderr: String::new(),
                        exit: ExitInfo::TimedOut(limit),
                    };
                }
            },
            None => self.runner.run(command).await,
        };

        match output {
            Ok(output) => Self::classify(&output),
            Err(e) => {
                warn!("Failed to start command '{}': {}", command, e);
                ExecutionResult::Failure {
                    stderr: String::new(),
                    exit: ExitInfo::SpawnFailed(e.to_string()),
                }
            }
        }
    }

    /// Reduces process output to success or failure.
    fn classify(output: &Output) -> ExecutionResult {
        if output.status.success() {
            info!("Command succeeded");
            ExecutionResult::Success {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        } else {
            let exit = match output.status.code() {
                Some(code) => ExitInfo::Code(code),
                None => ExitInfo::Signaled,
            };
            info!("Command failed with {}", exit);
            ExecutionResult::Failure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    // =========================================================================
    // Mock implementations
    // =========================================================================

    /// Mock process runner for testing.
    struct MockProcessRunner {
        output: Option<Output>,
        delay: Option<Duration>,
    }

    impl MockProcessRunner {
        fn success(stdout: &str) -> Self {
            Self {
                output: Some(Output {
                    status: ExitStatus::from_raw(0),
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: vec![],
                }),
                delay: None,
            }
        }

        fn failure(stderr: &str) -> Self {
            Self {
                output: Some(Output {
                    status: ExitStatus::from_raw(1 << 8), // Exit code 1
                    stdout: vec![],
                    stderr: stderr.as_bytes().to_vec(),
                }),
                delay: None,
            }
        }

        fn signaled() -> Self {
            Self {
                output: Some(Output {
                    status: ExitStatus::from_raw(9), // SIGKILL
                    stdout: vec![],
                    stderr: vec![],
                }),
                delay: None,
            }
        }

        fn spawn_error() -> Self {
            Self { output: None, delay: None }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::success("late")
            }
        }
    }

    #[async_trait]
    impl ProcessRunner for MockProcessRunner {
        async fn run(&self, _command: &str) -> Result<Output> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.output.clone().ok_or_else(|| anyhow!("cannot find binary path"))
        }
    }

    #[tokio::test]
    async fn test_execute_success_returns_stdout() {
        let executor = Executor::new(MockProcessRunner::success("Hello, World!\n"), None);

        let result = executor.execute("echo 'Hello, World!'").await;

        assert_eq!(
            result,
            ExecutionResult::Success {
                stdout: "Hello, World!\n".to_string(),
                stderr: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_success_keeps_stderr() {
        let runner = MockProcessRunner {
            output: Some(Output {
                status: ExitStatus::from_raw(0),
                stdout: b"ok\n".to_vec(),
                stderr: b"warning: shallow clone\n".to_vec(),
            }),
            delay: None,
        };
        let executor = Executor::new(runner, None);

        let result = executor.execute("git clone --depth 1 repo").await;

        assert_eq!(
            result,
            ExecutionResult::Success {
                stdout: "ok\n".to_string(),
                stderr: "warning: shallow clone\n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_failure_returns_stderr_and_code() {
        let executor = Executor::new(MockProcessRunner::failure("No such file or directory\n"), None);

        let result = executor.execute("ls /nonexistent").await;

        assert_eq!(
            result,
            ExecutionResult::Failure {
                stderr: "No such file or directory\n".to_string(),
                exit: ExitInfo::Code(1),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_signal_has_no_code() {
        let executor = Executor::new(MockProcessRunner::signaled(), None);

        let result = executor.execute("sleep 100").await;

        assert!(matches!(
            result,
            ExecutionResult::Failure { exit: ExitInfo::Signaled, .. }
        ));
    }

    #[tokio::test]
    async fn test_execute_spawn_error_has_empty_stderr() {
        let executor = Executor::new(MockProcessRunner::spawn_error(), None);

        let result = executor.execute("anything").await;

        match result {
            ExecutionResult::Failure { stderr, exit: ExitInfo::SpawnFailed(reason) } => {
                assert!(stderr.is_empty());
                assert!(reason.contains("cannot find binary path"));
            }
            other => panic!("expected spawn failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_times_out_when_configured() {
        let limit = Duration::from_millis(10);
        let executor = Executor::new(MockProcessRunner::slow(Duration::from_secs(5)), Some(limit));

        let result = executor.execute("sleep 5").await;

        assert_eq!(
            result,
            ExecutionResult::Failure {
                stderr: String::new(),
                exit: ExitInfo::TimedOut(limit),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_without_timeout_waits() {
        let executor = Executor::new(MockProcessRunner::slow(Duration::from_millis(20)), None);

        let result = executor.execute("sleep 0.02").await;

        assert!(matches!(result, ExecutionResult::Success { .. }));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_real_output() {
        let runner = ShellProcessRunner::new("sh");

        let output = runner.run("echo out; echo err >&2; exit 3").await.unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[tokio::test]
    async fn test_shell_runner_unknown_shell_is_an_error() {
        let runner = ShellProcessRunner::new("definitely-not-a-shell-redo");

        assert!(runner.run("true").await.is_err());
    }

    /// True while `pid` exists and is not a zombie.
    fn process_running(pid: libc::pid_t) -> bool {
        // SAFETY: signal 0 only checks for existence.
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat.contains(") Z "),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_children_of_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let executor = Executor::new(
            ShellProcessRunner::new("sh").in_own_process_group(),
            Some(Duration::from_millis(500)),
        );

        let command = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let result = executor.execute(&command).await;

        assert!(matches!(
            result,
            ExecutionResult::Failure { exit: ExitInfo::TimedOut(_), .. }
        ));
        let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut running = process_running(pid);
        for _ in 0..100 {
            if !running {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            running = process_running(pid);
        }
        assert!(!running, "background sleep {} survived the timeout", pid);
    }

    #[tokio::test]
    async fn test_own_process_group_still_captures_output() {
        let runner = ShellProcessRunner::new("sh").in_own_process_group();

        let output = runner.run("echo out; echo err >&2").await.unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }
}
