use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::error::CheckError;

/// Default hard wall-clock limit for one probe process.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything captured from one finished probe process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Probe executor - runs one probe command as an external process
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    timeout: Duration,
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ProbeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `args[0]` with the remaining arguments and wait for it to exit.
    ///
    /// A non-zero exit status is not an error here: probes may exit non-zero
    /// and still have written a usable response to stdout. If the deadline
    /// passes the child is killed and no partial output is returned.
    pub async fn execute(&self, args: &[String]) -> Result<ProcessOutput, CheckError> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| CheckError::ExecutionFailure("no program to execute".into()))?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started_at = SystemTime::now();
        let start = Instant::now();

        let child = command
            .spawn()
            .map_err(|e| CheckError::ExecutionFailure(format!("failed to spawn {program}: {e}")))?;

        debug!(program = %program, pid = ?child.id(), "Spawned probe process");

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CheckError::ExecutionFailure(format!("failed to wait for {program}: {e}")));
            }
            Err(_) => return Err(CheckError::ExecutionTimeout(self.timeout.as_secs())),
        };

        let elapsed = start.elapsed();

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            started_at,
            finished_at: started_at + elapsed,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let executor = ProbeExecutor::new(Duration::from_secs(5));
        let output = executor
            .execute(&argv(&["sh", "-c", "printf out; printf err >&2"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(output.success());
        assert!(output.finished_at >= output.started_at);
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let executor = ProbeExecutor::new(Duration::from_secs(5));
        let output = executor
            .execute(&argv(&["sh", "-c", "printf 'HTTP/1.1 500 Oops\\r\\n\\r\\n'; exit 22"]))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(22));
        assert!(output.stdout.starts_with("HTTP/1.1 500"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let executor = ProbeExecutor::new(Duration::from_secs(1));
        let start = Instant::now();
        let result = executor.execute(&argv(&["sleep", "10"])).await;

        assert_eq!(result.unwrap_err(), CheckError::ExecutionTimeout(1));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let executor = ProbeExecutor::default();
        let result = executor.execute(&argv(&["/definitely/not/a/binary"])).await;

        assert!(matches!(result, Err(CheckError::ExecutionFailure(_))));
    }

    #[tokio::test]
    async fn test_empty_argv() {
        let executor = ProbeExecutor::default();
        assert!(matches!(executor.execute(&[]).await, Err(CheckError::ExecutionFailure(_))));
    }
}
