use std::time::Duration;

use tracing::debug;

use super::command::build_command;
use super::condition::{self, Bindings};
use super::error::CheckError;
use super::executor::ProbeExecutor;
use super::response::parse_response;
use super::types::CheckResult;
use crate::database::models::Probe;

/// Runs one probe end to end: build the command, execute it, parse the
/// response and evaluate the probe's condition.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    executor: ProbeExecutor,
}

impl Checker {
    pub fn new(timeout: Duration) -> Self {
        Self { executor: ProbeExecutor::new(timeout) }
    }

    pub fn timeout(&self) -> Duration {
        self.executor.timeout()
    }

    /// Check a probe. Never fails: every error yields a down result.
    ///
    /// `observed_at` is the time the check finished.
    pub async fn check(&self, probe: &Probe) -> CheckResult {
        self.run_check(probe).await.finished()
    }

    async fn run_check(&self, probe: &Probe) -> CheckResult {
        let mut result = CheckResult::new(probe.id, probe.name.clone());

        let args = match build_command(&probe.request_spec) {
            Ok(args) => args,
            Err(error) => {
                debug!(probe = %probe.name, %error, "Could not build probe command");
                return result.failure(error);
            }
        };

        let output = match self.executor.execute(&args).await {
            Ok(output) => output,
            Err(CheckError::ExecutionTimeout(_)) => {
                debug!(probe = %probe.name, "Probe timed out");
                return result.timed_out(self.executor.timeout());
            }
            Err(error) => {
                debug!(probe = %probe.name, %error, "Probe execution failed");
                return result.failure(error);
            }
        };

        let parsed = parse_response(&output.stdout);
        let transfer_time = Some(output.stderr.trim()).filter(|s| !s.is_empty()).map(String::from);

        result.elapsed_seconds = output.elapsed.as_secs_f64();
        result.http_status = parsed.status_code();
        result.transfer_time = transfer_time;

        let bindings = Bindings {
            timespent: result.elapsed_seconds,
            response_code: parsed.status_code(),
            response_body: parsed.body,
            response_headers: parsed.headers,
        };

        if let Err(error) = parsed.status {
            let error = if output.success() {
                error
            } else {
                CheckError::ExecutionFailure(format!(
                    "exit status {:?} without a parsable response",
                    output.exit_code
                ))
            };
            debug!(probe = %probe.name, %error, "No usable response");
            result.response_body = bindings.response_body;
            result.response_headers = bindings.response_headers;
            return result.failure(error);
        }

        let verdict = condition::evaluate(&probe.condition_expr, &bindings);
        result.response_body = bindings.response_body;
        result.response_headers = bindings.response_headers;

        match verdict {
            Ok(value) => {
                let is_up = value.is_truthy();
                debug!(
                    probe = %probe.name,
                    status = ?result.http_status,
                    elapsed = result.elapsed_seconds,
                    is_up,
                    "Probe evaluated"
                );
                result.evaluated(is_up)
            }
            Err(error) => {
                debug!(probe = %probe.name, %error, "Condition failed, treating as down");
                result.failure(CheckError::EvaluationError(error.to_string()))
            }
        }
    }
}
