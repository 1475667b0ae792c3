/// Monitoring engine module - probe execution, evaluation and scheduling
///
/// This module is responsible for:
/// - Building probe command lines from stored request specs
/// - Running probes under a timeout and parsing their HTTP output
/// - Evaluating user conditions in a sandbox
/// - Scheduling check cycles, recording results and alerting
pub mod alert;
pub mod checker;
pub mod command;
pub mod condition;
pub mod error;
pub mod executor;
pub mod response;
pub mod scheduler;
pub mod types;


pub use alert::{AlertDispatcher, LogDispatcher, WebhookDispatcher};
pub use checker::Checker;
pub use scheduler::MonitoringScheduler;
pub use types::MonitorStatus;
