//! Entry-point invocation with per-instance failure isolation.

use rhai::Dynamic;

use super::error::DispatchError;
use super::instance::{EntryPoint, ScriptInstance};
use crate::interop::HostValue;

/// Result of asking an instance to run an entry point.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The instance is stopped, not ready, or does not define the entry point.
    Skipped,
    Completed(Dynamic),
    Failed(DispatchError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs `entry` without touching the instance's running flag on failure.
pub fn invoke(instance: &mut ScriptInstance, entry: EntryPoint, args: Vec<HostValue>) -> Outcome {
    if !instance.is_running() {
        return Outcome::Skipped;
    }
    let args = args.into_iter().map(HostValue::into_dynamic).collect();
    match instance.call(entry, args) {
        None => Outcome::Skipped,
        Some(Ok(value)) => Outcome::Completed(value),
        Some(Err(err)) => Outcome::Failed(DispatchError {
            script: instance.name().to_string(),
            entry: entry.as_str(),
            message: err.to_string(),
        }),
    }
}

/// Lifecycle dispatch: a failing entry point stops its instance and nothing else.
pub fn run(instance: &mut ScriptInstance, entry: EntryPoint, args: Vec<HostValue>) -> Outcome {
    let outcome = invoke(instance, entry, args);
    if let Outcome::Failed(err) = &outcome {
        tracing::error!(script = %err.script, entry = err.entry, "{}; script stopped", err.message);
        instance.stop();
    }
    outcome
}
