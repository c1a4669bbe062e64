#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use exec_fs::driver::{Driver, DriverConfig};
use exec_fs::exec::{ExecError, Executor};

/// Executor with scripted per-command outcomes and execution counting.
///
/// Commands without a script succeed with their own text plus a newline, so
/// tests only script the cases they care about.
pub struct ScriptedExecutor {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    outcomes: HashMap<String, Outcome>,
    delays: HashMap<String, Duration>,
    counts: HashMap<String, usize>,
}

enum Outcome {
    Succeed(Bytes),
    Fail(i32),
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState::default()),
        })
    }

    pub fn succeed(self: &Arc<Self>, command: &str, output: &[u8]) -> Arc<Self> {
        self.state.lock().unwrap().outcomes.insert(
            command.to_owned(),
            Outcome::Succeed(Bytes::copy_from_slice(output)),
        );
        Arc::clone(self)
    }

    /// Make every execution of `command` take at least `delay`.
    pub fn delay(self: &Arc<Self>, command: &str, delay: Duration) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(command.to_owned(), delay);
        Arc::clone(self)
    }

    pub fn fail(self: &Arc<Self>, command: &str) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(command.to_owned(), Outcome::Fail(1));
        Arc::clone(self)
    }

    /// Number of executions observed for `command`.
    pub fn count(&self, command: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .counts
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Total executions across all commands.
    pub fn total_count(&self) -> usize {
        self.state.lock().unwrap().counts.values().sum()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, command: &str) -> Result<Bytes, ExecError> {
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            *state.counts.entry(command.to_owned()).or_insert(0) += 1;

            let result = match state.outcomes.get(command) {
                Some(Outcome::Succeed(output)) => Ok(output.clone()),
                Some(Outcome::Fail(status)) => Err(ExecError::Failed { status: *status }),
                None => {
                    let mut text = command.as_bytes().to_vec();
                    text.push(b'\n');
                    Ok(Bytes::from(text))
                }
            };
            (state.delays.get(command).copied(), result)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        result
    }
}

/// Driver over a scripted executor with the default configuration.
pub fn scripted_driver(executor: &Arc<ScriptedExecutor>) -> Driver {
    Driver::with_executor(
        DriverConfig::default(),
        Arc::clone(executor) as Arc<dyn Executor>,
    )
}
