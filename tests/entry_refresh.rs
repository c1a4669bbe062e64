#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedExecutor;
use exec_fs::entry::{CommandOutput, RefreshPolicy};

fn entry(
    executor: &Arc<ScriptedExecutor>,
    command: &str,
    caching: bool,
    policy: RefreshPolicy,
) -> CommandOutput {
    CommandOutput::new(
        command,
        caching,
        policy,
        Arc::clone(executor) as Arc<dyn exec_fs::exec::Executor>,
    )
}

#[test]
fn caching_entry_executes_at_most_once() {
    let executor = ScriptedExecutor::new().succeed("date", b"now\n");
    let entry = entry(&executor, "date", true, RefreshPolicy::default());

    let first = entry.get(false).unwrap();
    let second = entry.get(false).unwrap();

    assert_eq!(first, second);
    assert_eq!(executor.count("date"), 1);
}

#[test]
fn caching_entry_ignores_elapsed_refresh_deadline() {
    let executor = ScriptedExecutor::new();
    let policy = RefreshPolicy {
        min_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(1),
    };
    let entry = entry(&executor, "date", true, policy);

    entry.get(false).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    entry.get(false).unwrap();

    assert_eq!(executor.count("date"), 1);
}

#[test]
fn fresh_entry_is_served_without_reexecution() {
    let executor = ScriptedExecutor::new();
    // Generous minimum: the deadline cannot elapse within this test.
    let policy = RefreshPolicy {
        min_interval: Duration::from_secs(60),
        max_interval: Duration::from_secs(60),
    };
    let entry = entry(&executor, "uptime", false, policy);

    let first = entry.get(false).unwrap();
    let second = entry.get(false).unwrap();

    assert_eq!(first, second);
    assert_eq!(executor.count("uptime"), 1);
}

#[test]
fn stale_entry_reexecutes_after_deadline() {
    let executor = ScriptedExecutor::new();
    let policy = RefreshPolicy {
        min_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(10),
    };
    let entry = entry(&executor, "uptime", false, policy);

    entry.get(false).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    entry.get(false).unwrap();

    assert_eq!(executor.count("uptime"), 2);
}

#[test]
fn backoff_deadline_is_capped_by_max_interval() {
    let executor = ScriptedExecutor::new().delay("uptime", Duration::from_millis(50));
    let policy = RefreshPolicy {
        min_interval: Duration::from_millis(100),
        max_interval: Duration::from_millis(60),
    };
    let entry = entry(&executor, "uptime", false, policy);

    entry.get(false).unwrap();

    // Without the cap the deadline would sit elapsed + min_interval, roughly
    // 150 ms past completion; the cap brings it down to 60 ms.
    std::thread::sleep(Duration::from_millis(100));
    entry.get(false).unwrap();

    assert_eq!(executor.count("uptime"), 2);
}

#[test]
fn backoff_deadline_grows_with_execution_time() {
    let executor = ScriptedExecutor::new().delay("uptime", Duration::from_millis(80));
    let policy = RefreshPolicy {
        min_interval: Duration::from_millis(20),
        max_interval: Duration::from_secs(10),
    };
    let entry = entry(&executor, "uptime", false, policy);

    entry.get(false).unwrap();

    // The deadline is elapsed + min_interval, roughly 100 ms past
    // completion: a slow command is not re-run 20 ms later.
    std::thread::sleep(Duration::from_millis(40));
    entry.get(false).unwrap();
    assert_eq!(executor.count("uptime"), 1);

    std::thread::sleep(Duration::from_millis(120));
    entry.get(false).unwrap();
    assert_eq!(executor.count("uptime"), 2);
}

#[test]
fn failed_command_behaves_as_nonexistent() {
    let executor = ScriptedExecutor::new().fail("false");
    let entry = entry(&executor, "false", false, RefreshPolicy::default());

    assert!(entry.get(false).is_none());
    assert!(!entry.has_output());
    assert!(entry.check().is_err());
}

#[test]
fn failure_is_retried_on_next_get() {
    let executor = ScriptedExecutor::new().fail("flaky");
    let entry = entry(&executor, "flaky", false, RefreshPolicy::default());

    assert!(entry.get(false).is_none());

    // The command recovers; absent data forces another attempt regardless of
    // the refresh deadline.
    executor.succeed("flaky", b"ok\n");
    assert_eq!(entry.get(false).as_deref(), Some(b"ok\n".as_slice()));
    assert_eq!(executor.count("flaky"), 2);
}

#[test]
fn consume_forces_regeneration_on_next_get() {
    let executor = ScriptedExecutor::new();
    let entry = entry(&executor, "once", false, RefreshPolicy::default());

    let first = entry.get(true).unwrap();
    let second = entry.get(false).unwrap();

    assert_eq!(first, second);
    assert_eq!(executor.count("once"), 2);
}

#[test]
fn attributes_track_data_length() {
    let executor = ScriptedExecutor::new().succeed("echo hi", b"hi\n");
    let entry = entry(&executor, "echo hi", false, RefreshPolicy::default());

    assert_eq!(entry.attr().size(), 0);
    entry.get(false).unwrap();
    assert_eq!(entry.attr().size(), 3);
}
