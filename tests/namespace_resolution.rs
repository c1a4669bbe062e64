#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;

use common::{ScriptedExecutor, scripted_driver};
use exec_fs::entry::RefreshPolicy;
use exec_fs::exec::EchoExecutor;
use exec_fs::namespace::{Namespace, RemoveError};

fn echo_namespace(memo_capacity: usize) -> Namespace {
    Namespace::new(
        "cached",
        memo_capacity,
        RefreshPolicy::default(),
        Arc::new(EchoExecutor),
    )
}

#[test]
fn memo_collapses_back_to_back_resolutions() {
    let namespace = echo_namespace(1);

    // Neither resolution registers the entry, yet both share one instance.
    let first = namespace.resolve_dynamic("/uptime", false);
    let second = namespace.resolve_dynamic("/uptime", false);

    assert!(Arc::ptr_eq(&first, &second));
    assert!(namespace.registered("/uptime").is_none());
}

#[test]
fn registration_promotes_the_memoized_instance() {
    let namespace = echo_namespace(1);

    let unregistered = namespace.resolve_dynamic("/uptime", false);
    let registered = namespace.resolve_dynamic("/uptime", true);

    assert!(Arc::ptr_eq(&unregistered, &registered));
    assert!(
        namespace
            .registered("/uptime")
            .is_some_and(|entry| Arc::ptr_eq(&entry, &registered))
    );
}

#[test]
fn single_slot_memo_rebuilds_after_interleaved_lookup() {
    let namespace = echo_namespace(1);

    let first = namespace.resolve_dynamic("/a", false);
    let _ = namespace.resolve_dynamic("/b", false);
    let second = namespace.resolve_dynamic("/a", false);

    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn wider_memo_collapses_interleaved_lookups() {
    let namespace = echo_namespace(4);

    let first = namespace.resolve_dynamic("/a", false);
    let _ = namespace.resolve_dynamic("/b", false);
    let second = namespace.resolve_dynamic("/a", false);

    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn getattr_then_open_executes_once() {
    let executor = ScriptedExecutor::new().succeed("echo hi", b"hi\n");
    let driver = scripted_driver(&executor);

    driver.getattr("/echo hi").unwrap();
    driver.open("/echo hi", 0).unwrap();

    assert_eq!(executor.count("echo hi"), 1);
}

#[test]
fn escaped_separators_are_decoded_into_command_text() {
    let executor = ScriptedExecutor::new().succeed("cat /etc/hostname", b"devbox\n");
    let driver = scripted_driver(&executor);

    driver.open("/cat ||etc||hostname", 0).unwrap();
    assert_eq!(executor.count("cat /etc/hostname"), 1);
    assert_eq!(
        driver.read("/cat ||etc||hostname", 64, 0).unwrap().as_ref(),
        b"devbox\n"
    );
}

#[test]
fn cache_subtree_prefix_determines_caching() {
    let namespace = echo_namespace(1);

    assert!(namespace.resolve_dynamic("/cached/date", true).is_caching());
    assert!(!namespace.resolve_dynamic("/date", true).is_caching());
    // A name merely starting with the prefix text is not inside the subtree.
    assert!(!namespace.resolve_dynamic("/cacheddate", true).is_caching());
}

#[test]
fn entry_command_is_the_final_segment() {
    let namespace = echo_namespace(1);

    let entry = namespace.resolve_dynamic("/cached/df -h", true);
    assert_eq!(entry.command(), "df -h");
}

#[test]
fn list_children_of_unknown_directory_fails() {
    let namespace = echo_namespace(1);
    assert!(namespace.list_children("/nope").is_err());
}

#[test]
fn list_children_is_sorted_after_dot_entries() {
    let namespace = echo_namespace(1);
    namespace.resolve_dynamic("/b cmd", true);
    namespace.resolve_dynamic("/a cmd", true);

    let names = namespace.list_children("/").unwrap();
    assert_eq!(names, vec![".", "..", "a cmd", "b cmd", "cached"]);
}

#[test]
fn remove_distinguishes_static_and_unknown() {
    let namespace = echo_namespace(1);

    assert!(matches!(
        namespace.remove("/cached"),
        Err(RemoveError::NotPermitted)
    ));
    assert!(matches!(
        namespace.remove("/"),
        Err(RemoveError::NotPermitted)
    ));
    assert!(matches!(
        namespace.remove("/unknown"),
        Err(RemoveError::NotFound)
    ));

    namespace.resolve_dynamic("/known", true);
    assert!(namespace.remove("/known").is_ok());
    assert!(namespace.registered("/known").is_none());
}

#[test]
fn custom_cache_directory_name() {
    let namespace = Namespace::new(
        "keep",
        1,
        RefreshPolicy::default(),
        Arc::new(EchoExecutor),
    );

    assert_eq!(namespace.cache_root(), "/keep");
    assert!(namespace.resolve_dynamic("/keep/date", true).is_caching());
    assert!(!namespace.resolve_dynamic("/cached/date", true).is_caching());
    assert!(
        namespace
            .list_children("/")
            .unwrap()
            .contains(&"keep".to_owned())
    );
}

#[test]
fn total_bytes_ignores_failed_entries() {
    let executor = ScriptedExecutor::new().fail("bad");
    let driver = scripted_driver(&executor);

    let _ = driver.open("/bad", 0);
    driver.open("/cached/ok", 0).unwrap();

    // "ok\n" is 3 bytes; the failed entry contributes nothing.
    assert_eq!(driver.namespace().total_data_bytes(), 3);
}
