//! Behaviour tests for the secret module bridge.

use std::cell::RefCell;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tether_module_api::ModuleKind;

use super::support::{FakeLibraries, FakeModule, Journal, JournalingModule, queue_secret_module};
use crate::runtime::{HostRuntime, TaskRunner};
use crate::secret::{SecretModuleBridge, load_or_continue};

#[derive(Default)]
struct SecretWorld {
    journal: Journal,
    accept: Option<bool>,
    loaded: Option<bool>,
    served_after_load: bool,
}

#[fixture]
fn world() -> RefCell<SecretWorld> {
    RefCell::new(SecretWorld::default())
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|recorded| recorded == event)
        .unwrap_or_else(|| panic!("{event} missing from {events:?}"))
}

#[given("a secret module that rejects initialisation")]
fn given_rejecting(world: &RefCell<SecretWorld>) {
    world.borrow_mut().accept = Some(false);
}

#[given("a secret module that accepts initialisation")]
fn given_accepting(world: &RefCell<SecretWorld>) {
    world.borrow_mut().accept = Some(true);
}

#[when("the host runs with the secret module")]
fn when_host_runs(world: &RefCell<SecretWorld>) {
    let mut state = world.borrow_mut();
    let accept = state.accept.expect("module behaviour should be configured");
    let journal = state.journal.clone();
    let runtime = HostRuntime::new(1).expect("runtime");
    let factory = queue_secret_module(JournalingModule::raw(&journal, accept));
    let bridge =
        SecretModuleBridge::with_libraries(FakeLibraries::new(FakeModule::Factory(factory), journal.clone()));
    let module_path = Path::new("/opt/tether").join(ModuleKind::Secret.library_file_name());

    let module = load_or_continue(&bridge, &runtime, &module_path, Path::new("/profiles/Global"));
    state.loaded = Some(module.is_some());

    let (sender, receiver) = mpsc::channel();
    let posted = runtime
        .thread_pool()
        .post_task(Box::new(move || drop(sender.send(()))));
    state.served_after_load =
        posted && receiver.recv_timeout(Duration::from_secs(2)).is_ok();

    drop(module);
    journal.record("runtime stopping");
    runtime.shutdown();
}

#[then("the host kept running without it")]
fn then_host_continued(world: &RefCell<SecretWorld>) {
    let state = world.borrow();
    assert_eq!(state.loaded, Some(false));
    assert!(state.served_after_load);
}

#[then("uninitialize was never called")]
fn then_never_uninitialized(world: &RefCell<SecretWorld>) {
    assert!(!world.borrow().journal.contains("uninitialize"));
}

#[then("uninitialize ran before the object was released")]
fn then_uninitialize_first(world: &RefCell<SecretWorld>) {
    let events = world.borrow().journal.events();
    assert!(position(&events, "uninitialize") < position(&events, "release"));
}

#[then("the library was unloaded after the runtime stopped")]
fn then_unloaded_last(world: &RefCell<SecretWorld>) {
    let events = world.borrow().journal.events();
    assert!(position(&events, "release") < position(&events, "runtime stopping"));
    assert!(position(&events, "runtime stopping") < position(&events, "unload"));
}

#[scenario(
    path = "tests/features/secret_module.feature",
    name = "A secret module that fails to initialise is discarded"
)]
fn failed_secret_module_is_discarded(world: RefCell<SecretWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/secret_module.feature",
    name = "A secret module is torn down before its library unloads"
)]
fn secret_module_torn_down_before_unload(world: RefCell<SecretWorld>) {
    let _ = world;
}
