//! Crash watcher stage, exported as `AppModuleEntry`.
//!
//! Runs in the process the launcher spawns with `--app-type=app-watcher` and
//! serves crash reports for its parent until the parent exits.

tether_module_api::export_watcher_entry!(tether::stages::run_watcher_stage);
