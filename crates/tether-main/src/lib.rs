//! Main stage of the tether application.
//!
//! Loaded by the launcher, which calls `AppMainEntry` and waits for it to
//! return. The stage runs until the process receives a termination signal.

tether_module_api::export_main_entry!(tether::stages::run_main_stage);
