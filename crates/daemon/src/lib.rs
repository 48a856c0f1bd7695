// kzrnote-daemon library entry point: the single-instance note coordinator.

pub mod app;
pub mod cmdline;
pub mod config;
pub mod editor;
pub mod events;
pub mod instance;
pub mod listing;
pub mod paths;
pub mod rpc;
pub mod runtime;
pub mod search;
pub mod shell;
pub mod store;
pub mod titles;
pub mod watcher;
