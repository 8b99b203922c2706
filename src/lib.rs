#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::struct_excessive_bools,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::doc_markdown
)]

pub mod api;
pub mod app;
pub mod backfill;
pub mod channel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod diff;
pub mod engine;
pub mod events;
pub mod http;
pub mod input;
pub mod log_window;
pub mod model;
pub mod notify;
pub mod poller;
pub mod protocol;
pub mod reducer;
pub mod tui;
