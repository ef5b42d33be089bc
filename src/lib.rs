//! Terminal form that asks an HTTP answering service one question at a time.

pub mod app;
pub mod client;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod ui;
