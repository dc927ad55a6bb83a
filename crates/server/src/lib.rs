// gallery-server library entry point.

pub mod api;
pub mod config;
pub mod cors;
pub mod error;
pub mod git;
pub mod runtime;
pub mod uploads;
