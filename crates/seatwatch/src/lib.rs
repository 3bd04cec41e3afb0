//! Watches a course section in the UVic class catalog and emails when seats open.

pub mod catalog;
pub mod config;
pub mod logging;
pub mod notify;
pub mod watch;
