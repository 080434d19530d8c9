//! Live log sessions
//!
//! A viewer watching a target owns at most one open sink per
//! `(service, viewer, target)` key. Opening a new one closes the previous.

pub mod manager;
pub mod registry;
pub mod sink;
