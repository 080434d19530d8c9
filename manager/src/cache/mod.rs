//! In-memory status cache and its event bus

pub mod events;
pub mod status;
