//! Settings, on-disk layout and the project store

pub mod layout;
pub mod projects;
pub mod settings;
