//! Domain models

pub mod cluster;
pub mod command;
pub mod image;
pub mod project;
pub mod service;
pub mod status;
