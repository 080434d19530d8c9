//! Wire models for the runtime manager HTTP API

pub mod models;
