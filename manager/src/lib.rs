//! Runtime manager library
//!
//! Starts, stops and watches the containers of integration projects on a
//! local Docker engine or a Kubernetes cluster, and streams their logs.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod probe;
pub mod server;
pub mod sessions;
pub mod storage;
pub mod utils;
pub mod workers;
