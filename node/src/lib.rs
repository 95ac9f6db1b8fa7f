//! One node of the ML cluster: task admission, dispatch, local execution and
//! the HTTP surface other nodes and clients talk to.

pub mod access;
pub mod breaker;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod monitor;
pub mod runner;
pub mod state;
pub mod stats;
pub mod store;
pub mod task_manager;
pub mod transport;
