//! UI to backend worker bridge: the command queue and the worker thread.

pub mod commands;
pub mod runtime;
