//! Small self-contained utilities shared across the backend and client.

pub mod arena;
pub mod threadpool;
