//! Broker-backed queue client for tasks and task results.

pub mod client;

pub use client::{QueueClient, QueueError, TaskQueue};
