//! Background Tasks Module
//!
//! Contains the task worker that treats a cache as a capacity-bounded,
//! recency-ordered work queue.

mod worker;

pub use worker::{Task, TaskWorker};
