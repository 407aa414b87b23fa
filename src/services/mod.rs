pub mod aggregate;
pub mod executor;
pub mod jobs;
pub mod queue;
pub mod store;
pub mod weather;
