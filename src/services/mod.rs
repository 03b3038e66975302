pub mod classifier;
pub mod gateway;
pub mod history;
pub mod host_store;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod scheduler;
