pub mod container_actions;
pub mod container_logs;
pub mod health;
pub mod metrics;
pub mod stacks;
