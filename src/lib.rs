pub mod agent;
pub mod archive;
pub mod audit;
pub mod broker;
pub mod config;
pub mod controller;
pub mod crucible_config;
pub mod errors;
pub mod locks;
pub mod oracle;
pub mod phase;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod ui;
