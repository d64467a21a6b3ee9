pub mod config;

pub mod db;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub mod alerting;
pub mod notifications;
