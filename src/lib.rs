pub mod api;
pub mod app;
pub mod breaker;
pub mod cli;
pub mod engine;
pub mod executors;
pub mod notify;
pub mod runner;
pub mod scheduler;
pub mod storage;
