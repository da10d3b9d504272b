//! I/O adapters: files, processes and external services.

pub mod agent;
pub mod archive;
pub mod backlog_store;
pub mod config;
pub mod init;
pub mod journal;
pub mod process;
pub mod signal;
pub mod tracker;
