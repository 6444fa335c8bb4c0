pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod drive;
pub mod logging;
pub mod reconcile;
pub mod remote;
pub mod sync;
