//! IIS Deployer Library
//!
//! Source acquisition, persistent build terminals, artifact placement and
//! deploy status tracking for IIS-hosted web applications.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
