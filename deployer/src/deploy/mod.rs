//! Deployment pipeline

pub mod artifacts;
pub mod executor;
pub mod fsm;
pub mod git;
pub mod orchestrator;
pub mod process;
pub mod shell;
pub mod site;
pub mod terminal;
