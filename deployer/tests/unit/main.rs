//! Integration tests for the deployer

mod support;
mod test_fsm;
mod test_orchestrator;
mod test_server;
mod test_store;
