//! FSM unit tests

use iis_deployer::deploy::fsm::{DeployEvent, DeployFsm};
use iis_deployer::models::deploy::DeployStatus;

fn begin() -> DeployEvent {
    DeployEvent::BeginCommands("running 1 build command(s)".to_string())
}

fn succeed() -> DeployEvent {
    DeployEvent::Succeed("deployed 3 file(s)".to_string())
}

fn fail() -> DeployEvent {
    DeployEvent::Fail("git clone failed".to_string())
}

/// Drive a fresh FSM through `path`; `None` if any step is rejected
fn walk(path: Vec<DeployEvent>) -> Option<DeployStatus> {
    let mut fsm = DeployFsm::new();
    for event in path {
        fsm.process(event).ok()?;
    }
    Some(fsm.state())
}

#[test]
fn test_fsm_allowed_paths() {
    assert_eq!(walk(vec![begin(), succeed()]), Some(DeployStatus::Success));
    assert_eq!(walk(vec![begin(), fail()]), Some(DeployStatus::Failed));
    assert_eq!(walk(vec![fail()]), Some(DeployStatus::Failed));
}

#[test]
fn test_fsm_rejected_paths() {
    assert_eq!(walk(vec![succeed()]), None);
    assert_eq!(walk(vec![begin(), begin()]), None);
    assert_eq!(walk(vec![begin(), succeed(), fail()]), None);
    assert_eq!(walk(vec![fail(), begin()]), None);
}

#[test]
fn test_fsm_terminal_flag_matches_states() {
    let mut fsm = DeployFsm::new();
    assert!(!fsm.state().is_terminal());

    fsm.process(begin()).unwrap();
    assert!(!fsm.state().is_terminal());

    fsm.process(succeed()).unwrap();
    assert!(fsm.state().is_terminal());
    assert_eq!(fsm.message(), Some("deployed 3 file(s)"));
}
