//! Tests for error types

use prometheus_pubsub::core::{AppResult, PubSubError};

#[test]
fn test_unauthorized_error() {
    let err = PubSubError::Unauthorized {
        topic: "users".to_string(),
        channel: "7".to_string(),
    };
    assert_eq!(format!("{err}"), "unauthorized subscription to users/7");
}

#[test]
fn test_rejected_error() {
    let err = PubSubError::Rejected("quota exceeded".to_string());
    assert_eq!(format!("{err}"), "subscription rejected: quota exceeded");
}

#[test]
fn test_manager_closed_error() {
    assert_eq!(
        format!("{}", PubSubError::ManagerClosed),
        "subscription manager is shut down"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = PubSubError::InvalidConfig("bus invalid".to_string());
    assert_eq!(format!("{err}"), "invalid configuration: bus invalid");
}

#[test]
fn test_converts_into_app_result() {
    fn closed() -> Result<(), PubSubError> {
        Err(PubSubError::ManagerClosed)
    }
    fn fails() -> AppResult<()> {
        closed()?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(
        err.downcast_ref::<PubSubError>(),
        Some(&PubSubError::ManagerClosed)
    );
}
