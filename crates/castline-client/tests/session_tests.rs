//! Session Manager Tests
//!
//! Drives the session manager over a scripted in-process transport:
//! - Connect with default-address fallback
//! - Software classification
//! - Command dispatch and alternate-name retries
//! - Push events and published state
//! - Connect guards, timeouts and disconnect

use castline_client::{ClientError, SessionManager, SessionManagerBuilder};
use castline_core::{
    request, ConnectionTarget, SessionState, SoftwareVariant, DEFAULT_PRIMARY_ADDRESS,
    DEFAULT_SECONDARY_ADDRESS,
};
use castline_test_utils::{wait_until, MockConnector, MockReply, DEFAULT_TIMEOUT};
use castline_transport::{TransportError, TransportEvent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CUSTOM_ADDRESS: &str = "ws://192.168.1.20:4455";

// ============================================================================
// Helpers
// ============================================================================

/// Connected manager with the classification call already cleared from the log
async fn connected(connector: MockConnector) -> SessionManager<MockConnector> {
    let manager = SessionManager::with_connector(connector.clone());
    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);
    connector.clear_calls();
    manager
}

async fn wait_for_state(manager: &SessionManager<MockConnector>, state: SessionState) -> bool {
    manager
        .subscribe()
        .wait_for_state(state, DEFAULT_TIMEOUT)
        .await
}

// ============================================================================
// Connect and Fallback
// ============================================================================

#[tokio::test]
async fn test_connect_classifies_and_publishes() {
    let connector = MockConnector::obs();
    let manager = SessionManager::with_connector(connector.clone());
    assert_eq!(manager.state(), SessionState::Disconnected);

    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, Some("secret")).await);

    assert_eq!(manager.state(), SessionState::Connected);
    assert_eq!(manager.software_type(), SoftwareVariant::Obs);
    assert_eq!(manager.active_address().as_deref(), Some(DEFAULT_PRIMARY_ADDRESS));
    assert_eq!(connector.call_types(), vec![request::GET_VERSION]);

    let targets = connector.attempt_targets();
    assert_eq!(targets[0].password.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_default_primary_failure_retries_secondary_once() {
    let connector = MockConnector::obs();
    connector.refuse(DEFAULT_PRIMARY_ADDRESS);
    let manager = SessionManager::with_connector(connector.clone());

    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, Some("pw")).await);

    assert_eq!(
        connector.attempts(),
        vec![DEFAULT_PRIMARY_ADDRESS, DEFAULT_SECONDARY_ADDRESS]
    );
    // Same password on the retry
    assert_eq!(connector.attempt_targets()[1].password.as_deref(), Some("pw"));
    assert_eq!(manager.active_address().as_deref(), Some(DEFAULT_SECONDARY_ADDRESS));
}

#[tokio::test]
async fn test_both_defaults_failing_reports_failure() {
    let connector = MockConnector::obs();
    connector.refuse(DEFAULT_PRIMARY_ADDRESS);
    connector.refuse(DEFAULT_SECONDARY_ADDRESS);
    let manager = SessionManager::with_connector(connector.clone());

    let err = manager
        .try_connect(ConnectionTarget::default())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, ClientError::ConnectionFailed { address, .. } if address == DEFAULT_SECONDARY_ADDRESS),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(connector.attempts().len(), 2);
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);
}

#[tokio::test]
async fn test_custom_address_failure_does_not_retry() {
    let connector = MockConnector::obs();
    connector.refuse(CUSTOM_ADDRESS);
    let manager = SessionManager::with_connector(connector.clone());

    assert!(!manager.connect(CUSTOM_ADDRESS, None).await);
    assert_eq!(connector.attempts(), vec![CUSTOM_ADDRESS]);
}

#[tokio::test]
async fn test_fallback_reaches_streamlabs() {
    let connector = MockConnector::new().with_vendor("STREAMLABS Desktop 1.16");
    connector.refuse(DEFAULT_PRIMARY_ADDRESS);
    let manager = SessionManager::with_connector(connector.clone());

    let variant = manager
        .try_connect(ConnectionTarget::default())
        .await
        .unwrap();

    assert_eq!(variant, SoftwareVariant::Streamlabs);
    assert_eq!(manager.software_type(), SoftwareVariant::Streamlabs);
    assert_eq!(manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_failed_classification_keeps_session() {
    // GetVersion unscripted, so it is rejected
    let connector = MockConnector::new();
    let manager = SessionManager::with_connector(connector.clone());

    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);
    assert_eq!(manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    let err = manager
        .try_connect(ConnectionTarget::new(CUSTOM_ADDRESS, None))
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::AlreadyConnected);
    assert!(!manager.connect(CUSTOM_ADDRESS, None).await);
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(manager.active_address().as_deref(), Some(DEFAULT_PRIMARY_ADDRESS));
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected() {
    let connector = MockConnector::obs();
    connector.set_connect_delay(Duration::from_millis(200));
    let manager = Arc::new(SessionManager::with_connector(connector.clone()));

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.try_connect(ConnectionTarget::default()).await })
    };
    assert!(wait_until(|| connector.attempts().len() == 1, DEFAULT_TIMEOUT).await);

    let second = manager.try_connect(ConnectionTarget::default()).await;
    assert_eq!(second.unwrap_err(), ClientError::ConnectInProgress);

    assert_eq!(first.await.unwrap().unwrap(), SoftwareVariant::Obs);
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test]
async fn test_abandoned_connect_closes_connection() {
    let connector = MockConnector::new();
    connector.script(request::GET_VERSION, MockReply::Hang);
    let manager = SessionManager::with_connector(connector.clone());

    let attempt = tokio::time::timeout(
        Duration::from_millis(100),
        manager.try_connect(ConnectionTarget::default()),
    )
    .await;
    assert!(attempt.is_err());
    assert_eq!(connector.attempts().len(), 1);

    assert!(wait_until(|| !connector.connection_live(), DEFAULT_TIMEOUT).await);
    assert!(!manager.is_connected());
    assert_eq!(manager.state(), SessionState::Disconnected);

    // Neither the socket nor the in-flight flag is left behind
    let connector = connector.with_vendor("OBS Studio");
    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);
    assert!(connector.connection_live());
    assert_eq!(manager.software_type(), SoftwareVariant::Obs);
}

#[tokio::test]
async fn test_connect_timeout_counts_as_failure() {
    let connector = MockConnector::obs();
    connector.set_connect_delay(Duration::from_secs(30));
    let manager = SessionManagerBuilder::with_connector(connector.clone())
        .connect_timeout(Duration::from_millis(20))
        .build();

    let err = manager
        .try_connect(ConnectionTarget::new(CUSTOM_ADDRESS, None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::ConnectionFailed {
            source: TransportError::Timeout,
            ..
        }
    ));
    // The in-flight guard was released
    assert!(!matches!(
        manager.try_connect(ConnectionTarget::new(CUSTOM_ADDRESS, None)).await,
        Err(ClientError::ConnectInProgress)
    ));
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_commands_without_session_issue_no_calls() {
    let connector = MockConnector::obs();
    let manager = SessionManager::with_connector(connector.clone());

    assert!(!manager.start_streaming().await);
    assert!(!manager.stop_streaming().await);
    assert!(!manager.set_current_scene("Intro").await);
    assert!(manager.get_scenes().await.is_empty());
    assert_eq!(
        manager.try_start_streaming().await.unwrap_err(),
        ClientError::NotConnected
    );

    assert_eq!(connector.call_count(), 0);
    assert!(connector.attempts().is_empty());
}

#[tokio::test]
async fn test_start_streaming_waits_for_push_event() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    assert!(manager.start_streaming().await);
    assert_eq!(manager.state(), SessionState::Connected);

    connector.emit(TransportEvent::StreamStateChanged { active: true });
    assert!(wait_for_state(&manager, SessionState::Streaming).await);

    assert!(manager.stop_streaming().await);
    connector.emit(TransportEvent::StreamStateChanged { active: false });
    assert!(wait_for_state(&manager, SessionState::Connected).await);

    assert_eq!(
        connector.call_types(),
        vec![request::START_STREAM, request::STOP_STREAM]
    );
}

#[tokio::test]
async fn test_obs_rejection_is_terminal() {
    let connector = MockConnector::obs();
    connector.reject(
        request::SET_CURRENT_PROGRAM_SCENE,
        600,
        "No source was found by the name of `Intro`.",
    );
    let manager = connected(connector.clone()).await;

    assert!(!manager.set_current_scene("Intro").await);

    assert_eq!(connector.call_types(), vec![request::SET_CURRENT_PROGRAM_SCENE]);
    assert_eq!(manager.state(), SessionState::Connected);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_unknown_variant_never_retries() {
    let connector = MockConnector::new();
    let manager = connected(connector.clone()).await;
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);

    assert!(!manager.start_streaming().await);
    assert_eq!(connector.call_types(), vec![request::START_STREAM]);
}

#[tokio::test]
async fn test_streamlabs_retries_with_alternate_once() {
    let connector = MockConnector::streamlabs().accepting(&[request::STOP_STREAMING]);
    let manager = connected(connector.clone()).await;
    assert_eq!(manager.software_type(), SoftwareVariant::Streamlabs);

    assert!(manager.stop_streaming().await);
    assert_eq!(
        connector.call_types(),
        vec![request::STOP_STREAM, request::STOP_STREAMING]
    );
}

#[tokio::test]
async fn test_streamlabs_alternate_failure_is_terminal() {
    let connector = MockConnector::streamlabs();
    let manager = connected(connector.clone()).await;

    assert!(!manager.start_streaming().await);
    assert_eq!(
        connector.call_types(),
        vec![request::START_STREAM, request::START_STREAMING]
    );
}

#[tokio::test]
async fn test_streamlabs_alternate_scene_shape() {
    let connector = MockConnector::streamlabs().accepting(&[request::SET_CURRENT_SCENE]);
    let manager = connected(connector.clone()).await;

    assert!(manager.set_current_scene("Be Right Back").await);

    let calls = connector.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, Some(json!({ "sceneName": "Be Right Back" })));
    assert_eq!(calls[1].0, request::SET_CURRENT_SCENE);
    assert_eq!(calls[1].1, Some(json!({ "scene-name": "Be Right Back" })));
}

#[tokio::test]
async fn test_streamlabs_transport_fault_is_not_retried() {
    let connector = MockConnector::streamlabs();
    connector.script(
        request::START_STREAM,
        MockReply::Fail(TransportError::SendFailed("broken pipe".to_string())),
    );
    let manager = connected(connector.clone()).await;

    assert!(!manager.start_streaming().await);
    assert_eq!(connector.call_types(), vec![request::START_STREAM]);
}

#[tokio::test]
async fn test_get_scenes() {
    let connector = MockConnector::obs();
    connector.respond(
        request::GET_SCENE_LIST,
        json!({
            "currentProgramSceneName": "Main",
            "scenes": [
                { "sceneName": "Main", "sceneIndex": 0 },
                { "sceneName": "Intro", "sceneIndex": 1 }
            ]
        }),
    );
    let manager = connected(connector.clone()).await;

    let names: Vec<_> = manager
        .get_scenes()
        .await
        .into_iter()
        .map(|s| s.scene_name)
        .collect();
    assert_eq!(names, vec!["Main", "Intro"]);
}

#[tokio::test]
async fn test_get_scenes_has_no_alternate() {
    let connector = MockConnector::streamlabs();
    let manager = connected(connector.clone()).await;

    assert!(manager.get_scenes().await.is_empty());
    assert_eq!(connector.call_types(), vec![request::GET_SCENE_LIST]);
}

#[tokio::test]
async fn test_malformed_scene_list_is_invalid_reply() {
    let connector = MockConnector::obs();
    connector.respond(request::GET_SCENE_LIST, json!({ "scenes": "nope" }));
    let manager = connected(connector.clone()).await;

    assert!(matches!(
        manager.try_get_scenes().await,
        Err(ClientError::InvalidReply(_))
    ));
    assert!(manager.get_scenes().await.is_empty());
}

#[tokio::test]
async fn test_request_timeout() {
    let connector = MockConnector::obs();
    connector.script(request::START_STREAM, MockReply::Hang);
    let manager = SessionManagerBuilder::with_connector(connector.clone())
        .request_timeout(Duration::from_millis(50))
        .build();
    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);

    assert_eq!(
        manager.try_start_streaming().await.unwrap_err(),
        ClientError::Timeout
    );
    // A timeout alone does not end the session
    assert_eq!(manager.state(), SessionState::Connected);
}

// ============================================================================
// Push Events and Disconnect
// ============================================================================

#[tokio::test]
async fn test_close_event_resets_session() {
    let connector = MockConnector::streamlabs();
    let manager = connected(connector.clone()).await;
    connector.emit(TransportEvent::StreamStateChanged { active: true });
    assert!(wait_for_state(&manager, SessionState::Streaming).await);

    connector.drop_connection("OBS exited");

    assert!(wait_for_state(&manager, SessionState::Disconnected).await);
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);
    assert!(!manager.is_connected());
    assert_eq!(manager.active_address(), None);
}

#[tokio::test]
async fn test_close_during_command() {
    let connector = MockConnector::obs();
    connector.script(request::START_STREAM, MockReply::Hang);
    let manager = Arc::new(connected(connector.clone()).await);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start_streaming().await })
    };
    assert!(wait_until(|| connector.call_count() == 1, DEFAULT_TIMEOUT).await);

    connector.drop_connection("socket reset");

    assert!(!pending.await.unwrap());
    assert!(wait_for_state(&manager, SessionState::Disconnected).await);
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);
}

#[tokio::test]
async fn test_not_connected_error_event_resets_session() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    connector.emit(TransportEvent::not_connected("socket is gone"));

    assert!(wait_for_state(&manager, SessionState::Disconnected).await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_other_error_event_keeps_session() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    connector.emit(TransportEvent::Error {
        code: "DECODE".to_string(),
        message: "garbled frame".to_string(),
    });
    connector.emit(TransportEvent::StreamStateChanged { active: true });

    // Events are handled in order, so the error was seen first
    assert!(wait_for_state(&manager, SessionState::Streaming).await);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    manager.disconnect().await;
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(manager.software_type(), SoftwareVariant::Unknown);

    manager.disconnect().await;
    assert_eq!(manager.state(), SessionState::Disconnected);

    assert!(!manager.start_streaming().await);
    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn test_reconnect_ignores_previous_session() {
    let connector = MockConnector::obs();
    let manager = connected(connector.clone()).await;

    manager.disconnect().await;
    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);

    // The first connection's close must not tear down the second
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), SessionState::Connected);
    assert!(manager.is_connected());

    connector.emit(TransportEvent::StreamStateChanged { active: true });
    assert!(wait_for_state(&manager, SessionState::Streaming).await);
}

#[tokio::test]
async fn test_subscriber_follows_lifecycle() {
    let connector = MockConnector::obs();
    let manager = SessionManager::with_connector(connector.clone());
    let mut subscriber = manager.subscribe();

    assert!(manager.connect(DEFAULT_PRIMARY_ADDRESS, None).await);
    assert_eq!(subscriber.changed().await, Some(SessionState::Connected));

    connector.emit(TransportEvent::StreamStateChanged { active: true });
    assert_eq!(subscriber.changed().await, Some(SessionState::Streaming));

    manager.disconnect().await;
    assert_eq!(subscriber.changed().await, Some(SessionState::Disconnected));
}
