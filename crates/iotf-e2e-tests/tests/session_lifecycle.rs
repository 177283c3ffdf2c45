//! E2E tests for the connect → publish → reconnect → disconnect lifecycle.

mod helpers;

use std::time::Duration;

use helpers::TestHarness;
use iotf_client::{ClientError, Config, QoS, Role, SessionState, TransportError};

/// Initialize from an identity file, connect, publish, disconnect, and
/// verify publishing afterwards fails with `NotConnected`.
#[tokio::test]
async fn e2e_file_identity_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.toml");
    std::fs::write(
        &path,
        r#"
org = "abc123"
type = "thermostat"
id = "t-001"
auth_method = "token"
auth_token = "s3cret-token"
port = 1883
"#,
    )
    .unwrap();

    let config = Config::from_file(&path, Role::Device).unwrap();
    let mut h = TestHarness::with_config(config);

    h.client.connect().await.unwrap();
    assert_eq!(h.client.state(), SessionState::Connected);

    let endpoint = &h.mqtt.connects()[0];
    assert_eq!(endpoint.host, "abc123.messaging.internetofthings.ibmcloud.com");
    assert_eq!(endpoint.port, 1883);
    assert_eq!(endpoint.client_id, "d:abc123:thermostat:t-001");
    let creds = endpoint.credentials.as_ref().unwrap();
    assert_eq!(creds.username, "use-token-auth");
    assert_eq!(creds.password, "s3cret-token");
    assert!(!endpoint.tls.is_tls());

    h.client
        .publish_event("status", "json", br#"{"d":{"temp":21}}"#, QoS::AtLeastOnce)
        .await
        .unwrap();
    let sent = h.mqtt.published_to("iot-2/evt/status/fmt/json");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_str(), r#"{"d":{"temp":21}}"#);

    h.client.disconnect().await.unwrap();
    assert_eq!(h.client.state(), SessionState::Disconnected);

    let err = h
        .client
        .publish_event("status", "json", b"{}", QoS::AtMostOnce)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    assert_eq!(h.mqtt.published().len(), 1);
}

/// Link loss mid-session: the handle backs off, reconnects with the same
/// client id and re-issues its subscriptions.
#[tokio::test]
async fn e2e_reconnect_restores_session() {
    let mut h = TestHarness::device();
    h.client.connect().await.unwrap();
    h.client.subscribe_commands().await.unwrap();
    h.client
        .subscribe_command("reboot", "json", QoS::AtLeastOnce)
        .await
        .unwrap();

    h.mqtt.drop_connection();
    h.mqtt
        .fail_connects(2, TransportError::Network("broker unreachable".into()));

    // 10 + 20 + 40 ms of backoff before the third attempt succeeds.
    let alive = h.client.yield_for(Duration::from_millis(500)).await.unwrap();
    assert!(alive);
    assert_eq!(h.mqtt.connect_attempts(), 4);

    let ids: Vec<_> = h.mqtt.connects().into_iter().map(|e| e.client_id).collect();
    assert!(ids.iter().all(|id| id == "d:abc123:thermostat:t-001"));

    let subs = h.mqtt.subscriptions();
    assert_eq!(subs.len(), 4);
    assert_eq!(subs[2], ("iot-2/cmd/+/fmt/+".to_string(), QoS::AtMostOnce));
    assert_eq!(
        subs[3],
        ("iot-2/cmd/reboot/fmt/json".to_string(), QoS::AtLeastOnce)
    );

    // Commands flow again after the reconnect.
    assert!(h.deliver("iot-2/cmd/reboot/fmt/json", b"{}").await);
    assert_eq!(h.commands().len(), 1);
}

/// Backoff state is visible between yields and grows per failed attempt.
#[tokio::test]
async fn e2e_backoff_grows_between_yields() {
    let mut h = TestHarness::device();
    h.client.connect().await.unwrap();
    h.mqtt.drop_connection();
    h.mqtt
        .fail_connects(10, TransportError::Auth("token revoked".into()));

    assert!(!h.client.yield_for(Duration::from_millis(5)).await.unwrap());
    assert_eq!(
        h.client.state(),
        SessionState::Reconnecting {
            attempt: 1,
            next_delay: Duration::from_millis(10)
        }
    );

    // Attempt 1 fails at ~10 ms, attempt 2 is scheduled 20 ms later.
    assert!(!h.client.yield_for(Duration::from_millis(15)).await.unwrap());
    assert_eq!(
        h.client.state(),
        SessionState::Reconnecting {
            attempt: 2,
            next_delay: Duration::from_millis(20)
        }
    );
    assert_eq!(h.mqtt.connect_attempts(), 2);
}

/// Manual disconnect cancels a pending reconnect for good.
#[tokio::test]
async fn e2e_disconnect_cancels_pending_reconnect() {
    let mut h = TestHarness::device();
    h.client.connect().await.unwrap();
    h.mqtt.drop_connection();
    assert!(!h.client.yield_for(Duration::from_millis(1)).await.unwrap());
    assert!(matches!(h.client.state(), SessionState::Reconnecting { .. }));

    h.client.disconnect().await.unwrap();
    assert_eq!(h.client.state(), SessionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(matches!(
        h.client.yield_for(Duration::from_millis(30)).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        h.client.retry_connection().await,
        Err(ClientError::NotConnected)
    ));
    assert_eq!(h.mqtt.connect_attempts(), 1);
}

/// A failed initial connect stays failed until the caller opts into
/// retrying, and `retry_connection` then loops until the broker accepts.
#[tokio::test]
async fn e2e_retry_connection_after_failed_connect() {
    let mut h = TestHarness::device();
    h.mqtt
        .fail_connects(3, TransportError::Network("connection refused".into()));

    assert!(matches!(
        h.client.connect().await,
        Err(ClientError::Network(_))
    ));
    assert_eq!(h.client.state(), SessionState::Disconnected);

    tokio::time::timeout(Duration::from_secs(2), h.client.retry_connection())
        .await
        .expect("retry should succeed within the backoff window")
        .unwrap();
    assert!(h.client.is_connected());
    assert_eq!(h.mqtt.connect_attempts(), 4);
}

/// Reconnecting after a manual disconnect requires an explicit connect and
/// starts with no subscriptions.
#[tokio::test]
async fn e2e_reconnect_after_manual_disconnect() {
    let mut h = TestHarness::device();
    h.client.connect().await.unwrap();
    h.client.subscribe_commands().await.unwrap();
    h.client.disconnect().await.unwrap();
    assert_eq!(h.mqtt.disconnects(), 1);

    h.mqtt.reset();
    h.client.connect().await.unwrap();
    assert!(h.client.is_connected());
    assert!(h.mqtt.subscriptions().is_empty());
    assert_eq!(h.client.subscriptions().count(), 0);
}
