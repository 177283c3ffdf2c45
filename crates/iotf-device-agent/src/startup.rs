//! Initial connection.

use iotf_client::{ClientError, ClientResult, IotfClient, Transport};

/// Connect, falling back to backoff retries for transient failures.
///
/// Configuration and credential errors are returned immediately; broker
/// and network failures are retried until a connect succeeds.
pub async fn connect<T: Transport>(client: &mut IotfClient<T>) -> ClientResult<()> {
    match client.connect().await {
        Ok(()) => Ok(()),
        Err(e @ (ClientError::Network(_) | ClientError::Auth(_) | ClientError::Tls(_))) => {
            tracing::warn!(error = %e, "initial connect failed, retrying with backoff");
            client.retry_connection().await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotf_client::{
        Auth, ClientSettings, Config, MockTransport, Role, TlsMaterial, TransportError,
    };

    fn client(tls: TlsMaterial) -> (IotfClient<MockTransport>, MockTransport) {
        let config = Config {
            org: "abc123".into(),
            domain: "internetofthings.ibmcloud.com".into(),
            device_type: "thermostat".into(),
            device_id: "t-001".into(),
            auth: Auth::Certificate,
            tls,
            port: 8883,
            role: Role::Device,
        };
        let settings = ClientSettings {
            reconnect_initial_ms: 5,
            reconnect_max_ms: 20,
            ..ClientSettings::default()
        };
        let mock = MockTransport::new();
        let client = IotfClient::with_settings(config, mock.clone(), settings);
        (client, mock)
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (mut client, mock) = client(TlsMaterial::ServerAuth { server_cert: None });
        mock.fail_connects(2, TransportError::Network("unreachable".into()));

        connect(&mut client).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(mock.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn credential_failures_are_not_retried() {
        let (mut client, mock) = client(TlsMaterial::Files {
            root_ca: "/nonexistent/ca.pem".into(),
            client_cert: "/nonexistent/client.pem".into(),
            client_key: "/nonexistent/client.key".into(),
        });

        let err = connect(&mut client).await.unwrap_err();
        assert!(matches!(err, ClientError::Credential(_)));
        assert_eq!(mock.connect_attempts(), 0);
    }
}
