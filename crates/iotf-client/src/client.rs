//! The client handle.
//!
//! [`IotfClient`] owns one transport, one validated identity and the
//! session bookkeeping. All I/O is driven by the caller: `connect`,
//! publishes and subscribes complete once the broker confirms them, and
//! [`IotfClient::yield_for`] runs inbound dispatch and any due reconnect
//! attempts for a bounded window.

use std::time::Duration;

use iotf_protocol::{MAX_SUBSCRIPTIONS, QoS, topics};
use tokio::time::Instant;

use crate::bootstrap::Endpoint;
use crate::config::Config;
use crate::error::{ClientError, ClientResult, TransportError, TransportResult};
use crate::handler::{CommandHandler, Dispatcher};
use crate::router::TopicRouter;
use crate::session::{Session, SessionState};
use crate::settings::ClientSettings;
use crate::tls::{self, SecureElement};
use crate::transport::Transport;

/// A device or gateway connection to the platform.
pub struct IotfClient<T: Transport> {
    config: Config,
    settings: ClientSettings,
    transport: T,
    session: Session,
    router: TopicRouter,
    dispatcher: Dispatcher,
    send_buf: Vec<u8>,
    secure_element: Option<Box<dyn SecureElement>>,
    /// Built on the first connect and reused for every reconnect.
    endpoint: Option<Endpoint>,
    /// Filters re-issued after every reconnect.
    subscriptions: Vec<(String, QoS)>,
}

impl<T: Transport> IotfClient<T> {
    /// Create a handle using the process-wide [`ClientSettings`].
    pub fn new(config: Config, transport: T) -> Self {
        Self::with_settings(config, transport, ClientSettings::current().clone())
    }

    pub fn with_settings(config: Config, transport: T, settings: ClientSettings) -> Self {
        let capacity = settings.buffer_capacity;
        Self {
            router: TopicRouter::new(&config, capacity),
            dispatcher: Dispatcher::new(capacity, &config.device_type, &config.device_id),
            send_buf: Vec::with_capacity(capacity),
            session: Session::new(settings.backoff()),
            secure_element: None,
            endpoint: None,
            subscriptions: Vec::new(),
            config,
            settings,
            transport,
        }
    }

    /// Attach the secure element driver used in secure-element mode.
    pub fn with_secure_element(mut self, element: Box<dyn SecureElement>) -> Self {
        self.secure_element = Some(element);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Active subscription filters.
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|(filter, _)| filter.as_str())
    }

    /// Register the command handler, replacing any previous one.
    pub fn set_command_handler(&mut self, handler: impl CommandHandler + 'static) {
        self.dispatcher.set_handler(Box::new(handler));
    }

    pub fn clear_command_handler(&mut self) {
        self.dispatcher.clear_handler();
    }

    // ── Connection lifecycle ──────────────────────────────────

    /// Open the session.
    ///
    /// Credential and configuration failures are returned as-is and never
    /// schedule a reconnect. Transport failures leave the handle
    /// `Disconnected`; call [`IotfClient::retry_connection`] to retry with
    /// backoff.
    pub async fn connect(&mut self) -> ClientResult<()> {
        if self.session.is_connected() {
            return Ok(());
        }
        self.session.begin_connect();

        let endpoint = match self.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.session.on_connect_failed();
                tracing::error!(error = %e, "failed to prepare connection");
                return Err(e);
            }
        };

        match self.transport.connect(&endpoint).await {
            Ok(()) => {
                self.session.on_connected();
                tracing::info!(
                    host = %endpoint.host,
                    port = endpoint.port,
                    client_id = %endpoint.client_id,
                    tls = endpoint.tls.is_tls(),
                    "connected"
                );
                self.restore_subscriptions().await;
                Ok(())
            }
            Err(e) => {
                self.session.on_connect_failed();
                tracing::warn!(host = %endpoint.host, error = %e, "connect failed");
                Err(e.into())
            }
        }
    }

    /// Reconnect with backoff until a connect succeeds.
    ///
    /// Fails with `NotConnected` on a handle that was explicitly
    /// disconnected. Dropping the returned future stops retrying.
    pub async fn retry_connection(&mut self) -> ClientResult<()> {
        if self.session.is_torn_down() {
            return Err(ClientError::NotConnected);
        }
        if self.session.is_connected() {
            return Ok(());
        }
        if !matches!(self.session.state(), SessionState::Reconnecting { .. }) {
            self.session.on_connection_lost(Instant::now());
        }

        loop {
            if let Some(at) = self.session.next_attempt_at() {
                tokio::time::sleep_until(at).await;
            }
            if self.reconnect_once().await? {
                return Ok(());
            }
        }
    }

    /// Close the session. Terminal: pending reconnects are cancelled and
    /// subscriptions forgotten until the next [`IotfClient::connect`].
    ///
    /// The handle is torn down even when closing the MQTT session fails;
    /// that failure is still returned.
    pub async fn disconnect(&mut self) -> ClientResult<()> {
        self.session.on_disconnect();
        self.subscriptions.clear();

        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                tracing::warn!(error = %e, "error while closing MQTT session");
                return Err(e.into());
            }
        }
        tracing::info!(device_id = %self.config.device_id, "disconnected");
        Ok(())
    }

    /// Drive inbound dispatch and reconnects for at most `duration`.
    ///
    /// Returns whether the handle is connected when the window ends.
    pub async fn yield_for(&mut self, duration: Duration) -> ClientResult<bool> {
        let deadline = Instant::now() + duration;

        loop {
            match self.session.state() {
                SessionState::Connected => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.transport.poll(remaining).await {
                        Ok(messages) => {
                            for message in messages {
                                self.dispatcher.dispatch(&message.topic, &message.payload);
                            }
                        }
                        Err(e) => self.connection_lost(&e),
                    }
                }
                SessionState::Reconnecting { .. } => {
                    let at = self.session.next_attempt_at().unwrap_or_else(Instant::now);
                    if at > deadline {
                        tokio::time::sleep_until(deadline).await;
                        return Ok(false);
                    }
                    tokio::time::sleep_until(at).await;
                    self.reconnect_once().await?;
                }
                SessionState::Disconnected | SessionState::Connecting => {
                    return Err(ClientError::NotConnected);
                }
            }

            if Instant::now() >= deadline {
                return Ok(self.session.is_connected());
            }
        }
    }

    // ── Publishing ────────────────────────────────────────────

    /// Publish an event about this handle.
    pub async fn publish_event(
        &mut self,
        event_type: &str,
        format: &str,
        payload: &[u8],
        qos: QoS,
    ) -> ClientResult<()> {
        self.ensure_connected()?;
        let topic = self.router.event(event_type, format)?;
        self.publish_data(&topic, payload, qos).await
    }

    /// Publish an event about the gateway itself.
    pub async fn publish_gateway_event(
        &mut self,
        event_type: &str,
        format: &str,
        payload: &[u8],
        qos: QoS,
    ) -> ClientResult<()> {
        self.ensure_connected()?;
        let topic = self.router.gateway_event(event_type, format)?;
        self.publish_data(&topic, payload, qos).await
    }

    /// Publish an event on behalf of a device attached to this gateway.
    pub async fn publish_device_event(
        &mut self,
        device_type: &str,
        device_id: &str,
        event_type: &str,
        format: &str,
        payload: &[u8],
        qos: QoS,
    ) -> ClientResult<()> {
        self.ensure_connected()?;
        let topic = self
            .router
            .device_event(device_type, device_id, event_type, format)?;
        self.publish_data(&topic, payload, qos).await
    }

    /// Publish `payload` to an arbitrary topic.
    pub async fn publish_data(&mut self, topic: &str, payload: &[u8], qos: QoS) -> ClientResult<()> {
        self.ensure_connected()?;
        let capacity = self.settings.buffer_capacity;
        if payload.len() > capacity {
            return Err(ClientError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }
        topics::validate_topic_name(topic)?;
        topics::ensure_capacity(topic.to_string(), capacity)?;

        self.send_buf.clear();
        self.send_buf.extend_from_slice(payload);
        let result = self.transport.publish(topic, &self.send_buf, qos).await;
        self.settle(result)?;
        tracing::debug!(topic, len = payload.len(), ?qos, "published");
        Ok(())
    }

    // ── Subscribing ───────────────────────────────────────────

    /// Subscribe to one command (`+` wildcards allowed).
    pub async fn subscribe_command(&mut self, command: &str, format: &str, qos: QoS) -> ClientResult<()> {
        self.ensure_connected()?;
        let filter = self.router.command(command, format)?;
        self.subscribe_filter(filter, qos).await
    }

    /// Subscribe to every command for this handle.
    pub async fn subscribe_commands(&mut self) -> ClientResult<()> {
        self.ensure_connected()?;
        let filter = self.router.all_commands()?;
        self.subscribe_filter(filter, QoS::default()).await
    }

    pub async fn subscribe_to_gateway_commands(&mut self, qos: QoS) -> ClientResult<()> {
        self.ensure_connected()?;
        let filter = self.router.gateway_commands()?;
        self.subscribe_filter(filter, qos).await
    }

    /// Subscribe to commands for a device attached to this gateway.
    pub async fn subscribe_to_device_commands(
        &mut self,
        device_type: &str,
        device_id: &str,
        command: &str,
        format: &str,
        qos: QoS,
    ) -> ClientResult<()> {
        self.ensure_connected()?;
        let filter = self
            .router
            .device_command(device_type, device_id, command, format)?;
        self.subscribe_filter(filter, qos).await
    }

    pub async fn subscribe_to_gateway_notification(&mut self) -> ClientResult<()> {
        self.ensure_connected()?;
        let filter = self.router.notifications()?;
        self.subscribe_filter(filter, QoS::default()).await
    }

    // ── Internal helpers ──────────────────────────────────────

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn endpoint(&mut self) -> ClientResult<Endpoint> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let bundle = tls::resolve_credentials(&self.config, self.secure_element.as_deref())?;
        let endpoint = Endpoint::new(&self.config, bundle, &self.settings);
        self.endpoint = Some(endpoint.clone());
        Ok(endpoint)
    }

    async fn subscribe_filter(&mut self, filter: String, qos: QoS) -> ClientResult<()> {
        let known = self.subscriptions.iter().position(|(f, _)| *f == filter);
        if known.is_none() && self.subscriptions.len() >= MAX_SUBSCRIPTIONS {
            return Err(ClientError::SubscriptionLimit(MAX_SUBSCRIPTIONS));
        }

        let result = self.transport.subscribe(&filter, qos).await;
        self.settle(result)?;
        tracing::info!(filter = %filter, ?qos, "subscribed");

        match known {
            Some(index) => self.subscriptions[index].1 = qos,
            None => self.subscriptions.push((filter, qos)),
        }
        Ok(())
    }

    async fn restore_subscriptions(&mut self) {
        for (filter, qos) in self.subscriptions.clone() {
            if let Err(e) = self.transport.subscribe(&filter, qos).await {
                tracing::warn!(filter = %filter, error = %e, "failed to restore subscription");
            }
        }
    }

    /// One scheduled reconnect attempt.
    ///
    /// `Ok(false)` means the attempt failed and the next one is scheduled.
    /// Only configuration and credential failures are returned as errors.
    async fn reconnect_once(&mut self) -> ClientResult<bool> {
        let attempt = self.session.attempt();
        self.session.begin_reconnect();

        let endpoint = match self.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.session.on_connect_failed();
                return Err(e);
            }
        };

        match self.transport.connect(&endpoint).await {
            Ok(()) => {
                self.session.on_connected();
                tracing::info!(attempt, client_id = %endpoint.client_id, "reconnected");
                self.restore_subscriptions().await;
                Ok(true)
            }
            Err(e) => {
                if matches!(e, TransportError::Auth(_)) {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "broker rejected credentials; retrying indefinitely until disconnect"
                    );
                }
                self.session.on_reconnect_failed(Instant::now());
                tracing::warn!(
                    attempt,
                    error = %e,
                    next = %self.session.state(),
                    "reconnect failed"
                );
                Ok(false)
            }
        }
    }

    fn connection_lost(&mut self, err: &TransportError) {
        self.session.on_connection_lost(Instant::now());
        tracing::warn!(error = %err, state = %self.session.state(), "connection lost");
    }

    /// Map a transport result, noticing when the link died underneath it.
    fn settle(&mut self, result: TransportResult<()>) -> ClientResult<()> {
        if let Err(e) = result {
            if self.session.is_connected() && !self.transport.is_connected() {
                self.connection_lost(&e);
            }
            return Err(e.into());
        }
        Ok(())
    }
}
