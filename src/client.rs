//! Client builder and runtime wiring.
//!
//! [`ClientBuilder`] collects the access token, the plugins, and the tuning
//! knobs, then `connect` performs the startup sequence:
//!
//! 1. Register all plugins (one-time bulk registration, fully preceding the
//!    first dispatch)
//! 2. Dial the api and event stream channels and build the request channel
//! 3. Spawn the api read loop (reply decode → correlation resolve), the
//!    event read loop (event decode → dispatch), and the correlation sweep
//!
//! # Example
//!
//! ```ignore
//! use botgate_client::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("access-token")
//!         .plugin(MyPlugin::default())
//!         .connect("ws://127.0.0.1:6700", "http://127.0.0.1:5700")
//!         .await?;
//!
//!     let echo = client.send_group_msg(12345, "hello".to_string()).await?;
//!     tracing::info!(echo, "command sent");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::correlator::{
    Correlator, EchoGenerator, SequentialEcho, TimeoutHook, DEFAULT_ECHO_TIMEOUT,
};
use crate::dispatch::{Dispatcher, FailureHook, DEFAULT_MAX_CONCURRENT_HANDLERS};
use crate::error::{BotgateError, Result};
use crate::plugin::{Plugin, PluginRegistry};
use crate::protocol::{
    ApiRequest, ApiResponse, Event, GatewayStatus, GroupBan, GroupKick, GroupMessage,
    GroupWholeBan, PrivateMessage, ACTION_GET_STATUS, ACTION_SEND_GROUP_MSG,
    ACTION_SEND_PRIVATE_MSG, ACTION_SET_GROUP_BAN, ACTION_SET_GROUP_KICK,
    ACTION_SET_GROUP_WHOLE_BAN,
};
use crate::transport::{HttpChannel, MessageChannel, RequestChannel, WsChannel};

/// Tuning knobs for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Period of the correlation sweep task.
    pub sweep_interval: Duration,
    /// Age beyond which a pending correlation is evicted.
    pub echo_timeout: Duration,
    /// Maximum concurrently running handler units.
    pub max_concurrent_handlers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_ECHO_TIMEOUT,
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }
}

/// Builder for configuring and connecting a gateway client.
pub struct ClientBuilder {
    token: String,
    plugins: Vec<Arc<dyn Plugin>>,
    config: ClientConfig,
    echo_generator: Arc<dyn EchoGenerator>,
    failure_hook: Option<FailureHook>,
    timeout_hook: Option<TimeoutHook>,
}

impl ClientBuilder {
    /// Create a builder carrying the gateway access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            plugins: Vec::new(),
            config: ClientConfig::default(),
            echo_generator: Arc::new(SequentialEcho::new()),
            failure_hook: None,
            timeout_hook: None,
        }
    }

    /// Register a plugin. Registration itself happens once, at connect time.
    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Set the correlation sweep period.
    ///
    /// Default: 30 seconds.
    pub fn sweep_interval(mut self, period: Duration) -> Self {
        self.config.sweep_interval = period;
        self
    }

    /// Set the correlation timeout threshold.
    ///
    /// Default: 30 seconds.
    pub fn echo_timeout(mut self, timeout: Duration) -> Self {
        self.config.echo_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrently running handler units.
    ///
    /// When this limit is reached, new dispatch units are dropped with a
    /// warning. Default: 256.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Replace the correlation id generator (deterministic ids in tests).
    pub fn echo_generator(mut self, generator: Arc<dyn EchoGenerator>) -> Self {
        self.echo_generator = generator;
        self
    }

    /// Install a hook receiving handler failures instead of the default
    /// log-only reporting.
    pub fn failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    /// Install a hook receiving the echo id of each timed-out command.
    pub fn timeout_hook(mut self, hook: TimeoutHook) -> Self {
        self.timeout_hook = Some(hook);
        self
    }

    /// Dial the gateway and start the client.
    ///
    /// `stream_url` is the WebSocket root (the api and event channels live
    /// at `{stream_url}/api` and `{stream_url}/event`); `request_url` is the
    /// HTTP root for status queries.
    pub async fn connect(self, stream_url: &str, request_url: &str) -> Result<GatewayClient> {
        let (api, api_rx) =
            WsChannel::connect("api", &format!("{stream_url}/api"), &self.token).await?;
        let (event, event_rx) =
            WsChannel::connect("event", &format!("{stream_url}/event"), &self.token).await?;
        let request = HttpChannel::new(request_url, &self.token)?;

        Ok(self.connect_channels(
            Arc::new(api),
            api_rx,
            Arc::new(event),
            event_rx,
            Arc::new(request),
        ))
    }

    /// Start the client over already-connected channels.
    ///
    /// This is the injection seam: tests supply in-memory doubles for both
    /// stream channels and the request channel.
    pub fn connect_channels(
        self,
        api: Arc<dyn MessageChannel>,
        api_rx: mpsc::Receiver<String>,
        event: Arc<dyn MessageChannel>,
        event_rx: mpsc::Receiver<String>,
        request: Arc<dyn RequestChannel>,
    ) -> GatewayClient {
        // Registration completes before the event read loop exists, so every
        // dispatch reads a finished registry.
        let registry = Arc::new(PluginRegistry::register_all(self.plugins));

        let dispatcher = match self.failure_hook {
            Some(hook) => Dispatcher::with_failure_hook(
                registry,
                self.config.max_concurrent_handlers,
                hook,
            ),
            None => Dispatcher::new(registry, self.config.max_concurrent_handlers),
        };

        let correlator = Arc::new(match self.timeout_hook {
            Some(hook) => Correlator::with_timeout_hook(self.config.echo_timeout, hook),
            None => Correlator::new(self.config.echo_timeout),
        });

        let sweep_task = correlator.spawn_sweep(self.config.sweep_interval);
        let api_task = tokio::spawn(api_read_loop(api_rx, correlator.clone()));
        let event_task = tokio::spawn(event_read_loop(event_rx, dispatcher));

        GatewayClient {
            api,
            event,
            request,
            correlator,
            echo_generator: self.echo_generator,
            _sweep_task: sweep_task,
            _api_task: api_task,
            _event_task: event_task,
        }
    }
}

/// Decode replies off the api channel and resolve their correlations.
async fn api_read_loop(mut inbound: mpsc::Receiver<String>, correlator: Arc<Correlator>) {
    while let Some(raw) = inbound.recv().await {
        let reply: ApiResponse = match JsonCodec::decode(raw.as_bytes()) {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(channel = "api", %error, "dropping undecodable reply");
                continue;
            }
        };
        if !reply.is_ok() {
            tracing::warn!(
                channel = "api",
                retcode = reply.retcode,
                echo = reply.echo,
                "gateway reported command failure"
            );
        }
        correlator.resolve(reply.echo);
    }
}

/// Decode events off the event channel and fan them out.
async fn event_read_loop(mut inbound: mpsc::Receiver<String>, dispatcher: Dispatcher) {
    while let Some(raw) = inbound.recv().await {
        let event: Event = match JsonCodec::decode(raw.as_bytes()) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(channel = "event", %error, "dropping undecodable event");
                continue;
            }
        };
        dispatcher.dispatch(event);
    }
}

/// A running gateway client.
pub struct GatewayClient {
    api: Arc<dyn MessageChannel>,
    event: Arc<dyn MessageChannel>,
    request: Arc<dyn RequestChannel>,
    correlator: Arc<Correlator>,
    echo_generator: Arc<dyn EchoGenerator>,
    _sweep_task: JoinHandle<()>,
    _api_task: JoinHandle<()>,
    _event_task: JoinHandle<()>,
}

impl GatewayClient {
    /// Create a new client builder.
    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(token)
    }

    /// Whether the api stream channel is connected.
    pub fn is_api_connected(&self) -> bool {
        self.api.is_connected()
    }

    /// Whether the event stream channel is connected.
    pub fn is_event_connected(&self) -> bool {
        self.event.is_connected()
    }

    /// Number of commands currently awaiting a reply.
    pub fn pending_commands(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Serialize and transmit an arbitrary payload on the api channel.
    ///
    /// A payload sent while disconnected is silently dropped: callers poll
    /// connectivity state before assuming delivery.
    pub async fn send_json<T: serde::Serialize>(&self, payload: &T) -> Result<()> {
        if !self.api.is_connected() {
            tracing::debug!(channel = "api", "not connected, dropping payload");
            return Ok(());
        }
        let encoded = JsonCodec::encode(payload)?;
        self.transmit(encoded).await;
        Ok(())
    }

    /// Send a group message. Returns the command's echo id.
    pub async fn send_group_msg(&self, group_id: i64, message: String) -> Result<i64> {
        self.send_command(ACTION_SEND_GROUP_MSG, GroupMessage { group_id, message })
            .await
    }

    /// Send a private message. Returns the command's echo id.
    pub async fn send_private_msg(&self, user_id: i64, message: String) -> Result<i64> {
        self.send_command(ACTION_SEND_PRIVATE_MSG, PrivateMessage { user_id, message })
            .await
    }

    /// Remove a user from a group, optionally rejecting future join
    /// requests. Returns the command's echo id.
    pub async fn set_group_kick(
        &self,
        group_id: i64,
        user_id: i64,
        reject_add_request: bool,
    ) -> Result<i64> {
        self.send_command(
            ACTION_SET_GROUP_KICK,
            GroupKick {
                group_id,
                user_id,
                reject_add_request,
            },
        )
        .await
    }

    /// Mute a group member for `duration` seconds (zero lifts the mute).
    /// Returns the command's echo id.
    pub async fn set_group_ban(&self, group_id: i64, user_id: i64, duration: i64) -> Result<i64> {
        self.send_command(
            ACTION_SET_GROUP_BAN,
            GroupBan {
                group_id,
                user_id,
                duration,
            },
        )
        .await
    }

    /// Mute or unmute the whole group. Returns the command's echo id.
    pub async fn set_group_whole_ban(&self, group_id: i64, enable: bool) -> Result<i64> {
        self.send_command(ACTION_SET_GROUP_WHOLE_BAN, GroupWholeBan { group_id, enable })
            .await
    }

    /// Query the gateway's health flags over the request channel.
    ///
    /// Fails if the channel is unavailable, the gateway reports a non-zero
    /// retcode, or the reply is missing any expected field.
    pub async fn get_status(&self) -> Result<GatewayStatus> {
        let raw = self.request.request(ACTION_GET_STATUS).await?;
        let reply: ApiResponse = JsonCodec::decode(raw.as_bytes())?;

        if !reply.is_ok() {
            return Err(BotgateError::Gateway {
                retcode: reply.retcode,
            });
        }
        let data = reply
            .data
            .ok_or_else(|| BotgateError::Protocol("status reply carried no data".to_string()))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Build, track, and transmit one command envelope.
    ///
    /// The echo id is generated per command and tracked only if the channel
    /// is connected; a command sent while disconnected is silently dropped.
    async fn send_command<P: serde::Serialize>(
        &self,
        action: &'static str,
        params: P,
    ) -> Result<i64> {
        let echo = self.echo_generator.next_id();

        if !self.api.is_connected() {
            tracing::debug!(channel = "api", action, echo, "not connected, dropping command");
            return Ok(echo);
        }

        let encoded = JsonCodec::encode(&ApiRequest::new(action, params, echo))?;
        self.correlator.track(echo);
        self.transmit(encoded).await;
        Ok(echo)
    }

    /// Hand a payload to the stream channel, logging instead of escalating:
    /// transport failures never reach command callers.
    async fn transmit(&self, payload: String) {
        if let Err(error) = self.api.send(payload).await {
            tracing::warn!(channel = "api", %error, "send failed, payload dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for a stream channel: records sends, exposes a
    /// switchable connected flag.
    pub(crate) struct MockChannel {
        pub connected: AtomicBool,
        pub sent: Mutex<Vec<String>>,
    }

    impl MockChannel {
        pub fn new(connected: bool) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn sent_payloads(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageChannel for MockChannel {
        async fn send(&self, payload: String) -> Result<()> {
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    /// Request channel double returning a canned body.
    pub(crate) struct MockRequestChannel {
        pub body: Mutex<String>,
    }

    impl MockRequestChannel {
        pub fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: Mutex::new(body.to_string()),
            })
        }
    }

    #[async_trait]
    impl RequestChannel for MockRequestChannel {
        async fn request(&self, _action: &str) -> Result<String> {
            Ok(self.body.lock().unwrap().clone())
        }
    }

    fn test_client(
        api: Arc<MockChannel>,
        request: Arc<dyn RequestChannel>,
    ) -> (GatewayClient, mpsc::Sender<String>) {
        let (api_tx, api_rx) = mpsc::channel(16);
        let (_event_tx, event_rx) = mpsc::channel(16);
        let event = MockChannel::new(true);

        let client = ClientBuilder::new("secret")
            .echo_generator(Arc::new(crate::correlator::SequentialEcho::starting_at(
                1000,
            )))
            .connect_channels(api, api_rx, event, event_rx, request);
        (client, api_tx)
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.sweep_interval, DEFAULT_ECHO_TIMEOUT);
        assert_eq!(config.echo_timeout, DEFAULT_ECHO_TIMEOUT);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
    }

    #[test]
    fn test_builder_setters() {
        let builder = ClientBuilder::new("secret")
            .sweep_interval(Duration::from_secs(5))
            .echo_timeout(Duration::from_secs(10))
            .max_concurrent_handlers(32);

        assert_eq!(builder.config.sweep_interval, Duration::from_secs(5));
        assert_eq!(builder.config.echo_timeout, Duration::from_secs(10));
        assert_eq!(builder.config.max_concurrent_handlers, 32);
    }

    #[tokio::test]
    async fn test_command_tracked_and_sent() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new("{}");
        let (client, _api_tx) = test_client(api.clone(), request);

        let echo = client.send_group_msg(100, "hi".to_string()).await.unwrap();

        assert_eq!(echo, 1000);
        assert_eq!(client.pending_commands(), 1);

        let sent = api.sent_payloads();
        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["action"], "send_group_msg");
        assert_eq!(value["params"]["group_id"], 100);
        assert_eq!(value["echo"], 1000);
    }

    #[tokio::test]
    async fn test_disconnected_command_silently_dropped() {
        let api = MockChannel::new(false);
        let request = MockRequestChannel::new("{}");
        let (client, _api_tx) = test_client(api.clone(), request);

        let result = client.send_private_msg(7, "hi".to_string()).await;

        assert!(result.is_ok());
        assert!(api.sent_payloads().is_empty());
        assert_eq!(client.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_reply_resolves_pending_command() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new("{}");
        let (client, api_tx) = test_client(api.clone(), request);

        let echo = client.send_group_msg(100, "hi".to_string()).await.unwrap();
        assert_eq!(client.pending_commands(), 1);

        api_tx
            .send(format!(r#"{{"retcode": 0, "data": null, "echo": {echo}}}"#))
            .await
            .unwrap();
        // Read loop runs as a task; yield until the resolution lands.
        for _ in 0..50 {
            if client.pending_commands() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(client.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_reply_dropped_channel_stays_open() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new("{}");
        let (client, api_tx) = test_client(api.clone(), request);

        let echo = client.send_group_msg(100, "hi".to_string()).await.unwrap();

        api_tx.send("{garbage".to_string()).await.unwrap();
        api_tx
            .send(format!(r#"{{"retcode": 0, "data": null, "echo": {echo}}}"#))
            .await
            .unwrap();

        for _ in 0..50 {
            if client.pending_commands() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        // The malformed message was dropped; the valid one still resolved.
        assert_eq!(client.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_get_status_typed_decode() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new(
            r#"{
                "retcode": 0,
                "data": {
                    "app_initialized": true,
                    "app_enabled": true,
                    "plugins_good": true,
                    "app_good": true,
                    "online": false,
                    "good": false
                },
                "echo": 0
            }"#,
        );
        let (client, _api_tx) = test_client(api, request);

        let status = client.get_status().await.unwrap();
        assert!(status.app_initialized);
        assert!(!status.online);
        assert!(!status.all_good());
    }

    #[tokio::test]
    async fn test_get_status_nonzero_retcode() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new(r#"{"retcode": 103, "data": null}"#);
        let (client, _api_tx) = test_client(api, request);

        let result = client.get_status().await;
        assert!(matches!(
            result,
            Err(BotgateError::Gateway { retcode: 103 })
        ));
    }

    #[tokio::test]
    async fn test_get_status_missing_field_is_error() {
        let api = MockChannel::new(true);
        let request =
            MockRequestChannel::new(r#"{"retcode": 0, "data": {"good": true}, "echo": 0}"#);
        let (client, _api_tx) = test_client(api, request);

        assert!(client.get_status().await.is_err());
    }

    #[tokio::test]
    async fn test_send_json_passthrough() {
        let api = MockChannel::new(true);
        let request = MockRequestChannel::new("{}");
        let (client, _api_tx) = test_client(api.clone(), request);

        client
            .send_json(&serde_json::json!({ "action": "custom", "params": {} }))
            .await
            .unwrap();

        assert_eq!(api.sent_payloads().len(), 1);
    }
}
