//! Generic reconnecting stream input
//!
//! [`StreamInput`] owns the worker pool, reconnect loop and dispatch
//! plumbing shared by every streaming transport; the transport itself
//! is abstracted behind [`ConsumerBuilder`]/[`Consumer`]. A worker
//! cycles `Starting -> Consuming -> Backoff -> Starting` until closed:
//! session setup and receive failures put it into a fixed recovery
//! wait, never terminate it.
//!
//! Received payloads are decoded on the worker and queued to a single
//! dispatcher task, which runs the input's processor chain and fans
//! events out to the configured outputs. The queue is bounded; when the
//! dispatcher falls behind, payloads are dropped and counted rather
//! than backpressuring the transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;
use virta_core::{EventMsg, PluginConfig, PluginError};

use super::{Format, Input, InputOptions, WorkerState};
use crate::outputs::{fan_out, fan_out_raw, Meta, Output};
use crate::processors::ProcessorChain;

const DEFAULT_RECOVERY_WAIT: Duration = Duration::from_secs(2);
const DEFAULT_QUEUE_SIZE: usize = 1024;

/// One live transport session
#[async_trait]
pub trait Consumer: Send {
    /// Receive the next payload
    ///
    /// # Errors
    /// Any error tears the session down; the worker rebuilds it after
    /// the recovery wait.
    async fn recv(&mut self) -> Result<Bytes, PluginError>;
}

/// Factory for transport sessions
#[async_trait]
pub trait ConsumerBuilder: Send + Sync {
    /// The session type this builder produces
    type Session: Consumer + 'static;

    /// Open a session identified by `client_id`
    async fn session(&self, client_id: &str) -> Result<Self::Session, PluginError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    format: Format,
    num_workers: usize,
    #[serde(with = "humantime_serde")]
    recovery_wait_time: Duration,
    event_processors: Vec<String>,
    queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: Format::default(),
            num_workers: 1,
            recovery_wait_time: DEFAULT_RECOVERY_WAIT,
            event_processors: Vec::new(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

enum Dispatch {
    Events(Vec<EventMsg>),
    Raw(Bytes, Meta),
}

/// Reconnecting worker-pool input over any [`ConsumerBuilder`]
pub struct StreamInput<B> {
    builder: Arc<B>,
    name: String,
    cancel: CancellationToken,
    states: Vec<Arc<Mutex<WorkerState>>>,
    workers: Vec<JoinHandle<()>>,
    tx: Option<mpsc::Sender<Dispatch>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<B> StreamInput<B> {
    /// Wrap a transport builder; workers spawn on [`Input::start`]
    pub fn new(builder: B) -> Self {
        Self {
            builder: Arc::new(builder),
            name: String::new(),
            cancel: CancellationToken::new(),
            states: Vec::new(),
            workers: Vec::new(),
            tx: None,
            dispatcher: None,
        }
    }

    /// Current state of each worker, by index
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states.iter().map(|s| *s.lock()).collect()
    }

    /// The resolved input name
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct WorkerCtx<B> {
    builder: Arc<B>,
    input: String,
    client_id: String,
    format: Format,
    recovery_wait: Duration,
    cancel: CancellationToken,
    state: Arc<Mutex<WorkerState>>,
    tx: mpsc::Sender<Dispatch>,
}

impl<B: ConsumerBuilder> WorkerCtx<B> {
    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Sleep out the recovery wait; true means cancelled
    async fn backoff(&self) -> bool {
        self.set_state(WorkerState::Backoff);
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(self.recovery_wait) => false,
        }
    }

    fn dispatch(&self, data: Bytes) {
        let msg = match self.format {
            Format::Event => match virta_core::decode_event_batch(&data) {
                Ok(events) => Dispatch::Events(events),
                Err(err) => {
                    tracing::warn!(input = %self.input, worker = %self.client_id, error = %err,
                        "payload dropped, decode failed");
                    return;
                }
            },
            Format::Bytes => {
                let mut meta = Meta::new();
                meta.insert("input".to_string(), self.input.clone());
                Dispatch::Raw(data, meta)
            }
        };
        if self.tx.try_send(msg).is_err() {
            tracing::warn!(input = %self.input, worker = %self.client_id,
                "payload dropped, dispatch queue full");
        }
    }

    async fn run(self) {
        loop {
            self.set_state(WorkerState::Starting);
            let mut session = match self.builder.session(&self.client_id).await {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(input = %self.input, worker = %self.client_id, error = %err,
                        "session setup failed");
                    if self.backoff().await {
                        break;
                    }
                    continue;
                }
            };
            tracing::info!(input = %self.input, worker = %self.client_id, "session established");
            self.set_state(WorkerState::Consuming);

            let lost = loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break false,
                    received = session.recv() => match received {
                        Ok(data) => self.dispatch(data),
                        Err(err) => {
                            tracing::warn!(input = %self.input, worker = %self.client_id,
                                error = %err, "session lost");
                            break true;
                        }
                    }
                }
            };
            if !lost || self.backoff().await {
                break;
            }
        }
        self.set_state(WorkerState::Stopped);
    }
}

async fn dispatcher_loop(
    input: String,
    mut rx: mpsc::Receiver<Dispatch>,
    chain: ProcessorChain,
    outputs: HashMap<String, Arc<dyn Output>>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Dispatch::Events(events) => {
                for ev in chain.apply(events) {
                    fan_out(&outputs, &ev).await;
                }
            }
            Dispatch::Raw(data, meta) => fan_out_raw(&outputs, &data, &meta).await,
        }
    }
    tracing::debug!(input = %input, "dispatcher drained");
}

#[async_trait]
impl<B> Input for StreamInput<B>
where
    B: ConsumerBuilder + 'static,
{
    async fn start(
        &mut self,
        name: &str,
        cfg: &PluginConfig,
        opts: InputOptions,
    ) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        self.name = if name.is_empty() {
            format!("stream-{}", Ulid::new().to_string().to_lowercase())
        } else {
            name.to_string()
        };

        let chain = ProcessorChain::build(
            &opts.registry,
            &cfg.event_processors,
            &opts.processor_definitions,
        )?;

        let (tx, rx) = mpsc::channel(cfg.queue_size.max(1));
        self.dispatcher = Some(tokio::spawn(dispatcher_loop(
            self.name.clone(),
            rx,
            chain,
            opts.outputs,
        )));

        let base = if opts.name_prefix.is_empty() {
            format!("{}-consumer", self.name)
        } else {
            format!("{}-{}-consumer", opts.name_prefix, self.name)
        };
        let num_workers = cfg.num_workers.max(1);
        for idx in 0..num_workers {
            let state = Arc::new(Mutex::new(WorkerState::Starting));
            self.states.push(state.clone());
            let ctx = WorkerCtx {
                builder: self.builder.clone(),
                input: self.name.clone(),
                client_id: format!("{base}-{idx}"),
                format: cfg.format,
                recovery_wait: cfg.recovery_wait_time,
                cancel: self.cancel.clone(),
                state,
                tx: tx.clone(),
            };
            self.workers.push(tokio::spawn(ctx.run()));
        }
        self.tx = Some(tx);
        tracing::info!(input = %self.name, workers = num_workers, "input started");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PluginError> {
        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                tracing::warn!(input = %self.name, error = %err, "worker join failed");
            }
        }
        // Dropping the sender lets the dispatcher drain what was queued.
        self.tx.take();
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(err) = dispatcher.await {
                tracing::warn!(input = %self.name, error = %err, "dispatcher join failed");
            }
        }
        tracing::info!(input = %self.name, "input closed");
        Ok(())
    }
}

/// In-process transport over a tokio channel
///
/// Every session shares one receiver; payloads are load-balanced across
/// workers rather than duplicated.
#[derive(Clone)]
pub struct ChannelBuilder {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Bytes>>>,
}

impl ChannelBuilder {
    /// Create the transport, returning the feeding side and the builder
    pub fn new(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
            },
        )
    }
}

/// Session handle for [`ChannelBuilder`]
pub struct ChannelConsumer {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Bytes>>>,
}

#[async_trait]
impl Consumer for ChannelConsumer {
    async fn recv(&mut self) -> Result<Bytes, PluginError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| PluginError::Connection("channel closed".to_string()))
    }
}

#[async_trait]
impl ConsumerBuilder for ChannelBuilder {
    type Session = ChannelConsumer;

    async fn session(&self, _client_id: &str) -> Result<ChannelConsumer, PluginError> {
        Ok(ChannelConsumer {
            rx: self.rx.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::outputs::tests::CollectingOutput;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` session attempts, then delegates
    struct FlakyBuilder {
        inner: ChannelBuilder,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ConsumerBuilder for FlakyBuilder {
        type Session = ChannelConsumer;

        async fn session(&self, client_id: &str) -> Result<ChannelConsumer, PluginError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PluginError::Connection("broker unreachable".to_string()));
            }
            self.inner.session(client_id).await
        }
    }

    fn config(json: serde_json::Value) -> PluginConfig {
        let serde_json::Value::Object(map) = json else {
            unreachable!("test configs are objects");
        };
        map
    }

    fn options(sink: &Arc<CollectingOutput>) -> InputOptions {
        let mut outputs: HashMap<String, Arc<dyn Output>> = HashMap::new();
        outputs.insert("sink".to_string(), sink.clone());
        InputOptions {
            outputs,
            ..InputOptions::default()
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_events_flow_to_outputs() {
        let sink = Arc::new(CollectingOutput::default());
        let (feed, builder) = ChannelBuilder::new(8);
        let mut input = StreamInput::new(builder);
        input
            .start("chan1", &config(json!({})), options(&sink))
            .await
            .unwrap();

        let mut ev = EventMsg::with_timestamp("sub1", 1);
        ev.add_value("x", json!(1));
        let data = Bytes::from(virta_core::encode_event_batch(&[ev]).unwrap());
        feed.send(data).await.unwrap();

        wait_for(|| !sink.events.lock().is_empty()).await;
        input.close().await.unwrap();
        assert_eq!(sink.events.lock()[0].name, "sub1");
        assert_eq!(input.worker_states(), vec![WorkerState::Stopped]);
    }

    #[tokio::test]
    async fn test_processor_chain_applied_before_fan_out() {
        let sink = Arc::new(CollectingOutput::default());
        let (feed, builder) = ChannelBuilder::new(8);
        let mut input = StreamInput::new(builder);

        let mut opts = options(&sink);
        opts.registry = Arc::new(crate::processors::ProcessorRegistry::with_defaults());
        opts.processor_definitions.insert(
            "sev".to_string(),
            config(json!({
                "event-add-tag": {
                    "condition": r#".values.number == "42""#,
                    "add": {"sev": "high"},
                }
            })),
        );
        input
            .start(
                "chan1",
                &config(json!({"event-processors": ["sev"]})),
                opts,
            )
            .await
            .unwrap();

        let mut ev = EventMsg::with_timestamp("sub1", 1);
        ev.add_value("number", json!("42"));
        let data = Bytes::from(virta_core::encode_event_batch(&[ev]).unwrap());
        feed.send(data).await.unwrap();

        wait_for(|| !sink.events.lock().is_empty()).await;
        input.close().await.unwrap();
        assert_eq!(
            sink.events.lock()[0].tags.get("sev"),
            Some(&"high".to_string())
        );
    }

    #[tokio::test]
    async fn test_decode_failure_drops_payload_only() {
        let sink = Arc::new(CollectingOutput::default());
        let (feed, builder) = ChannelBuilder::new(8);
        let mut input = StreamInput::new(builder);
        input
            .start("chan1", &config(json!({})), options(&sink))
            .await
            .unwrap();

        feed.send(Bytes::from_static(b"not json")).await.unwrap();
        let ev = EventMsg::with_timestamp("sub1", 1);
        let data = Bytes::from(virta_core::encode_event_batch(&[ev]).unwrap());
        feed.send(data).await.unwrap();

        wait_for(|| !sink.events.lock().is_empty()).await;
        input.close().await.unwrap();
        assert_eq!(sink.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_retries_through_backoff() {
        let sink = Arc::new(CollectingOutput::default());
        let (feed, channel) = ChannelBuilder::new(8);
        let builder = FlakyBuilder {
            inner: channel,
            failures: 2,
            attempts: AtomicUsize::new(0),
        };
        let mut input = StreamInput::new(builder);
        input
            .start(
                "flaky",
                &config(json!({"recovery-wait-time": "10ms"})),
                options(&sink),
            )
            .await
            .unwrap();

        wait_for(|| input.worker_states() == vec![WorkerState::Consuming]).await;

        let ev = EventMsg::with_timestamp("sub1", 1);
        let data = Bytes::from(virta_core::encode_event_batch(&[ev]).unwrap());
        feed.send(data).await.unwrap();
        wait_for(|| !sink.events.lock().is_empty()).await;
        input.close().await.unwrap();
        assert_eq!(input.worker_states(), vec![WorkerState::Stopped]);
    }

    #[tokio::test]
    async fn test_close_during_backoff_stops_worker() {
        let sink = Arc::new(CollectingOutput::default());
        let (_feed, channel) = ChannelBuilder::new(8);
        let builder = FlakyBuilder {
            inner: channel,
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
        };
        let mut input = StreamInput::new(builder);
        input
            .start(
                "flaky",
                &config(json!({"recovery-wait-time": "1h"})),
                options(&sink),
            )
            .await
            .unwrap();

        wait_for(|| input.worker_states() == vec![WorkerState::Backoff]).await;
        input.close().await.unwrap();
        assert_eq!(input.worker_states(), vec![WorkerState::Stopped]);
    }

    #[tokio::test]
    async fn test_raw_format_forwards_bytes_with_meta() {
        #[derive(Default)]
        struct RawSink {
            payloads: parking_lot::Mutex<Vec<(Bytes, Meta)>>,
        }

        #[async_trait]
        impl Output for RawSink {
            async fn init(
                &mut self,
                _name: &str,
                _cfg: &PluginConfig,
                _opts: crate::outputs::OutputOptions,
            ) -> Result<(), PluginError> {
                Ok(())
            }

            async fn write(&self, data: Bytes, meta: &Meta) -> Result<(), PluginError> {
                self.payloads.lock().push((data, meta.clone()));
                Ok(())
            }

            async fn write_event(&self, _ev: &EventMsg) -> Result<(), PluginError> {
                Ok(())
            }

            async fn close(&self) -> Result<(), PluginError> {
                Ok(())
            }
        }

        let sink = Arc::new(RawSink::default());
        let mut outputs: HashMap<String, Arc<dyn Output>> = HashMap::new();
        outputs.insert("raw".to_string(), sink.clone());

        let (feed, builder) = ChannelBuilder::new(8);
        let mut input = StreamInput::new(builder);
        input
            .start(
                "chan1",
                &config(json!({"format": "bytes"})),
                InputOptions {
                    outputs,
                    ..InputOptions::default()
                },
            )
            .await
            .unwrap();

        feed.send(Bytes::from_static(b"\x00\x01binary")).await.unwrap();
        wait_for(|| !sink.payloads.lock().is_empty()).await;
        input.close().await.unwrap();

        let payloads = sink.payloads.lock();
        assert_eq!(payloads[0].0, Bytes::from_static(b"\x00\x01binary"));
        assert_eq!(payloads[0].1.get("input"), Some(&"chan1".to_string()));
    }

    #[tokio::test]
    async fn test_generated_name_when_unnamed() {
        let sink = Arc::new(CollectingOutput::default());
        let (_feed, builder) = ChannelBuilder::new(8);
        let mut input = StreamInput::new(builder);
        input
            .start("", &config(json!({})), options(&sink))
            .await
            .unwrap();
        assert!(input.name().starts_with("stream-"));
        input.close().await.unwrap();
    }
}
