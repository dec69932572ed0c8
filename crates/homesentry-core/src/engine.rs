// ── Engine facade ──
//
// Full lifecycle for one reconciliation engine instance: periodic
// reconcile and ingest ticks, command routing, and reactive data
// streaming through the DataStore.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::firewall::{FirewallBackend, FirewallExecutor};
use crate::ingest::{AlertIngestor, IngestOutcome};
use crate::model::{Alert, Device, PushSubscription};
use crate::notify::{
    EmailTransport, NotificationFanout, PushTransport, RealtimeHandle, RealtimeHub, ALERTS_TOPIC,
};
use crate::reconcile::{DeviceReconciler, ReconcileOutcome};
use crate::store::DataStore;
use crate::stream::EntityStream;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Pluggable transports handed to the engine at construction.
///
/// The firewall backend is mandatory; push and email are optional and
/// their channels simply stay silent when absent.
pub struct EngineTransports {
    pub firewall: Arc<dyn FirewallBackend>,
    pub push: Option<Arc<dyn PushTransport>>,
    pub email: Option<Arc<dyn EmailTransport>>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Owns the reconcile loop,
/// the ingest loop, and the command processor.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Arc<EngineConfig>,
    store: Arc<DataStore>,
    realtime: Arc<RealtimeHub>,
    firewall: Arc<FirewallExecutor>,
    reconciler: DeviceReconciler,
    ingestor: Mutex<AlertIngestor>,
    running: watch::Sender<bool>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, transports: EngineTransports) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(DataStore::new());
        let realtime = Arc::new(RealtimeHub::new());

        let firewall = Arc::new(FirewallExecutor::new(transports.firewall, store.clone()));
        let fanout = Arc::new(NotificationFanout::new(
            store.clone(),
            config.clone(),
            realtime.clone(),
            transports.push,
            transports.email,
        ));

        let reconciler = DeviceReconciler::new(store.clone(), firewall.clone(), config.clone());
        let ingestor = Mutex::new(AlertIngestor::new(store.clone(), fanout, &config));

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (running, _) = watch::channel(false);

        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                realtime,
                firewall,
                reconciler,
                ingestor,
                running,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the background loops: reconcile ticks, ingest ticks, and
    /// the command processor.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let engine = self.clone();
            handles.push(tokio::spawn(command_processor_task(engine, rx)));
        }

        let engine = self.clone();
        let cancel = self.inner.cancel.child_token();
        handles.push(tokio::spawn(reconcile_task(engine, cancel)));

        let engine = self.clone();
        let cancel = self.inner.cancel.child_token();
        handles.push(tokio::spawn(ingest_task(engine, cancel)));

        let _ = self.inner.running.send(true);
        info!(
            reconcile_interval = ?self.inner.config.reconcile_interval,
            ingest_interval = ?self.inner.config.ingest_interval,
            "engine started"
        );
    }

    /// Stop the background loops. The in-flight tick completes; there
    /// is no hard preemption.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self.inner.running.send(false);
        debug!("engine stopped");
    }

    // ── Ticks (also driven directly by tests) ────────────────────

    /// Run one reconcile pass now.
    pub async fn reconcile_once(&self) -> ReconcileOutcome {
        self.inner.reconciler.run_tick().await
    }

    /// Run one ingest pass now.
    pub async fn ingest_once(&self) -> IngestOutcome {
        self.inner.ingestor.lock().await.run_tick().await
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Execute a command through the command channel.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        if !*self.inner.running.borrow() {
            return Err(CoreError::ShuttingDown);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::ShuttingDown)?;

        rx.await.map_err(|_| CoreError::ShuttingDown)?
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to running-state changes.
    pub fn running(&self) -> watch::Receiver<bool> {
        self.inner.running.subscribe()
    }

    #[must_use]
    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices()
    }

    #[must_use]
    pub fn alerts_snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.inner.store.alerts()
    }

    #[must_use]
    pub fn devices(&self) -> EntityStream<Device> {
        self.inner.store.device_stream()
    }

    #[must_use]
    pub fn alerts(&self) -> EntityStream<Alert> {
        self.inner.store.alert_stream()
    }

    /// Subscribe to the realtime alerts topic.
    #[must_use]
    pub fn subscribe_alerts(&self) -> RealtimeHandle {
        self.inner.realtime.subscribe(ALERTS_TOPIC)
    }

    #[must_use]
    pub fn realtime(&self) -> &Arc<RealtimeHub> {
        &self.inner.realtime
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn reconcile_task(engine: Engine, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(engine.inner.config.reconcile_interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                engine.reconcile_once().await;
            }
        }
    }
}

async fn ingest_task(engine: Engine, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(engine.inner.config.ingest_interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                engine.ingest_once().await;
            }
        }
    }
}

/// Process commands from the mpsc channel.
async fn command_processor_task(engine: Engine, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = engine.inner.cancel.child_token();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&engine, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────

async fn route_command(engine: &Engine, command: Command) -> Result<CommandResult, CoreError> {
    let store = &engine.inner.store;

    match command {
        Command::BlockDevice { ip } => {
            let key = ip.to_string();
            if store.device(&key).is_none() {
                return Err(CoreError::DeviceNotFound { identifier: key });
            }
            engine.inner.firewall.block(ip).await?;
            device_result(store, &key)
        }
        Command::UnblockDevice { ip } => {
            let key = ip.to_string();
            if store.device(&key).is_none() {
                return Err(CoreError::DeviceNotFound { identifier: key });
            }
            engine.inner.firewall.unblock(ip).await?;
            device_result(store, &key)
        }
        Command::RenameDevice { ip, name } => {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(CoreError::ValidationFailed {
                    message: "device name must not be empty".into(),
                });
            }
            let key = ip.to_string();
            let updated = store
                .update_device(&key, |device| device.display_name = name)
                .ok_or(CoreError::DeviceNotFound { identifier: key })?;
            Ok(CommandResult::Device((*updated).clone()))
        }
        Command::AcknowledgeAlert { dedup_key } => {
            if !store.acknowledge_alert(&dedup_key) {
                return Err(CoreError::AlertNotFound { dedup_key });
            }
            let alert = store
                .alert(&dedup_key)
                .ok_or(CoreError::AlertNotFound { dedup_key })?;
            Ok(CommandResult::Alert((*alert).clone()))
        }
        Command::RegisterPushSubscription {
            owner,
            endpoint,
            keys,
            user_agent,
        } => {
            let key = PushSubscription::store_key(&owner, &endpoint);
            // Re-registering refreshes keys and reactivates; creation
            // time and last use survive.
            let existing = store.subscription(&key);
            store.upsert_subscription(PushSubscription {
                owner,
                endpoint,
                keys,
                user_agent,
                is_active: true,
                created_at: existing
                    .as_ref()
                    .map_or_else(chrono::Utc::now, |s| s.created_at),
                last_used: existing.as_ref().and_then(|s| s.last_used),
            });
            Ok(CommandResult::Ok)
        }
        Command::DeactivatePushSubscription { owner, endpoint } => {
            let key = PushSubscription::store_key(&owner, &endpoint);
            if !store.deactivate_subscription(&key) {
                return Err(CoreError::SubscriptionNotFound { key });
            }
            Ok(CommandResult::Ok)
        }
    }
}

fn device_result(store: &DataStore, key: &str) -> Result<CommandResult, CoreError> {
    let device = store.device(key).ok_or_else(|| CoreError::DeviceNotFound {
        identifier: key.to_owned(),
    })?;
    Ok(CommandResult::Device((*device).clone()))
}
