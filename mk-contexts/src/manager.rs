use std::collections::{
    BTreeMap,
    HashMap,
};
use std::sync::Arc;

use kube::config::Kubeconfig;
use mk_core::errors::*;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::{
    RwLock,
    broadcast,
    mpsc,
    oneshot,
};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::*;

use crate::client::{
    ClientProvider,
    ClusterClient,
};
use crate::config::ManagerConfig;
use crate::context::{
    KubeContext,
    KubeconfigSnapshot,
};
use crate::debounce::Debouncer;
use crate::dispatcher::{
    ContextsDispatcher,
    DispatchEvent,
};
use crate::events::{
    ContextEvent,
    StateChannel,
    StateUpdate,
};
use crate::factory::{
    PermissionGroup,
    ResourceFactoryHandler,
};
use crate::health::{
    self,
    ContextHealthChecker,
    ContextHealthState,
    HealthCheckOptions,
    HealthEvent,
};
use crate::informer::{
    self,
    InformerEvent,
    ResourceInformer,
};
use crate::permissions::{
    self,
    ContextPermissionsChecker,
    ContextResourcePermission,
};
use crate::registry::ContextResourceRegistry;
use crate::states::{
    ContextGeneralState,
    ContextsStatesRegistry,
    ResourceCount,
};

err_impl! {ManagerError,
    #[error("contexts manager has been disposed: {0}")]
    Disposed(String),
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextPhase {
    #[default]
    New,
    HealthChecking,
    Reachable,
    PermissionChecking,
    Watching,
    Disposed,
}

enum Command {
    Update(KubeconfigSnapshot),
    Dispose(oneshot::Sender<()>),
}

/// Tracks every context of a kubeconfig: reachability, watch permissions, and the objects of
/// every permitted kind.
///
/// All mutation happens on a single background task; this handle only sends it commands and
/// reads the shared state registry.  Queries therefore reflect whatever the background task has
/// processed so far, which may lag slightly behind the latest `update`.
pub struct ContextsManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    states: Arc<RwLock<ContextsStatesRegistry>>,
    events_tx: Option<broadcast::Sender<ContextEvent>>,
    updates_tx: Option<broadcast::Sender<StateUpdate>>,
    task: Option<JoinHandle<EmptyResult>>,
}

// Lets test assertions format `anyhow::Result<ContextsManager>`
#[cfg(test)]
impl std::fmt::Debug for ContextsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextsManager").finish_non_exhaustive()
    }
}

impl ContextsManager {
    pub fn start(config: &ManagerConfig, provider: Arc<dyn ClientProvider>) -> anyhow::Result<ContextsManager> {
        config.validate()?;
        Ok(ContextsManager::start_with_factories(config, provider, config.factory_handler()?))
    }

    pub fn start_with_factories(
        config: &ManagerConfig,
        provider: Arc<dyn ClientProvider>,
        factories: ResourceFactoryHandler,
    ) -> ContextsManager {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        // broadcast channels can't be empty
        let capacity = config.event_channel_capacity.max(1);
        let (events_tx, _) = broadcast::channel(capacity);
        let (updates_tx, _) = broadcast::channel(capacity);
        let states = Arc::new(RwLock::new(ContextsStatesRegistry::new()));

        let (health_tx, health_rx): (health::Sender, health::Receiver) = mpsc::unbounded_channel();
        let (permissions_tx, permissions_rx): (permissions::Sender, permissions::Receiver) = mpsc::unbounded_channel();
        let (informer_tx, informer_rx): (informer::Sender, informer::Receiver) = mpsc::unbounded_channel();

        let orchestrator = Orchestrator {
            health_opts: config.health_check_options(),
            provider,
            factories,
            dispatcher: ContextsDispatcher::new(),
            contexts: BTreeMap::new(),
            informers: ContextResourceRegistry::new(),
            probe_groups: HashMap::new(),
            next_id: 0,
            states: states.clone(),
            events_tx: events_tx.clone(),
            publisher: Debouncer::new(config.debounce_interval(), updates_tx.clone()),
            health_tx,
            permissions_tx,
            informer_tx,
            disposed: false,
        };
        let task = tokio::spawn(orchestrator.run(cmd_rx, health_rx, permissions_rx, informer_rx));

        ContextsManager {
            cmd_tx,
            states,
            events_tx: Some(events_tx),
            updates_tx: Some(updates_tx),
            task: Some(task),
        }
    }

    // Validation happens here, before anything is queued: a kubeconfig that doesn't hold
    // together is rejected as a whole and the contexts being tracked are left alone.
    pub fn update(&self, kubeconfig: &Kubeconfig) -> EmptyResult {
        let snapshot = KubeconfigSnapshot::try_from(kubeconfig)?;
        self.cmd_tx
            .send(Command::Update(snapshot))
            .map_err(|_| ManagerError::disposed("cannot apply kubeconfig update"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        match &self.events_tx {
            Some(tx) => tx.subscribe(),
            // The sender is dropped straight away, so this receiver reports Closed
            None => broadcast::channel(1).1,
        }
    }

    pub fn subscribe_states(&self) -> broadcast::Receiver<StateUpdate> {
        match &self.updates_tx {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub async fn health_states(&self) -> Vec<ContextHealthState> {
        self.states.read().await.health_states()
    }

    pub async fn context_phases(&self) -> BTreeMap<String, ContextPhase> {
        self.states.read().await.phases()
    }

    pub async fn permissions(&self, context_name: Option<&str>) -> Vec<ContextResourcePermission> {
        self.states.read().await.permissions(context_name)
    }

    pub async fn resource_counts(&self) -> Vec<ResourceCount> {
        self.states.read().await.resource_counts()
    }

    pub async fn general_states(&self) -> BTreeMap<String, ContextGeneralState> {
        self.states.read().await.general_states()
    }

    pub async fn current_context_general_state(&self) -> Option<ContextGeneralState> {
        self.states.read().await.current_context_general_state()
    }

    pub async fn resources(&self, context_name: &str, resource_name: &str) -> Option<Vec<Arc<DynamicObject>>> {
        self.states.read().await.resources(context_name, resource_name)
    }

    // Stops every child task, cancels pending publishes, and closes both event channels.  Safe to
    // call more than once; returns the orchestration loop's error if it died on its own.
    pub async fn dispose(&mut self) -> EmptyResult {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Dispose(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        self.events_tx = None;
        self.updates_tx = None;

        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                mkerr!(err, "contexts manager loop failed");
                Err(err)
            },
            Err(err) => {
                error!("contexts manager loop panicked: {err}");
                Err(err.into())
            },
        }
    }
}

struct ContextEntry {
    context: KubeContext,
    phase: ContextPhase,
    health: Option<ContextHealthChecker>,
    permissions: Option<ContextPermissionsChecker>,

    // Informer-driven restarts since the context was last added or updated
    restarts: u32,
}

// Owns every per-context child and is the only writer to the states registry.  Children report
// back over typed channels tagged with their instance id; a message whose id doesn't match the
// child currently registered for that context (or resource) comes from something we already
// disposed and is dropped.
struct Orchestrator {
    health_opts: HealthCheckOptions,
    provider: Arc<dyn ClientProvider>,
    factories: ResourceFactoryHandler,
    dispatcher: ContextsDispatcher,
    contexts: BTreeMap<String, ContextEntry>,
    informers: ContextResourceRegistry<ResourceInformer>,
    probe_groups: HashMap<String, Arc<Vec<PermissionGroup>>>,
    next_id: u64,

    states: Arc<RwLock<ContextsStatesRegistry>>,
    events_tx: broadcast::Sender<ContextEvent>,
    publisher: Debouncer<StateChannel, StateUpdate>,

    health_tx: health::Sender,
    permissions_tx: permissions::Sender,
    informer_tx: informer::Sender,

    disposed: bool,
}

impl Orchestrator {
    #[instrument(name = "contexts_manager", skip_all)]
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut health_rx: health::Receiver,
        mut permissions_rx: permissions::Receiver,
        mut informer_rx: informer::Receiver,
    ) -> EmptyResult {
        info!("contexts manager started");
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Update(snapshot)) => self.handle_update(snapshot).await,
                    Some(Command::Dispose(done_tx)) => {
                        self.dispose().await;
                        let _ = done_tx.send(());
                        return Ok(());
                    },
                    None => {
                        self.dispose().await;
                        return Ok(());
                    },
                },
                Some(msg) = health_rx.recv() => self.handle_health(msg).await,
                Some(msg) = permissions_rx.recv() => {
                    if let Err(err) = self.handle_permissions(msg).await {
                        self.dispose().await;
                        return Err(err);
                    }
                },
                Some(msg) = informer_rx.recv() => self.handle_informer(msg).await,
            }
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    async fn handle_update(&mut self, snapshot: KubeconfigSnapshot) {
        self.states.write().await.set_current_context(snapshot.current_context.clone());

        for evt in self.dispatcher.update(&snapshot) {
            match evt {
                DispatchEvent::Delete(name) => self.delete_context(&name).await,
                DispatchEvent::Add(ctx) => {
                    let (server, user) = (ctx.server().unwrap_or("<none>"), ctx.user().unwrap_or("<none>"));
                    info!("context added: {} (cluster {}, server {server}, user {user})", ctx.name(), ctx.cluster());
                    self.add_context(ctx, 0).await;
                },
                DispatchEvent::Update(ctx) => {
                    info!("context updated: {}", ctx.name());
                    self.add_context(ctx, 0).await;
                },
            }
        }

        self.publish(None).await;
    }

    // Used for adds, updates, and restarts alike: whatever exists for the name is torn down and
    // the pipeline starts over from a fresh health checker.  A restart (`restarts > 0`) holds off
    // the first probe for one health interval, doubling with every further restart.
    async fn add_context(&mut self, ctx: KubeContext, restarts: u32) {
        let name = ctx.name().to_string();
        let watched = self.teardown(&name).await;

        let delay = self.restart_delay(restarts);
        let id = self.next_id();
        let checker = ContextHealthChecker::start_after(
            id,
            ctx.clone(),
            self.provider.clone(),
            self.health_opts,
            delay,
            self.health_tx.clone(),
        );
        self.contexts.insert(
            name.clone(),
            ContextEntry {
                context: ctx,
                phase: ContextPhase::HealthChecking,
                health: Some(checker),
                permissions: None,
                restarts,
            },
        );

        let state = ContextHealthState::unknown(&name);
        {
            let mut states = self.states.write().await;
            states.set_health(state.clone());
            states.set_phase(&name, ContextPhase::HealthChecking);
        }
        self.emit(ContextEvent::HealthStateChanged(state));
        for res in &watched {
            self.publish(Some(res)).await;
        }
        self.publish(None).await;
    }

    fn restart_delay(&self, restarts: u32) -> Duration {
        if restarts == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (restarts - 1).min(MAX_RESTART_BACKOFF_INTERVALS.ilog2());
        self.health_opts.interval * factor
    }

    async fn delete_context(&mut self, name: &str) {
        info!("context deleted: {name}");
        let watched = self.teardown(name).await;
        self.contexts.remove(name);
        self.states.write().await.remove_context(name);

        self.emit(ContextEvent::ContextDeleted { context_name: name.into() });
        for res in &watched {
            self.publish(Some(res)).await;
        }
        self.publish(None).await;
    }

    // Disposes health checker, permissions checker and informers, in that order; returns the
    // names of the resources that were being watched.
    async fn teardown(&mut self, name: &str) -> Vec<String> {
        if let Some(checker) = self.contexts.get_mut(name).and_then(|e| e.health.take()) {
            checker.dispose();
        }
        self.stop_watching(name).await
    }

    async fn stop_watching(&mut self, name: &str) -> Vec<String> {
        if let Some(checker) = self.contexts.get_mut(name).and_then(|e| e.permissions.take()) {
            checker.dispose();
        }

        let watched: Vec<_> = self.informers.iter_context(name).map(|(res, _)| res.to_string()).collect();
        for informer in self.informers.remove_context(name) {
            informer.dispose();
        }

        let mut states = self.states.write().await;
        states.clear_permissions(name);
        states.clear_caches(name);
        watched
    }

    async fn handle_health(&mut self, msg: health::Message) {
        let Some(entry) = self.contexts.get(&msg.context_name) else {
            debug!("dropping health message for unknown context {}", msg.context_name);
            return;
        };
        if entry.health.as_ref().map(|h| h.id()) != Some(msg.checker_id) {
            debug!("dropping stale health message from checker {} for {}", msg.checker_id, msg.context_name);
            return;
        }

        let name = msg.context_name;
        match msg.event {
            HealthEvent::StateChanged(state) => {
                let mut watched = vec![];
                if !state.checking {
                    if state.reachable {
                        if entry.phase == ContextPhase::HealthChecking {
                            self.set_phase(&name, ContextPhase::Reachable).await;
                        }
                    } else {
                        // Nothing may keep watching a context we can't reach
                        watched = self.stop_watching(&name).await;
                        self.set_phase(&name, ContextPhase::HealthChecking).await;
                    }
                }

                self.states.write().await.set_health(state.clone());
                self.emit(ContextEvent::HealthStateChanged(state));
                for res in &watched {
                    self.publish(Some(res)).await;
                }
                self.publish(None).await;
            },
            HealthEvent::Reachable(client) => self.start_permissions(&name, client).await,
        }
    }

    async fn start_permissions(&mut self, name: &str, client: Arc<dyn ClusterClient>) {
        let id = self.next_id();
        let Some(entry) = self.contexts.get_mut(name) else {
            return;
        };
        if let Some(previous) = entry.permissions.take() {
            previous.dispose();
        }

        let namespace = entry.context.namespace().to_string();
        let groups = self
            .probe_groups
            .entry(namespace.clone())
            .or_insert_with(|| Arc::new(self.factories.get_permissions_requests(&namespace)))
            .clone();

        entry.permissions = Some(ContextPermissionsChecker::start(id, name, client, groups, self.permissions_tx.clone()));
        entry.phase = ContextPhase::PermissionChecking;
        self.states.write().await.set_phase(name, ContextPhase::PermissionChecking);
    }

    async fn handle_permissions(&mut self, msg: permissions::Message) -> EmptyResult {
        let Some(entry) = self.contexts.get(&msg.context_name) else {
            debug!("dropping permissions result for unknown context {}", msg.context_name);
            return Ok(());
        };
        if entry.permissions.as_ref().map(|p| p.id()) != Some(msg.checker_id) {
            debug!("dropping stale permissions result from checker {} for {}", msg.checker_id, msg.context_name);
            return Ok(());
        }

        // Every resource we probed for came out of a registered factory, so anything else means
        // the probe groups and the factory list have diverged
        for p in &msg.permissions {
            self.factories.factory_for(&p.resource_name)?;
        }

        let name = msg.context_name;
        let namespace = entry.context.namespace().to_string();
        self.states.write().await.set_permissions(&name, &msg.permissions);
        self.emit(ContextEvent::PermissionsResult { context_name: name.clone(), permissions: msg.permissions.clone() });

        for p in msg.permissions.iter().filter(|p| p.permitted) {
            let factory = self.factories.factory_for(&p.resource_name)?;
            let Some(ar) = factory.api_resource() else {
                continue;
            };
            if self.informers.contains(&name, &p.resource_name) {
                continue;
            }

            let stream = msg.client.watch(&ar, factory.watch_namespace(&namespace));
            let id = self.next_id();
            let informer = ResourceInformer::start(id, &name, &p.resource_name, ar, stream, self.informer_tx.clone());
            self.states.write().await.set_cache(&name, &p.resource_name, informer.store());
            self.informers.set(&name, &p.resource_name, informer);
        }

        self.set_phase(&name, ContextPhase::Watching).await;
        self.publish(None).await;
        Ok(())
    }

    async fn handle_informer(&mut self, msg: informer::Message) {
        let current = self.informers.get(&msg.context_name, &msg.resource_name).map(|i| i.id());
        if current != Some(msg.informer_id) {
            debug!(
                "dropping stale message from informer {} for {} on {}",
                msg.informer_id, msg.resource_name, msg.context_name
            );
            return;
        }

        let (name, res) = (msg.context_name, msg.resource_name);
        match msg.event {
            InformerEvent::Updated { count } => {
                self.emit(ContextEvent::ResourceUpdated { context_name: name.clone(), resource_name: res.clone() });
                self.emit(ContextEvent::ResourceCountUpdated(ResourceCount {
                    context_name: name,
                    resource_name: res.clone(),
                    count,
                }));
                self.publish(Some(&res)).await;
                self.publish(None).await;
            },
            InformerEvent::Offline { error } => {
                warn!("informer for {res} on context {name} is offline, restarting context: {error}");
                self.emit(ContextEvent::InformerOffline { context_name: name.clone(), resource_name: res.clone(), error });
                if let Some((ctx, restarts)) = self.contexts.get(&name).map(|e| (e.context.clone(), e.restarts)) {
                    self.add_context(ctx, restarts.saturating_add(1)).await;
                }
            },
        }
    }

    async fn set_phase(&mut self, name: &str, phase: ContextPhase) {
        if let Some(entry) = self.contexts.get_mut(name) {
            entry.phase = phase;
            self.states.write().await.set_phase(name, phase);
        }
    }

    fn emit(&self, event: ContextEvent) {
        // Err just means nobody is subscribed right now
        let _ = self.events_tx.send(event);
    }

    // Schedules a publish of the aggregate channels (or of one resource channel); the debouncer
    // collapses these, so it's fine to call this liberally.
    async fn publish(&mut self, resource_name: Option<&str>) {
        if self.disposed {
            return;
        }

        let states = self.states.read().await;
        match resource_name {
            Some(res) => {
                let contexts = states.resources_by_kind(res);
                drop(states);
                self.publisher.schedule(
                    StateChannel::Resources(res.into()),
                    StateUpdate::Resources { resource_name: res.into(), contexts },
                );
            },
            None => {
                let checking = states.checking_states();
                let general = states.general_states();
                let context_name = states.current_context().map(String::from);
                let current = states.current_context_general_state();
                drop(states);

                self.publisher.schedule(StateChannel::CheckingState, StateUpdate::CheckingState(checking));
                self.publisher.schedule(StateChannel::GeneralState, StateUpdate::GeneralState(general));
                self.publisher.schedule(
                    StateChannel::CurrentContextGeneralState,
                    StateUpdate::CurrentContextGeneralState { context_name, state: current },
                );
            },
        }
    }

    async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        info!("disposing contexts manager ({} contexts)", self.contexts.len());

        for entry in self.contexts.values_mut() {
            if let Some(checker) = entry.health.take() {
                checker.dispose();
            }
        }
        for entry in self.contexts.values_mut() {
            if let Some(checker) = entry.permissions.take() {
                checker.dispose();
            }
            entry.phase = ContextPhase::Disposed;
        }
        for informer in self.informers.drain() {
            informer.dispose();
        }
        self.publisher.dispose();

        self.contexts.clear();
        self.states.write().await.clear();
    }
}
