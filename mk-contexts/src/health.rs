use std::fmt;
use std::sync::Arc;

use mk_core::errors::*;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{
    Duration,
    sleep,
    timeout,
};
use tracing::*;

use crate::client::{
    ClientProvider,
    ClusterClient,
};
use crate::context::KubeContext;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthPhase {
    #[default]
    Unknown,
    Checking,
    Reachable,
    Unreachable,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextHealthState {
    pub context_name: String,
    pub phase: HealthPhase,
    pub checking: bool,
    pub reachable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContextHealthState {
    pub fn unknown(context_name: &str) -> ContextHealthState {
        ContextHealthState { context_name: context_name.into(), ..Default::default() }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HealthCheckOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        HealthCheckOptions {
            timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS),
            interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS),
        }
    }
}

pub enum HealthEvent {
    StateChanged(ContextHealthState),

    // Sent only when a context becomes reachable after not being reachable (including the very
    // first successful probe); carries the client that succeeded so the permissions checker can
    // reuse it.
    Reachable(Arc<dyn ClusterClient>),
}

impl fmt::Debug for HealthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthEvent::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
            HealthEvent::Reachable(_) => f.write_str("Reachable"),
        }
    }
}

#[derive(Debug)]
pub struct Message {
    pub(crate) context_name: String,
    pub(crate) checker_id: u64,
    pub(crate) event: HealthEvent,
}
pub type Sender = mpsc::UnboundedSender<Message>;
pub type Receiver = mpsc::UnboundedReceiver<Message>;

// The reachability state machine, without any of the I/O.  Every cycle goes through
// `begin_check` then `finish_check`; the second element returned by `finish_check` is the
// "became reachable" edge.
#[derive(Debug)]
pub(crate) struct HealthTracker {
    state: ContextHealthState,
}

impl HealthTracker {
    pub(crate) fn new(context_name: &str) -> HealthTracker {
        HealthTracker { state: ContextHealthState::unknown(context_name) }
    }

    pub(crate) fn begin_check(&mut self) -> ContextHealthState {
        self.state.phase = HealthPhase::Checking;
        self.state.checking = true;
        self.state.clone()
    }

    pub(crate) fn finish_check(&mut self, res: &EmptyResult) -> (ContextHealthState, bool) {
        let was_reachable = self.state.reachable;
        self.state.checking = false;
        match res {
            Ok(()) => {
                self.state.phase = HealthPhase::Reachable;
                self.state.reachable = true;
                self.state.error = None;
            },
            Err(err) => {
                self.state.phase = HealthPhase::Unreachable;
                self.state.reachable = false;
                self.state.error = Some(format!("{err:#}"));
            },
        }

        (self.state.clone(), self.state.reachable && !was_reachable)
    }
}

pub struct ContextHealthChecker {
    id: u64,
    context_name: String,
    task: JoinHandle<()>,
}

impl ContextHealthChecker {
    pub fn start(
        id: u64,
        ctx: KubeContext,
        provider: Arc<dyn ClientProvider>,
        opts: HealthCheckOptions,
        tx: Sender,
    ) -> ContextHealthChecker {
        ContextHealthChecker::start_after(id, ctx, provider, opts, Duration::ZERO, tx)
    }

    // Same as `start`, but the first probe waits for `delay`
    pub fn start_after(
        id: u64,
        ctx: KubeContext,
        provider: Arc<dyn ClientProvider>,
        opts: HealthCheckOptions,
        delay: Duration,
        tx: Sender,
    ) -> ContextHealthChecker {
        let context_name = ctx.name().to_string();
        info!("starting health checker {id} for context {context_name} (delay {delay:?})");
        let task = tokio::spawn(run(id, ctx, provider, opts, delay, tx));
        ContextHealthChecker { id, context_name, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    // Stops polling; the cached client is dropped along with the task.  Anything the task
    // already queued is filtered out by the receiver based on the checker id.
    pub fn dispose(&self) {
        debug!("disposing health checker {} for context {}", self.id, self.context_name);
        self.task.abort();
    }
}

impl Drop for ContextHealthChecker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn probe_once(
    ctx: &KubeContext,
    provider: &dyn ClientProvider,
    cached: &mut Option<Arc<dyn ClusterClient>>,
) -> anyhow::Result<Arc<dyn ClusterClient>> {
    let client = match cached {
        Some(client) => client.clone(),
        None => {
            let client = provider.client_for(ctx).await?;
            *cached = Some(client.clone());
            client
        },
    };
    client.probe().await?;
    Ok(client)
}

#[instrument(skip_all, fields(context = ctx.name(), checker = id))]
async fn run(
    id: u64,
    ctx: KubeContext,
    provider: Arc<dyn ClientProvider>,
    opts: HealthCheckOptions,
    delay: Duration,
    tx: Sender,
) {
    if !delay.is_zero() {
        sleep(delay).await;
    }

    let mut tracker = HealthTracker::new(ctx.name());
    let mut client: Option<Arc<dyn ClusterClient>> = None;
    let send = |event| {
        tx.send(Message { context_name: ctx.name().into(), checker_id: id, event })
            .is_ok()
    };

    loop {
        if !send(HealthEvent::StateChanged(tracker.begin_check())) {
            break;
        }

        let res = match timeout(opts.timeout, probe_once(&ctx, provider.as_ref(), &mut client)).await {
            Ok(res) => res,
            Err(_) => Err(anyhow!("health check timed out after {:?}", opts.timeout)),
        };

        let (probed, res) = match res {
            Ok(c) => (Some(c), Ok(())),
            Err(err) => {
                // Rebuild the client from scratch next time around, the credentials may have
                // been the problem
                client = None;
                (None, Err(err))
            },
        };

        let (state, became_reachable) = tracker.finish_check(&res);
        match &state.error {
            Some(err) => warn!("context unreachable: {err}"),
            None => debug!("context reachable"),
        }
        if !send(HealthEvent::StateChanged(state)) {
            break;
        }

        if let (true, Some(c)) = (became_reachable, probed) {
            if !send(HealthEvent::Reachable(c)) {
                break;
            }
        }

        sleep(opts.interval).await;
    }
    debug!("health checker stopped");
}
