use futures::StreamExt;
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher::Event;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::*;

use crate::client::ObjStream;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InformerEvent {
    Updated { count: usize },
    Offline { error: String },
}

#[derive(Debug)]
pub struct Message {
    pub(crate) context_name: String,
    pub(crate) resource_name: String,
    pub(crate) informer_id: u64,
    pub(crate) event: InformerEvent,
}
pub type Sender = mpsc::UnboundedSender<Message>;
pub type Receiver = mpsc::UnboundedReceiver<Message>;

// An informer owns one list+watch stream and the reflector cache built from it.  The cache is
// readable from anywhere through the cloned `Store`; the informer task is the only writer.
//
// The watcher's initial list arrives as Init, InitApply..., InitDone; the cache only swaps in the
// new list on InitDone, so we don't report anything until then.  Repeated stream errors, or the
// stream ending, take the informer offline for good: the owner is expected to tear it down and
// build a fresh one.
pub struct ResourceInformer {
    id: u64,
    context_name: String,
    resource_name: String,
    store: Store<DynamicObject>,
    task: JoinHandle<()>,
}

impl ResourceInformer {
    pub fn start(
        id: u64,
        context_name: &str,
        resource_name: &str,
        ar: ApiResource,
        stream: ObjStream,
        tx: Sender,
    ) -> ResourceInformer {
        info!("starting informer {id} for {resource_name} on context {context_name}");
        let writer = Writer::new(ar);
        let store = writer.as_reader();
        let task = tokio::spawn(run(id, context_name.into(), resource_name.into(), writer, stream, tx));

        ResourceInformer {
            id,
            context_name: context_name.into(),
            resource_name: resource_name.into(),
            store,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> Store<DynamicObject> {
        self.store.clone()
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        self.store.state().len()
    }

    pub fn dispose(&self) {
        debug!("disposing informer {} for {} on context {}", self.id, self.resource_name, self.context_name);
        self.task.abort();
    }
}

impl Drop for ResourceInformer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    id: u64,
    context_name: String,
    resource_name: String,
    mut writer: Writer<DynamicObject>,
    mut stream: ObjStream,
    tx: Sender,
) {
    let send = |event| {
        tx.send(Message {
            context_name: context_name.clone(),
            resource_name: resource_name.clone(),
            informer_id: id,
            event,
        })
        .is_ok()
    };

    // The watcher retries on its own (with backoff), so a single error is usually just a
    // reconnect; only a run of them with nothing in between means the watch is broken
    let mut failures = 0;
    let mut last_error: Option<String> = None;
    while let Some(res) = stream.next().await {
        let evt = match res {
            Ok(evt) => evt,
            Err(err) => {
                failures += 1;
                let error = format!("{err:#}");
                if failures >= WATCH_MAX_CONSECUTIVE_ERRORS {
                    warn!("informer for {resource_name} on context {context_name} went offline: {error}");
                    send(InformerEvent::Offline { error });
                    return;
                }
                warn!("watch error {failures} for {resource_name} on context {context_name}: {error}");
                last_error = Some(error);
                continue;
            },
        };
        failures = 0;
        last_error = None;

        writer.apply_watcher_event(&evt);
        match &evt {
            Event::Init | Event::InitApply(_) => continue,
            Event::Delete(obj) => debug!("{} deleted on context {context_name}", obj.namespaced_name()),
            _ => (),
        }

        let count = writer.as_reader().state().len();
        if !send(InformerEvent::Updated { count }) {
            return;
        }
    }

    warn!("watch stream for {resource_name} on context {context_name} ended");
    let error = match last_error {
        Some(err) => format!("watch stream ended: {err}"),
        None => "watch stream ended".into(),
    };
    send(InformerEvent::Offline { error });
}
