mod permissions_test;
mod registry_test;
mod states_test;

use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};

use futures::{
    StreamExt,
    stream,
};
use kube::runtime::watcher::Event;
use mk_core::errors::*;
use mk_core::prelude::*;
use mk_testutils::*;
use rstest::*;

use super::*;
use crate::client::{
    MockClientProvider,
    MockClusterClient,
};

fn watch_request(group: Option<&str>, resource: &str) -> PermissionRequest {
    PermissionRequest::new(group, resource, WATCH_VERB)
}

#[fixture]
fn pods_factory() -> ResourceFactory {
    ResourceFactory::new(PODS, true, vec![PermissionRequest::watch_everything(), watch_request(None, PODS)])
        .watching(&POD_GVK)
}

#[fixture]
fn deployments_factory() -> ResourceFactory {
    ResourceFactory::new(
        DEPLOYMENTS,
        true,
        vec![PermissionRequest::watch_everything(), watch_request(Some("apps"), DEPLOYMENTS)],
    )
    .watching(&DEPLOYMENT_GVK)
}

#[fixture]
fn pods_and_deployments(pods_factory: ResourceFactory, deployments_factory: ResourceFactory) -> ResourceFactoryHandler {
    ResourceFactoryHandler::new(vec![pods_factory, deployments_factory]).unwrap()
}

// A watch stream that delivers a complete initial list and then stays open forever
fn listed_stream(objs: Vec<DynamicObject>) -> ObjStream {
    let mut events: Vec<anyhow::Result<Event<DynamicObject>>> = vec![Ok(Event::Init)];
    events.extend(objs.into_iter().map(|o| Ok(Event::InitApply(o))));
    events.push(Ok(Event::InitDone));
    Box::pin(stream::iter(events).chain(stream::pending()))
}

fn objects_for(ar: &ApiResource) -> Vec<DynamicObject> {
    match ar.plural.as_str() {
        PODS => vec![test_pod("pod1"), test_pod("pod2")],
        DEPLOYMENTS => vec![test_deployment(TEST_DEPLOYMENT)],
        _ => vec![],
    }
}

// Shared switches and counters for every fake client a FakeCluster provider hands out
#[derive(Clone)]
struct FakeCluster {
    up: Arc<AtomicBool>,
    allow_all: Arc<AtomicBool>,
    clients_built: Arc<AtomicUsize>,
    reviews: Arc<AtomicUsize>,
    watches: Arc<AtomicUsize>,
}

impl FakeCluster {
    fn new() -> FakeCluster {
        FakeCluster {
            up: Arc::new(AtomicBool::new(true)),
            allow_all: Arc::new(AtomicBool::new(true)),
            clients_built: Arc::new(AtomicUsize::new(0)),
            reviews: Arc::new(AtomicUsize::new(0)),
            watches: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn reviews(&self) -> usize {
        self.reviews.load(Ordering::SeqCst)
    }

    fn client(&self) -> MockClusterClient {
        let (up, allow_all, reviews, watches) =
            (self.up.clone(), self.allow_all.clone(), self.reviews.clone(), self.watches.clone());

        let mut client = MockClusterClient::new();
        client.expect_probe().returning(move || {
            if up.load(Ordering::SeqCst) { Ok(()) } else { Err(anyhow!("connection refused")) }
        });
        client.expect_review_access().returning(move |attrs| {
            reviews.fetch_add(1, Ordering::SeqCst);
            let allowed = allow_all.load(Ordering::SeqCst) || attrs.resource != WILDCARD;
            Ok(AccessReview { allowed, reason: (!allowed).then(|| "RBAC: access denied".into()) })
        });
        client.expect_watch().returning(move |ar, _| {
            watches.fetch_add(1, Ordering::SeqCst);
            listed_stream(objects_for(ar))
        });
        client
    }

    fn provider(&self) -> MockClientProvider {
        let fake = self.clone();
        let mut provider = MockClientProvider::new();
        provider.expect_client_for().returning(move |_| {
            fake.clients_built.fetch_add(1, Ordering::SeqCst);
            let client: Arc<dyn ClusterClient> = Arc::new(fake.client());
            Ok(client)
        });
        provider
    }
}

fn snapshot_for(names: &[&str]) -> KubeconfigSnapshot {
    KubeconfigSnapshot::try_from(&test_kubeconfig_for(names)).unwrap()
}

fn test_context(name: &str) -> KubeContext {
    snapshot_for(&[name]).contexts.remove(0)
}
