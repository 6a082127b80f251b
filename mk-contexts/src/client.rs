use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    Stream,
    StreamExt,
    TryStreamExt,
};
use k8s_openapi::api::authorization::v1 as authv1;
use kube::api::{
    Api,
    PostParams,
};
use kube::config::KubeConfigOptions;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{
    self,
    watcher,
};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use mk_core::prelude::*;
use tracing::*;

use crate::context::KubeContext;
use crate::factory::ResourceAttributes;

pub type ObjStream = Pin<Box<dyn Stream<Item = anyhow::Result<watcher::Event<DynamicObject>>> + Send>>;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessReview {
    pub allowed: bool,
    pub reason: Option<String>,
}

// Everything the state manager needs from one cluster.  Keeping this behind a trait means the
// orchestration logic can be driven entirely from mocks in tests, and the kube-backed version
// below stays a thin shim.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn probe(&self) -> EmptyResult;
    async fn review_access(&self, attrs: &ResourceAttributes) -> anyhow::Result<AccessReview>;
    fn watch(&self, ar: &ApiResource, namespace: Option<String>) -> ObjStream;
}

#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client_for(&self, ctx: &KubeContext) -> anyhow::Result<Arc<dyn ClusterClient>>;
}

// Lets test assertions format `anyhow::Result<Arc<dyn ClusterClient>>`
#[cfg(test)]
impl std::fmt::Debug for dyn ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClusterClient")
    }
}

pub struct KubeClusterClient {
    client: kube::Client,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client) -> KubeClusterClient {
        KubeClusterClient { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn probe(&self) -> EmptyResult {
        let info = self.client.apiserver_version().await?;
        debug!("apiserver version: {}", info.git_version);
        Ok(())
    }

    async fn review_access(&self, attrs: &ResourceAttributes) -> anyhow::Result<AccessReview> {
        let review = authv1::SelfSubjectAccessReview {
            spec: authv1::SelfSubjectAccessReviewSpec {
                resource_attributes: Some(attrs.into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<authv1::SelfSubjectAccessReview> = Api::all(self.client.clone());
        let resp = api.create(&PostParams::default(), &review).await?;
        let status = resp.status.unwrap_or_default();
        Ok(AccessReview {
            allowed: status.allowed,
            reason: status.reason.or(status.evaluation_error),
        })
    }

    fn watch(&self, ar: &ApiResource, namespace: Option<String>) -> ObjStream {
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), &ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        };
        watcher(api, Default::default())
            .default_backoff()
            .map_err(|e| e.into())
            .boxed()
    }
}

// Builds a kube::Client for a single context out of that context's own minimal kubeconfig, so
// the client never depends on whatever the "current" context of the full file happens to be.
#[derive(Clone, Debug, Default)]
pub struct KubeClientProvider {}

#[async_trait]
impl ClientProvider for KubeClientProvider {
    async fn client_for(&self, ctx: &KubeContext) -> anyhow::Result<Arc<dyn ClusterClient>> {
        let opts = KubeConfigOptions { context: Some(ctx.name().into()), ..Default::default() };
        let config = kube::Config::from_custom_kubeconfig(ctx.kubeconfig().clone(), &opts).await?;
        let client = kube::Client::try_from(config)?;
        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}
