use std::collections::BTreeSet;

use kube::config::{
    Kubeconfig,
    NamedContext,
};
use mk_core::errors::*;
use mk_core::prelude::*;
use serde_json::Value;

err_impl! {KubeconfigError,
    #[error("context declared more than once: {0}")]
    DuplicateContext(String),

    #[error("context has no cluster/user body: {0}")]
    EmptyContext(String),

    #[error("context references an unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("context references an unknown user: {0}")]
    UnknownUser(String),
}

// A KubeContext is everything we know about one named context: its cluster, user and namespace,
// plus a self-contained kubeconfig (just this context, its cluster and its user) that client
// construction works from.  The `material` field is a JSON rendering of that kubeconfig; two
// contexts with the same name are "the same" if and only if their material is equal, which is
// how the dispatcher tells real updates from no-op reloads.
#[derive(Clone, Debug)]
pub struct KubeContext {
    name: String,
    cluster: String,
    user: Option<String>,
    namespace: Option<String>,
    server: Option<String>,
    kubeconfig: Kubeconfig,
    material: Value,
}

impl KubeContext {
    fn from_named(named: &NamedContext, source: &Kubeconfig) -> anyhow::Result<KubeContext> {
        let Some(body) = named.context.as_ref() else {
            return Err(KubeconfigError::empty_context(&named.name));
        };

        let cluster = source
            .clusters
            .iter()
            .find(|c| c.name == body.cluster)
            .ok_or_else(|| KubeconfigError::unknown_cluster(&format!("{} -> {}", named.name, body.cluster)))?;

        let user = match &body.user {
            Some(user_name) => Some(
                source
                    .auth_infos
                    .iter()
                    .find(|a| &a.name == user_name)
                    .ok_or_else(|| KubeconfigError::unknown_user(&format!("{} -> {}", named.name, user_name)))?,
            ),
            None => None,
        };

        let kubeconfig = Kubeconfig {
            clusters: vec![cluster.clone()],
            auth_infos: user.into_iter().cloned().collect(),
            contexts: vec![named.clone()],
            current_context: Some(named.name.clone()),
            ..Default::default()
        };
        let material = serde_json::to_value(&kubeconfig)?;

        Ok(KubeContext {
            name: named.name.clone(),
            cluster: body.cluster.clone(),
            user: body.user.clone(),
            namespace: body.namespace.clone(),
            server: cluster.cluster.as_ref().and_then(|c| c.server.clone()),
            kubeconfig,
            material,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    // Contexts without an explicit namespace behave like kubectl does and use "default"
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn kubeconfig(&self) -> &Kubeconfig {
        &self.kubeconfig
    }

    pub fn same_material(&self, other: &KubeContext) -> bool {
        self.name == other.name && self.material == other.material
    }
}

/// A validated view of a kubeconfig: every context resolved against its cluster and user.
///
/// Building a snapshot is the only place where kubeconfig content is checked; it either succeeds
/// for the whole file or fails without producing anything, so a bad edit to the kubeconfig never
/// disturbs contexts that are already being tracked.
#[derive(Clone, Debug, Default)]
pub struct KubeconfigSnapshot {
    pub contexts: Vec<KubeContext>,
    pub current_context: Option<String>,
}

impl TryFrom<&Kubeconfig> for KubeconfigSnapshot {
    type Error = anyhow::Error;

    fn try_from(kubeconfig: &Kubeconfig) -> anyhow::Result<KubeconfigSnapshot> {
        let mut seen = BTreeSet::new();
        let mut contexts = Vec::with_capacity(kubeconfig.contexts.len());
        for named in &kubeconfig.contexts {
            if !seen.insert(named.name.as_str()) {
                return Err(KubeconfigError::duplicate_context(&named.name));
            }
            contexts.push(KubeContext::from_named(named, kubeconfig)?);
        }

        Ok(KubeconfigSnapshot {
            contexts,
            current_context: kubeconfig.current_context.clone(),
        })
    }
}

impl KubeconfigSnapshot {
    pub fn get(&self, name: &str) -> Option<&KubeContext> {
        self.contexts.iter().find(|c| c.name == name)
    }
}
