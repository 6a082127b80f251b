use k8s_openapi::api::authorization::v1 as authv1;
use mk_core::errors::*;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

err_impl! {FactoryError,
    #[error("resource factory registered twice: {0}")]
    DuplicateFactory(String),

    #[error("no resource factory registered for: {0}")]
    UnknownResource(String),
}

// One permission descriptor from a factory declaration.  `group: None` means the core API group;
// `resource: "*"` (and `group: "*"`) are authorizer wildcards.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub resource: String,
    pub verb: String,
}

impl PermissionRequest {
    pub fn new(group: Option<&str>, resource: &str, verb: &str) -> PermissionRequest {
        PermissionRequest {
            group: group.map(String::from),
            resource: resource.into(),
            verb: verb.into(),
        }
    }

    pub fn watch_everything() -> PermissionRequest {
        PermissionRequest::new(Some(WILDCARD), WILDCARD, WATCH_VERB)
    }
}

/// The attributes of a single access check.  Two probes are the same probe exactly when their
/// attributes compare equal, so `namespace` being present or absent is significant.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub resource: String,
    pub verb: String,
}

impl ResourceAttributes {
    fn for_request(req: &PermissionRequest, namespace: Option<&str>) -> ResourceAttributes {
        ResourceAttributes {
            namespace: namespace.map(String::from),
            group: req.group.clone(),
            resource: req.resource.clone(),
            verb: req.verb.clone(),
        }
    }
}

impl From<&ResourceAttributes> for authv1::ResourceAttributes {
    fn from(attrs: &ResourceAttributes) -> authv1::ResourceAttributes {
        authv1::ResourceAttributes {
            namespace: attrs.namespace.clone(),
            group: attrs.group.clone(),
            resource: Some(attrs.resource.clone()),
            verb: Some(attrs.verb.clone()),
            ..Default::default()
        }
    }
}

// A ResourceFactory declares one watchable kind: what it is called, whether it lives in a
// namespace, which access checks grant it (broadest first), and which GVK the informer should
// watch once it is authorized.  Factories without a `watch` GVK still take part in permission
// checking; they just never get an informer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFactory {
    pub resource: String,
    pub namespaced: bool,

    #[serde(default)]
    pub permissions_requests: Vec<PermissionRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<GVK>,
}

impl ResourceFactory {
    pub fn new(resource: &str, namespaced: bool, permissions_requests: Vec<PermissionRequest>) -> ResourceFactory {
        ResourceFactory {
            resource: resource.into(),
            namespaced,
            permissions_requests,
            watch: None,
        }
    }

    pub fn watching(mut self, gvk: &GVK) -> ResourceFactory {
        self.watch = Some(gvk.clone());
        self
    }

    pub fn api_resource(&self) -> Option<ApiResource> {
        self.watch.as_ref().map(|gvk| gvk.api_resource(&self.resource))
    }

    // The namespace the informer for this kind should be scoped to, if any
    pub fn watch_namespace(&self, context_namespace: &str) -> Option<String> {
        self.namespaced.then(|| context_namespace.into())
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    pub attrs: ResourceAttributes,
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_deny_requests: Vec<PermissionGroup>,
}

#[derive(Clone, Debug, Default)]
pub struct ResourceFactoryHandler {
    factories: Vec<ResourceFactory>,

    // Deepest onDenyRequests nesting to compute; None follows the declarations all the way down
    max_depth: Option<usize>,
}

impl ResourceFactoryHandler {
    pub fn new(factories: Vec<ResourceFactory>) -> anyhow::Result<ResourceFactoryHandler> {
        let mut handler = ResourceFactoryHandler::default();
        for f in factories {
            handler.add(f)?;
        }
        Ok(handler)
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> ResourceFactoryHandler {
        self.max_depth = max_depth;
        self
    }

    pub fn add(&mut self, factory: ResourceFactory) -> EmptyResult {
        if self.factories.iter().any(|f| f.resource == factory.resource) {
            return Err(FactoryError::duplicate_factory(&factory.resource));
        }
        self.factories.push(factory);
        Ok(())
    }

    pub fn factory_for(&self, resource: &str) -> anyhow::Result<&ResourceFactory> {
        self.factories
            .iter()
            .find(|f| f.resource == resource)
            .ok_or_else(|| FactoryError::unknown_resource(resource))
    }

    pub fn factories(&self) -> &[ResourceFactory] {
        &self.factories
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|f| f.resource.as_str())
    }

    // Merges every factory's permission requests into the smallest ordered list of probes.  The
    // first descriptor of each factory forms the top level; factories whose top-level attributes
    // are equal share a probe.  The next descriptor of each member of a group becomes that
    // group's fallback level, computed the same way over just those members, and so on.
    pub fn get_permissions_requests(&self, namespace: &str) -> Vec<PermissionGroup> {
        let members: Vec<_> = self.factories.iter().collect();
        self.group_level(&members, 0, namespace)
    }

    fn group_level(&self, members: &[&ResourceFactory], depth: usize, namespace: &str) -> Vec<PermissionGroup> {
        let mut groups: Vec<PermissionGroup> = vec![];
        let mut group_members: Vec<Vec<&ResourceFactory>> = vec![];

        for f in members {
            let Some(req) = f.permissions_requests.get(depth) else {
                continue;
            };

            let attrs = ResourceAttributes::for_request(req, f.namespaced.then_some(namespace));
            match groups.iter().position(|g| g.attrs == attrs) {
                Some(i) => {
                    groups[i].resources.push(f.resource.clone());
                    group_members[i].push(f);
                },
                None => {
                    groups.push(PermissionGroup { attrs, resources: vec![f.resource.clone()], on_deny_requests: vec![] });
                    group_members.push(vec![f]);
                },
            }
        }

        if self.max_depth.is_none_or(|max| depth < max) {
            for (group, m) in groups.iter_mut().zip(group_members) {
                group.on_deny_requests = self.group_level(&m, depth + 1, namespace);
            }
        }

        groups
    }
}

fn builtin(resource: &str, namespaced: bool, gvk: &GVK) -> ResourceFactory {
    ResourceFactory::new(
        resource,
        namespaced,
        vec![PermissionRequest::watch_everything(), PermissionRequest::new(gvk.group_opt(), resource, WATCH_VERB)],
    )
    .watching(gvk)
}

pub fn builtin_factories() -> Vec<ResourceFactory> {
    vec![
        builtin(PODS, true, &POD_GVK),
        builtin(DEPLOYMENTS, true, &DEPLOYMENT_GVK),
        builtin(SERVICES, true, &SERVICE_GVK),
        builtin(INGRESSES, true, &INGRESS_GVK),
        builtin(PERSISTENT_VOLUME_CLAIMS, true, &PVC_GVK),
        builtin(CONFIGMAPS, true, &CONFIGMAP_GVK),
        builtin(SECRETS, true, &SECRET_GVK),
        builtin(JOBS, true, &JOB_GVK),
        builtin(CRONJOBS, true, &CRONJOB_GVK),
        builtin(EVENTS, true, &EVENT_GVK),
        builtin(NODES, false, &NODE_GVK),
    ]
}
