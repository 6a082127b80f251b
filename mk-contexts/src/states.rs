use std::collections::BTreeMap;
use std::sync::Arc;

use kube::runtime::reflector::Store;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

use crate::health::ContextHealthState;
use crate::manager::ContextPhase;
use crate::permissions::ContextResourcePermission;
use crate::registry::ContextResourceRegistry;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextGeneralState {
    pub checking: bool,
    pub reachable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Object count for every resource currently being watched on this context
    pub resources: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCount {
    pub context_name: String,
    pub resource_name: String,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResources {
    pub context_name: String,
    pub items: Vec<Arc<DynamicObject>>,
}

// The single source of truth for everything consumers can ask about.  Health and permission
// results are stored as they arrive; general state and counts are always derived from them and
// from the live informer caches on demand, so there is nothing to keep in sync.
//
// Only the orchestration loop writes to this (behind a RwLock); queries take a read guard.
#[derive(Default)]
pub struct ContextsStatesRegistry {
    current_context: Option<String>,
    health: BTreeMap<String, ContextHealthState>,
    phases: BTreeMap<String, ContextPhase>,
    permissions: ContextResourceRegistry<ContextResourcePermission>,
    caches: ContextResourceRegistry<Store<DynamicObject>>,
}

impl ContextsStatesRegistry {
    pub fn new() -> ContextsStatesRegistry {
        Default::default()
    }

    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    pub fn set_current_context(&mut self, current_context: Option<String>) {
        self.current_context = current_context;
    }

    pub fn set_health(&mut self, state: ContextHealthState) {
        self.health.insert(state.context_name.clone(), state);
    }

    #[cfg(test)]
    pub(crate) fn health(&self, context_name: &str) -> Option<&ContextHealthState> {
        self.health.get(context_name)
    }

    pub fn health_states(&self) -> Vec<ContextHealthState> {
        self.health.values().cloned().collect()
    }

    pub fn set_phase(&mut self, context_name: &str, phase: ContextPhase) {
        self.phases.insert(context_name.into(), phase);
    }

    pub fn phases(&self) -> BTreeMap<String, ContextPhase> {
        self.phases.clone()
    }

    // Replaces every permission result previously stored for the context
    pub fn set_permissions(&mut self, context_name: &str, permissions: &[ContextResourcePermission]) {
        self.permissions.remove_context(context_name);
        for p in permissions {
            self.permissions.set(context_name, &p.resource_name, p.clone());
        }
    }

    pub fn clear_permissions(&mut self, context_name: &str) {
        self.permissions.remove_context(context_name);
    }

    pub fn permissions(&self, context_name: Option<&str>) -> Vec<ContextResourcePermission> {
        match context_name {
            Some(ctx) => self.permissions.iter_context(ctx).map(|(_, p)| p.clone()).collect(),
            None => self.permissions.iter().map(|(_, _, p)| p.clone()).collect(),
        }
    }

    pub fn set_cache(&mut self, context_name: &str, resource_name: &str, store: Store<DynamicObject>) {
        self.caches.set(context_name, resource_name, store);
    }

    pub fn clear_caches(&mut self, context_name: &str) {
        self.caches.remove_context(context_name);
    }

    pub fn checking_states(&self) -> BTreeMap<String, bool> {
        self.health.iter().map(|(name, s)| (name.clone(), s.checking)).collect()
    }

    pub fn general_state(&self, context_name: &str) -> Option<ContextGeneralState> {
        let health = self.health.get(context_name)?;
        Some(ContextGeneralState {
            checking: health.checking,
            reachable: health.reachable,
            error: health.error.clone(),
            resources: self
                .caches
                .iter_context(context_name)
                .map(|(res, store)| (res.to_string(), store.state().len()))
                .collect(),
        })
    }

    pub fn general_states(&self) -> BTreeMap<String, ContextGeneralState> {
        self.health
            .keys()
            .filter_map(|name| Some((name.clone(), self.general_state(name)?)))
            .collect()
    }

    pub fn current_context_general_state(&self) -> Option<ContextGeneralState> {
        self.general_state(self.current_context.as_deref()?)
    }

    #[cfg(test)]
    pub(crate) fn resource_count(&self, context_name: &str, resource_name: &str) -> Option<ResourceCount> {
        let store = self.caches.get(context_name, resource_name)?;
        Some(ResourceCount {
            context_name: context_name.into(),
            resource_name: resource_name.into(),
            count: store.state().len(),
        })
    }

    pub fn resource_counts(&self) -> Vec<ResourceCount> {
        self.caches
            .iter()
            .map(|(ctx, res, store)| ResourceCount {
                context_name: ctx.into(),
                resource_name: res.into(),
                count: store.state().len(),
            })
            .collect()
    }

    pub fn resources(&self, context_name: &str, resource_name: &str) -> Option<Vec<Arc<DynamicObject>>> {
        self.caches.get(context_name, resource_name).map(|store| store.state())
    }

    pub fn resources_by_kind(&self, resource_name: &str) -> Vec<ContextResources> {
        self.caches
            .iter()
            .filter(|(_, res, _)| *res == resource_name)
            .map(|(ctx, _, store)| ContextResources { context_name: ctx.into(), items: store.state() })
            .collect()
    }

    pub fn remove_context(&mut self, context_name: &str) {
        self.health.remove(context_name);
        self.phases.remove(context_name);
        self.permissions.remove_context(context_name);
        self.caches.remove_context(context_name);
    }

    pub fn clear(&mut self) {
        self.health.clear();
        self.phases.clear();
        self.permissions.drain();
        self.caches.drain();
    }
}
