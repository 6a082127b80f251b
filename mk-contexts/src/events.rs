use std::collections::BTreeMap;

use serde::Serialize;

use crate::health::ContextHealthState;
use crate::permissions::ContextResourcePermission;
use crate::states::{
    ContextGeneralState,
    ContextResources,
    ResourceCount,
};

// Fine-grained notifications, sent as things happen (not debounced).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContextEvent {
    HealthStateChanged(ContextHealthState),
    PermissionsResult {
        context_name: String,
        permissions: Vec<ContextResourcePermission>,
    },
    ContextDeleted {
        context_name: String,
    },
    ResourceUpdated {
        context_name: String,
        resource_name: String,
    },
    ResourceCountUpdated(ResourceCount),
    InformerOffline {
        context_name: String,
        resource_name: String,
        error: String,
    },
}

impl ContextEvent {
    pub fn context_name(&self) -> &str {
        match self {
            ContextEvent::HealthStateChanged(state) => &state.context_name,
            ContextEvent::ResourceCountUpdated(count) => &count.context_name,
            ContextEvent::PermissionsResult { context_name, .. }
            | ContextEvent::ContextDeleted { context_name }
            | ContextEvent::ResourceUpdated { context_name, .. }
            | ContextEvent::InformerOffline { context_name, .. } => context_name,
        }
    }
}

// Each channel is debounced on its own; resource channels are keyed by resource name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum StateChannel {
    CheckingState,
    GeneralState,
    CurrentContextGeneralState,
    Resources(String),
}

/// Aggregate snapshots, published at most once per debounce window per channel.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StateUpdate {
    CheckingState(BTreeMap<String, bool>),
    GeneralState(BTreeMap<String, ContextGeneralState>),
    CurrentContextGeneralState {
        context_name: Option<String>,
        state: Option<ContextGeneralState>,
    },
    Resources {
        resource_name: String,
        contexts: Vec<ContextResources>,
    },
}

impl StateUpdate {
    pub fn channel(&self) -> StateChannel {
        match self {
            StateUpdate::CheckingState(_) => StateChannel::CheckingState,
            StateUpdate::GeneralState(_) => StateChannel::GeneralState,
            StateUpdate::CurrentContextGeneralState { .. } => StateChannel::CurrentContextGeneralState,
            StateUpdate::Resources { resource_name, .. } => StateChannel::Resources(resource_name.clone()),
        }
    }
}
