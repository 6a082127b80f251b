#![cfg_attr(coverage, feature(coverage_attribute))]
mod client;
mod config;
mod context;
mod debounce;
mod dispatcher;
mod events;
mod factory;
mod health;
mod informer;
mod manager;
mod permissions;
mod registry;
mod states;

pub use crate::client::{
    AccessReview,
    ClientProvider,
    ClusterClient,
    KubeClientProvider,
    KubeClusterClient,
    ObjStream,
};
#[cfg(feature = "mock")]
pub use crate::client::{
    MockClientProvider,
    MockClusterClient,
};
pub use crate::config::ManagerConfig;
pub use crate::context::{
    KubeContext,
    KubeconfigSnapshot,
};
pub use crate::debounce::Debouncer;
pub use crate::dispatcher::{
    ContextsDispatcher,
    DispatchEvent,
};
pub use crate::events::{
    ContextEvent,
    StateChannel,
    StateUpdate,
};
pub use crate::factory::{
    PermissionGroup,
    PermissionRequest,
    ResourceAttributes,
    ResourceFactory,
    ResourceFactoryHandler,
    builtin_factories,
};
pub use crate::health::{
    ContextHealthChecker,
    ContextHealthState,
    HealthCheckOptions,
    HealthPhase,
};
pub use crate::informer::{
    InformerEvent,
    ResourceInformer,
};
pub use crate::manager::{
    ContextPhase,
    ContextsManager,
};
pub use crate::permissions::{
    ContextPermissionsChecker,
    ContextResourcePermission,
    check_permissions,
};
pub use crate::registry::ContextResourceRegistry;
pub use crate::states::{
    ContextGeneralState,
    ContextResources,
    ContextsStatesRegistry,
    ResourceCount,
};

#[cfg(test)]
mod tests;
