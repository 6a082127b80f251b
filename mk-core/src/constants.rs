use lazy_static::lazy_static;

use crate::k8s::GVK;

// Wildcards understood by the Kubernetes authorizer
pub const WILDCARD: &str = "*";
pub const WATCH_VERB: &str = "watch";

// Namespace used for contexts that don't specify one
pub const DEFAULT_NAMESPACE: &str = "default";

// Timing
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 250;

// An informer only gives up after this many watch errors in a row
pub const WATCH_MAX_CONSECUTIVE_ERRORS: usize = 5;

// A context restarted after an informer failure waits one health interval, doubling on each
// further restart up to this many intervals
pub const MAX_RESTART_BACKOFF_INTERVALS: u32 = 8;

// Channels
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

// Built-in resource names (these are the plurals the apiserver uses)
pub const PODS: &str = "pods";
pub const DEPLOYMENTS: &str = "deployments";
pub const SERVICES: &str = "services";
pub const INGRESSES: &str = "ingresses";
pub const PERSISTENT_VOLUME_CLAIMS: &str = "persistentvolumeclaims";
pub const CONFIGMAPS: &str = "configmaps";
pub const SECRETS: &str = "secrets";
pub const JOBS: &str = "jobs";
pub const CRONJOBS: &str = "cronjobs";
pub const EVENTS: &str = "events";
pub const NODES: &str = "nodes";

// Built-in GVKs
lazy_static! {
    pub static ref POD_GVK: GVK = GVK::new("", "v1", "Pod");
    pub static ref DEPLOYMENT_GVK: GVK = GVK::new("apps", "v1", "Deployment");
    pub static ref SERVICE_GVK: GVK = GVK::new("", "v1", "Service");
    pub static ref INGRESS_GVK: GVK = GVK::new("networking.k8s.io", "v1", "Ingress");
    pub static ref PVC_GVK: GVK = GVK::new("", "v1", "PersistentVolumeClaim");
    pub static ref CONFIGMAP_GVK: GVK = GVK::new("", "v1", "ConfigMap");
    pub static ref SECRET_GVK: GVK = GVK::new("", "v1", "Secret");
    pub static ref JOB_GVK: GVK = GVK::new("batch", "v1", "Job");
    pub static ref CRONJOB_GVK: GVK = GVK::new("batch", "v1", "CronJob");
    pub static ref EVENT_GVK: GVK = GVK::new("", "v1", "Event");
    pub static ref NODE_GVK: GVK = GVK::new("", "v1", "Node");
}
