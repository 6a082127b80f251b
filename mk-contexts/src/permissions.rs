use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_recursion::async_recursion;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::*;

use crate::client::{
    AccessReview,
    ClusterClient,
};
use crate::factory::{
    PermissionGroup,
    ResourceAttributes,
};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResourcePermission {
    pub context_name: String,
    pub resource_name: String,
    pub permitted: bool,

    // The probe that decided this resource's outcome
    pub attrs: ResourceAttributes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct Message {
    pub(crate) context_name: String,
    pub(crate) checker_id: u64,
    pub(crate) client: Arc<dyn ClusterClient>,
    pub(crate) permissions: Vec<ContextResourcePermission>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("context_name", &self.context_name)
            .field("checker_id", &self.checker_id)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}
pub type Sender = mpsc::UnboundedSender<Message>;
pub type Receiver = mpsc::UnboundedReceiver<Message>;

pub struct ContextPermissionsChecker {
    id: u64,
    context_name: String,
    task: JoinHandle<()>,
}

impl ContextPermissionsChecker {
    pub fn start(
        id: u64,
        context_name: &str,
        client: Arc<dyn ClusterClient>,
        groups: Arc<Vec<PermissionGroup>>,
        tx: Sender,
    ) -> ContextPermissionsChecker {
        info!("starting permissions checker {id} for context {context_name}");
        let ctx = context_name.to_string();
        let task = tokio::spawn(async move {
            let permissions = check_permissions(&ctx, client.as_ref(), &groups).await;
            let permitted = permissions.iter().filter(|p| p.permitted).count();
            debug!("context {ctx}: {permitted}/{} resources permitted", permissions.len());

            // The receiver going away means we're shutting down, nothing to do about it
            let _ = tx.send(Message { context_name: ctx, checker_id: id, client, permissions });
        });

        ContextPermissionsChecker { id, context_name: context_name.into(), task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dispose(&self) {
        debug!("disposing permissions checker {} for context {}", self.id, self.context_name);
        self.task.abort();
    }
}

impl Drop for ContextPermissionsChecker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Walks the probe groups against a cluster and returns one result per resource.
///
/// Each group is checked once.  When it is granted, or has nowhere more specific to fall back
/// to, its outcome applies to every resource it lists.  When it is denied, resources that have no
/// fallback entry are denied outright and the fallback entries are checked in turn.  An access
/// check that fails to run counts as a denial.
pub async fn check_permissions(
    context_name: &str,
    client: &dyn ClusterClient,
    groups: &[PermissionGroup],
) -> Vec<ContextResourcePermission> {
    let mut out = vec![];
    check_groups(context_name, client, groups, &mut out).await;
    out
}

#[async_recursion]
async fn check_groups(
    context_name: &str,
    client: &dyn ClusterClient,
    groups: &[PermissionGroup],
    out: &mut Vec<ContextResourcePermission>,
) {
    for group in groups {
        let review = match client.review_access(&group.attrs).await {
            Ok(review) => review,
            Err(err) => {
                warn!("access check {:?} failed on context {context_name}, treating as denied: {err}", group.attrs);
                AccessReview { allowed: false, reason: Some(format!("access check failed: {err}")) }
            },
        };
        debug!("access check {:?} on context {context_name}: allowed={}", group.attrs, review.allowed);

        let record = |out: &mut Vec<ContextResourcePermission>, resource_name: &str| {
            out.push(ContextResourcePermission {
                context_name: context_name.into(),
                resource_name: resource_name.into(),
                permitted: review.allowed,
                attrs: group.attrs.clone(),
                reason: review.reason.clone(),
            })
        };

        if review.allowed || group.on_deny_requests.is_empty() {
            for res in &group.resources {
                record(out, res);
            }
            continue;
        }

        let fallbacks: HashSet<&str> = group
            .on_deny_requests
            .iter()
            .flat_map(|g| g.resources.iter().map(|r| r.as_str()))
            .collect();
        for res in group.resources.iter().filter(|r| !fallbacks.contains(r.as_str())) {
            record(out, res);
        }
        check_groups(context_name, client, &group.on_deny_requests, out).await;
    }
}
