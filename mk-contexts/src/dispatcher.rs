use std::collections::BTreeMap;

use tracing::*;

use crate::context::{
    KubeContext,
    KubeconfigSnapshot,
};

#[derive(Clone, Debug)]
pub enum DispatchEvent {
    Delete(String),
    Add(KubeContext),
    Update(KubeContext),
}

impl DispatchEvent {
    pub fn context_name(&self) -> &str {
        match self {
            DispatchEvent::Delete(name) => name,
            DispatchEvent::Add(ctx) | DispatchEvent::Update(ctx) => ctx.name(),
        }
    }
}

// The dispatcher remembers the last snapshot it was given and turns each new snapshot into a
// list of per-context changes.  Deletes always come first, then adds (in kubeconfig order), then
// updates, so a caller that processes the list in order never has a removed context and its
// replacement alive at the same time.
#[derive(Debug, Default)]
pub struct ContextsDispatcher {
    known: BTreeMap<String, KubeContext>,
}

impl ContextsDispatcher {
    pub fn new() -> ContextsDispatcher {
        Default::default()
    }

    pub fn update(&mut self, snapshot: &KubeconfigSnapshot) -> Vec<DispatchEvent> {
        let mut deletes = vec![];
        let mut adds = vec![];
        let mut updates = vec![];

        for name in self.known.keys() {
            if snapshot.get(name).is_none() {
                deletes.push(DispatchEvent::Delete(name.clone()));
            }
        }

        for ctx in &snapshot.contexts {
            match self.known.get(ctx.name()) {
                None => adds.push(DispatchEvent::Add(ctx.clone())),
                Some(old) if !old.same_material(ctx) => updates.push(DispatchEvent::Update(ctx.clone())),
                Some(_) => (),
            }
        }

        self.known = snapshot.contexts.iter().map(|c| (c.name().to_string(), c.clone())).collect();
        debug!(
            "kubeconfig reconciled: {} deleted, {} added, {} updated",
            deletes.len(),
            adds.len(),
            updates.len()
        );

        deletes.into_iter().chain(adds).chain(updates).collect()
    }

    #[cfg(test)]
    pub(crate) fn contexts(&self) -> impl Iterator<Item = &KubeContext> {
        self.known.values()
    }
}
