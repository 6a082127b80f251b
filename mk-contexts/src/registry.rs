use std::collections::BTreeMap;

/// A two-level map keyed by (context name, resource name).
///
/// Used for anything that exists once per watched kind per context: informers, their caches and
/// permission results.  Removing a context drops every entry under it at once, which is how the
/// orchestrator tears a context down.
#[derive(Clone, Debug)]
pub struct ContextResourceRegistry<T> {
    entries: BTreeMap<String, BTreeMap<String, T>>,
}

impl<T> Default for ContextResourceRegistry<T> {
    fn default() -> Self {
        ContextResourceRegistry { entries: BTreeMap::new() }
    }
}

impl<T> ContextResourceRegistry<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, context_name: &str, resource_name: &str) -> Option<&T> {
        self.entries.get(context_name)?.get(resource_name)
    }

    pub fn contains(&self, context_name: &str, resource_name: &str) -> bool {
        self.get(context_name, resource_name).is_some()
    }

    // Returns the previous value, if any
    pub fn set(&mut self, context_name: &str, resource_name: &str, value: T) -> Option<T> {
        self.entries
            .entry(context_name.into())
            .or_default()
            .insert(resource_name.into(), value)
    }

    #[cfg(test)]
    pub(crate) fn remove(&mut self, context_name: &str, resource_name: &str) -> Option<T> {
        let inner = self.entries.get_mut(context_name)?;
        let value = inner.remove(resource_name);
        if inner.is_empty() {
            self.entries.remove(context_name);
        }
        value
    }

    pub fn remove_context(&mut self, context_name: &str) -> Vec<T> {
        self.entries
            .remove(context_name)
            .map(|inner| inner.into_values().collect())
            .unwrap_or_default()
    }

    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
            .into_values()
            .flat_map(|inner| inner.into_values())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &T)> {
        self.entries
            .iter()
            .flat_map(|(ctx, inner)| inner.iter().map(move |(res, v)| (ctx.as_str(), res.as_str(), v)))
    }

    pub fn iter_context(&self, context_name: &str) -> impl Iterator<Item = (&str, &T)> {
        self.entries
            .get(context_name)
            .into_iter()
            .flat_map(|inner| inner.iter().map(|(res, v)| (res.as_str(), v)))
    }

    #[cfg(test)]
    pub(crate) fn contexts(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(|inner| inner.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
