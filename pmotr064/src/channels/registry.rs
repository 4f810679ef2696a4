//! The set of channels currently exposed by a session.

use indexmap::IndexMap;

use super::discovery::ChannelBinding;

/// Changes to apply to the host after a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDiff {
    pub added: Vec<ChannelBinding>,
    pub removed: Vec<String>,
}

impl ChannelDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Channel bindings of one device, in discovery order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    bindings: IndexMap<String, ChannelBinding>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registry content with `discovered`.
    ///
    /// Unchanged bindings are kept as they are. A binding whose definition
    /// changed is reported as removed and added again.
    pub fn apply(&mut self, discovered: Vec<ChannelBinding>) -> ChannelDiff {
        let mut diff = ChannelDiff::default();

        let mut next = IndexMap::with_capacity(discovered.len());
        for binding in discovered {
            match self.bindings.get(&binding.channel_id) {
                Some(existing) if *existing == binding => {}
                Some(_) => {
                    diff.removed.push(binding.channel_id.clone());
                    diff.added.push(binding.clone());
                }
                None => diff.added.push(binding.clone()),
            }
            next.insert(binding.channel_id.clone(), binding);
        }

        for id in self.bindings.keys() {
            if !next.contains_key(id) {
                diff.removed.push(id.clone());
            }
        }

        self.bindings = next;
        diff
    }

    /// Drop every binding, returning their ids.
    pub fn clear(&mut self) -> Vec<String> {
        let removed = self.bindings.keys().cloned().collect();
        self.bindings.clear();
        removed
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelBinding> {
        self.bindings.get(channel_id)
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.bindings.contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelBinding> {
        self.bindings.values()
    }

    /// Other channels answered by the same get call as `binding`.
    ///
    /// Channels reading the same output argument as `binding` are left out.
    pub fn siblings_of<'a>(
        &'a self,
        binding: &'a ChannelBinding,
    ) -> impl Iterator<Item = &'a ChannelBinding> + 'a {
        let argument = binding.get_action.as_ref().and_then(|a| a.argument_name());
        self.bindings.values().filter(move |other| {
            other.channel_id != binding.channel_id
                && binding.shares_get_call_with(other)
                && other.get_action.as_ref().and_then(|a| a.argument_name()) != argument
        })
    }
}
