// Keyhost Engine — Broadcast Channel Selection
//
// Several relays may be able to submit a transaction for the same chain.
// Selection is a pure lookup over configuration: the highest-priority
// enabled channel that is registered and serves the chain wins. A channel
// with an empty `chains` list serves every chain.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub chains: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ChannelSettings {
    pub fn new(name: &str, priority: i32) -> Self {
        ChannelSettings { name: name.into(), priority, enabled: true, chains: Vec::new() }
    }

    pub fn serves(&self, chain_id: &str) -> bool {
        self.chains.is_empty() || self.chains.iter().any(|c| c == chain_id)
    }
}

/// Name of the channel to use for `chain_id`, if any qualifies.
pub fn select_channel<'a>(
    settings: &'a [ChannelSettings],
    registered: &HashSet<String>,
    chain_id: &str,
) -> Option<&'a str> {
    settings
        .iter()
        .filter(|s| s.enabled && registered.contains(&s.name) && s.serves(chain_id))
        .max_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.name.cmp(&a.name)))
        .map(|s| s.name.as_str())
}
