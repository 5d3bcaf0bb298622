// Keyhost Engine — custody host runtime
// Quote aggregation, the transaction lifecycle, the framed extension channel
// and the vault, wired together by `state` and exposed to the two peers by
// `extension` (browser) and `tools` (agent).

pub mod aggregator;
pub mod chains;
pub mod config;
pub mod context;
pub mod extension;
pub mod instance;
pub mod lifecycle;
pub mod peer;
pub mod state;
pub mod tools;
pub mod vault;

#[cfg(test)]
pub mod testing;
