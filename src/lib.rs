// Keyhost — local custody host.
//
//   atoms  — constants, errors, domain types and capability traits (no I/O)
//   engine — everything with side effects

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult, ErrorInfo};
pub use engine::config::HostConfig;
pub use engine::context::RequestContext;
pub use engine::state::HostState;
