//! 核心层：错误与恢复、运行状态

pub mod error;
pub mod recovery;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{AgentState, FileMap, GenerationStatus, RunPhase, SharedState};
