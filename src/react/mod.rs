//! 编排层：Planner、编排主循环、过程事件、标题 / 回复生成与内置提示词

pub mod events;
pub mod generators;
pub mod loop_;
pub mod planner;
pub mod prompts;

pub use events::GenerationEvent;
pub use generators::{SummaryWriter, FALLBACK_RESPONSE, FALLBACK_TITLE};
pub use loop_::{run_network, NetworkResult, NetworkSession, Termination};
pub use planner::{extract_json_block, Planner};
