//! 工具箱：terminal、createOrUpdateFiles、readFiles、finish，以及注册表与执行器

pub mod executor;
pub mod finish;
pub mod read_files;
pub mod registry;
pub mod schema;
pub mod terminal;
pub mod write_files;

pub use executor::ToolExecutor;
pub use finish::FinishTool;
pub use read_files::ReadFilesTool;
pub use registry::{Tool, ToolRegistry};
pub use terminal::TerminalTool;
pub use write_files::WriteFilesTool;

use crate::core::SharedState;
use crate::sandbox::SandboxHandle;

/// 为一次运行构建工具执行器：所有工具共享同一个 SharedState 与沙箱句柄
pub fn build_toolbox(
    state: &SharedState,
    sandbox: Option<&SandboxHandle>,
    tool_timeout_secs: u64,
) -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(TerminalTool::new(sandbox.cloned()));
    registry.register(WriteFilesTool::new(state.clone(), sandbox.cloned()));
    registry.register(ReadFilesTool::new(state.clone(), sandbox.cloned()));
    registry.register(FinishTool::new(state.clone()));
    ToolExecutor::new(registry, tool_timeout_secs)
}
