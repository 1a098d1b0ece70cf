//! AppForge - 自然语言生成可预览 React 项目
//!
//! 模块划分：
//! - **agent**: 无头生成服务（StartGeneration / GetStatus / Cancel，每次运行独立上下文）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、运行状态（AgentState / RunPhase / GenerationStatus）
//! - **llm**: 模型边界（OpenAI 兼容 function calling / Mock）
//! - **materialize**: 项目规范化流水线（路径、导入、占位文件、依赖清单、脚手架）
//! - **memory**: 对话消息类型
//! - **react**: Agent 编排循环（Routing → ToolExecuting → Terminated）、标题与回复生成
//! - **sandbox**: 沙箱句柄（本地目录 / 内存）
//! - **store**: 结果持久化（内存 / SQLite）
//! - **tools**: 工具箱（terminal、createOrUpdateFiles、readFiles、finish）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod materialize;
pub mod memory;
pub mod observability;
pub mod react;
pub mod sandbox;
pub mod store;
pub mod tools;

pub use agent::{GenerationOutcome, GenerationService, StatusReport};
pub use materialize::{materialize, CanonicalProject, FileContent, RawFiles};
