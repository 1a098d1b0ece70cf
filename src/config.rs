//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `APPFORGE__*` 覆盖
//! （双下划线表示嵌套，如 `APPFORGE__AGENT__MAX_ITERATIONS=10`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub sandbox: SandboxSection,
    pub tools: ToolsSection,
    pub store: StoreSection,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

/// 生成方式：工具循环（agent）或单次 JSON 生成（direct）
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Agent,
    Direct,
}

/// [agent] 段：编排循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 路由次数上限（防止模型失控）
    pub max_iterations: usize,
    /// 作为上下文注入的历史消息条数
    pub history_limit: usize,
    /// 单轮内模型调用失败的重试次数
    pub model_retries: u32,
    /// 完成标记
    pub completion_marker: String,
    pub mode: GenerationMode,
    /// 以项目最近一次产物的文件表作为初始状态
    pub seed_previous_files: bool,
    /// 覆盖内置 system prompt 的文件路径
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            history_limit: 5,
            model_retries: 2,
            completion_marker: "<task_summary>".to_string(),
            mode: GenerationMode::Agent,
            seed_previous_files: true,
            system_prompt_path: None,
        }
    }
}

/// [sandbox] 段：沙箱实现、超时、预览端口与启动命令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// local / memory
    pub provider: String,
    /// local 沙箱的根目录，每个沙箱一个子目录
    pub root: PathBuf,
    /// 每次沙箱调用的超时（秒）
    pub timeout_secs: u64,
    pub preview_port: u16,
    /// 创建沙箱后依次执行的初始化命令
    pub setup_commands: Vec<String>,
    /// 循环结束后在后台启动的预览服务命令
    pub start_command: Option<String>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            root: PathBuf::from("workspace/sandboxes"),
            timeout_secs: 60,
            preview_port: 3000,
            setup_commands: Vec::new(),
            start_command: None,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 120,
        }
    }
}

/// [store] 段：memory / sqlite
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub provider: String,
    pub db_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            db_path: PathBuf::from("workspace/appforge.db"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 APPFORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 APPFORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("APPFORGE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("sandbox.setup_commands")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.agent.history_limit, 5);
        assert_eq!(cfg.agent.completion_marker, "<task_summary>");
        assert_eq!(cfg.sandbox.preview_port, 3000);
        assert_eq!(cfg.store.provider, "memory");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appforge.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 3\nmode = \"direct\"\n\n[llm]\nprovider = \"mock\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_iterations, 3);
        assert_eq!(cfg.agent.mode, GenerationMode::Direct);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.agent.history_limit, 5);
    }
}
