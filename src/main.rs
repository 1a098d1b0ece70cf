//! AppForge - 自然语言生成可预览 React 项目
//!
//! 入口：初始化日志、按配置构建生成服务，对一条提示词跑一次生成并打印结果。
//!
//! ```bash
//! appforge [--config path/to/appforge.toml] [--project <id>] "build a todo app"
//! ```
//! 运行期间 Ctrl+C 请求取消（下一次路由时生效）。

use std::path::PathBuf;

use anyhow::{bail, Context};
use appforge::config::load_config;
use appforge::react::GenerationEvent;
use appforge::GenerationService;
use clap::Parser;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "appforge")]
#[command(version, about = "AppForge - generate a previewable React project from a prompt")]
struct CliArgs {
    /// Config file (defaults to config/default.toml plus APPFORGE__* env vars)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project id; a follow-up run on the same id edits the previous files
    #[arg(short, long = "project")]
    project_id: Option<String>,

    /// What to build
    #[arg(trailing_var_arg = true, required = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    appforge::observability::init();

    let args = CliArgs::parse();
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }
    let project_id = args
        .project_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let cfg = load_config(args.config).context("Failed to load config")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<GenerationEvent>();
    let service = GenerationService::from_config(cfg)
        .await
        .context("Failed to create generation service")?
        .with_event_tx(event_tx);

    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match &ev {
                GenerationEvent::StepUpdate { step, max_steps } => {
                    eprintln!("[step {step}/{max_steps}]");
                }
                GenerationEvent::ToolCall { tool, .. } => eprintln!("  -> {tool}"),
                GenerationEvent::Observation { preview, .. } => eprintln!("     {preview}"),
                GenerationEvent::Thinking => {}
                other => {
                    if let Ok(json) = serde_json::to_string(other) {
                        eprintln!("{json}");
                    }
                }
            }
        }
    });

    let handle = service
        .start_generation(&prompt, &project_id)
        .await
        .context("Failed to start generation")?;

    let canceller = service.clone();
    let cancel_id = project_id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel(&cancel_id).await;
        }
    });

    let outcome = handle.await.context("Generation task panicked")?;
    // 发送端仍被服务持有，事件打印任务不会自行结束
    tokio::task::yield_now().await;
    printer.abort();

    println!("project: {}", outcome.project_id);
    match (&outcome.artifact, &outcome.message) {
        (Some(artifact), Some(message)) => {
            println!("title:   {}", artifact.title);
            println!("preview: {}", artifact.preview_handle);
            println!("files:");
            for path in artifact.files.keys() {
                println!("  {path}");
            }
            println!();
            println!("{}", message.content);
        }
        _ => {
            println!("status:  error");
            if let Some(err) = &outcome.error {
                println!("reason:  {err}");
            }
            if let Some(message) = &outcome.message {
                println!("{}", message.content);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_collects_prompt_and_flags() {
        let args = CliArgs::try_parse_from([
            "appforge", "--config", "my.toml", "--project", "p1", "build", "a", "todo", "app",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("my.toml")));
        assert_eq!(args.project_id.as_deref(), Some("p1"));
        assert_eq!(args.prompt.join(" "), "build a todo app");
    }

    #[test]
    fn test_cli_requires_prompt() {
        assert!(CliArgs::try_parse_from(["appforge", "--project", "p1"]).is_err());
    }
}
