//! 内置提示词：编码 Agent、标题生成、回复生成、直接生成模式

use std::path::Path;

/// 编码 Agent 的 system prompt；`{marker}` 会被替换为完成标记
pub const CODE_AGENT_PROMPT: &str = r#"You are a senior React developer building a complete, previewable single-page app inside a sandbox.

Environment:
- React 18 with function components and hooks, Tailwind CSS via CDN for styling.
- Supported packages: lucide-react (icons), date-fns, uuid, clsx, tailwind-merge, react-router-dom,
  react-hook-form, zod, @hookform/resolvers, framer-motion, react-icons, axios, chart.js with react-chartjs-2,
  recharts, firebase. Anything else will not load in the preview.

Rules:
1. The root component lives in src/App.js and is the default export.
2. Put components in src/components/Name.js, one component per file, `.js` extension for all React files.
3. Every relative import must point at a file you create. Do not import files you did not write.
4. Style with Tailwind utility classes only; make the result responsive and polished.
5. Use createOrUpdateFiles to write complete file contents (never partial diffs or placeholders).
6. Use readFiles before changing files that already exist. Use terminal only when a command is really needed.

When everything is written, call the `finish` tool with a one-paragraph summary, or end your final message with:
{marker}
Short description of what was built or changed
{marker_close}"#;

/// 标题生成
pub const TITLE_PROMPT: &str = r#"Write a short title for the app described in the task summary below.
Use at most 3 words in Title Case (for example "Expense Tracker" or "Chat Widget").
No punctuation, quotes or prefixes. Return only the title."#;

/// 面向用户的结果说明
pub const RESPONSE_PROMPT: &str = r#"Based on the task summary below, tell the user in 1 to 3 casual sentences what was built or changed for them.
Do not mention the summary itself. Return plain text only: no code, tags or markdown."#;

/// 直接生成模式：一次性返回 JSON 项目
pub const DIRECT_PROMPT: &str = r#"Generate a React project for the request above. Use Tailwind CSS for styling and .js files.
Split the UI into components under /components when useful. Only use lucide-react, date-fns, react-chartjs-2
and chart.js as third-party packages, and only when needed.

Respond with JSON only, in exactly this shape:
{
  "projectTitle": "",
  "explanation": "",
  "files": {
    "/App.js": { "code": "" }
  },
  "generatedFiles": ["/App.js"]
}
`files` must contain every file with its full source in `code`, `generatedFiles` lists the same paths,
and `explanation` is one concise paragraph about the structure and features."#;

/// 编码 Agent 的 system prompt：自定义文件优先，读取失败回退内置版本
pub fn code_agent_prompt(marker: &str, override_path: Option<&Path>) -> String {
    let template = match override_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) if !s.trim().is_empty() => s,
            Ok(_) => CODE_AGENT_PROMPT.to_string(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read system prompt: {}", e);
                CODE_AGENT_PROMPT.to_string()
            }
        },
        None => CODE_AGENT_PROMPT.to_string(),
    };
    template
        .replace("{marker}", marker)
        .replace("{marker_close}", &closing_marker(marker))
}

/// `<task_summary>` -> `</task_summary>`；非标签形式的标记原样返回
pub fn closing_marker(marker: &str) -> String {
    match marker.strip_prefix('<') {
        Some(rest) if !rest.starts_with('/') => format!("</{rest}"),
        _ => marker.to_string(),
    }
}
