//! 脚手架与占位文件模板
//!
//! 入口 /src/index.js、基础样式 /src/index.css、HTML 外壳 /public/index.html 缺失时补齐；
//! 没有根组件 App.* 时补一个默认 App，保证预览不为空白。

use std::collections::BTreeMap;

use crate::materialize::imports::MissingKind;

/// 占位文件标记，CanonicalProject::placeholders 据此识别
pub const PLACEHOLDER_MARKER: &str = "appforge:placeholder";

pub const ENTRY_PATH: &str = "/src/index.js";
pub const STYLES_PATH: &str = "/src/index.css";
pub const HTML_PATH: &str = "/public/index.html";
pub const APP_PATH: &str = "/src/App.js";
pub const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";

const ENTRY_JS: &str = r#"import React from 'react';
import ReactDOM from 'react-dom/client';
import './index.css';
import App from './App';

const root = ReactDOM.createRoot(document.getElementById('root'));
root.render(<App />);
"#;

const INDEX_CSS: &str = r#"* {
  margin: 0;
  padding: 0;
  box-sizing: border-box;
}

body {
  font-family: system-ui, -apple-system, 'Segoe UI', Roboto, 'Helvetica Neue', sans-serif;
  line-height: 1.6;
  color: #1f2937;
  background-color: #ffffff;
  -webkit-font-smoothing: antialiased;
}

#root {
  min-height: 100vh;
  display: flex;
  flex-direction: column;
}
"#;

const DEFAULT_APP: &str = r#"import React from 'react';

function App() {
  return (
    <div className="min-h-screen bg-gray-50 flex items-center justify-center p-8">
      <div className="max-w-xl text-center">
        <h1 className="text-4xl font-bold text-gray-900 mb-4">Your app is almost ready</h1>
        <p className="text-lg text-gray-600">
          The generated files did not include a root App component, so this default one is shown.
        </p>
      </div>
    </div>
  );
}

export default App;
"#;

fn index_html() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>React App</title>
    <script src="{TAILWIND_CDN}"></script>
  </head>
  <body>
    <div id="root"></div>
  </body>
</html>
"#
    )
}

/// 补齐入口、样式、HTML 外壳与根组件（已存在的文件不动）
pub fn ensure_entry_files(files: &mut BTreeMap<String, String>) {
    files
        .entry(ENTRY_PATH.to_string())
        .or_insert_with(|| ENTRY_JS.to_string());
    files
        .entry(STYLES_PATH.to_string())
        .or_insert_with(|| INDEX_CSS.to_string());
    files
        .entry(HTML_PATH.to_string())
        .or_insert_with(index_html);

    let has_app = ["/src/App.js", "/src/App.jsx", "/src/App.tsx", "/src/App.ts"]
        .iter()
        .any(|p| files.contains_key(*p));
    if !has_app {
        tracing::info!("no root App component generated, adding default");
        files.insert(APP_PATH.to_string(), DEFAULT_APP.to_string());
    }
}

/// 由文件名得到合法的组件标识符（PascalCase）
pub fn component_name(path: &str) -> String {
    let stem = crate::materialize::paths::stem(path);
    let mut name: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("Component{name}");
    }
    name
}

/// 占位文件内容
pub fn placeholder(path: &str, kind: &MissingKind) -> String {
    match kind {
        MissingKind::Component => {
            let name = component_name(path);
            format!(
                r#"// {PLACEHOLDER_MARKER}
import React from 'react';

function {name}() {{
  return (
    <div className="p-4 border-2 border-dashed border-gray-300 rounded-lg bg-gray-50 text-center">
      <div className="text-gray-500 text-sm mb-1">Placeholder Component</div>
      <div className="text-gray-700 font-medium">{name}</div>
      <div className="text-gray-400 text-xs mt-1">This component was imported but never generated.</div>
    </div>
  );
}}

export default {name};
"#
            )
        }
        MissingKind::Module => format!("// {PLACEHOLDER_MARKER}\nexport default {{}};\n"),
        MissingKind::Stylesheet(_) => format!("/* {PLACEHOLDER_MARKER}: {path} */\n"),
        MissingKind::Json => format!("{{\"{PLACEHOLDER_MARKER}\": true}}\n"),
        MissingKind::Asset => format!("{PLACEHOLDER_MARKER}: {path}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("/src/Foo.js"), "Foo");
        assert_eq!(component_name("/src/todo-list.jsx"), "TodoList");
        assert_eq!(component_name("/src/3d.js"), "Component3d");
    }

    #[test]
    fn test_entry_files_only_fill_gaps() {
        let mut files = BTreeMap::new();
        files.insert("/src/App.jsx".to_string(), "custom".to_string());
        files.insert("/src/index.css".to_string(), "body {}".to_string());
        ensure_entry_files(&mut files);
        assert_eq!(files["/src/index.css"], "body {}");
        assert!(!files.contains_key(APP_PATH));
        assert!(files[HTML_PATH].contains(TAILWIND_CDN));
        assert!(files[ENTRY_PATH].contains("import App from './App'"));
    }

    #[test]
    fn test_placeholders_are_marked() {
        for kind in [
            MissingKind::Component,
            MissingKind::Module,
            MissingKind::Stylesheet("css".to_string()),
            MissingKind::Json,
            MissingKind::Asset,
        ] {
            let body = placeholder("/src/Foo.js", &kind);
            assert!(body.contains(PLACEHOLDER_MARKER));
            assert!(!body.trim().is_empty());
        }
    }
}
