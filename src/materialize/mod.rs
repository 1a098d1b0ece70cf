//! 项目物化：把生成过程产出的原始文件表整理成可直接预览的规范项目
//!
//! 单趟、无副作用的纯函数管线，顺序固定：
//! 1. 解包内容（`Raw` / `Coded`），丢弃空内容；
//! 2. 路径规范化（见 [`paths`]）；
//! 3. 相对导入改写，与路径展平保持一致（见 [`imports`]）；
//! 4. 组件头部规范化（React 导入 / 默认导出）；
//! 5. 补齐入口、样式、HTML 外壳与根组件（见 [`scaffold`]）；
//! 6. 为未解析的相对导入合成占位文件；
//! 7. 依赖检测并生成 package.json（见 [`manifest`]）。
//!
//! 对自身输出再运行一次结果不变。

pub mod imports;
pub mod manifest;
pub mod paths;
pub mod scaffold;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::core::FileMap;

pub use scaffold::{APP_PATH, PLACEHOLDER_MARKER, TAILWIND_CDN};

const MANIFEST_PATH: &str = "/package.json";

/// 原始文件内容：裸字符串或 `{code: string}` 包装，入口处解析一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Raw(String),
    Coded(String),
}

impl FileContent {
    pub fn text(&self) -> &str {
        match self {
            FileContent::Raw(s) | FileContent::Coded(s) => s,
        }
    }

    /// JSON 值 -> 文件内容；null 或不含 `code` 的对象视为畸形，返回 None
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(FileContent::Raw(s.clone())),
            Value::Object(map) => match map.get("code") {
                Some(Value::String(s)) => Some(FileContent::Coded(s.clone())),
                Some(Value::Null) | None => None,
                Some(other) => Some(FileContent::Coded(other.to_string())),
            },
            other => Some(FileContent::Raw(other.to_string())),
        }
    }
}

/// 物化前的原始文件集合（保留输入顺序，同一规范路径后者覆盖前者）
#[derive(Debug, Clone, Default)]
pub struct RawFiles {
    entries: Vec<(String, FileContent)>,
}

impl RawFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// 来自工具循环的共享状态
    pub fn from_state(files: &FileMap) -> Self {
        Self {
            entries: files
                .iter()
                .map(|(p, c)| (p.clone(), FileContent::Raw(c.clone())))
                .collect(),
        }
    }

    /// 来自结构化 JSON（`{path: {code}}` 或 `{path: string}`）；字符串会先按 JSON 解析
    pub fn from_json(value: &Value) -> Self {
        let parsed;
        let value = match value {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => {
                    tracing::warn!("files payload is not valid JSON, ignoring: {}", e);
                    return Self::default();
                }
            },
            v => v,
        };

        let Value::Object(map) = value else {
            tracing::warn!("files payload is not a JSON object, ignoring");
            return Self::default();
        };

        let mut raw = Self::default();
        for (path, content) in map {
            match FileContent::from_value(content) {
                Some(c) => raw.push(path.clone(), c),
                None => tracing::warn!(file = %path, "malformed file entry skipped"),
            }
        }
        raw
    }

    pub fn from_canonical(project: &CanonicalProject) -> Self {
        Self::from_state(&project.files)
    }

    pub fn push(&mut self, path: impl Into<String>, content: FileContent) {
        self.entries.push((path.into(), content));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileContent)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c))
    }
}

/// 物化结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalProject {
    /// 规范路径 -> 内容
    pub files: BTreeMap<String, String>,
    /// 包名 -> 版本（与 package.json 一致）
    pub dependencies: BTreeMap<String, String>,
}

/// 交给浏览器端预览组件的全部信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDescriptor {
    pub template: String,
    pub active_file: String,
    pub visible_files: Vec<String>,
    pub dependencies: BTreeMap<String, String>,
    pub external_resources: Vec<String>,
}

impl CanonicalProject {
    /// 合成的占位文件路径
    pub fn placeholders(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(_, c)| c.contains(PLACEHOLDER_MARKER))
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn preview(&self) -> PreviewDescriptor {
        let active = ["/src/App.js", "/src/App.jsx", "/src/App.tsx", "/src/App.ts"]
            .iter()
            .find(|p| self.files.contains_key(**p))
            .copied()
            .unwrap_or(APP_PATH)
            .to_string();
        PreviewDescriptor {
            template: "react".to_string(),
            visible_files: vec![active.clone()],
            active_file: active,
            dependencies: self.dependencies.clone(),
            external_resources: vec![TAILWIND_CDN.to_string()],
        }
    }

    /// 预览组件的文件格式：`{path: {code}}`
    pub fn files_json(&self) -> Value {
        Value::Object(
            self.files
                .iter()
                .map(|(p, c)| (p.clone(), serde_json::json!({ "code": c })))
                .collect(),
        )
    }
}

/// 物化入口
pub fn materialize(raw: &RawFiles) -> CanonicalProject {
    // 1-2: 解包 + 路径规范化
    let mut staged: Vec<(Vec<String>, String, String)> = Vec::with_capacity(raw.len());
    for (path, content) in raw.iter() {
        let text = content.text();
        if text.trim().is_empty() {
            tracing::debug!(file = %path, "empty file dropped");
            continue;
        }
        let Some(segs) = paths::normalize(path) else {
            tracing::warn!(file = %path, "file path escapes project root, skipped");
            continue;
        };
        let Some(canonical) = paths::canonicalize(&segs) else {
            tracing::warn!(file = %path, "file path could not be canonicalized, skipped");
            continue;
        };
        staged.push((segs, canonical, text.to_string()));
    }

    let index: HashMap<String, String> = staged
        .iter()
        .map(|(segs, canonical, _)| (segs.join("/"), canonical.clone()))
        .collect();

    // 3-4: 导入改写 + 头部规范化
    let mut files: BTreeMap<String, String> = BTreeMap::new();
    for (segs, canonical, text) in staged {
        let content = if paths::is_code(&canonical) {
            let rewritten = imports::rewrite_relative(&text, &segs, &canonical, &index);
            if canonical == scaffold::ENTRY_PATH {
                rewritten
            } else {
                imports::normalize_header(&rewritten, &canonical)
            }
        } else {
            text
        };
        if files.insert(canonical.clone(), content).is_some() {
            tracing::warn!(file = %canonical, "several files map to the same path, keeping the last");
        }
    }

    // 5: 脚手架先于占位，缺失的根组件得到默认 App 而不是占位
    scaffold::ensure_entry_files(&mut files);

    // 6: 占位
    for (path, kind) in imports::missing_targets(&files) {
        tracing::info!(file = %path, kind = ?kind, "synthesizing placeholder for unresolved import");
        let body = scaffold::placeholder(&path, &kind);
        files.entry(path).or_insert(body);
    }

    // 7: 依赖 + 清单
    let dependencies = manifest::detect_dependencies(&files);
    files.insert(MANIFEST_PATH.to_string(), manifest::package_json(&dependencies));

    tracing::debug!(files = files.len(), deps = dependencies.len(), "project materialized");
    CanonicalProject { files, dependencies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(entries: &[(&str, &str)]) -> RawFiles {
        let mut r = RawFiles::new();
        for (p, c) in entries {
            r.push(*p, FileContent::Raw(c.to_string()));
        }
        r
    }

    fn assert_all_imports_resolve(project: &CanonicalProject) {
        for (path, code) in &project.files {
            if !paths::is_code(path) {
                continue;
            }
            for spec in imports::specifiers(code) {
                if imports::is_relative(&spec) {
                    assert!(
                        imports::resolve_import(&project.files, path, &spec).is_some(),
                        "{path}: unresolved import {spec}"
                    );
                }
            }
        }
    }

    fn messy_project() -> RawFiles {
        raw(&[
            (
                "/App.js",
                "import { useState } from 'react';\nimport Header from './components/Header';\nimport Footer from './components/Footer';\nimport Home from './pages/Home';\nimport './App.css';\n\nexport default function App() {\n  return <div><Header /><Home /><Footer /></div>;\n}\n",
            ),
            (
                "components/Header.jsx",
                "import { Menu } from 'lucide-react';\nconst Header = () => {\n  return <header><Menu /></header>;\n};\n",
            ),
            (
                "pages/Home.js",
                "import Card from '../components/Card';\nimport { fmt } from '../utils/fmt';\nfunction Home() {\n  return (<Card>{fmt(1)}</Card>);\n}\nexport default Home;\n",
            ),
            ("src/components/Card.js", "export default function Card({ children }) {\n  return <div>{children}</div>;\n}\n"),
            ("utils/fmt.js", "export const fmt = (n) => n.toFixed(2);\n"),
            ("README.md", "   "),
        ])
    }

    #[test]
    fn test_materialized_imports_resolve() {
        let project = materialize(&messy_project());
        assert_all_imports_resolve(&project);

        assert!(project.files.contains_key("/src/Header.jsx"));
        assert!(project.files.contains_key("/src/Card.js"));
        assert!(project.files.contains_key("/src/utils/fmt.js"));
        assert!(project.files.contains_key("/src/index.js"));
        assert!(project.files.contains_key("/src/index.css"));
        assert!(project.files.contains_key("/public/index.html"));
        assert!(project.files.contains_key("/package.json"));
        assert!(!project.files.contains_key("/README.md"));

        let header = &project.files["/src/Header.jsx"];
        assert!(header.starts_with("import React from 'react';"));
        assert!(header.contains("export default Header;"));
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let once = materialize(&messy_project());
        let twice = materialize(&RawFiles::from_canonical(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_component_gets_placeholder() {
        let project = materialize(&raw(&[(
            "App.js",
            "import React from 'react';\nimport Foo from './components/Foo';\nexport default function App() {\n  return <Foo />;\n}\n",
        )]));
        assert!(project.files["/src/App.js"].contains("from './Foo'"));
        let foo = &project.files["/src/Foo.js"];
        assert!(foo.contains(PLACEHOLDER_MARKER));
        assert!(foo.contains("export default Foo;"));
        assert_eq!(project.placeholders(), vec!["/src/Foo.js"]);
        assert_all_imports_resolve(&project);
    }

    #[test]
    fn test_missing_stylesheet_gets_placeholder() {
        let project = materialize(&raw(&[(
            "src/App.js",
            "import './App.css';\nexport default function App() {\n  return <div />;\n}\n",
        )]));
        assert!(project.files["/src/App.css"].contains(PLACEHOLDER_MARKER));
    }

    #[tokio::test]
    async fn test_latest_write_survives_path_aliases() {
        use crate::core::{AgentState, FileMap, SharedState};

        let state = SharedState::default();
        state
            .merge_files(vec![("src/App.js".to_string(), "export default () => <p>OLD</p>;\n".to_string())])
            .await;
        state
            .merge_files(vec![("App.js".to_string(), "export default () => <p>NEW</p>;\n".to_string())])
            .await;
        let project = materialize(&RawFiles::from_state(&state.files().await));
        assert!(project.files["/src/App.js"].contains("<p>NEW</p>"));

        let mut seed = FileMap::new();
        seed.insert("/src/App.js".to_string(), "export default () => <p>SEEDED</p>;\n".to_string());
        let state = SharedState::new(AgentState::seeded(seed));
        state
            .merge_files(vec![("./src/App.js".to_string(), "export default () => <p>EDITED</p>;\n".to_string())])
            .await;
        let project = materialize(&RawFiles::from_state(&state.files().await));
        assert!(project.files["/src/App.js"].contains("<p>EDITED</p>"));
    }

    #[test]
    fn test_import_with_other_extension_uses_real_component() {
        let project = materialize(&raw(&[
            (
                "App.js",
                "import Header from './components/Header.js';\nexport default function App() {\n  return <Header />;\n}\n",
            ),
            ("components/Header.jsx", "export default function Header() {\n  return <h1>Hi</h1>;\n}\n"),
        ]));
        assert!(project.files["/src/App.js"].contains("from './Header'"));
        assert!(!project.files.contains_key("/src/Header.js"));
        assert!(project.placeholders().is_empty());
        assert_all_imports_resolve(&project);
    }

    #[test]
    fn test_directory_import_past_root_gets_placeholder() {
        let project = materialize(&raw(&[
            ("App.js", "export default function App() {\n  return <main />;\n}\n"),
            ("pages/Home.js", "import x from '../..';\nexport default function Home() {\n  return <p>{x}</p>;\n}\n"),
        ]));
        assert!(project.files["/src/pages/Home.js"].contains("from './Root'"));
        assert_eq!(project.placeholders(), vec!["/src/pages/Root.js"]);
        assert_all_imports_resolve(&project);
        assert_eq!(materialize(&RawFiles::from_canonical(&project)), project);
    }

    #[test]
    fn test_manifest_lists_exactly_detected_packages() {
        let project = materialize(&raw(&[(
            "App.js",
            "import { motion } from 'framer-motion';\nimport { Line } from 'react-chartjs-2';\nimport moment from 'moment';\nexport default function App() {\n  return <motion.div><Line /></motion.div>;\n}\n",
        )]));
        let names: Vec<&str> = project.dependencies.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["framer-motion", "react", "react-chartjs-2", "react-dom"]);

        let manifest: Value = serde_json::from_str(&project.files["/package.json"]).unwrap();
        let listed: Vec<&String> = manifest["dependencies"].as_object().unwrap().keys().collect();
        assert_eq!(listed.len(), 4);
    }

    #[test]
    fn test_no_app_gets_default_root() {
        let project = materialize(&RawFiles::new());
        assert!(project.files.contains_key(APP_PATH));
        assert!(project.placeholders().is_empty());
        assert_eq!(project.preview().active_file, APP_PATH);
    }

    #[test]
    fn test_coded_json_and_malformed_entries() {
        let payload = json!({
            "App.js": { "code": "export default function App() {\n  return <p>hi</p>;\n}\n" },
            "broken.js": { "content": "no code field" },
            "nothing.js": null,
            "count.js": 42
        });
        let raw = RawFiles::from_json(&payload);
        assert_eq!(raw.len(), 2);

        let project = materialize(&raw);
        assert!(project.files["/src/App.js"].contains("<p>hi</p>"));
        assert_eq!(project.files["/src/count.js"], "42");
        assert!(!project.files.contains_key("/src/broken.js"));
    }

    #[test]
    fn test_from_json_accepts_string_payload() {
        let payload = Value::String(r#"{"src/App.js": "export default () => <i/>;"}"#.to_string());
        assert_eq!(RawFiles::from_json(&payload).len(), 1);
        assert!(RawFiles::from_json(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_escaping_path_skipped() {
        let project = materialize(&raw(&[("../../etc/passwd", "root"), ("App.js", "export default () => <i/>;\n")]));
        assert!(project.files.keys().all(|k| !k.contains("passwd")));
    }

    #[test]
    fn test_preview_descriptor() {
        let project = materialize(&raw(&[("App.jsx", "export default function App() {\n  return <i />;\n}\n")]));
        let preview = project.preview();
        assert_eq!(preview.active_file, "/src/App.jsx");
        assert_eq!(preview.external_resources, vec![TAILWIND_CDN.to_string()]);
        assert_eq!(project.files_json()["/src/App.jsx"]["code"], project.files["/src/App.jsx"].as_str());
    }
}
