//! 依赖自动检测与 package.json 生成
//!
//! 扫描所有非相对导入，取顶层包名（支持 `@scope/name`），与预览沙箱支持的白名单取交集；
//! 不在白名单的包静默忽略。清单总是包含框架运行时 react / react-dom。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::materialize::imports::{is_relative, specifiers};
use crate::materialize::paths;

/// 框架运行时（总是写入清单）
pub const FRAMEWORK_RUNTIME: &[(&str, &str)] = &[("react", "^18.2.0"), ("react-dom", "^18.2.0")];

/// 预览沙箱支持的包及版本
pub const ALLOWED_PACKAGES: &[(&str, &str)] = &[
    ("lucide-react", "^0.469.0"),
    ("date-fns", "^4.1.0"),
    ("react-chartjs-2", "^5.3.0"),
    ("chart.js", "^4.4.7"),
    ("recharts", "^2.12.0"),
    ("react-router-dom", "^6.8.0"),
    ("uuid", "^9.0.0"),
    ("axios", "^1.3.0"),
    ("firebase", "^9.17.0"),
    ("@google/generative-ai", "^0.21.0"),
    ("react-hook-form", "^7.43.0"),
    ("zod", "^3.20.0"),
    ("@hookform/resolvers", "^2.9.0"),
    ("framer-motion", "^10.0.0"),
    ("react-icons", "^4.7.0"),
    ("clsx", "^1.2.0"),
    ("tailwind-merge", "^1.12.0"),
];

/// 说明符 -> 顶层包名；相对 / 绝对路径 / URL 返回 None
pub fn package_name(spec: &str) -> Option<&str> {
    if spec.is_empty()
        || is_relative(spec)
        || spec.starts_with('/')
        || spec.contains("://")
        || spec.starts_with("node:")
    {
        return None;
    }
    let mut parts = spec.splitn(3, '/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let second = parts.next()?;
        if second.is_empty() {
            return None;
        }
        Some(&spec[..first.len() + 1 + second.len()])
    } else {
        Some(first)
    }
}

fn allowed_version(name: &str) -> Option<&'static str> {
    FRAMEWORK_RUNTIME
        .iter()
        .chain(ALLOWED_PACKAGES.iter())
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// 检测依赖：框架运行时 + 白名单内被导入的包
pub fn detect_dependencies(files: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut deps: BTreeMap<String, String> = FRAMEWORK_RUNTIME
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();

    for (path, code) in files {
        if !paths::is_code(path) {
            continue;
        }
        for spec in specifiers(code) {
            let Some(name) = package_name(&spec) else {
                continue;
            };
            match allowed_version(name) {
                Some(version) => {
                    deps.entry(name.to_string())
                        .or_insert_with(|| version.to_string());
                }
                None => tracing::debug!(package = %name, file = %path, "package not supported by preview, omitted"),
            }
        }
    }
    deps
}

#[derive(Serialize)]
struct PackageJson<'a> {
    name: &'a str,
    version: &'a str,
    private: bool,
    main: &'a str,
    dependencies: &'a BTreeMap<String, String>,
}

/// 生成 package.json 文本
pub fn package_json(dependencies: &BTreeMap<String, String>) -> String {
    let manifest = PackageJson {
        name: "react-app",
        version: "0.1.0",
        private: true,
        main: "/src/index.js",
        dependencies,
    };
    let mut text = serde_json::to_string_pretty(&manifest).unwrap_or_else(|_| "{}".to_string());
    text.push('\n');
    text
}
