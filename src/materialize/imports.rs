//! 导入说明符：扫描、解析、改写与头部规范化
//!
//! 覆盖 `import ... from '...'`、`export ... from '...'`、`import '...'`、`import('...')`、`require('...')`。
//! 相对导入按原始文件位置解析到原始文件集合，再按规范路径重新计算；无法解析的折叠为同目录 `./<文件名>`，
//! 与路径展平保持一致，缺失目标随后由占位文件补齐。

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::materialize::paths::{self, extension, join, parent, relative_spec, segments};

/// 解析无扩展名导入时依次尝试的后缀
const LOOKUP_SUFFIXES: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs", ".json"];
const INDEX_SUFFIXES: &[&str] = &["/index.js", "/index.jsx", "/index.ts", "/index.tsx"];
/// 带源码扩展名的导入可命中同名但扩展名不同的文件（`./Header.js` -> `Header.jsx`）
const CODE_SUFFIXES: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs"];
/// 越过项目根目录的目录导入（`'..'`、`'../..'`）折叠到的占位名
const ROOT_PLACEHOLDER: &str = "Root";

/// import / export-from / 副作用 import / 动态 import / require 中的说明符
fn spec_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?P<pre>\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)['"](?P<spec>[^'"\n]+)['"]"#,
        )
        .expect("static regex")
    })
}

fn jsx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\breturn|=>)\s*\(?\s*<[A-Za-z>]").expect("static regex")
    })
}

fn react_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*import\s+(?:React\b|\*\s+as\s+React\b)").expect("static regex")
    })
}

fn default_export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bexport\s+default\b|\bexport\s*\{[^}]*\bas\s+default\b")
            .expect("static regex")
    })
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:export\s+)?(?:function\s+(?P<f>[A-Za-z_$][\w$]*)|(?:const|let|var)\s+(?P<c>[A-Za-z_$][\w$]*)\s*=|class\s+(?P<k>[A-Za-z_$][\w$]*))",
        )
        .expect("static regex")
    })
}

/// 需要按文件路径解析的说明符：`./`、`../` 开头，或裸写的 `components/...`
pub fn is_relative(spec: &str) -> bool {
    spec == "."
        || spec == ".."
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with("components/")
}

/// 代码中出现的全部导入说明符（按出现顺序）
pub fn specifiers(code: &str) -> Vec<String> {
    spec_re()
        .captures_iter(code)
        .map(|c| c["spec"].to_string())
        .collect()
}

fn as_relative(spec: &str) -> String {
    if spec.starts_with("components/") {
        format!("./{spec}")
    } else {
        spec.to_string()
    }
}

/// 命中方式：原样、补扩展名、目录 index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Hit {
    Exact,
    Suffixed,
    Index,
}

/// 在 has(path) 描述的文件集合中查找目标（段形式，不含前导 `/`）
fn lookup(target: &[String], has: impl Fn(&str) -> bool) -> Option<(String, Hit)> {
    if target.is_empty() {
        return None;
    }
    let base = target.join("/");
    if has(&base) {
        return Some((base, Hit::Exact));
    }
    for suffix in LOOKUP_SUFFIXES {
        let candidate = format!("{base}{suffix}");
        if has(&candidate) {
            return Some((candidate, Hit::Suffixed));
        }
    }
    if let Some(last) = target.last().filter(|l| paths::is_code(l)) {
        let dir = &target[..target.len() - 1];
        let mut stem_segs = dir.to_vec();
        stem_segs.push(paths::stem(last).to_string());
        let stem_base = stem_segs.join("/");
        for suffix in CODE_SUFFIXES {
            let candidate = format!("{stem_base}{suffix}");
            if has(&candidate) {
                return Some((candidate, Hit::Suffixed));
            }
        }
    }
    for suffix in INDEX_SUFFIXES {
        let candidate = format!("{base}{suffix}");
        if has(&candidate) {
            return Some((candidate, Hit::Index));
        }
    }
    None
}

/// 在规范文件表中解析 importer 的相对导入，返回命中的规范路径
pub fn resolve_import(files: &BTreeMap<String, String>, importer: &str, spec: &str) -> Option<String> {
    let importer = segments(importer);
    let target = join(parent(&importer), &as_relative(spec));
    lookup(&target, |p| files.contains_key(&format!("/{p}"))).map(|(p, _)| format!("/{p}"))
}

/// 按命中方式给出规范目标对应的说明符段（补扩展名命中去掉扩展名，index 命中取目录）
fn spec_target(canonical: &str, hit: Hit) -> Vec<String> {
    let mut segs = segments(canonical);
    match hit {
        Hit::Exact => {}
        Hit::Suffixed => {
            if let Some(last) = segs.last_mut() {
                *last = paths::stem(last).to_string();
            }
        }
        Hit::Index => {
            segs.pop();
        }
    }
    segs
}

/// 按文件名在全部规范路径中查找（取字典序最小者，保证结果确定）
fn by_file_name(name: &str, index: &HashMap<String, String>) -> Option<(String, Hit)> {
    let mut candidates: Vec<(&String, Hit)> = index
        .values()
        .filter_map(|canonical| {
            let file = canonical.rsplit('/').next()?;
            if file == name {
                Some((canonical, Hit::Exact))
            } else if paths::is_code(file)
                && (paths::stem(file) == name
                    || (paths::is_code(name) && paths::stem(file) == paths::stem(name)))
            {
                Some((canonical, Hit::Suffixed))
            } else {
                None
            }
        })
        .collect();
    candidates.sort();
    candidates.dedup_by(|a, b| a.0 == b.0);
    candidates.into_iter().next().map(|(c, h)| (c.clone(), h))
}

/// 改写一个文件的相对导入
///
/// orig 为该文件的原始路径段，canonical 为其规范路径；index 为原始路径（`a/b.js`）-> 规范路径。
pub fn rewrite_relative(
    code: &str,
    orig: &[String],
    canonical: &str,
    index: &HashMap<String, String>,
) -> String {
    let orig_dir = parent(orig);
    let canon_segs = segments(canonical);
    let canon_dir = parent(&canon_segs);

    spec_re()
        .replace_all(code, |caps: &Captures| {
            let whole = &caps[0];
            let spec = &caps["spec"];
            if !is_relative(spec) {
                return whole.to_string();
            }
            let target = join(orig_dir, &as_relative(spec));
            let new_spec = match lookup(&target, |p| index.contains_key(p)) {
                Some((orig_key, hit)) => {
                    let Some(canon_target) = index.get(&orig_key) else {
                        return whole.to_string();
                    };
                    let to = spec_target(canon_target, hit);
                    if to.is_empty() {
                        return whole.to_string();
                    }
                    relative_spec(canon_dir, &to)
                }
                None => {
                    let name = match spec.rsplit('/').next() {
                        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
                        _ => target.last().map_or(ROOT_PLACEHOLDER, String::as_str),
                    };
                    match by_file_name(name, index) {
                        Some((canon_target, hit)) => {
                            relative_spec(canon_dir, &spec_target(&canon_target, hit))
                        }
                        None => format!("./{name}"),
                    }
                }
            };
            if new_spec == spec {
                return whole.to_string();
            }
            tracing::debug!(file = %canonical, from = %spec, to = %new_spec, "rewrote import");
            whole.replacen(spec, &new_spec, 1)
        })
        .into_owned()
}

/// 是否为 UI 组件源码（js/jsx/tsx 且含 JSX 返回）
pub fn is_component_source(path: &str, code: &str) -> bool {
    matches!(extension(path), Some("js" | "jsx" | "tsx")) && jsx_re().is_match(code)
}

/// 头部规范化：缺 React 导入则前置；缺默认导出则按首个声明补一个。已存在的从不重复添加。
pub fn normalize_header(code: &str, path: &str) -> String {
    if !is_component_source(path, code) {
        return code.to_string();
    }
    let mut out = code.to_string();

    if !react_import_re().is_match(&out) {
        out = format!("import React from 'react';\n{out}");
    }

    if !default_export_re().is_match(&out) {
        if let Some(name) = first_declaration(&out) {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("\nexport default {name};\n"));
        }
    }
    out
}

/// 首个声明名，优先大写开头（组件）
fn first_declaration(code: &str) -> Option<String> {
    let names: Vec<String> = declaration_re()
        .captures_iter(code)
        .filter_map(|c| {
            c.name("f")
                .or_else(|| c.name("c"))
                .or_else(|| c.name("k"))
                .map(|m| m.as_str().to_string())
        })
        .collect();
    names
        .iter()
        .find(|n| n.starts_with(|ch: char| ch.is_ascii_uppercase()))
        .or_else(|| names.first())
        .cloned()
}

/// 所有未解析的相对导入：规范目标路径 -> 占位内容种类
pub fn missing_targets(files: &BTreeMap<String, String>) -> BTreeMap<String, MissingKind> {
    let mut missing = BTreeMap::new();
    for (path, code) in files {
        if !paths::is_code(path) {
            continue;
        }
        for spec in specifiers(code) {
            if !is_relative(&spec) || resolve_import(files, path, &spec).is_some() {
                continue;
            }
            let importer = segments(path);
            let target = join(parent(&importer), &as_relative(&spec));
            if target.is_empty() {
                continue;
            }
            let joined = format!("/{}", target.join("/"));
            let (key, kind) = match extension(&joined) {
                Some(e) if paths::is_stylesheet(&joined) => (joined.clone(), MissingKind::Stylesheet(e.to_string())),
                Some("js" | "jsx" | "tsx") => (joined.clone(), MissingKind::Component),
                Some("ts" | "mjs" | "cjs") => (joined.clone(), MissingKind::Module),
                Some("json") => (joined.clone(), MissingKind::Json),
                Some(_) => (joined.clone(), MissingKind::Asset),
                None => (format!("{joined}.js"), MissingKind::Component),
            };
            missing.entry(key).or_insert(kind);
        }
    }
    missing
}

/// 占位文件种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingKind {
    Component,
    /// 非 JSX 模块（.ts / .mjs）
    Module,
    Stylesheet(String),
    Json,
    Asset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::paths::{canonicalize, normalize};

    fn index_of(paths: &[&str]) -> HashMap<String, String> {
        paths
            .iter()
            .map(|p| {
                let segs = normalize(p).unwrap();
                (segs.join("/"), canonicalize(&segs).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_specifiers_cover_all_forms() {
        let code = r#"
import React, { useState } from 'react';
import Header from "./components/Header";
export { default as Nav } from './Nav';
import './App.css';
const Lazy = React.lazy(() => import('./Lazy'));
const x = require('../lib/x');
"#;
        assert_eq!(
            specifiers(code),
            vec![
                "react",
                "./components/Header",
                "./Nav",
                "./App.css",
                "./Lazy",
                "../lib/x"
            ]
        );
    }

    #[test]
    fn test_rewrite_follows_flattening() {
        let index = index_of(&["App.js", "components/Header.js", "pages/Home.js", "utils/fmt.js"]);
        let app = "import Header from './components/Header';\nimport Home from './pages/Home';\n";
        let out = rewrite_relative(app, &normalize("App.js").unwrap(), "/src/App.js", &index);
        assert!(out.contains("from './Header'"));
        assert!(out.contains("from './pages/Home'"));

        let home = "import Header from '../components/Header';\nimport { f } from '../utils/fmt.js';\n";
        let out = rewrite_relative(
            home,
            &normalize("pages/Home.js").unwrap(),
            "/src/pages/Home.js",
            &index,
        );
        assert!(out.contains("from '../Header'"));
        assert!(out.contains("from '../utils/fmt.js'"));
    }

    #[test]
    fn test_unresolved_collapses_to_sibling() {
        let index = index_of(&["App.js"]);
        let out = rewrite_relative(
            "import Foo from \"./components/Foo\";",
            &normalize("App.js").unwrap(),
            "/src/App.js",
            &index,
        );
        assert_eq!(out, "import Foo from \"./Foo\";");
    }

    #[test]
    fn test_unresolved_found_by_file_name() {
        let index = index_of(&["pages/Home.js", "src/components/Card.js"]);
        let out = rewrite_relative(
            "import Card from '../components/Card';",
            &normalize("pages/Home.js").unwrap(),
            "/src/pages/Home.js",
            &index,
        );
        assert_eq!(out, "import Card from '../Card';");
    }

    #[test]
    fn test_extension_mismatch_resolves_to_existing_file() {
        let index = index_of(&["App.js", "components/Header.jsx", "pages/Home.js", "src/components/Nav.tsx"]);
        let out = rewrite_relative(
            "import Header from './components/Header.js';",
            &normalize("App.js").unwrap(),
            "/src/App.js",
            &index,
        );
        assert_eq!(out, "import Header from './Header';");

        let out = rewrite_relative(
            "import Nav from '../widgets/Nav.js';",
            &normalize("pages/Home.js").unwrap(),
            "/src/pages/Home.js",
            &index,
        );
        assert_eq!(out, "import Nav from '../Nav';");
    }

    #[test]
    fn test_directory_import_past_root_collapses() {
        let index = index_of(&["pages/Home.js"]);
        let home = normalize("pages/Home.js").unwrap();
        for spec in ["../..", ".."] {
            let out = rewrite_relative(
                &format!("import x from '{spec}';"),
                &home,
                "/src/pages/Home.js",
                &index,
            );
            assert_eq!(out, "import x from './Root';", "{spec}");
        }
    }

    #[test]
    fn test_normalize_header_adds_once() {
        let code = "function Card() {\n  return <div>hi</div>;\n}\n";
        let once = normalize_header(code, "/src/Card.js");
        assert!(once.starts_with("import React from 'react';\n"));
        assert!(once.trim_end().ends_with("export default Card;"));
        assert_eq!(normalize_header(&once, "/src/Card.js"), once);
    }

    #[test]
    fn test_normalize_header_respects_existing() {
        let code = "import React, { useState } from 'react';\nconst helper = 1;\nexport default function App() {\n  return (<main />);\n}\n";
        assert_eq!(normalize_header(code, "/src/App.js"), code);

        let not_ui = "export const add = (a, b) => a + b;\n";
        assert_eq!(normalize_header(not_ui, "/src/math.js"), not_ui);
    }

    #[test]
    fn test_missing_targets() {
        let mut files = BTreeMap::new();
        files.insert(
            "/src/App.js".to_string(),
            "import Foo from './Foo';\nimport './App.css';\nimport data from './data.json';\n".to_string(),
        );
        let missing = missing_targets(&files);
        assert_eq!(missing.get("/src/Foo.js"), Some(&MissingKind::Component));
        assert_eq!(
            missing.get("/src/App.css"),
            Some(&MissingKind::Stylesheet("css".to_string()))
        );
        assert_eq!(missing.get("/src/data.json"), Some(&MissingKind::Json));
    }
}
