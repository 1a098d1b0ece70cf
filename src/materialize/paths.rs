//! 路径规范化
//!
//! 规范路径一律以 `/` 开头。规则：
//! - 根目录配置 / 标记入口文件（package.json、tailwind.config.js、index.html 等）与 public/ 下文件保持原位；
//! - 任意层级 `components/` 目录下的文件展平到 `/src/<文件名>`（index.* 保留在 `/src/components/` 下，避免与入口冲突）；
//! - 已在 src/ 下的文件保持；其余源码文件移入 `/src/`。

/// 保持在项目根目录的配置 / 标记文件
const ROOT_FILES: &[&str] = &[
    "package.json",
    "tailwind.config.js",
    "tailwind.config.cjs",
    "postcss.config.js",
    "postcss.config.cjs",
    "vite.config.js",
    "tsconfig.json",
    "jsconfig.json",
    "README.md",
    "index.html",
    ".gitignore",
];

/// 可被导入改写 / 扫描的源码扩展名
const CODE_EXTS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// 词法规范化：去掉空段与 `.`，处理 `..`；逃出根目录或结果为空时返回 None
pub fn normalize(path: &str) -> Option<Vec<String>> {
    let mut segs: Vec<String> = Vec::new();
    for seg in path.trim().split(&['/', '\\'][..]) {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop()?;
            }
            s => segs.push(s.to_string()),
        }
    }
    if segs.is_empty() {
        None
    } else {
        Some(segs)
    }
}

/// 把 spec 按目录 dir 解析为规范化段；越过根目录的 `..` 被截断
pub fn join(dir: &[String], spec: &str) -> Vec<String> {
    let mut segs: Vec<String> = dir.to_vec();
    for seg in spec.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop();
            }
            s => segs.push(s.to_string()),
        }
    }
    segs
}

/// 原始路径（已规范化的段）-> 规范路径
pub fn canonicalize(segs: &[String]) -> Option<String> {
    let file = segs.last()?;
    let rel = segs.join("/");

    if ROOT_FILES.contains(&rel.as_str()) || segs[0] == "public" {
        return Some(format!("/{rel}"));
    }

    if let Some(i) = segs[..segs.len() - 1].iter().position(|s| s == "components") {
        if stem(file) == "index" {
            return Some(format!("/src/components/{}", segs[i + 1..].join("/")));
        }
        return Some(format!("/src/{file}"));
    }

    if segs[0] == "src" {
        Some(format!("/{rel}"))
    } else {
        Some(format!("/src/{rel}"))
    }
}

/// 原始路径 -> 规范路径（规范化 + 展平）；同一逻辑文件的不同写法得到同一结果
pub fn logical_path(path: &str) -> Option<String> {
    normalize(path).and_then(|segs| canonicalize(&segs))
}

/// 规范路径拆成段（去掉前导 `/`）
pub fn segments(canonical: &str) -> Vec<String> {
    canonical
        .split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// 所在目录的段
pub fn parent(segs: &[String]) -> &[String] {
    match segs.len() {
        0 => segs,
        n => &segs[..n - 1],
    }
}

/// 从目录 from 指向 to 的相对导入说明符（总以 `./` 或 `../` 开头）
pub fn relative_spec(from_dir: &[String], to: &[String]) -> String {
    let common = from_dir
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from_dir.len() - common;
    let rest = to[common..].join("/");
    if ups == 0 {
        format!("./{rest}")
    } else {
        format!("{}{rest}", "../".repeat(ups))
    }
}

pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    match name.rfind('.') {
        Some(0) | None => None,
        Some(i) => Some(&name[i + 1..]),
    }
}

pub fn stem(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

pub fn is_code(path: &str) -> bool {
    extension(path).is_some_and(|e| CODE_EXTS.contains(&e))
}

pub fn is_stylesheet(path: &str) -> bool {
    matches!(extension(path), Some("css" | "scss" | "sass" | "less"))
}
