//! 路径规范化与通配符展开
//!
//! 所有平台相关的路径差异集中在这里处理，解析命令时调用一次，
//! 下游只会看到以 `/` 分隔的规范路径。

use crate::error::TransferError;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 本地文件解析结果
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    /// stage 内的逻辑名（文件基名）
    pub logical_name: String,
    pub size_bytes: u64,
}

/// 用户主目录（Windows 为用户配置目录）
fn home_dir() -> Option<String> {
    if cfg!(target_os = "windows") {
        std::env::var("USERPROFILE").ok()
    } else {
        std::env::var("HOME").ok()
    }
}

/// 规范化本地路径
///
/// 去掉 `file://` 前缀，统一反斜杠为 `/`，展开开头的 `~`，
/// 折叠重复分隔符。盘符（`C:/...`）原样保留。
pub fn normalize_local_path(raw: &str) -> String {
    let mut path = raw.trim().to_string();

    if let Some(stripped) = path.strip_prefix("file://") {
        path = stripped.to_string();
    }

    path = path.replace('\\', "/");

    if path == "~" || path.starts_with("~/") {
        if let Some(home) = home_dir() {
            let home = home.replace('\\', "/");
            path = format!("{}{}", home, &path[1..]);
        }
    }

    // 折叠重复的分隔符
    while path.contains("//") {
        path = path.replace("//", "/");
    }

    if path.len() > 1 {
        path = path.trim_end_matches('/').to_string();
    }

    path
}

/// 把文件名通配符模式编译为锚定正则
fn pattern_to_regex(name_pattern: &str) -> Result<Regex, TransferError> {
    let escaped = regex::escape(name_pattern).replace("\\*", ".*");
    Regex::new(&format!("^{}$", escaped))
        .map_err(|e| TransferError::MalformedCommand(format!("非法的路径模式: {}", e)))
}

/// 拆分模式为 (目录, 文件名模式)
fn split_pattern(pattern: &str) -> (String, String) {
    match pattern.rfind('/') {
        Some(idx) => (pattern[..idx].to_string(), pattern[idx + 1..].to_string()),
        None => (".".to_string(), pattern.to_string()),
    }
}

/// 展开 PUT 的本地路径模式为具体文件列表（按文件名排序）
///
/// 通配符 `*` 只允许出现在最后一段；目录被跳过，符号链接按目标处理。
pub async fn resolve_put_pattern(
    pattern: &str,
    allow_missing_literal: bool,
) -> Result<Vec<LocalFile>, TransferError> {
    let (dir, name_pattern) = split_pattern(pattern);

    if dir.contains('*') {
        return Err(TransferError::MalformedCommand(format!(
            "通配符只允许出现在路径的最后一段: {}",
            pattern
        )));
    }

    if !name_pattern.contains('*') {
        return resolve_literal(pattern, allow_missing_literal).await;
    }

    let regex = pattern_to_regex(&name_pattern)?;
    let mut read_dir = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(_) => return Err(TransferError::NoMatchingFiles(pattern.to_string())),
    };

    let mut files = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| TransferError::local_io(dir.as_str(), e))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !regex.is_match(name) {
            continue;
        }
        // metadata 追随符号链接；目录不参与上传
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(LocalFile {
            absolute_path: entry.path(),
            logical_name: name.to_string(),
            size_bytes: metadata.len(),
        });
    }

    if files.is_empty() {
        return Err(TransferError::NoMatchingFiles(pattern.to_string()));
    }

    files.sort_by(|a, b| a.logical_name.cmp(&b.logical_name));
    Ok(files)
}

/// 解析无通配符的字面路径
async fn resolve_literal(
    path: &str,
    allow_missing: bool,
) -> Result<Vec<LocalFile>, TransferError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) if allow_missing => return Ok(Vec::new()),
        Err(_) => return Err(TransferError::NoMatchingFiles(path.to_string())),
    };

    if !metadata.is_file() {
        return Err(TransferError::NoMatchingFiles(path.to_string()));
    }

    let logical_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| TransferError::MalformedCommand(format!("非法的文件路径: {}", path)))?;

    Ok(vec![LocalFile {
        absolute_path: PathBuf::from(path),
        logical_name,
        size_bytes: metadata.len(),
    }])
}

/// 取对象路径的最后一段作为本地文件名
pub fn base_name(object_path: &str) -> &str {
    object_path.rsplit('/').next().unwrap_or(object_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_normalize_local_path() {
        assert_eq!(normalize_local_path("file:///tmp/data.csv"), "/tmp/data.csv");
        assert_eq!(
            normalize_local_path(r"file://C:\Users\u\AppData\Local\Temp\f.csv"),
            "C:/Users/u/AppData/Local/Temp/f.csv"
        );
        assert_eq!(normalize_local_path("/tmp//a///b/"), "/tmp/a/b");
        assert_eq!(normalize_local_path("  /tmp/x "), "/tmp/x");
    }

    #[test]
    fn test_normalize_expands_home() {
        let home = home_dir().unwrap().replace('\\', "/");
        assert_eq!(normalize_local_path("~/data.csv"), format!("{}/data.csv", home));
        // 中间的 ~ 不展开
        assert_eq!(normalize_local_path("/tmp/~/x"), "/tmp/~/x");
    }

    #[test]
    fn test_split_pattern() {
        assert_eq!(
            split_pattern("/tmp/data/part*"),
            ("/tmp/data".to_string(), "part*".to_string())
        );
        assert_eq!(split_pattern("part*"), (".".to_string(), "part*".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_wildcard_sorted_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part_2.csv"), b"2").unwrap();
        fs::write(dir.path().join("part_1.csv"), b"1").unwrap();
        fs::write(dir.path().join("other.csv"), b"x").unwrap();
        fs::create_dir(dir.path().join("part_dir")).unwrap();
        // 别的目录下的同前缀文件不应被匹配
        fs::write(other.path().join("part_9.csv"), b"9").unwrap();

        let pattern = format!("{}/part*", dir.path().display());
        let files = resolve_put_pattern(&pattern, false).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.logical_name.as_str()).collect();
        assert_eq!(names, vec!["part_1.csv", "part_2.csv"]);
    }

    #[tokio::test]
    async fn test_resolve_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/nope*", dir.path().display());
        assert!(matches!(
            resolve_put_pattern(&pattern, false).await,
            Err(TransferError::NoMatchingFiles(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_literal_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/absent.csv", dir.path().display());
        assert!(matches!(
            resolve_put_pattern(&path, false).await,
            Err(TransferError::NoMatchingFiles(_))
        ));
        // 配置允许字面路径零匹配
        assert!(resolve_put_pattern(&path, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_in_directory_rejected() {
        assert!(matches!(
            resolve_put_pattern("/tmp/*/data.csv", false).await,
            Err(TransferError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.gz"), "c.gz");
        assert_eq!(base_name("c.gz"), "c.gz");
    }
}
