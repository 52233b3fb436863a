//! PUT/GET 传输命令解析
//!
//! 语法:
//!   PUT file://<本地路径,末段可含*> @<stage引用> [选项...]
//!   GET @<stage引用> file://<本地目录> [选项...]
//!
//! 选项为 KEY=VALUE 形式，未知选项一律拒绝。平台路径差异在
//! 解析阶段统一规范化，下游不再出现平台分支。

use crate::core::codec::{self, CodecDescriptor};
use crate::core::path;
use crate::error::TransferError;

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Put,
    Get,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Put => write!(f, "PUT"),
            TransferDirection::Get => write!(f, "GET"),
        }
    }
}

/// 命令选项集合
#[derive(Debug, Clone)]
pub struct OptionSet {
    pub auto_compress: bool,
    pub overwrite: bool,
    pub parallelism: usize,
    /// 显式声明的源压缩格式，覆盖自动检测
    pub source_compression: Option<&'static CodecDescriptor>,
}

impl Default for OptionSet {
    fn default() -> Self {
        Self {
            auto_compress: true,
            overwrite: false,
            parallelism: 4,
            source_compression: None,
        }
    }
}

/// 解析后的传输命令，解析完成后不可变
#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub direction: TransferDirection,
    /// 规范化后的本地路径（PUT 为文件模式，GET 为目标目录）
    pub local_path: String,
    /// stage 引用（`@db.schema.stage` 或 `@db.schema.%table`），对本层不透明
    pub stage_path: String,
    pub options: OptionSet,
}

/// 按空白切分，支持引号包裹含空格的路径
fn tokenize(text: &str) -> Result<Vec<String>, TransferError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }

    if quote.is_some() {
        return Err(TransferError::MalformedCommand("引号未闭合".to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, TransferError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(TransferError::MalformedCommand(format!(
            "选项 {} 的值必须是 TRUE 或 FALSE: {}",
            key, value
        )))
    }
}

/// 解析选项 token，未知键拒绝
fn parse_options(tokens: &[String]) -> Result<OptionSet, TransferError> {
    let mut options = OptionSet::default();

    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            return Err(TransferError::MalformedCommand(format!(
                "非法的选项: {}",
                token
            )));
        };

        match key.to_ascii_uppercase().as_str() {
            "AUTO_COMPRESS" => options.auto_compress = parse_bool(key, value)?,
            "OVERWRITE" => options.overwrite = parse_bool(key, value)?,
            "PARALLEL" => {
                options.parallelism = value.parse::<usize>().ok().filter(|p| *p >= 1).ok_or_else(
                    || {
                        TransferError::MalformedCommand(format!(
                            "PARALLEL 必须是不小于 1 的整数: {}",
                            value
                        ))
                    },
                )?;
            }
            "SOURCE_COMPRESSION" => {
                options.source_compression = Some(codec::lookup_by_mime_sub_type(value)?);
            }
            other => {
                return Err(TransferError::MalformedCommand(format!(
                    "未知选项: {}",
                    other
                )));
            }
        }
    }

    Ok(options)
}

fn expect_local_uri(token: &str) -> Result<String, TransferError> {
    if !token.to_ascii_lowercase().starts_with("file://") {
        return Err(TransferError::MalformedCommand(format!(
            "本地路径必须以 file:// 开头: {}",
            token
        )));
    }
    Ok(path::normalize_local_path(token))
}

fn expect_stage_ref(token: &str) -> Result<String, TransferError> {
    if !token.starts_with('@') {
        return Err(TransferError::MalformedCommand(format!(
            "stage 引用必须以 @ 开头: {}",
            token
        )));
    }
    Ok(token.to_string())
}

/// 解析一条 PUT/GET 命令
pub fn parse(text: &str) -> Result<TransferCommand, TransferError> {
    let tokens = tokenize(text)?;

    let Some(keyword) = tokens.first() else {
        return Err(TransferError::MalformedCommand("空命令".to_string()));
    };

    let direction = if keyword.eq_ignore_ascii_case("put") {
        TransferDirection::Put
    } else if keyword.eq_ignore_ascii_case("get") {
        TransferDirection::Get
    } else {
        return Err(TransferError::MalformedCommand(format!(
            "无法识别的命令: {}",
            keyword
        )));
    };

    if tokens.len() < 3 {
        return Err(TransferError::MalformedCommand(format!(
            "{} 命令缺少参数",
            direction
        )));
    }

    let (local_path, stage_path) = match direction {
        TransferDirection::Put => (expect_local_uri(&tokens[1])?, expect_stage_ref(&tokens[2])?),
        TransferDirection::Get => (expect_local_uri(&tokens[2])?, expect_stage_ref(&tokens[1])?),
    };

    let options = parse_options(&tokens[3..])?;

    Ok(TransferCommand {
        direction,
        local_path,
        stage_path,
        options,
    })
}
