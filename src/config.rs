//! 代理配置模块
//!
//! 配置按调用显式传入，不使用进程级可变全局状态，保证并发传输互不影响。

use crate::core::digest::DigestAlgorithm;
use serde::{Deserialize, Serialize};

/// 传输代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// 暂时性存储错误的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试基础延迟（毫秒），按 2^n 指数退避
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 内容摘要算法
    #[serde(default)]
    pub digest: DigestAlgorithm,
    /// 无通配符的字面路径匹配不到文件时，是否视为有效的空结果
    #[serde(default)]
    pub allow_missing_literal: bool,
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            digest: DigestAlgorithm::default(),
            allow_missing_literal: false,
        }
    }
}
