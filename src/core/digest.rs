//! 内容摘要 - 跳过重复上传的判定依据
//!
//! 摘要对压缩后的规范字节计算，与存储后端记录的对象摘要比对。

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// 摘要算法
///
/// 默认 MD5（128 位），与既有部署的对象存储记录的 Content-MD5 / ETag 互通；
/// BLAKE3 供后端回显任意摘要的场景使用，同样截取 128 位。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Blake3,
}

/// 计算内容摘要（128 位，小写十六进制）
pub fn content_digest(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Md5 => format!("{:x}", Md5::digest(data)),
        DigestAlgorithm::Blake3 => blake3::hash(data).to_hex()[..32].to_string(),
    }
}

/// 判断远端对象是否与本地内容一致
///
/// 后端无法提供摘要时视为不一致，退化为总是重新上传。
pub fn matches_remote(local_digest: &str, remote_digest: Option<&str>) -> bool {
    remote_digest.is_some_and(|remote| remote.eq_ignore_ascii_case(local_digest))
}
