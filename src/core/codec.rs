//! 压缩编码注册表
//!
//! 固定的编码目录（gzip / bzip2 / brotli / deflate / raw deflate / zstd），
//! 进程启动后只读，按 MIME 子类型和文件扩展名双向查找。

use crate::error::TransferError;
use std::io::{Read, Write};

/// 压缩编码描述符
#[derive(Debug, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// 结果行中展示的编码名
    pub name: &'static str,
    /// 规范文件扩展名（含点）
    pub file_extension: &'static str,
    /// MIME 子类型，用于 SOURCE_COMPRESSION 选项
    pub mime_sub_type: &'static str,
}

pub static GZIP: CodecDescriptor = CodecDescriptor {
    name: "GZIP",
    file_extension: ".gz",
    mime_sub_type: "gzip",
};

pub static BZIP2: CodecDescriptor = CodecDescriptor {
    name: "BZIP2",
    file_extension: ".bz2",
    mime_sub_type: "bz2",
};

pub static BROTLI: CodecDescriptor = CodecDescriptor {
    name: "BROTLI",
    file_extension: ".br",
    mime_sub_type: "br",
};

pub static DEFLATE: CodecDescriptor = CodecDescriptor {
    name: "DEFLATE",
    file_extension: ".deflate",
    mime_sub_type: "deflate",
};

pub static RAW_DEFLATE: CodecDescriptor = CodecDescriptor {
    name: "RAW_DEFLATE",
    file_extension: ".raw_deflate",
    mime_sub_type: "raw_deflate",
};

pub static ZSTD: CodecDescriptor = CodecDescriptor {
    name: "ZSTD",
    file_extension: ".zst",
    mime_sub_type: "zstd",
};

/// 未压缩
pub static NONE: CodecDescriptor = CodecDescriptor {
    name: "NONE",
    file_extension: "",
    mime_sub_type: "none",
};

static CATALOG: [&CodecDescriptor; 6] = [&GZIP, &BZIP2, &BROTLI, &DEFLATE, &RAW_DEFLATE, &ZSTD];

/// 按 MIME 子类型查找编码，不在目录中返回 UnknownCodec
pub fn lookup_by_mime_sub_type(sub_type: &str) -> Result<&'static CodecDescriptor, TransferError> {
    let sub_type = sub_type.to_ascii_lowercase();
    CATALOG
        .iter()
        .find(|c| c.mime_sub_type == sub_type)
        .copied()
        .ok_or(TransferError::UnknownCodec(sub_type))
}

/// 按文件名的扩展名查找编码
pub fn lookup_by_extension(file_name: &str) -> Option<&'static CodecDescriptor> {
    let lower = file_name.to_ascii_lowercase();
    CATALOG
        .iter()
        .find(|c| lower.ends_with(c.file_extension))
        .copied()
}

/// 按文件头魔数嗅探编码
///
/// brotli 和 raw deflate 没有可靠魔数，只能靠扩展名识别。
pub fn sniff(head: &[u8]) -> Option<&'static CodecDescriptor> {
    if head.starts_with(&[0x1f, 0x8b]) {
        return Some(&GZIP);
    }
    if head.starts_with(b"BZh") {
        return Some(&BZIP2);
    }
    if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        return Some(&ZSTD);
    }
    // zlib 头: 0x78 后跟合法的 FLG 校验字节
    if head.len() >= 2 && head[0] == 0x78 && matches!(head[1], 0x01 | 0x5e | 0x9c | 0xda) {
        return Some(&DEFLATE);
    }
    None
}

/// 检测源文件的压缩格式：扩展名优先，其次内容嗅探
pub fn detect(file_name: &str, head: &[u8]) -> Option<&'static CodecDescriptor> {
    lookup_by_extension(file_name).or_else(|| sniff(head))
}

/// PUT 编码协商，返回 (源编码, 目标编码)
///
/// 已压缩的文件按原编码原样上传；AUTO_COMPRESS 只对未压缩文件生效，
/// 统一规范化为 gzip。
pub fn negotiate_put(
    auto_compress: bool,
    explicit_source: Option<&'static CodecDescriptor>,
    detected: Option<&'static CodecDescriptor>,
) -> (&'static CodecDescriptor, &'static CodecDescriptor) {
    let source = explicit_source.or(detected).unwrap_or(&NONE);
    if auto_compress && source.name == NONE.name {
        (&NONE, &GZIP)
    } else {
        (source, source)
    }
}

/// 压缩整块数据
pub fn compress(codec: &CodecDescriptor, data: &[u8]) -> std::io::Result<Vec<u8>> {
    match codec.name {
        "GZIP" => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        "BZIP2" => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        "BROTLI" => {
            let mut out = Vec::new();
            {
                let mut encoder = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
                encoder.write_all(data)?;
                encoder.flush()?;
            }
            Ok(out)
        }
        "DEFLATE" => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        "RAW_DEFLATE" => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        "ZSTD" => zstd::encode_all(data, 0),
        _ => Ok(data.to_vec()),
    }
}

/// 解压整块数据
pub fn decompress(codec: &CodecDescriptor, data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match codec.name {
        "GZIP" => {
            flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        }
        "BZIP2" => {
            bzip2::read::BzDecoder::new(data).read_to_end(&mut out)?;
        }
        "BROTLI" => {
            brotli::Decompressor::new(data, 4096).read_to_end(&mut out)?;
        }
        "DEFLATE" => {
            flate2::read::ZlibDecoder::new(data).read_to_end(&mut out)?;
        }
        "RAW_DEFLATE" => {
            flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
        }
        "ZSTD" => {
            out = zstd::decode_all(data)?;
        }
        _ => out.extend_from_slice(data),
    }
    Ok(out)
}
