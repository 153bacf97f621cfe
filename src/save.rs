//! KDBX 3.x 保存流程
//!
//! 写出流程（严格顺序）：
//! 1. 重新序列化 Header
//! 2. header_hash = SHA256(签名 || 版本 || Header 字节)
//! 3. 文档写入 HeaderHash、保护字段、输出 XML，按需压缩后做块哈希
//! 4. 前置 stream_start_bytes，AES-256-CBC 加密
//! 5. 签名 + 版本 + Header + 密文，原子写入目标路径
//!
//! 第 3 步之后文档回到未保护的工作状态，句柄可以继续使用。

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::KdbxConfig;
use crate::crypto::cipher;
use crate::crypto::kdf::MasterKey;
use crate::document::Database;
use crate::error::Result;
use crate::format::header::{Header, Preamble};
use crate::fs::atomic::write_bytes_atomic;

/// 生成完整的容器字节
pub fn encode_kdbx(
    preamble: &Preamble,
    header: &Header,
    master_key: &MasterKey,
    database: &mut Database,
    config: &KdbxConfig,
) -> Result<Vec<u8>> {
    // ---------- Header 与 header hash ----------
    let preamble_bytes = preamble.to_bytes();
    let header_bytes = header.to_bytes()?;

    let mut hasher = Sha256::new();
    hasher.update(preamble_bytes);
    hasher.update(&header_bytes);
    let header_hash: [u8; 32] = hasher.finalize().into();

    // ---------- 文档载荷 ----------
    let body = database.serialize(&header_hash, header.compression()?, config.block_size)?;

    let stream_start = header.stream_start_bytes()?;
    let mut plaintext = Vec::with_capacity(stream_start.len() + body.len());
    plaintext.extend_from_slice(stream_start);
    plaintext.extend_from_slice(&body);

    // ---------- 外层加密 ----------
    let ciphertext = cipher::encrypt(&plaintext, master_key, header.encryption_iv()?)?;
    debug!(
        payload = plaintext.len(),
        ciphertext = ciphertext.len(),
        "encrypted document"
    );

    let mut out = Vec::with_capacity(preamble_bytes.len() + header_bytes.len() + ciphertext.len());
    out.extend_from_slice(&preamble_bytes);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// 编码并原子写入 `path`
pub fn write_kdbx(
    path: &Path,
    preamble: &Preamble,
    header: &Header,
    master_key: &MasterKey,
    database: &mut Database,
    config: &KdbxConfig,
) -> Result<()> {
    let bytes = encode_kdbx(preamble, header, master_key, database, config)?;
    write_bytes_atomic(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "saved database");
    Ok(())
}
