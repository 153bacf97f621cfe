//! KDBX 3.x 打开流程
//!
//! 读取流程（严格顺序）：
//! 1. 读取并校验签名与版本
//! 2. 读取 Header，确认外层密码与内层流受支持
//! 3. 使用口令 + Header 中的种子派生主密钥
//! 4. AES-256-CBC 解密剩余数据，校验 stream_start_bytes
//! 5. 块哈希层逐块校验，按需 gzip 解压
//! 6. 解析 XML 并解除字段保护
//!
//! 任一步失败立即返回错误，不产生部分结果。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::algorithm::Compression;
use crate::config::KdbxConfig;
use crate::crypto::cipher;
use crate::crypto::kdf::{self, MasterKey};
use crate::document::Database;
use crate::error::Result;
use crate::format::block::BlockHasher;
use crate::format::gzip;
use crate::format::header::{Header, Preamble};

/// 一次成功打开的全部产物
pub struct Opened {
    pub preamble: Preamble,
    pub header: Header,
    pub master_key: MasterKey,
    pub database: Database,
}

/// 从路径打开
pub fn open_kdbx(path: &Path, passphrase: &str, config: &KdbxConfig) -> Result<Opened> {
    let file = File::open(path)?;
    info!(path = %path.display(), "opening database");
    read_kdbx(BufReader::new(file), passphrase, config)
}

/// 从任意字节流读取完整容器
pub fn read_kdbx<R: Read>(mut reader: R, passphrase: &str, config: &KdbxConfig) -> Result<Opened> {
    // ---------- 签名 / 版本 / Header ----------
    let preamble = Preamble::read(&mut reader)?;
    let header = Header::read(&mut reader)?;
    let cipher = header.cipher()?;
    let inner = header.inner_stream()?;
    let compression = header.compression()?;
    debug!(version = %preamble.version, ?cipher, ?inner, ?compression, "parsed header");

    // ---------- 派生主密钥 ----------
    let master_key = kdf::derive_master_key(
        passphrase,
        header.transform_seed()?,
        header.transform_rounds()?,
        header.master_seed()?,
    )?;

    let database = read_payload(reader, &header, &master_key, config)?;

    Ok(Opened {
        preamble,
        header,
        master_key,
        database,
    })
}

/// 解密 Header 之后的全部字节并构建文档
pub(crate) fn read_payload<R: Read>(
    mut reader: R,
    header: &Header,
    master_key: &MasterKey,
    config: &KdbxConfig,
) -> Result<Database> {
    let mut ciphertext = Vec::new();
    reader.read_to_end(&mut ciphertext)?;

    // ---------- 外层解密 ----------
    let plaintext = cipher::decrypt_with(
        &ciphertext,
        master_key,
        header.encryption_iv()?,
        config.strict_padding,
    )?;
    let hashed = cipher::strip_stream_start(&plaintext, header.stream_start_bytes()?)?;

    // ---------- 块哈希 / 解压 ----------
    let payload = BlockHasher::default().unhash(hashed)?;
    let xml = match header.compression()? {
        Compression::None => payload,
        Compression::Gzip => gzip::decompress(&payload)?,
    };
    debug!(bytes = xml.len(), "decrypted document");

    Database::from_xml(&xml, header.protected_stream_key()?)
}
