//! 块哈希层（hashed block stream）
//!
//! 解密后的载荷按固定大小切块，每块记录为：
//!
//! 4  字节 块序号（小端 u32，从 0 开始严格递增）
//! 32 字节 块内容的 SHA-256
//! 4  字节 块长度（小端 u32）
//! N  字节 块内容
//!
//! 最后追加一条终止记录：下一个序号、32 字节全 0、长度 0。
//! 这一层独立于 AES-CBC，只负责发现篡改。

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::DEFAULT_BLOCK_SIZE;
use crate::error::{KdbxError, Result};

const INDEX_SIZE: usize = 4;
const HASH_SIZE: usize = 32;
const LEN_SIZE: usize = 4;

/// 块哈希编码 / 解码器
#[derive(Debug, Clone, Copy)]
pub struct BlockHasher {
    block_size: usize,
}

impl BlockHasher {
    /// 块大小被限制在 1..=u32::MAX 之间
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.clamp(1, u32::MAX as usize),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 将数据切块并生成完整的哈希块流
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        let records = data.len().div_ceil(self.block_size) + 1;
        let mut out = Vec::with_capacity(data.len() + records * (INDEX_SIZE + HASH_SIZE + LEN_SIZE));

        let mut index: u32 = 0;
        for chunk in data.chunks(self.block_size) {
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&Sha256::digest(chunk));
            out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            out.extend_from_slice(chunk);
            index += 1;
        }

        // 终止记录
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&[0u8; HASH_SIZE]);
        out.extend_from_slice(&0u32.to_le_bytes());

        debug!(blocks = index, bytes = data.len(), "hashed payload blocks");
        out
    }

    /// 逐块校验并拼接，直到遇到终止记录
    pub fn unhash(&self, stream: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(stream.len());
        let mut pos = 0usize;
        let mut expected: u32 = 0;

        loop {
            let index = u32::from_le_bytes(take_array(stream, &mut pos, "block index")?);
            let hash: [u8; HASH_SIZE] = take_array(stream, &mut pos, "block hash")?;
            let length = u32::from_le_bytes(take_array(stream, &mut pos, "block length")?) as usize;

            if index != expected {
                return Err(KdbxError::integrity(format!(
                    "block index {index} out of order, expected {expected}"
                )));
            }

            if length == 0 {
                if hash != [0u8; HASH_SIZE] {
                    return Err(KdbxError::integrity("terminal block carries a non-zero hash"));
                }
                break;
            }

            let chunk = stream
                .get(pos..pos + length)
                .ok_or_else(|| KdbxError::integrity(format!("block {index} is truncated")))?;
            pos += length;

            if Sha256::digest(chunk).as_slice() != hash.as_slice() {
                return Err(KdbxError::integrity(format!("block {index} hash mismatch")));
            }

            out.extend_from_slice(chunk);
            expected = expected
                .checked_add(1)
                .ok_or_else(|| KdbxError::integrity("too many blocks"))?;
        }

        if pos < stream.len() {
            warn!(trailing = stream.len() - pos, "ignoring bytes after terminal block");
        }

        debug!(blocks = expected, bytes = out.len(), "verified payload blocks");
        Ok(out)
    }
}

impl Default for BlockHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

/// 使用默认 1 MiB 块大小编码
pub fn hash(data: &[u8]) -> Vec<u8> {
    BlockHasher::default().hash(data)
}

pub fn unhash(stream: &[u8]) -> Result<Vec<u8>> {
    BlockHasher::default().unhash(stream)
}

fn take_array<const N: usize>(stream: &[u8], pos: &mut usize, what: &str) -> Result<[u8; N]> {
    let bytes = stream
        .get(*pos..*pos + N)
        .ok_or_else(|| KdbxError::integrity(format!("truncated {what}")))?;
    *pos += N;

    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}
