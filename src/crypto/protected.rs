//! 受保护字段的内层流密码（Salsa20）
//!
//! 密钥 = SHA256(protected_stream_key)，IV 固定为 E8 30 09 4B 97 20 5D 2A。
//!
//! 每一轮 protect / unprotect 开始时重置一次，之后整轮共用同一条密钥流，
//! 按文档深度优先顺序依次消费。插入或删除任一受保护字段，
//! 都会改变该轮中其后所有字段的密文。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use salsa20::Salsa20;
use salsa20::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{KdbxError, Result};

/// 固定的 Salsa20 nonce
pub const SALSA20_IV: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

/// 每次从底层密码取出的密钥流长度
const KEYSTREAM_CHUNK: usize = 64;

/// 带缓冲的 Salsa20 密钥流
pub struct ProtectedStream {
    key: Zeroizing<[u8; 32]>,
    cipher: Salsa20,
    buffer: Zeroizing<Vec<u8>>,
}

impl ProtectedStream {
    pub fn new(protected_stream_key: &[u8]) -> Self {
        let key: [u8; 32] = Sha256::digest(protected_stream_key).into();
        let key = Zeroizing::new(key);
        let cipher = Salsa20::new(&(*key).into(), &SALSA20_IV.into());

        Self {
            key,
            cipher,
            buffer: Zeroizing::new(Vec::new()),
        }
    }

    /// 回到密钥流起点并清空缓冲
    pub fn reset(&mut self) {
        self.cipher = Salsa20::new(&(*self.key).into(), &SALSA20_IV.into());
        self.buffer.clear();
    }

    /// 取出接下来的 `n` 字节密钥流，未用完的部分留给下一次调用
    pub fn take(&mut self, n: usize) -> Zeroizing<Vec<u8>> {
        while self.buffer.len() < n {
            let mut chunk = [0u8; KEYSTREAM_CHUNK];
            self.cipher.apply_keystream(&mut chunk);
            self.buffer.extend_from_slice(&chunk);
        }

        Zeroizing::new(self.buffer.drain(..n).collect())
    }

    /// base64 解码 → 异或密钥流 → UTF-8 明文
    pub fn decode(&mut self, text: &str) -> Result<String> {
        let mut bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| KdbxError::format(format!("protected value is not base64: {e}")))?;

        let keystream = self.take(bytes.len());
        xor_in_place(&mut bytes, &keystream);

        String::from_utf8(bytes)
            .map_err(|_| KdbxError::decryption("protected value is not valid UTF-8"))
    }

    /// UTF-8 明文 → 异或密钥流 → base64
    pub fn encode(&mut self, text: &str) -> String {
        let mut bytes = Zeroizing::new(text.as_bytes().to_vec());
        let keystream = self.take(bytes.len());
        xor_in_place(&mut bytes, &keystream);
        STANDARD.encode(&bytes[..])
    }
}

impl std::fmt::Debug for ProtectedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedStream")
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

fn xor_in_place(data: &mut [u8], keystream: &[u8]) {
    for (byte, k) in data.iter_mut().zip(keystream) {
        *byte ^= k;
    }
}
