//! 外层载荷加解密：AES-256-CBC + PKCS#7 填充
//!
//! 解密结果的前缀必须等于 Header 中的 stream_start_bytes，
//! 不相等即表示口令错误或文件损坏。

use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};

use crate::error::{KdbxError, Result};

/// AES 分组长度
pub const BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 补齐到 16 字节边界后加密
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], iv: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| KdbxError::format("encryption IV must be 16 bytes"))?;

    let mut buffer = pad(plaintext);
    let len = buffer.len();
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| KdbxError::format("padded payload is not block aligned"))?;

    Ok(buffer)
}

/// 解密并严格校验填充
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], iv: &[u8]) -> Result<Vec<u8>> {
    decrypt_with(ciphertext, key, iv, true)
}

/// 解密；`strict_padding` 为假时只按最后一个字节截断，不校验其余填充字节
pub fn decrypt_with(
    ciphertext: &[u8],
    key: &[u8; 32],
    iv: &[u8],
    strict_padding: bool,
) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(KdbxError::decryption(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
            ciphertext.len()
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| KdbxError::format("encryption IV must be 16 bytes"))?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| KdbxError::decryption("AES-CBC decryption failed"))?;

    unpad(&mut buffer, strict_padding)?;
    Ok(buffer)
}

/// 校验并去掉 stream_start_bytes 前缀
pub fn strip_stream_start<'a>(plaintext: &'a [u8], expected: &[u8]) -> Result<&'a [u8]> {
    match plaintext.strip_prefix(expected) {
        Some(rest) => Ok(rest),
        None => Err(KdbxError::decryption(
            "stream start bytes mismatch (wrong passphrase or corrupted file)",
        )),
    }
}

fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_LEN - data.len() % BLOCK_LEN;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

fn unpad(buffer: &mut Vec<u8>, strict: bool) -> Result<()> {
    let Some(&last) = buffer.last() else {
        return Err(KdbxError::decryption("empty plaintext"));
    };
    let pad_len = last as usize;

    if strict {
        if pad_len == 0 || pad_len > BLOCK_LEN || pad_len > buffer.len() {
            return Err(KdbxError::decryption("invalid padding length"));
        }
        if buffer[buffer.len() - pad_len..].iter().any(|&b| b != last) {
            return Err(KdbxError::decryption("inconsistent padding bytes"));
        }
    }

    let keep = buffer.len().saturating_sub(pad_len);
    buffer.truncate(keep);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];
    const IV: [u8; 16] = [0x22; 16];

    #[test]
    fn roundtrip_various_lengths() {
        for len in [0usize, 1, 15, 16, 17, 100] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let ciphertext = encrypt(&plaintext, &KEY, &IV).unwrap();
            assert_eq!(ciphertext.len() % BLOCK_LEN, 0);
            assert!(ciphertext.len() > plaintext.len());
            assert_eq!(decrypt(&ciphertext, &KEY, &IV).unwrap(), plaintext);
        }
    }

    #[test]
    fn aligned_input_gets_full_padding_block() {
        let ciphertext = encrypt(&[0u8; 32], &KEY, &IV).unwrap();
        assert_eq!(ciphertext.len(), 48);
    }

    #[test]
    fn wrong_key_fails_strict_padding_or_prefix() {
        let plaintext = b"stream-start-bytes-and-then-the-payload";
        let ciphertext = encrypt(plaintext, &KEY, &IV).unwrap();

        let mut other = KEY;
        other[0] ^= 1;
        match decrypt(&ciphertext, &other, &IV) {
            Err(KdbxError::Decryption(_)) => {}
            Ok(garbage) => assert!(strip_stream_start(&garbage, b"stream-start").is_err()),
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn misaligned_ciphertext_is_decryption_error() {
        assert!(matches!(
            decrypt(&[0u8; 15], &KEY, &IV),
            Err(KdbxError::Decryption(_))
        ));
        assert!(matches!(decrypt(&[], &KEY, &IV), Err(KdbxError::Decryption(_))));
    }

    #[test]
    fn bad_iv_length_is_format_error() {
        assert!(matches!(
            encrypt(b"x", &KEY, &[0u8; 8]),
            Err(KdbxError::Format(_))
        ));
    }

    #[test]
    fn strict_unpad_rejects_inconsistent_bytes() {
        let mut buffer = vec![1, 2, 3, 9, 2, 3];
        assert!(unpad(&mut buffer, true).is_err());

        let mut buffer = vec![1, 2, 3, 9, 2, 3];
        unpad(&mut buffer, false).unwrap();
        assert_eq!(buffer, vec![1, 2, 3]);
    }

    #[test]
    fn strict_unpad_rejects_zero_and_oversized() {
        assert!(unpad(&mut vec![5, 0], true).is_err());
        assert!(unpad(&mut vec![5, 17], true).is_err());
    }

    #[test]
    fn stream_start_prefix_is_stripped() {
        assert_eq!(strip_stream_start(b"abcdef", b"abc").unwrap(), b"def");
        assert!(matches!(
            strip_stream_start(b"abcdef", b"xyz"),
            Err(KdbxError::Decryption(_))
        ));
    }
}
