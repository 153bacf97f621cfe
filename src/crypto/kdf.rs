//! KDBX 3.x 主密钥派生
//!
//! 派生步骤（必须与任何兼容实现逐字节一致）：
//! 1. composite = SHA256(SHA256(UTF8(passphrase)))
//! 2. 以 transform_seed 为密钥，对 composite 做 transform_rounds 轮 AES-256-ECB
//!    （32 字节恰好是两个分组，不做填充）
//! 3. transformed = SHA256(结果)
//! 4. master_key = SHA256(master_seed || transformed)
//!
//! transform_rounds 来自 Header，可以很大。派生过程没有中途退出点，
//! 需要取消时只能整体放弃，由 `spawn_derive` 在后台线程执行。

use std::sync::mpsc;
use std::thread;

use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{KdbxError, Result};

/// 派生密钥长度（256-bit）
pub const KEY_LEN: usize = 32;

/// 32 字节主密钥，离开作用域后自动清零
pub type MasterKey = Zeroizing<[u8; KEY_LEN]>;

/// composite key：SHA256(SHA256(passphrase))
pub fn composite_key(passphrase: &str) -> Zeroizing<[u8; KEY_LEN]> {
    let once = Zeroizing::new(sha256(passphrase.as_bytes()));
    Zeroizing::new(sha256(&once[..]))
}

/// 对 composite key 做 AES-ECB 多轮变换并取 SHA-256
pub fn transform_key(
    composite: &[u8; KEY_LEN],
    transform_seed: &[u8],
    transform_rounds: u64,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let cipher = Aes256::new_from_slice(transform_seed).map_err(|_| {
        KdbxError::format(format!(
            "transform seed must be {KEY_LEN} bytes, got {}",
            transform_seed.len()
        ))
    })?;

    let mut block = Zeroizing::new(*composite);
    for _ in 0..transform_rounds {
        let (left, right) = block.split_at_mut(16);
        cipher.encrypt_block(GenericArray::from_mut_slice(left));
        cipher.encrypt_block(GenericArray::from_mut_slice(right));
    }

    Ok(Zeroizing::new(sha256(&block[..])))
}

/// 根据口令和 Header 中的种子派生主密钥
pub fn derive_master_key(
    passphrase: &str,
    transform_seed: &[u8],
    transform_rounds: u64,
    master_seed: &[u8],
) -> Result<MasterKey> {
    debug!(transform_rounds, "deriving master key");

    let composite = composite_key(passphrase);
    let transformed = transform_key(&composite, transform_seed, transform_rounds)?;

    let mut input = Zeroizing::new(Vec::with_capacity(master_seed.len() + KEY_LEN));
    input.extend_from_slice(master_seed);
    input.extend_from_slice(&transformed[..]);

    Ok(Zeroizing::new(sha256(&input)))
}

/// 后台派生任务的句柄。
///
/// 调用 `wait` 取得结果；直接丢弃句柄即放弃整个计算，
/// 工作线程算完后结果随之丢弃，不会产生部分结果。
pub struct DeriveHandle {
    receiver: mpsc::Receiver<Result<MasterKey>>,
    worker: thread::JoinHandle<()>,
}

impl DeriveHandle {
    /// 阻塞直到派生完成
    pub fn wait(self) -> Result<MasterKey> {
        self.receiver.recv().map_err(|_| {
            KdbxError::Io(std::io::Error::other("key derivation worker exited"))
        })?
    }

    /// 工作线程是否已经结束
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

/// 在独立线程中派生主密钥
pub fn spawn_derive(
    passphrase: Zeroizing<String>,
    transform_seed: Vec<u8>,
    transform_rounds: u64,
    master_seed: Vec<u8>,
) -> DeriveHandle {
    let (sender, receiver) = mpsc::channel();

    let worker = thread::spawn(move || {
        let result = derive_master_key(&passphrase, &transform_seed, transform_rounds, &master_seed);
        // 接收端已被丢弃说明调用方放弃了本次计算
        let _ = sender.send(result);
    });

    DeriveHandle { receiver, worker }
}

fn sha256(data: &[u8]) -> [u8; KEY_LEN] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_A: [u8; 32] = [7u8; 32];
    const SEED_B: [u8; 32] = [9u8; 32];

    #[test]
    fn zero_rounds_matches_hash_chain() {
        let composite = sha256(&sha256(b"test"));
        let transformed = sha256(&composite);
        let mut input = SEED_B.to_vec();
        input.extend_from_slice(&transformed);
        let expected = sha256(&input);

        let key = derive_master_key("test", &SEED_A, 0, &SEED_B).unwrap();
        assert_eq!(*key, expected);
    }

    #[test]
    fn one_round_is_two_ecb_blocks() {
        let composite = composite_key("test");
        let cipher = Aes256::new_from_slice(&SEED_A).unwrap();
        let mut manual = *composite;
        for half in manual.chunks_mut(16) {
            cipher.encrypt_block(GenericArray::from_mut_slice(half));
        }

        let transformed = transform_key(&composite, &SEED_A, 1).unwrap();
        assert_eq!(*transformed, sha256(&manual));
    }

    #[test]
    fn derive_matches_known_answer() {
        let key = derive_master_key("test", &SEED_A, 1000, &SEED_B).unwrap();
        assert_eq!(
            *key,
            [
                0x65, 0xe9, 0xfd, 0x5a, 0xa8, 0xa8, 0x53, 0x7b, 0x4d, 0xd4, 0xb3, 0xdf, 0x09, 0xb2,
                0x0f, 0x85, 0xea, 0xec, 0x0a, 0x4c, 0x6c, 0x58, 0x76, 0xeb, 0x9a, 0xa0, 0x56, 0xaa,
                0x46, 0xb1, 0x4d, 0x5d,
            ]
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_master_key("correct horse", &SEED_A, 100, &SEED_B).unwrap();
        let b = derive_master_key("correct horse", &SEED_A, 100, &SEED_B).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn any_input_change_changes_key() {
        let base = derive_master_key("pass", &SEED_A, 10, &SEED_B).unwrap();

        let mut seed = SEED_A;
        seed[31] ^= 1;
        let mut master = SEED_B;
        master[0] ^= 0x80;

        assert_ne!(*base, *derive_master_key("pasr", &SEED_A, 10, &SEED_B).unwrap());
        assert_ne!(*base, *derive_master_key("pass", &seed, 10, &SEED_B).unwrap());
        assert_ne!(*base, *derive_master_key("pass", &SEED_A, 11, &SEED_B).unwrap());
        assert_ne!(*base, *derive_master_key("pass", &SEED_A, 10, &master).unwrap());
    }

    #[test]
    fn short_transform_seed_is_rejected() {
        let result = derive_master_key("pass", &[1u8; 16], 1, &SEED_B);
        assert!(matches!(result, Err(KdbxError::Format(_))));
    }

    #[test]
    fn background_derive_matches_inline() {
        let inline = derive_master_key("pass", &SEED_A, 500, &SEED_B).unwrap();
        let handle = spawn_derive(
            Zeroizing::new("pass".to_string()),
            SEED_A.to_vec(),
            500,
            SEED_B.to_vec(),
        );
        assert_eq!(*handle.wait().unwrap(), *inline);
    }

    #[test]
    fn dropping_handle_abandons_work() {
        let handle = spawn_derive(
            Zeroizing::new("pass".to_string()),
            SEED_A.to_vec(),
            10_000,
            SEED_B.to_vec(),
        );
        drop(handle);
    }
}
