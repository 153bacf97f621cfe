//! KDBX 3.x 密码库容器的读写引擎。
//!
//! 打开 / 保存流程见 `open` 与 `save` 模块；
//! 日常使用只需要 `KdbxFile` 会话句柄。

pub mod algorithm;
pub mod config;
pub mod crypto;
pub mod document;
pub mod error;
pub mod file;
pub mod format;
pub mod fs;
pub mod open;
pub mod save;

pub use algorithm::Compression;
pub use config::KdbxConfig;
pub use document::{Attachment, Database, Entry, EntryMut, Group, NewEntry};
pub use error::{KdbxError, Result};
pub use file::{KdbxFile, PendingOpen};

use std::path::Path;

/// 使用默认配置打开数据库
pub fn open(path: impl AsRef<Path>, passphrase: &str) -> Result<KdbxFile> {
    KdbxFile::open(path, passphrase)
}

/// 新建数据库并立即写盘
pub fn create(path: impl AsRef<Path>, passphrase: &str) -> Result<KdbxFile> {
    KdbxFile::create(path, passphrase)
}
