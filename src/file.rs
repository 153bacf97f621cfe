//! 打开的数据库会话。
//!
//! `KdbxFile` 独占 Header、主密钥与文档，
//! 所有操作都通过显式传递的句柄完成，没有进程级的「当前数据库」。
//! 同一个句柄不能被多个调用方同时使用。

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::info;
use zeroize::Zeroizing;

use crate::algorithm::{Compression, DEFAULT_COMPRESSION};
use crate::config::KdbxConfig;
use crate::crypto::kdf::{self, DeriveHandle, MasterKey};
use crate::document::Database;
use crate::error::{KdbxError, Result};
use crate::format::header::{Header, HeaderField, Preamble, Version};
use crate::open::{self, Opened};
use crate::save;

pub struct KdbxFile {
    path: PathBuf,
    config: KdbxConfig,
    preamble: Preamble,
    header: Header,
    master_key: MasterKey,
    database: Database,
}

impl KdbxFile {
    pub fn open(path: impl AsRef<Path>, passphrase: &str) -> Result<Self> {
        Self::open_with_config(path, passphrase, KdbxConfig::default())
    }

    pub fn open_with_config(
        path: impl AsRef<Path>,
        passphrase: &str,
        config: KdbxConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let opened = open::open_kdbx(path, passphrase, &config)?;
        Ok(Self::from_opened(path.to_path_buf(), config, opened))
    }

    /// 读取 Header 后在后台线程派生密钥，调用 `PendingOpen::finish` 完成打开
    pub fn begin_open(
        path: impl AsRef<Path>,
        passphrase: Zeroizing<String>,
        config: KdbxConfig,
    ) -> Result<PendingOpen> {
        let path = path.as_ref().to_path_buf();
        let mut reader = File::open(&path)?;

        let preamble = Preamble::read(&mut reader)?;
        let header = Header::read(&mut reader)?;
        header.cipher()?;
        header.inner_stream()?;

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;

        let derive = kdf::spawn_derive(
            passphrase,
            header.transform_seed()?.to_vec(),
            header.transform_rounds()?,
            header.master_seed()?.to_vec(),
        );

        Ok(PendingOpen {
            path,
            config,
            preamble,
            header,
            rest,
            derive,
        })
    }

    /// 新建数据库文件；目标已存在时报错，不覆盖
    pub fn create(path: impl AsRef<Path>, passphrase: &str) -> Result<Self> {
        Self::create_with_config(path, passphrase, KdbxConfig::default())
    }

    pub fn create_with_config(
        path: impl AsRef<Path>,
        passphrase: &str,
        config: KdbxConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(KdbxError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }

        let header = Header::generate(config.default_transform_rounds, DEFAULT_COMPRESSION)?;
        let master_key = kdf::derive_master_key(
            passphrase,
            header.transform_seed()?,
            header.transform_rounds()?,
            header.master_seed()?,
        )?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Database");
        let database = Database::new(name, header.protected_stream_key()?)?;

        let mut file = Self {
            path: path.to_path_buf(),
            config,
            preamble: Preamble::default(),
            header,
            master_key,
            database,
        };
        file.save()?;
        info!(path = %path.display(), "created database");
        Ok(file)
    }

    fn from_opened(path: PathBuf, config: KdbxConfig, opened: Opened) -> Self {
        Self {
            path,
            config,
            preamble: opened.preamble,
            header: opened.header,
            master_key: opened.master_key,
            database: opened.database,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &KdbxConfig {
        &self.config
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> Version {
        self.preamble.version
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// 修改下一次保存使用的压缩方式
    pub fn set_compression(&mut self, compression: Compression) -> Result<()> {
        self.header.set(
            HeaderField::CompressionFlags,
            compression.to_u32().to_le_bytes().to_vec(),
        )
    }

    /// 原地保存
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.write_to(&path)
    }

    /// 另存到 `path`；句柄仍指向原文件
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(path.as_ref())
    }

    /// 编码为完整容器字节，不写盘
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        save::encode_kdbx(
            &self.preamble,
            &self.header,
            &self.master_key,
            &mut self.database,
            &self.config,
        )
    }

    fn write_to(&mut self, path: &Path) -> Result<()> {
        save::write_kdbx(
            path,
            &self.preamble,
            &self.header,
            &self.master_key,
            &mut self.database,
            &self.config,
        )
    }

    /// 关闭会话；主密钥随之清零
    pub fn close(self) {
        info!(path = %self.path.display(), "closed database");
    }
}

impl fmt::Debug for KdbxFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdbxFile")
            .field("path", &self.path)
            .field("version", &self.preamble.version)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 正在后台派生密钥的打开操作。
///
/// 丢弃即放弃本次打开。
pub struct PendingOpen {
    path: PathBuf,
    config: KdbxConfig,
    preamble: Preamble,
    header: Header,
    rest: Vec<u8>,
    derive: DeriveHandle,
}

impl PendingOpen {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 密钥是否已经派生完成
    pub fn is_ready(&self) -> bool {
        self.derive.is_finished()
    }

    /// 等待派生结束，解密并构建会话
    pub fn finish(self) -> Result<KdbxFile> {
        let master_key = self.derive.wait()?;
        let database = open::read_payload(
            Cursor::new(self.rest),
            &self.header,
            &master_key,
            &self.config,
        )?;

        Ok(KdbxFile::from_opened(
            self.path,
            self.config,
            Opened {
                preamble: self.preamble,
                header: self.header,
                master_key,
                database,
            },
        ))
    }
}
