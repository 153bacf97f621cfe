//! KDBX 3.x 文件头实现
//!
//! 文件布局：
//!
//! 8  字节 签名（两个小端 u32）
//! 4  字节 版本（两个小端 i16：minor, major）
//! N  条   Header 记录：(1 字节有符号 id, 2 字节小端长度, value)
//!
//! 记录流以 id 0（end of header）结束。Header 在打开时解析一次，
//! 保存时原样重新序列化，外部再对序列化结果计算 header hash。

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use rand::{RngCore, rngs::OsRng};
use tracing::warn;

use crate::algorithm::{Compression, InnerStream, OuterCipher};
use crate::error::{KdbxError, Result};

/// KDBX 签名（小端）
pub const SIGNATURE: (u32, u32) = (0x9AA2_D903, 0xB54B_FB67);

/// 唯一支持的主版本号
pub const SUPPORTED_MAJOR_VERSION: i16 = 3;

/// 新建文件写入的版本号：3.1
pub const DEFAULT_VERSION: Version = Version { minor: 1, major: 3 };

/// 签名 + 版本共 12 字节
pub const PREAMBLE_SIZE: usize = 12;

/// 种子与密钥类字段的长度
pub const SEED_SIZE: usize = 32;

/// AES-CBC IV 长度
pub const IV_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub minor: i16,
    pub major: i16,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 文件最前面的签名与版本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub version: Version,
}

impl Preamble {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    /// 读取并校验签名与版本
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; PREAMBLE_SIZE];
        read_exact_or_format(&mut reader, &mut buf, "file too short for signature")?;

        let sig1 = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let sig2 = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if (sig1, sig2) != SIGNATURE {
            return Err(KdbxError::format(format!(
                "signature mismatch: {sig1:#010x} {sig2:#010x}"
            )));
        }

        let version = Version {
            minor: i16::from_le_bytes([buf[8], buf[9]]),
            major: i16::from_le_bytes([buf[10], buf[11]]),
        };

        if version.major != SUPPORTED_MAJOR_VERSION {
            return Err(KdbxError::format(format!(
                "unsupported KDBX version {version}"
            )));
        }

        Ok(Self { version })
    }

    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let mut out = [0u8; PREAMBLE_SIZE];
        out[0..4].copy_from_slice(&SIGNATURE.0.to_le_bytes());
        out[4..8].copy_from_slice(&SIGNATURE.1.to_le_bytes());
        out[8..10].copy_from_slice(&self.version.minor.to_le_bytes());
        out[10..12].copy_from_slice(&self.version.major.to_le_bytes());
        out
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION)
    }
}

/// Header 字段 id。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderField {
    EndOfHeader,
    Comment,
    CipherId,
    CompressionFlags,
    MasterSeed,
    TransformSeed,
    TransformRounds,
    EncryptionIv,
    ProtectedStreamKey,
    StreamStartBytes,
    InnerRandomStreamId,
}

impl HeaderField {
    pub const ALL: [HeaderField; 11] = [
        Self::EndOfHeader,
        Self::Comment,
        Self::CipherId,
        Self::CompressionFlags,
        Self::MasterSeed,
        Self::TransformSeed,
        Self::TransformRounds,
        Self::EncryptionIv,
        Self::ProtectedStreamKey,
        Self::StreamStartBytes,
        Self::InnerRandomStreamId,
    ];

    pub fn id(self) -> i8 {
        match self {
            Self::EndOfHeader => 0,
            Self::Comment => 1,
            Self::CipherId => 2,
            Self::CompressionFlags => 3,
            Self::MasterSeed => 4,
            Self::TransformSeed => 5,
            Self::TransformRounds => 6,
            Self::EncryptionIv => 7,
            Self::ProtectedStreamKey => 8,
            Self::StreamStartBytes => 9,
            Self::InnerRandomStreamId => 10,
        }
    }

    pub fn from_id(id: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.id() == id)
    }

    /// 字段的符号名
    pub fn name(self) -> &'static str {
        match self {
            Self::EndOfHeader => "end_of_header",
            Self::Comment => "comment",
            Self::CipherId => "cipher_id",
            Self::CompressionFlags => "compression_flags",
            Self::MasterSeed => "master_seed",
            Self::TransformSeed => "transform_seed",
            Self::TransformRounds => "transform_rounds",
            Self::EncryptionIv => "encryption_iv",
            Self::ProtectedStreamKey => "protected_stream_key",
            Self::StreamStartBytes => "stream_start_bytes",
            Self::InnerRandomStreamId => "inner_random_stream_id",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::CompressionFlags | Self::InnerRandomStreamId => ValueKind::U32,
            Self::TransformRounds => ValueKind::I64,
            _ => ValueKind::Bytes,
        }
    }
}

impl FromStr for HeaderField {
    type Err = KdbxError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| KdbxError::not_found(format!("unknown header field '{name}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bytes,
    U32,
    I64,
}

/// `Header::get` 的返回值：解码后的类型化值或原始字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderValue<'a> {
    Bytes(&'a [u8]),
    U32(u32),
    I64(i64),
}

/// 已解析的 Header 记录集合。
///
/// 以数字 id 为键保存原始字节，未知 id 同样保留，
/// 以保证重新序列化时字段集合不变。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: BTreeMap<i8, Vec<u8>>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成新文件使用的 Header：全部种子与 IV 随机产生
    pub fn generate(transform_rounds: u64, compression: Compression) -> Result<Self> {
        let rounds = i64::try_from(transform_rounds)
            .map_err(|_| KdbxError::format("transform rounds out of range"))?;

        let mut header = Self::new();
        header.set(HeaderField::CipherId, OuterCipher::Aes256.to_uuid().to_vec())?;
        header.set(
            HeaderField::CompressionFlags,
            compression.to_u32().to_le_bytes().to_vec(),
        )?;
        header.set(HeaderField::MasterSeed, random_bytes(SEED_SIZE))?;
        header.set(HeaderField::TransformSeed, random_bytes(SEED_SIZE))?;
        header.set(HeaderField::TransformRounds, rounds.to_le_bytes().to_vec())?;
        header.set(HeaderField::EncryptionIv, random_bytes(IV_SIZE))?;
        header.set(HeaderField::ProtectedStreamKey, random_bytes(SEED_SIZE))?;
        header.set(HeaderField::StreamStartBytes, random_bytes(SEED_SIZE))?;
        header.set(
            HeaderField::InnerRandomStreamId,
            InnerStream::Salsa20.to_u32().to_le_bytes().to_vec(),
        )?;
        header.set(HeaderField::EndOfHeader, Vec::new())?;
        Ok(header)
    }

    /// 读取记录直到 id 0
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = Self::new();

        loop {
            let mut record = [0u8; 3];
            read_exact_or_format(&mut reader, &mut record, "truncated header record")?;

            let id = i8::from_le_bytes([record[0]]);
            let length = i16::from_le_bytes([record[1], record[2]]);
            let length = usize::try_from(length).map_err(|_| {
                KdbxError::format(format!("invalid length {length} for header field {id}"))
            })?;

            let mut value = vec![0u8; length];
            read_exact_or_format(&mut reader, &mut value, "truncated header value")?;

            if HeaderField::from_id(id).is_none() {
                warn!(id, length, "keeping unknown header field");
            }

            header.set_raw(id, value)?;

            if id == HeaderField::EndOfHeader.id() {
                break;
            }
        }

        Ok(header)
    }

    /// 按 id 升序写出，id 0 固定最后写出且长度为 0
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        for (&id, value) in self.fields.iter().filter(|(id, _)| **id != 0) {
            write_record(&mut out, id, value)?;
        }
        write_record(&mut out, HeaderField::EndOfHeader.id(), &[])?;

        Ok(out)
    }

    /// 解码后的字段值；字段不存在时返回 NotFound
    pub fn get(&self, field: HeaderField) -> Result<HeaderValue<'_>> {
        let raw = self.get_raw(field)?;
        decode_value(field, raw)
    }

    pub fn get_raw(&self, field: HeaderField) -> Result<&[u8]> {
        self.fields
            .get(&field.id())
            .map(Vec::as_slice)
            .ok_or_else(|| KdbxError::not_found(format!("header field '{}'", field.name())))
    }

    /// 按符号名查询，`raw` 为真时返回原始字节
    pub fn lookup(&self, name: &str, raw: bool) -> Result<HeaderValue<'_>> {
        let field = name.parse::<HeaderField>()?;
        if raw {
            self.get_raw(field).map(HeaderValue::Bytes)
        } else {
            self.get(field)
        }
    }

    pub fn set(&mut self, field: HeaderField, value: Vec<u8>) -> Result<()> {
        self.set_raw(field.id(), value)
    }

    fn set_raw(&mut self, id: i8, value: Vec<u8>) -> Result<()> {
        if let Some(field) = HeaderField::from_id(id) {
            decode_value(field, &value)?;
        }
        self.fields.insert(id, value);
        Ok(())
    }

    /// 当前保存的字段 id（升序）
    pub fn field_ids(&self) -> Vec<i8> {
        self.fields.keys().copied().collect()
    }

    // ---------- 类型化访问 ----------

    pub fn cipher(&self) -> Result<OuterCipher> {
        let raw = self.get_raw(HeaderField::CipherId)?;
        OuterCipher::from_uuid(raw)
            .ok_or_else(|| KdbxError::format("unsupported outer cipher"))
    }

    pub fn compression(&self) -> Result<Compression> {
        match self.fields.get(&HeaderField::CompressionFlags.id()) {
            None => Ok(Compression::None),
            Some(raw) => {
                let flags = decode_u32(HeaderField::CompressionFlags, raw)?;
                Compression::from_u32(flags).ok_or_else(|| {
                    KdbxError::format(format!("unsupported compression flags {flags}"))
                })
            }
        }
    }

    pub fn inner_stream(&self) -> Result<InnerStream> {
        let raw = self.get_raw(HeaderField::InnerRandomStreamId)?;
        let id = decode_u32(HeaderField::InnerRandomStreamId, raw)?;
        InnerStream::from_u32(id)
            .ok_or_else(|| KdbxError::format(format!("unsupported inner random stream {id}")))
    }

    pub fn transform_rounds(&self) -> Result<u64> {
        match self.get(HeaderField::TransformRounds)? {
            HeaderValue::I64(rounds) => u64::try_from(rounds)
                .map_err(|_| KdbxError::format(format!("negative transform rounds {rounds}"))),
            _ => Err(KdbxError::format("transform rounds is not an integer")),
        }
    }

    pub fn master_seed(&self) -> Result<&[u8]> {
        self.get_raw(HeaderField::MasterSeed)
    }

    pub fn transform_seed(&self) -> Result<&[u8]> {
        self.get_raw(HeaderField::TransformSeed)
    }

    pub fn encryption_iv(&self) -> Result<&[u8]> {
        self.get_raw(HeaderField::EncryptionIv)
    }

    pub fn protected_stream_key(&self) -> Result<&[u8]> {
        self.get_raw(HeaderField::ProtectedStreamKey)
    }

    pub fn stream_start_bytes(&self) -> Result<&[u8]> {
        self.get_raw(HeaderField::StreamStartBytes)
    }
}

fn decode_value(field: HeaderField, raw: &[u8]) -> Result<HeaderValue<'_>> {
    match field.kind() {
        ValueKind::Bytes => Ok(HeaderValue::Bytes(raw)),
        ValueKind::U32 => decode_u32(field, raw).map(HeaderValue::U32),
        ValueKind::I64 => {
            let bytes: [u8; 8] = raw.try_into().map_err(|_| wrong_width(field, raw.len()))?;
            Ok(HeaderValue::I64(i64::from_le_bytes(bytes)))
        }
    }
}

fn decode_u32(field: HeaderField, raw: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = raw.try_into().map_err(|_| wrong_width(field, raw.len()))?;
    Ok(u32::from_le_bytes(bytes))
}

fn wrong_width(field: HeaderField, len: usize) -> KdbxError {
    KdbxError::format(format!(
        "header field '{}' has unexpected length {len}",
        field.name()
    ))
}

fn write_record(out: &mut Vec<u8>, id: i8, value: &[u8]) -> Result<()> {
    let length = i16::try_from(value.len())
        .map_err(|_| KdbxError::format(format!("header field {id} is too long")))?;

    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(value);
    Ok(())
}

/// 将 EOF 转为格式错误，其余 I/O 错误原样返回
fn read_exact_or_format<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            KdbxError::format(what)
        } else {
            KdbxError::Io(e)
        }
    })
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}
