//! KDBX 3.x 中出现的算法标识。
//!
//! 统一管理外层密码、内层保护流与压缩方式的取值，
//! 解析 Header 时据此拒绝不支持的组合。

/// 外层载荷密码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterCipher {
    Aes256,
}

impl OuterCipher {
    /// AES-256 的 cipher UUID：31c1f2e6-bf71-4350-be58-05216afc5aff
    pub const AES_256_UUID: [u8; 16] = [
        0x31, 0xc1, 0xf2, 0xe6, 0xbf, 0x71, 0x43, 0x50,
        0xbe, 0x58, 0x05, 0x21, 0x6a, 0xfc, 0x5a, 0xff,
    ];

    pub fn to_uuid(self) -> [u8; 16] {
        match self {
            Self::Aes256 => Self::AES_256_UUID,
        }
    }

    pub fn from_uuid(value: &[u8]) -> Option<Self> {
        if value == Self::AES_256_UUID {
            Some(Self::Aes256)
        } else {
            None
        }
    }
}

/// 受保护字段使用的内层随机流。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerStream {
    Salsa20,
}

impl InnerStream {
    pub const ARC4_VARIANT_ID: u32 = 1;
    pub const SALSA20_ID: u32 = 2;

    pub fn to_u32(self) -> u32 {
        match self {
            Self::Salsa20 => Self::SALSA20_ID,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            Self::SALSA20_ID => Some(Self::Salsa20),
            _ => None,
        }
    }
}

/// 块哈希层内部的 XML 压缩方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub const NONE_ID: u32 = 0;
    pub const GZIP_ID: u32 = 1;

    pub fn to_u32(self) -> u32 {
        match self {
            Self::None => Self::NONE_ID,
            Self::Gzip => Self::GZIP_ID,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            Self::NONE_ID => Some(Self::None),
            Self::GZIP_ID => Some(Self::Gzip),
            _ => None,
        }
    }
}

/// 新建文件默认使用的压缩方式（与 KeePass 2.x 一致）
pub const DEFAULT_COMPRESSION: Compression = Compression::Gzip;
