//! 打开 / 保存时使用的运行参数。
//!
//! 库本身不读取环境变量或命令行参数，
//! 所有可调项都通过 `KdbxConfig` 显式传入。

/// 块哈希层默认的分块大小：1 MiB
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// 新建文件时默认的密钥变换轮数
pub const DEFAULT_TRANSFORM_ROUNDS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdbxConfig {
    /// 保存时块哈希的分块大小（字节）
    pub block_size: usize,

    /// 解密时是否严格校验 PKCS#7 填充。
    ///
    /// 关闭后只按最后一个字节的值截断，与旧实现逐字节兼容。
    pub strict_padding: bool,

    /// `KdbxFile::create` 写入 Header 的变换轮数
    pub default_transform_rounds: u64,
}

impl Default for KdbxConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            strict_padding: true,
            default_transform_rounds: DEFAULT_TRANSFORM_ROUNDS,
        }
    }
}
