//! 载荷的 gzip 压缩层（Header compression_flags = 1）

use std::io::{Read, Write};

use flate2::Compression as Level;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{KdbxError, Result};

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Level::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// 解压失败视为格式错误
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| KdbxError::format(format!("payload is not valid gzip: {e}")))?;
    Ok(out)
}
