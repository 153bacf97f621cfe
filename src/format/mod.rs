//! KDBX 3.x 的磁盘布局：文件头、块哈希层与可选的 gzip 压缩。

pub mod block;
pub mod gzip;
pub mod header;
