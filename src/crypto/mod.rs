//! 密码学原语：主密钥派生、外层载荷加密、受保护字段的内层流。

pub mod cipher;
pub mod kdf;
pub mod protected;
