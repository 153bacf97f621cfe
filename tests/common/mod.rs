#![allow(dead_code)]

use std::path::{Path, PathBuf};

use kdbx_engine::algorithm::Compression;
use kdbx_engine::crypto::{cipher, kdf, protected::ProtectedStream};
use kdbx_engine::format::block::BlockHasher;
use kdbx_engine::format::gzip;
use kdbx_engine::format::header::{Header, Preamble};
use kdbx_engine::{KdbxConfig, KdbxFile};

pub const PASSPHRASE: &str = "test";
pub const FIXTURE_GROUP: &str = "Fixture Root";
pub const FIXTURE_SUBGROUP: &str = "Email";
pub const FIXTURE_ENTRY_UUID: &str = "ZmFrZS1lbnRyeS11dWlkMQ==";
pub const FIXTURE_TITLE: &str = "Mailbox";
pub const FIXTURE_USERNAME: &str = "alice@example.org";
pub const FIXTURE_PASSWORD: &str = "correct horse battery staple";
pub const FIXTURE_NOTES: &str = "recovery codes in the safe";

/// 测试使用较少的变换轮数
pub fn fast_config() -> KdbxConfig {
    KdbxConfig {
        default_transform_rounds: 100,
        ..KdbxConfig::default()
    }
}

pub fn create(path: &Path) -> KdbxFile {
    KdbxFile::create_with_config(path, PASSPHRASE, fast_config()).expect("create database")
}

fn fixture_xml(stream: &mut ProtectedStream) -> String {
    // 文档顺序：先 Notes（受保护）再 Password
    let notes = stream.encode(FIXTURE_NOTES);
    let password = stream.encode(FIXTURE_PASSWORD);
    format!(
        r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<KeePassFile>
	<Meta>
		<Generator>Fixture</Generator>
		<HeaderHash></HeaderHash>
		<DatabaseName>Fixture</DatabaseName>
		<MemoryProtection>
			<ProtectTitle>False</ProtectTitle>
			<ProtectPassword>True</ProtectPassword>
		</MemoryProtection>
		<Binaries />
	</Meta>
	<Root>
		<Group>
			<UUID>cm9vdC1ncm91cC11dWlkMDA=</UUID>
			<Name>{FIXTURE_GROUP}</Name>
			<Group>
				<UUID>c3ViLWdyb3VwLXV1aWQwMDA=</UUID>
				<Name>{FIXTURE_SUBGROUP}</Name>
				<Entry>
					<UUID>{FIXTURE_ENTRY_UUID}</UUID>
					<String><Key>Notes</Key><Value Protected="True">{notes}</Value></String>
					<String><Key>Password</Key><Value Protected="True">{password}</Value></String>
					<String><Key>Title</Key><Value>{FIXTURE_TITLE}</Value></String>
					<String><Key>UserName</Key><Value>{FIXTURE_USERNAME}</Value></String>
				</Entry>
			</Group>
		</Group>
		<DeletedObjects />
	</Root>
</KeePassFile>
"#
    )
}

/// 直接用底层组件拼出一个容器文件，不经过保存流程
pub fn write_fixture(dir: &Path, compression: Compression, block_size: usize) -> PathBuf {
    let header = Header::generate(50, compression).expect("generate header");
    let mut stream = ProtectedStream::new(header.protected_stream_key().unwrap());
    let xml = fixture_xml(&mut stream);

    let payload = match compression {
        Compression::None => xml.into_bytes(),
        Compression::Gzip => gzip::compress(xml.as_bytes()).unwrap(),
    };
    let hashed = BlockHasher::new(block_size).hash(&payload);

    let mut plaintext = header.stream_start_bytes().unwrap().to_vec();
    plaintext.extend_from_slice(&hashed);

    let key = kdf::derive_master_key(
        PASSPHRASE,
        header.transform_seed().unwrap(),
        header.transform_rounds().unwrap(),
        header.master_seed().unwrap(),
    )
    .unwrap();
    let ciphertext = cipher::encrypt(&plaintext, &key, header.encryption_iv().unwrap()).unwrap();

    let mut bytes = Preamble::default().to_bytes().to_vec();
    bytes.extend_from_slice(&header.to_bytes().unwrap());
    bytes.extend_from_slice(&ciphertext);

    let path = dir.join("fixture.kdbx");
    std::fs::write(&path, bytes).expect("write fixture");
    path
}
