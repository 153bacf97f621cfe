use kdbx_engine::crypto::{cipher, kdf};
use kdbx_engine::document::Database;
use kdbx_engine::format::block::BlockHasher;
use kdbx_engine::format::header::{Header, HeaderField};
use kdbx_engine::NewEntry;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cipher_roundtrip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..300),
        key in any::<[u8; 32]>(),
        iv in any::<[u8; 16]>(),
    ) {
        let ciphertext = cipher::encrypt(&plaintext, &key, &iv).unwrap();
        prop_assert_eq!(cipher::decrypt(&ciphertext, &key, &iv).unwrap(), plaintext.clone());
        prop_assert_eq!(cipher::decrypt_with(&ciphertext, &key, &iv, false).unwrap(), plaintext);
    }

    #[test]
    fn block_hash_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..2000),
        block_size in 1usize..600,
    ) {
        let hasher = BlockHasher::new(block_size);
        prop_assert_eq!(hasher.unhash(&hasher.hash(&data)).unwrap(), data);
    }

    #[test]
    fn header_roundtrip_keeps_fields(
        comment in proptest::collection::vec(any::<u8>(), 0..64),
        rounds in 1u64..1_000_000,
    ) {
        let mut header = Header::generate(rounds, kdbx_engine::Compression::Gzip).unwrap();
        header.set(HeaderField::Comment, comment).unwrap();

        let bytes = header.to_bytes().unwrap();
        let parsed = Header::read(&bytes[..]).unwrap();
        prop_assert_eq!(parsed.field_ids(), header.field_ids());
        prop_assert_eq!(&parsed, &header);
        prop_assert_eq!(&bytes[bytes.len() - 3..], &[0u8, 0, 0][..]);
    }

    #[test]
    fn protect_unprotect_keeps_values(
        passwords in proptest::collection::vec("[ -~]{0,40}", 1..6),
        stream_key in any::<[u8; 32]>(),
    ) {
        let mut db = Database::new("prop", &stream_key).unwrap();
        let uuids: Vec<String> = passwords
            .iter()
            .map(|pw| db.add_entry(&NewEntry::new("e").password(pw.clone())).unwrap())
            .collect();

        db.protect().unwrap();
        db.unprotect().unwrap();
        for (uuid, pw) in uuids.iter().zip(&passwords) {
            prop_assert_eq!(db.entry(uuid).unwrap().password(), pw.as_str());
        }
    }

    #[test]
    fn derive_changes_with_any_input_bit(bit in 0usize..256) {
        let seed = [3u8; 32];
        let master = [9u8; 32];
        let base = kdf::derive_master_key("pass", &seed, 10, &master).unwrap();

        let mut flipped = seed;
        flipped[bit / 8] ^= 1 << (bit % 8);
        let changed = kdf::derive_master_key("pass", &flipped, 10, &master).unwrap();
        prop_assert_ne!(&base[..], &changed[..]);

        let again = kdf::derive_master_key("pass", &seed, 10, &master).unwrap();
        prop_assert_eq!(&base[..], &again[..]);
    }
}
