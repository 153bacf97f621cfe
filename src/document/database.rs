//! 解密后的文档：XML 树 + 受保护字段密钥流 + 二级索引。
//!
//! 索引在构建时一次生成，之后每个结构性修改都同步维护：
//!
//! - UUID → Group / Entry 节点（不含 History 中的旧版本）
//! - 附件 id → `Meta/Binaries/Binary` 节点
//! - 附件 id → 条目侧的 `Binary` 引用节点（包含 History）

use std::collections::{BTreeMap, HashMap};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{debug, warn};

use super::attachment::{build_reference, reference_id};
use super::entry::build_entry;
use super::group::build_group;
use super::xml::{NodeId, XmlTree};
use super::{
    ATTR_COMPRESSED, ATTR_ID, ATTR_PROTECTED, ATTR_PROTECTED_VALUE, ELEM_BINARIES, ELEM_BINARY,
    ELEM_DB_NAME, ELEM_DB_NAME_CHANGED, ELEM_DELETED_OBJECTS, ELEM_DOC_NODE, ELEM_ENTRY,
    ELEM_GENERATOR, ELEM_GROUP, ELEM_HEADER_HASH, ELEM_HISTORY, ELEM_MEMORY_PROT, ELEM_META,
    ELEM_PROT_PASSWORD, ELEM_ROOT, ELEM_UUID, Entry, EntryMut, GENERATOR, Group, NewEntry,
    VALUE_FALSE, VALUE_TRUE, timestamp_now, touch_modified,
};
use crate::algorithm::Compression;
use crate::crypto::protected::ProtectedStream;
use crate::error::{KdbxError, Result};
use crate::format::block::BlockHasher;
use crate::format::gzip;

/// 新建数据库时 MemoryProtection 下的开关，只有密码默认受保护
const MEMORY_PROTECTION: [(&str, &str); 5] = [
    ("ProtectTitle", VALUE_FALSE),
    ("ProtectUserName", VALUE_FALSE),
    (ELEM_PROT_PASSWORD, VALUE_TRUE),
    ("ProtectURL", VALUE_FALSE),
    ("ProtectNotes", VALUE_FALSE),
];

/// 一个已打开的数据库文档
#[derive(Debug)]
pub struct Database {
    tree: XmlTree,
    stream: ProtectedStream,
    uuid_index: HashMap<String, NodeId>,
    binary_index: BTreeMap<u64, NodeId>,
    binary_refs: BTreeMap<u64, Vec<NodeId>>,
}

impl Database {
    /// 从解密（且已解压）的 XML 构建文档，并解除字段保护
    pub fn from_xml(xml: &[u8], protected_stream_key: &[u8]) -> Result<Self> {
        let tree = XmlTree::parse(xml)?;
        if tree.name(tree.root()) != ELEM_DOC_NODE {
            return Err(KdbxError::format(format!(
                "document root is <{}>, expected <{ELEM_DOC_NODE}>",
                tree.name(tree.root())
            )));
        }

        let mut db = Self::with_tree(tree, protected_stream_key)?;
        let revealed = db.unprotect()?;
        debug!(
            entries = db.uuid_index.len(),
            binaries = db.binary_index.len(),
            revealed,
            "loaded document"
        );
        Ok(db)
    }

    /// 新建最小文档：Meta + Root/Group(name) + DeletedObjects
    pub fn new(name: &str, protected_stream_key: &[u8]) -> Result<Self> {
        let now = timestamp_now();
        let mut tree = XmlTree::new(ELEM_DOC_NODE);
        let doc = tree.root();

        let meta = tree.append_element(doc, ELEM_META);
        tree.append_text_element(meta, ELEM_GENERATOR, GENERATOR);
        tree.append_element(meta, ELEM_HEADER_HASH);
        tree.append_text_element(meta, ELEM_DB_NAME, name);
        tree.append_text_element(meta, ELEM_DB_NAME_CHANGED, now.as_str());
        tree.append_element(meta, "DatabaseDescription");
        tree.append_element(meta, "DefaultUserName");
        let protection = tree.append_element(meta, ELEM_MEMORY_PROT);
        for (flag, value) in MEMORY_PROTECTION {
            tree.append_text_element(protection, flag, value);
        }
        tree.append_text_element(meta, "RecycleBinEnabled", VALUE_FALSE);
        tree.append_element(meta, ELEM_BINARIES);
        tree.append_element(meta, "CustomData");

        let root = tree.append_element(doc, ELEM_ROOT);
        build_group(&mut tree, root, name);
        tree.append_element(root, ELEM_DELETED_OBJECTS);

        let mut db = Self::with_tree(tree, protected_stream_key)?;
        db.unprotect()?;
        Ok(db)
    }

    fn with_tree(tree: XmlTree, protected_stream_key: &[u8]) -> Result<Self> {
        let mut db = Self {
            tree,
            stream: ProtectedStream::new(protected_stream_key),
            uuid_index: HashMap::new(),
            binary_index: BTreeMap::new(),
            binary_refs: BTreeMap::new(),
        };
        db.rebuild_indexes()?;
        Ok(db)
    }

    fn rebuild_indexes(&mut self) -> Result<()> {
        self.uuid_index.clear();
        self.binary_index.clear();
        self.binary_refs.clear();

        if let Some(binaries) = self.tree.descend(self.tree.root(), &[ELEM_META, ELEM_BINARIES]) {
            for blob in self.tree.children_named(binaries, ELEM_BINARY).collect::<Vec<_>>() {
                let Some(raw) = self.tree.attribute(blob, ATTR_ID) else {
                    continue;
                };
                let id = raw.trim().parse().map_err(|_| {
                    KdbxError::format(format!("binary ID {raw:?} is not a number"))
                })?;
                self.binary_index.insert(id, blob);
            }
        }

        if let Some(root) = self.tree.child(self.tree.root(), ELEM_ROOT) {
            self.index_subtree(root, false)?;
        }
        Ok(())
    }

    fn index_subtree(&mut self, node: NodeId, in_history: bool) -> Result<()> {
        let name = self.tree.name(node);
        if (name == ELEM_GROUP || name == ELEM_ENTRY) && !in_history {
            if let Some(uuid) = self.tree.child_text(node, ELEM_UUID) {
                self.uuid_index.insert(uuid.to_string(), node);
            }
        }

        let in_history = in_history || name == ELEM_HISTORY;
        let is_entry = name == ELEM_ENTRY;
        for child in self.tree.children(node).to_vec() {
            if is_entry && self.tree.name(child) == ELEM_BINARY {
                let id = reference_id(&self.tree, child)?;
                self.binary_refs.entry(id).or_default().push(child);
            } else {
                self.index_subtree(child, in_history)?;
            }
        }
        Ok(())
    }

    // ---------- 受保护字段 ----------

    /// 解除保护：按文档顺序解密所有 `Protected="True"` 的元素。
    ///
    /// 原密文保存在 `ProtectedValue` 属性中。返回处理的元素数。
    pub fn unprotect(&mut self) -> Result<usize> {
        self.stream.reset();
        let mut count = 0;

        for node in self.tree.descendants(self.tree.root()) {
            if self.tree.attribute(node, ATTR_PROTECTED) != Some(VALUE_TRUE) {
                continue;
            }
            let ciphertext = self.tree.text(node).unwrap_or_default().to_string();
            let plaintext = self.stream.decode(&ciphertext)?;

            self.tree.set_attribute(node, ATTR_PROTECTED_VALUE, ciphertext);
            self.tree.set_attribute(node, ATTR_PROTECTED, VALUE_FALSE);
            self.tree.set_text(node, plaintext);
            count += 1;
        }

        self.set_protect_password(VALUE_FALSE);
        Ok(count)
    }

    /// 重新保护：按文档顺序加密所有 `Protected="False"` 元素的当前文本。
    pub fn protect(&mut self) -> Result<usize> {
        self.stream.reset();
        let mut count = 0;

        for node in self.tree.descendants(self.tree.root()) {
            if self.tree.attribute(node, ATTR_PROTECTED) != Some(VALUE_FALSE) {
                continue;
            }
            let ciphertext = self.stream.encode(self.tree.text(node).unwrap_or_default());

            self.tree.remove_attribute(node, ATTR_PROTECTED_VALUE);
            self.tree.set_attribute(node, ATTR_PROTECTED, VALUE_TRUE);
            self.tree.set_text(node, ciphertext);
            count += 1;
        }

        self.set_protect_password(VALUE_TRUE);
        Ok(count)
    }

    fn set_protect_password(&mut self, value: &str) {
        let path = [ELEM_META, ELEM_MEMORY_PROT, ELEM_PROT_PASSWORD];
        match self.tree.descend(self.tree.root(), &path) {
            Some(flag) => self.tree.set_text(flag, value),
            None => warn!("document has no Meta/MemoryProtection/ProtectPassword"),
        }
    }

    /// 生成待加密的载荷：写入 HeaderHash、保护字段、输出 XML、
    /// 按需压缩，再做块哈希。
    ///
    /// 结束后文档回到未保护的工作状态。
    pub fn serialize(
        &mut self,
        header_hash: &[u8; 32],
        compression: Compression,
        block_size: usize,
    ) -> Result<Vec<u8>> {
        let meta = self.meta()?;
        let hash_node = self.tree.ensure_child(meta, ELEM_HEADER_HASH);
        self.tree.set_text(hash_node, STANDARD.encode(header_hash));

        self.protect()?;
        let xml = self.tree.to_bytes();
        let restored = self.unprotect();
        let xml = xml?;
        restored?;

        let payload = match compression {
            Compression::None => xml,
            Compression::Gzip => gzip::compress(&xml)?,
        };
        Ok(BlockHasher::new(block_size).hash(&payload))
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    // ---------- 导航 ----------

    fn meta(&self) -> Result<NodeId> {
        self.tree
            .child(self.tree.root(), ELEM_META)
            .ok_or_else(|| KdbxError::not_found("document has no Meta element"))
    }

    /// `Meta/DatabaseName`
    pub fn name(&self) -> &str {
        self.tree
            .descend(self.tree.root(), &[ELEM_META, ELEM_DB_NAME])
            .and_then(|node| self.tree.text(node))
            .unwrap_or_default()
    }

    /// `Meta/HeaderHash`，上一次保存时写入
    pub fn header_hash(&self) -> Option<&str> {
        self.tree
            .descend(self.tree.root(), &[ELEM_META, ELEM_HEADER_HASH])
            .and_then(|node| self.tree.text(node))
    }

    fn root_group_id(&self) -> Result<NodeId> {
        self.tree
            .descend(self.tree.root(), &[ELEM_ROOT, ELEM_GROUP])
            .ok_or_else(|| KdbxError::not_found("document has no Root/Group element"))
    }

    pub fn root_group(&self) -> Result<Group<'_>> {
        Ok(Group::new(&self.tree, self.root_group_id()?))
    }

    /// 根分组下的一级分组
    pub fn groups(&self) -> Result<Vec<Group<'_>>> {
        Ok(self.root_group()?.groups())
    }

    pub fn group(&self, uuid: &str) -> Result<Group<'_>> {
        Ok(Group::new(&self.tree, self.lookup(uuid, ELEM_GROUP)?))
    }

    pub fn entry(&self, uuid: &str) -> Result<Entry<'_>> {
        Ok(Entry::new(&self.tree, self.lookup(uuid, ELEM_ENTRY)?))
    }

    pub fn entry_mut(&mut self, uuid: &str) -> Result<EntryMut<'_>> {
        let node = self.lookup(uuid, ELEM_ENTRY)?;
        Ok(EntryMut::new(&mut self.tree, node))
    }

    /// 全部条目（不含历史版本），按文档顺序
    pub fn entries(&self) -> Vec<Entry<'_>> {
        let Ok(root) = self.root_group_id() else {
            return Vec::new();
        };
        self.tree
            .descendants(root)
            .into_iter()
            .filter(|&node| {
                self.tree.name(node) == ELEM_ENTRY
                    && self.tree.parent(node).map(|p| self.tree.name(p)) == Some(ELEM_GROUP)
            })
            .map(|node| Entry::new(&self.tree, node))
            .collect()
    }

    fn lookup(&self, uuid: &str, kind: &str) -> Result<NodeId> {
        self.uuid_index
            .get(uuid)
            .copied()
            .filter(|&node| self.tree.name(node) == kind)
            .ok_or_else(|| KdbxError::not_found(format!("no {kind} with UUID {uuid}")))
    }

    // ---------- 结构修改 ----------

    /// 在根分组下追加一个新分组，返回其 UUID
    pub fn add_group(&mut self, name: &str) -> Result<String> {
        let root = self.root_group_id()?;
        let (node, uuid) = build_group(&mut self.tree, root, name);
        self.uuid_index.insert(uuid.clone(), node);
        debug!(%uuid, name, "added group");
        Ok(uuid)
    }

    /// 在根分组中新建条目
    pub fn add_entry(&mut self, fields: &NewEntry) -> Result<String> {
        let root = self.root_group_id()?;
        Ok(self.insert_entry(root, fields))
    }

    /// 在指定分组中新建条目
    pub fn add_entry_to(&mut self, group_uuid: &str, fields: &NewEntry) -> Result<String> {
        let group = self.lookup(group_uuid, ELEM_GROUP)?;
        Ok(self.insert_entry(group, fields))
    }

    fn insert_entry(&mut self, group: NodeId, fields: &NewEntry) -> String {
        let (node, uuid) = build_entry(&mut self.tree, group, fields);
        self.uuid_index.insert(uuid.clone(), node);
        debug!(%uuid, title = %fields.title, "added entry");
        uuid
    }

    // ---------- 附件 ----------

    /// 存入附件内容，返回 blob id。
    ///
    /// 内容完全相同的 blob 只存一份；新 id 为现有最大 id + 1。
    pub fn add_attachment(&mut self, content: &[u8]) -> Result<u64> {
        let encoded = STANDARD.encode(content);
        if let Some(&id) = self.binary_index.iter().find_map(|(id, &blob)| {
            self.blob_matches(blob, &encoded, content).then_some(id)
        }) {
            debug!(id, "attachment content already stored");
            return Ok(id);
        }

        let meta = self.meta()?;
        let binaries = self.tree.ensure_child(meta, ELEM_BINARIES);
        let id = match self.binary_index.last_key_value() {
            None => 0,
            Some((&max, _)) => max
                .checked_add(1)
                .ok_or_else(|| KdbxError::format("binary id space exhausted"))?,
        };

        let blob = self.tree.append_text_element(binaries, ELEM_BINARY, encoded);
        self.tree.set_attribute(blob, ATTR_ID, id.to_string());
        self.binary_index.insert(id, blob);
        debug!(id, bytes = content.len(), "stored attachment blob");
        Ok(id)
    }

    fn blob_matches(&self, blob: NodeId, encoded: &str, content: &[u8]) -> bool {
        if self.tree.attribute(blob, ATTR_COMPRESSED) == Some(VALUE_TRUE) {
            decode_blob(&self.tree, blob).is_ok_and(|bytes| bytes == content)
        } else {
            self.tree.text(blob).unwrap_or_default().trim() == encoded
        }
    }

    /// 给条目挂上附件，返回 blob id
    pub fn attach(&mut self, entry_uuid: &str, filename: &str, content: &[u8]) -> Result<u64> {
        let entry = self.lookup(entry_uuid, ELEM_ENTRY)?;
        let id = self.add_attachment(content)?;

        let reference = build_reference(&mut self.tree, entry, filename, id);
        self.binary_refs.entry(id).or_default().push(reference);
        touch_modified(&mut self.tree, entry);
        Ok(id)
    }

    /// 删除一个条目侧引用；没有其他引用时同时删除共享 blob
    pub fn remove_attachment(&mut self, reference: NodeId) -> Result<()> {
        let id = reference_id(&self.tree, reference)?;
        let refs = self
            .binary_refs
            .get_mut(&id)
            .filter(|refs| refs.contains(&reference))
            .ok_or_else(|| KdbxError::not_found(format!("attachment reference to {id}")))?;

        refs.retain(|&r| r != reference);
        let orphaned = refs.is_empty();
        if let Some(entry) = self.tree.parent(reference) {
            touch_modified(&mut self.tree, entry);
        }
        self.tree.detach(reference);

        if orphaned {
            self.binary_refs.remove(&id);
            if let Some(blob) = self.binary_index.remove(&id) {
                self.tree.detach(blob);
            }
            debug!(id, "removed last reference, dropped blob");
        }
        Ok(())
    }

    /// 按位置删除条目上的第 `index` 个附件
    pub fn detach(&mut self, entry_uuid: &str, index: usize) -> Result<()> {
        let reference = self
            .entry(entry_uuid)?
            .attachments()
            .get(index)
            .map(|a| a.node_id())
            .ok_or_else(|| {
                KdbxError::not_found(format!("entry {entry_uuid} has no attachment #{index}"))
            })?;
        self.remove_attachment(reference)
    }

    /// 读取 blob 内容（`Compressed="True"` 时自动解压）
    pub fn attachment_content(&self, id: u64) -> Result<Vec<u8>> {
        let blob = self
            .binary_index
            .get(&id)
            .copied()
            .ok_or_else(|| KdbxError::not_found(format!("no binary with ID {id}")))?;
        decode_blob(&self.tree, blob)
    }

    /// 已存储的 blob id，升序
    pub fn attachment_ids(&self) -> Vec<u64> {
        self.binary_index.keys().copied().collect()
    }

    /// 指向 `id` 的条目侧引用数量
    pub fn reference_count(&self, id: u64) -> usize {
        self.binary_refs.get(&id).map_or(0, Vec::len)
    }
}

fn decode_blob(tree: &XmlTree, blob: NodeId) -> Result<Vec<u8>> {
    let text = tree.text(blob).unwrap_or_default();
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| KdbxError::format(format!("binary content is not base64: {e}")))?;

    if tree.attribute(blob, ATTR_COMPRESSED) == Some(VALUE_TRUE) {
        gzip::decompress(&bytes)
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FIELD_PASSWORD;

    const STREAM_KEY: [u8; 32] = [7u8; 32];

    fn database() -> Database {
        Database::new("Vault", &STREAM_KEY).unwrap()
    }

    fn password_node(db: &Database, uuid: &str) -> NodeId {
        let entry = db.entry(uuid).unwrap().node_id();
        let tree = db.tree();
        tree.children_named(entry, "String")
            .find(|&s| tree.child_text(s, "Key") == Some(FIELD_PASSWORD))
            .and_then(|s| tree.child(s, "Value"))
            .unwrap()
    }

    /// 用同一把流密钥手工构造带受保护字段的 XML
    fn protected_xml(passwords: &[&str]) -> String {
        let mut stream = ProtectedStream::new(&STREAM_KEY);
        let entries: String = passwords
            .iter()
            .enumerate()
            .map(|(i, pw)| {
                format!(
                    "<Entry><UUID>uuid-{i}</UUID>\
                     <String><Key>Title</Key><Value>t{i}</Value></String>\
                     <String><Key>Password</Key><Value Protected=\"True\">{}</Value></String>\
                     </Entry>",
                    stream.encode(pw)
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><KeePassFile><Meta>\
             <MemoryProtection><ProtectPassword>True</ProtectPassword></MemoryProtection>\
             <Binaries/></Meta><Root><Group><UUID>root</UUID><Name>Fixture</Name>{entries}\
             </Group></Root></KeePassFile>"
        )
    }

    #[test]
    fn from_xml_reveals_protected_values_in_order() {
        let xml = protected_xml(&["alpha", "", "gamma"]);
        let db = Database::from_xml(xml.as_bytes(), &STREAM_KEY).unwrap();

        assert_eq!(db.root_group().unwrap().title(), "Fixture");
        assert_eq!(db.entry("uuid-0").unwrap().password(), "alpha");
        assert_eq!(db.entry("uuid-1").unwrap().password(), "");
        assert_eq!(db.entry("uuid-2").unwrap().password(), "gamma");

        let node = password_node(&db, "uuid-0");
        assert_eq!(db.tree().attribute(node, ATTR_PROTECTED), Some(VALUE_FALSE));
        assert!(db.tree().attribute(node, ATTR_PROTECTED_VALUE).is_some());

        let flag = db
            .tree()
            .descend(db.tree().root(), &[ELEM_META, ELEM_MEMORY_PROT, ELEM_PROT_PASSWORD])
            .unwrap();
        assert_eq!(db.tree().text(flag), Some(VALUE_FALSE));
    }

    #[test]
    fn wrong_root_is_format_error() {
        let err = Database::from_xml(b"<Other/>", &STREAM_KEY).unwrap_err();
        assert!(matches!(err, KdbxError::Format(_)));
    }

    #[test]
    fn protect_then_unprotect_keeps_plaintext() {
        let mut db = database();
        let a = db.add_entry(&NewEntry::new("a").password("first")).unwrap();
        let b = db.add_entry(&NewEntry::new("b").password("second")).unwrap();

        assert_eq!(db.protect().unwrap(), 2);
        let node = password_node(&db, &a);
        assert_eq!(db.tree().attribute(node, ATTR_PROTECTED), Some(VALUE_TRUE));
        assert_ne!(db.tree().text(node), Some("first"));

        assert_eq!(db.unprotect().unwrap(), 2);
        assert_eq!(db.entry(&a).unwrap().password(), "first");
        assert_eq!(db.entry(&b).unwrap().password(), "second");
    }

    #[test]
    fn edited_value_survives_protect_cycle() {
        let mut db = database();
        let uuid = db.add_entry(&NewEntry::new("a").password("old")).unwrap();
        db.protect().unwrap();
        db.unprotect().unwrap();

        db.entry_mut(&uuid).unwrap().set_password("new");
        db.protect().unwrap();
        db.unprotect().unwrap();
        assert_eq!(db.entry(&uuid).unwrap().password(), "new");
    }

    #[test]
    fn ciphertext_depends_on_document_order() {
        let mut db = database();
        let uuid = db.add_entry(&NewEntry::new("later").password("same")).unwrap();
        db.protect().unwrap();
        let before = db.tree().text(password_node(&db, &uuid)).unwrap().to_string();
        db.unprotect().unwrap();

        // 在它之前插入一个受保护字段
        let first = db.root_group().unwrap().entries()[0].node_id();
        let tree = &mut db.tree;
        let string = tree.insert_element(first, 0, "String");
        tree.append_text_element(string, "Key", "Extra");
        let value = tree.append_text_element(string, "Value", "xyz");
        tree.set_attribute(value, ATTR_PROTECTED, VALUE_FALSE);

        db.protect().unwrap();
        let after = db.tree().text(password_node(&db, &uuid)).unwrap().to_string();
        assert_ne!(before, after);
    }

    #[test]
    fn serialize_writes_header_hash_and_restores_state() {
        let mut db = database();
        let uuid = db.add_entry(&NewEntry::new("a").password("pw")).unwrap();
        let hash = [0xab; 32];

        let body = db.serialize(&hash, Compression::None, 1024).unwrap();
        assert_eq!(db.header_hash(), Some(STANDARD.encode(hash).as_str()));
        assert_eq!(db.entry(&uuid).unwrap().password(), "pw");

        let xml = BlockHasher::new(1024).unhash(&body).unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(!text.contains(">pw<"));

        let reopened = Database::from_xml(text.as_bytes(), &STREAM_KEY).unwrap();
        assert_eq!(reopened.entry(&uuid).unwrap().password(), "pw");
    }

    #[test]
    fn serialize_gzip_payload() {
        let mut db = database();
        let body = db.serialize(&[0; 32], Compression::Gzip, 1 << 20).unwrap();
        let packed = BlockHasher::default().unhash(&body).unwrap();
        let xml = gzip::decompress(&packed).unwrap();
        assert!(xml.starts_with(b"<?xml"));
    }

    #[test]
    fn groups_and_lookup() {
        let mut db = database();
        let uuid = db.add_group("Banking").unwrap();
        let entry = db
            .add_entry_to(&uuid, &NewEntry::new("Bank").password("1234"))
            .unwrap();

        let titles: Vec<&str> = db.groups().unwrap().iter().map(|g| g.title()).collect();
        assert_eq!(titles, vec!["Banking"]);
        assert_eq!(db.group(&uuid).unwrap().entries()[0].uuid(), entry);
        assert_eq!(db.entries().len(), 1);

        assert!(matches!(db.entry(&uuid), Err(KdbxError::NotFound(_))));
        assert!(matches!(db.group("missing"), Err(KdbxError::NotFound(_))));
    }

    #[test]
    fn attachments_are_deduplicated() {
        let mut db = database();
        let a = db.add_entry(&NewEntry::new("a")).unwrap();
        let b = db.add_entry(&NewEntry::new("b")).unwrap();

        let first = db.attach(&a, "key.pem", b"shared").unwrap();
        let second = db.attach(&b, "copy.pem", b"shared").unwrap();
        let other = db.attach(&b, "other.bin", b"different").unwrap();

        assert_eq!(first, second);
        assert_eq!(other, first + 1);
        assert_eq!(db.reference_count(first), 2);
        assert_eq!(db.attachment_ids(), vec![first, other]);

        db.detach(&a, 0).unwrap();
        assert_eq!(db.attachment_content(first).unwrap(), b"shared");
        db.detach(&b, 0).unwrap();
        assert!(matches!(
            db.attachment_content(first),
            Err(KdbxError::NotFound(_))
        ));
        assert_eq!(db.entry(&b).unwrap().attachments()[0].filename(), "other.bin");
    }

    #[test]
    fn compressed_blob_is_inflated() {
        let packed = STANDARD.encode(gzip::compress(b"zipped").unwrap());
        let xml = format!(
            "<KeePassFile><Meta><Binaries>\
             <Binary ID=\"3\" Compressed=\"True\">{packed}</Binary>\
             </Binaries></Meta><Root><Group><UUID>g</UUID><Name>G</Name></Group></Root>\
             </KeePassFile>"
        );
        let mut db = Database::from_xml(xml.as_bytes(), &STREAM_KEY).unwrap();
        assert_eq!(db.attachment_content(3).unwrap(), b"zipped");
        assert_eq!(db.add_attachment(b"zipped").unwrap(), 3);
        assert_eq!(db.add_attachment(b"fresh").unwrap(), 4);
    }

    #[test]
    fn exhausted_binary_ids_are_rejected() {
        let xml = "<KeePassFile><Meta><Binaries>\
                   <Binary ID=\"18446744073709551615\">eA==</Binary>\
                   </Binaries></Meta><Root><Group><UUID>g</UUID><Name>G</Name></Group></Root>\
                   </KeePassFile>";
        let mut db = Database::from_xml(xml.as_bytes(), &STREAM_KEY).unwrap();

        assert_eq!(db.add_attachment(b"x").unwrap(), u64::MAX);
        assert!(matches!(
            db.add_attachment(b"new content"),
            Err(KdbxError::Format(_))
        ));
        assert_eq!(db.attachment_ids(), vec![u64::MAX]);
    }

    #[test]
    fn history_entries_are_not_indexed() {
        let xml = "<KeePassFile><Meta/><Root><Group><UUID>g</UUID>\
                   <Entry><UUID>e</UUID><History><Entry><UUID>e</UUID>\
                   <String><Key>Password</Key><Value>old</Value></String>\
                   </Entry></History></Entry></Group></Root></KeePassFile>";
        let db = Database::from_xml(xml.as_bytes(), &STREAM_KEY).unwrap();
        let entry = db.entry("e").unwrap();
        assert_eq!(entry.history_len(), 1);
        assert_eq!(entry.field(FIELD_PASSWORD), None);
        assert_eq!(db.entries().len(), 1);
    }
}
