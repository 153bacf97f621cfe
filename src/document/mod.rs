//! 解密后的文档模型：Database 持有 XML 树，
//! Group / Entry / Attachment 是指向其中子树的只读视图。

pub mod attachment;
pub mod database;
pub mod entry;
pub mod group;
pub mod xml;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use rand::{RngCore, rngs::OsRng};

pub use attachment::Attachment;
pub use database::Database;
pub use entry::{Entry, EntryMut, NewEntry};
pub use group::Group;
pub use xml::{NodeId, XmlTree};

pub(crate) const ELEM_DOC_NODE: &str = "KeePassFile";
pub(crate) const ELEM_META: &str = "Meta";
pub(crate) const ELEM_ROOT: &str = "Root";
pub(crate) const ELEM_GROUP: &str = "Group";
pub(crate) const ELEM_ENTRY: &str = "Entry";
pub(crate) const ELEM_HISTORY: &str = "History";
pub(crate) const ELEM_UUID: &str = "UUID";
pub(crate) const ELEM_NAME: &str = "Name";
pub(crate) const ELEM_NOTES: &str = "Notes";
pub(crate) const ELEM_ICON_ID: &str = "IconID";
pub(crate) const ELEM_TIMES: &str = "Times";
pub(crate) const ELEM_STRING: &str = "String";
pub(crate) const ELEM_BINARY: &str = "Binary";
pub(crate) const ELEM_BINARIES: &str = "Binaries";
pub(crate) const ELEM_KEY: &str = "Key";
pub(crate) const ELEM_VALUE: &str = "Value";
pub(crate) const ELEM_AUTO_TYPE: &str = "AutoType";

pub(crate) const ELEM_GENERATOR: &str = "Generator";
pub(crate) const ELEM_HEADER_HASH: &str = "HeaderHash";
pub(crate) const ELEM_DB_NAME: &str = "DatabaseName";
pub(crate) const ELEM_DB_NAME_CHANGED: &str = "DatabaseNameChanged";
pub(crate) const ELEM_MEMORY_PROT: &str = "MemoryProtection";
pub(crate) const ELEM_PROT_PASSWORD: &str = "ProtectPassword";
pub(crate) const ELEM_DELETED_OBJECTS: &str = "DeletedObjects";

pub(crate) const ELEM_CREATION_TIME: &str = "CreationTime";
pub(crate) const ELEM_LAST_MOD_TIME: &str = "LastModificationTime";
pub(crate) const ELEM_LAST_ACCESS_TIME: &str = "LastAccessTime";
pub(crate) const ELEM_EXPIRY_TIME: &str = "ExpiryTime";
pub(crate) const ELEM_EXPIRES: &str = "Expires";
pub(crate) const ELEM_USAGE_COUNT: &str = "UsageCount";
pub(crate) const ELEM_LOCATION_CHANGED: &str = "LocationChanged";

pub(crate) const ATTR_PROTECTED: &str = "Protected";
pub(crate) const ATTR_PROTECTED_VALUE: &str = "ProtectedValue";
pub(crate) const ATTR_REF: &str = "Ref";
pub(crate) const ATTR_ID: &str = "ID";
pub(crate) const ATTR_COMPRESSED: &str = "Compressed";

pub(crate) const VALUE_TRUE: &str = "True";
pub(crate) const VALUE_FALSE: &str = "False";

pub const FIELD_TITLE: &str = "Title";
pub const FIELD_USERNAME: &str = "UserName";
pub const FIELD_PASSWORD: &str = "Password";
pub const FIELD_URL: &str = "URL";
pub const FIELD_NOTES: &str = "Notes";

/// 新建分组与条目写入 Generator 的名字
pub(crate) const GENERATOR: &str = "kdbx-engine";

/// 全 0 UUID 的 base64 形式
pub(crate) const NULL_UUID: &str = "AAAAAAAAAAAAAAAAAAAAAA==";

/// 16 字节随机 UUID，base64 编码
pub(crate) fn new_uuid() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// KDBX 3.x 使用的 UTC 时间格式
pub(crate) fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// 为新节点写入默认的 Times 子树
pub(crate) fn append_times(tree: &mut XmlTree, parent: NodeId) -> NodeId {
    let now = timestamp_now();
    let times = tree.append_element(parent, ELEM_TIMES);
    tree.append_text_element(times, ELEM_CREATION_TIME, now.as_str());
    tree.append_text_element(times, ELEM_LAST_MOD_TIME, now.as_str());
    tree.append_text_element(times, ELEM_LAST_ACCESS_TIME, now.as_str());
    tree.append_text_element(times, ELEM_EXPIRY_TIME, now.as_str());
    tree.append_text_element(times, ELEM_EXPIRES, VALUE_FALSE);
    tree.append_text_element(times, ELEM_USAGE_COUNT, "0");
    tree.append_text_element(times, ELEM_LOCATION_CHANGED, now.as_str());
    times
}

/// 更新节点 Times/LastModificationTime（不存在则忽略）
pub(crate) fn touch_modified(tree: &mut XmlTree, node: NodeId) {
    if let Some(modified) = tree.descend(node, &[ELEM_TIMES, ELEM_LAST_MOD_TIME]) {
        tree.set_text(modified, timestamp_now());
    }
}
