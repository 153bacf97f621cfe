//! 条目上的附件引用：`Binary{Key=文件名, Value@Ref=共享 blob id}`

use super::xml::{NodeId, XmlTree};
use super::{ATTR_REF, ELEM_BINARY, ELEM_KEY, ELEM_STRING, ELEM_VALUE};
use crate::error::{KdbxError, Result};

/// 附件引用的只读视图
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    tree: &'a XmlTree,
    node: NodeId,
}

impl<'a> Attachment<'a> {
    pub(crate) fn new(tree: &'a XmlTree, node: NodeId) -> Self {
        Self { tree, node }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn filename(&self) -> &'a str {
        self.tree.child_text(self.node, ELEM_KEY).unwrap_or_default()
    }

    /// 引用的 blob id
    pub fn id(&self) -> Result<u64> {
        reference_id(self.tree, self.node)
    }
}

/// 解析 `Binary/Value@Ref`
pub(crate) fn reference_id(tree: &XmlTree, binary: NodeId) -> Result<u64> {
    let raw = tree
        .child(binary, ELEM_VALUE)
        .and_then(|value| tree.attribute(value, ATTR_REF))
        .ok_or_else(|| KdbxError::not_found("attachment reference has no Ref"))?;

    raw.trim()
        .parse()
        .map_err(|_| KdbxError::format(format!("attachment reference {raw:?} is not a number")))
}

/// 在条目上追加一个附件引用，位置紧跟最后一个 String / Binary
pub(crate) fn build_reference(tree: &mut XmlTree, entry: NodeId, filename: &str, id: u64) -> NodeId {
    let position = tree
        .children(entry)
        .iter()
        .rposition(|&c| matches!(tree.name(c), ELEM_STRING | ELEM_BINARY))
        .map_or(0, |last| last + 1);

    let binary = tree.insert_element(entry, position, ELEM_BINARY);
    tree.append_text_element(binary, ELEM_KEY, filename);
    let value = tree.append_element(binary, ELEM_VALUE);
    tree.set_attribute(value, ATTR_REF, id.to_string());
    binary
}
