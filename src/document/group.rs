//! 分组视图与新分组工厂

use super::xml::{NodeId, XmlTree};
use super::{
    ELEM_ENTRY, ELEM_GROUP, ELEM_ICON_ID, ELEM_NAME, ELEM_NOTES, ELEM_UUID, Entry, NULL_UUID,
    VALUE_TRUE, append_times, new_uuid,
};

/// KeePass 默认的文件夹图标
const FOLDER_ICON: &str = "48";

/// `Group` 子树上的只读视图
#[derive(Debug, Clone, Copy)]
pub struct Group<'a> {
    tree: &'a XmlTree,
    node: NodeId,
}

impl<'a> Group<'a> {
    pub(crate) fn new(tree: &'a XmlTree, node: NodeId) -> Self {
        Self { tree, node }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn uuid(&self) -> &'a str {
        self.tree.child_text(self.node, ELEM_UUID).unwrap_or_default()
    }

    /// 分组标题（Name 元素）
    pub fn title(&self) -> &'a str {
        self.tree.child_text(self.node, ELEM_NAME).unwrap_or_default()
    }

    pub fn notes(&self) -> &'a str {
        self.tree.child_text(self.node, ELEM_NOTES).unwrap_or_default()
    }

    /// 直属条目，按文档顺序
    pub fn entries(&self) -> Vec<Entry<'a>> {
        let tree = self.tree;
        tree.children_named(self.node, ELEM_ENTRY)
            .map(|id| Entry::new(tree, id))
            .collect()
    }

    /// 直属子分组，按文档顺序
    pub fn groups(&self) -> Vec<Group<'a>> {
        let tree = self.tree;
        tree.children_named(self.node, ELEM_GROUP)
            .map(|id| Group::new(tree, id))
            .collect()
    }
}

/// 在 `parent` 末尾追加一个新分组，返回节点与 UUID
pub(crate) fn build_group(tree: &mut XmlTree, parent: NodeId, name: &str) -> (NodeId, String) {
    let uuid = new_uuid();
    let group = tree.append_element(parent, ELEM_GROUP);

    tree.append_text_element(group, ELEM_UUID, uuid.as_str());
    tree.append_text_element(group, ELEM_NAME, name);
    tree.append_text_element(group, ELEM_NOTES, "");
    tree.append_text_element(group, ELEM_ICON_ID, FOLDER_ICON);
    append_times(tree, group);
    tree.append_text_element(group, "IsExpanded", VALUE_TRUE);
    tree.append_text_element(group, "DefaultAutoTypeSequence", "");
    tree.append_element(group, "EnableAutoType");
    tree.append_element(group, "EnableSearching");
    tree.append_text_element(group, "LastTopVisibleEntry", NULL_UUID);

    (group, uuid)
}
