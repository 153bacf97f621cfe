//! 条目视图、可写视图与新条目工厂

use super::xml::{NodeId, XmlTree};
use super::{
    ATTR_PROTECTED, Attachment, ELEM_AUTO_TYPE, ELEM_BINARY, ELEM_GROUP, ELEM_HISTORY,
    ELEM_ICON_ID, ELEM_KEY, ELEM_STRING, ELEM_UUID, ELEM_VALUE, FIELD_NOTES, FIELD_PASSWORD,
    FIELD_TITLE, FIELD_URL, FIELD_USERNAME, VALUE_FALSE, VALUE_TRUE, append_times, new_uuid,
    touch_modified,
};

/// `Entry` 子树上的只读视图
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    tree: &'a XmlTree,
    node: NodeId,
}

impl<'a> Entry<'a> {
    pub(crate) fn new(tree: &'a XmlTree, node: NodeId) -> Self {
        Self { tree, node }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn uuid(&self) -> &'a str {
        self.tree.child_text(self.node, ELEM_UUID).unwrap_or_default()
    }

    /// `String[Key=key]/Value` 的文本；缺失返回 None，空值返回 ""
    pub fn field(&self, key: &str) -> Option<&'a str> {
        let value = find_value(self.tree, self.node, key)?;
        Some(self.tree.text(value).unwrap_or_default())
    }

    /// 当前字段是否带 `Protected="True"`
    pub fn is_protected(&self, key: &str) -> bool {
        find_value(self.tree, self.node, key)
            .and_then(|value| self.tree.attribute(value, ATTR_PROTECTED))
            == Some(VALUE_TRUE)
    }

    /// 全部字段名，按文档顺序
    pub fn field_keys(&self) -> Vec<&'a str> {
        let tree = self.tree;
        tree.children_named(self.node, ELEM_STRING)
            .filter_map(|s| tree.child_text(s, ELEM_KEY))
            .collect()
    }

    pub fn title(&self) -> &'a str {
        self.field(FIELD_TITLE).unwrap_or_default()
    }

    pub fn username(&self) -> &'a str {
        self.field(FIELD_USERNAME).unwrap_or_default()
    }

    pub fn password(&self) -> &'a str {
        self.field(FIELD_PASSWORD).unwrap_or_default()
    }

    pub fn url(&self) -> &'a str {
        self.field(FIELD_URL).unwrap_or_default()
    }

    pub fn notes(&self) -> &'a str {
        self.field(FIELD_NOTES).unwrap_or_default()
    }

    /// 条目上的附件引用，按文档顺序
    pub fn attachments(&self) -> Vec<Attachment<'a>> {
        let tree = self.tree;
        tree.children_named(self.node, ELEM_BINARY)
            .map(|id| Attachment::new(tree, id))
            .collect()
    }

    /// 旧版本记录数量
    pub fn history_len(&self) -> usize {
        self.tree
            .child(self.node, ELEM_HISTORY)
            .map_or(0, |h| self.tree.children_named(h, super::ELEM_ENTRY).count())
    }

    /// 条目的直属分组节点
    pub fn parent_group(&self) -> Option<NodeId> {
        self.tree
            .parent(self.node)
            .filter(|&p| self.tree.name(p) == ELEM_GROUP)
    }
}

/// 条目字段的可写视图。
///
/// 只修改字段文本；受保护状态由下一次保存时统一处理。
#[derive(Debug)]
pub struct EntryMut<'a> {
    tree: &'a mut XmlTree,
    node: NodeId,
}

impl<'a> EntryMut<'a> {
    pub(crate) fn new(tree: &'a mut XmlTree, node: NodeId) -> Self {
        Self { tree, node }
    }

    pub fn as_entry(&self) -> Entry<'_> {
        Entry::new(self.tree, self.node)
    }

    /// 设置字段；不存在时新建 `String` 对。
    ///
    /// 新建的 Password 值带 `Protected="False"`，保存时会被加密保护。
    pub fn set_field(&mut self, key: &str, value: &str) {
        match find_value(self.tree, self.node, key) {
            Some(value_node) => self.tree.set_text(value_node, value),
            None => {
                append_string(self.tree, self.node, key, value, key == FIELD_PASSWORD);
            }
        }
        touch_modified(self.tree, self.node);
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_field(FIELD_TITLE, title);
    }

    pub fn set_username(&mut self, username: &str) {
        self.set_field(FIELD_USERNAME, username);
    }

    pub fn set_password(&mut self, password: &str) {
        self.set_field(FIELD_PASSWORD, password);
    }

    pub fn set_url(&mut self, url: &str) {
        self.set_field(FIELD_URL, url);
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.set_field(FIELD_NOTES, notes);
    }
}

/// 新条目的字段，未给出的字段写为空值
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub title: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl NewEntry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// 在分组中插入新条目：放在已有条目之后、子分组之前
pub(crate) fn build_entry(tree: &mut XmlTree, group: NodeId, fields: &NewEntry) -> (NodeId, String) {
    let children = tree.children(group);
    let position = children
        .iter()
        .rposition(|&c| tree.name(c) == super::ELEM_ENTRY)
        .map(|last| last + 1)
        .or_else(|| children.iter().position(|&c| tree.name(c) == ELEM_GROUP))
        .unwrap_or(children.len());

    let uuid = new_uuid();
    let entry = tree.insert_element(group, position, super::ELEM_ENTRY);

    tree.append_text_element(entry, ELEM_UUID, uuid.as_str());
    tree.append_text_element(entry, ELEM_ICON_ID, "0");
    tree.append_element(entry, "ForegroundColor");
    tree.append_element(entry, "BackgroundColor");
    tree.append_element(entry, "OverrideURL");
    tree.append_element(entry, "Tags");
    append_times(tree, entry);

    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    append_string(tree, entry, FIELD_TITLE, &fields.title, false);
    append_string(tree, entry, FIELD_USERNAME, &text(&fields.username), false);
    append_string(tree, entry, FIELD_PASSWORD, &text(&fields.password), true);
    append_string(tree, entry, FIELD_URL, &text(&fields.url), false);
    append_string(tree, entry, FIELD_NOTES, &text(&fields.notes), false);

    let auto_type = tree.append_element(entry, ELEM_AUTO_TYPE);
    tree.append_text_element(auto_type, "Enabled", VALUE_TRUE);
    tree.append_text_element(auto_type, "DataTransferObfuscation", "0");
    tree.append_element(entry, ELEM_HISTORY);

    (entry, uuid)
}

/// 找到 `String[Key=key]` 下的 Value 节点
fn find_value(tree: &XmlTree, entry: NodeId, key: &str) -> Option<NodeId> {
    tree.children_named(entry, ELEM_STRING)
        .find(|&s| tree.child_text(s, ELEM_KEY) == Some(key))
        .and_then(|s| tree.child(s, ELEM_VALUE))
}

/// 追加 `String{Key, Value}`，位置在最后一个 String 之后
fn append_string(tree: &mut XmlTree, entry: NodeId, key: &str, value: &str, protect: bool) -> NodeId {
    let children = tree.children(entry);
    let position = children
        .iter()
        .rposition(|&c| tree.name(c) == ELEM_STRING)
        .map(|last| last + 1)
        .or_else(|| children.iter().position(|&c| tree.name(c) == ELEM_BINARY))
        .or_else(|| children.iter().position(|&c| tree.name(c) == ELEM_AUTO_TYPE))
        .unwrap_or(children.len());

    let string = tree.insert_element(entry, position, ELEM_STRING);
    tree.append_text_element(string, ELEM_KEY, key);
    let value_node = tree.append_text_element(string, ELEM_VALUE, value);
    if protect {
        tree.set_attribute(value_node, ATTR_PROTECTED, VALUE_FALSE);
    }
    value_node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_tree() -> (XmlTree, NodeId) {
        let mut tree = XmlTree::new("Group");
        let root = tree.root();
        tree.append_text_element(root, "Name", "General");
        (tree, root)
    }

    #[test]
    fn new_entry_has_standard_fields() {
        let (mut tree, group) = group_tree();
        let fields = NewEntry::new("Mail").username("alice").password("s3cret");
        let (node, uuid) = build_entry(&mut tree, group, &fields);

        let entry = Entry::new(&tree, node);
        assert_eq!(entry.uuid(), uuid);
        assert_eq!(entry.title(), "Mail");
        assert_eq!(entry.username(), "alice");
        assert_eq!(entry.password(), "s3cret");
        assert_eq!(entry.url(), "");
        assert_eq!(entry.notes(), "");
        assert_eq!(
            entry.field_keys(),
            vec!["Title", "UserName", "Password", "URL", "Notes"]
        );
        assert!(!entry.is_protected(FIELD_PASSWORD));
        assert_eq!(entry.parent_group(), Some(group));
    }

    #[test]
    fn password_value_starts_unprotected() {
        let (mut tree, group) = group_tree();
        let (node, _) = build_entry(&mut tree, group, &NewEntry::new("x"));

        let value = find_value(&tree, node, FIELD_PASSWORD).unwrap();
        assert_eq!(tree.attribute(value, ATTR_PROTECTED), Some(VALUE_FALSE));
        let title = find_value(&tree, node, FIELD_TITLE).unwrap();
        assert_eq!(tree.attribute(title, ATTR_PROTECTED), None);
    }

    #[test]
    fn entries_go_before_subgroups() {
        let (mut tree, group) = group_tree();
        tree.append_element(group, "Group");
        build_entry(&mut tree, group, &NewEntry::new("first"));
        build_entry(&mut tree, group, &NewEntry::new("second"));

        let names: Vec<&str> = tree.children(group).iter().map(|&c| tree.name(c)).collect();
        assert_eq!(names, vec!["Name", "Entry", "Entry", "Group"]);
    }

    #[test]
    fn set_field_updates_or_creates() {
        let (mut tree, group) = group_tree();
        let (node, _) = build_entry(&mut tree, group, &NewEntry::new("x"));

        let mut entry = EntryMut::new(&mut tree, node);
        entry.set_password("changed");
        entry.set_field("Custom", "value");

        let view = entry.as_entry();
        assert_eq!(view.password(), "changed");
        assert_eq!(view.field("Custom"), Some("value"));
        assert_eq!(view.field("Missing"), None);
        assert_eq!(view.field_keys().last(), Some(&"Custom"));
    }
}
