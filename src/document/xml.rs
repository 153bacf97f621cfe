//! 解密后 XML 文档的内存树
//!
//! 节点存放在一个 Vec 中，以 `NodeId` 下标引用。节点 id 在整个
//! 文档生命周期内稳定，摘除（detach）的节点只是不再挂在父节点下，
//! 序列化时自然被跳过。这使得 Database 可以长期持有
//! UUID → 节点、附件 id → 节点 的索引。
//!
//! KeePass 的 XML 没有混合内容：元素要么只有文本，要么只有子元素，
//! 因此带子元素的节点上的纯空白文本在解析时直接丢弃。

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{KdbxError, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl XmlNode {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            parent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
    root: NodeId,
}

impl XmlTree {
    /// 只有根元素的空文档
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![XmlNode::new(root_name, None)],
            root: NodeId(0),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        let mut reader = Reader::from_reader(data);

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(xml_error)?;
            match event {
                Event::Start(start) => {
                    let id = open_node(&mut nodes, &mut root, &stack, &start)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    open_node(&mut nodes, &mut root, &stack, &start)?;
                }
                Event::End(_) => {
                    let id = stack
                        .pop()
                        .ok_or_else(|| KdbxError::format("unbalanced closing tag"))?;
                    let node = &mut nodes[id.0];
                    if !node.children.is_empty()
                        && node.text.as_deref().is_some_and(|t| t.trim().is_empty())
                    {
                        node.text = None;
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(xml_error)?;
                    push_text(&mut nodes, &stack, &text)?;
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8(cdata.into_inner().into_owned())
                        .map_err(|_| KdbxError::format("CDATA section is not valid UTF-8"))?;
                    push_text(&mut nodes, &stack, &text)?;
                }
                Event::Eof => break,
                // 声明、注释、处理指令与 DOCTYPE 不进入树
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(KdbxError::format("unexpected end of XML document"));
        }
        let root = root.ok_or_else(|| KdbxError::format("XML document has no root element"))?;

        Ok(Self { nodes, root })
    }

    /// 带 XML 声明、以制表符缩进输出
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))
            .map_err(xml_error)?;
        self.write_node(&mut writer, self.root)?;
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];

        let mut start = BytesStart::new(node.name.as_str());
        for (key, value) in &node.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = node.text.as_deref().filter(|t| !t.is_empty());

        // 空值仍然输出空元素，而不是省略
        if node.children.is_empty() && text.is_none() {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
        }
        for &child in &node.children {
            self.write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(node.name.as_str())))
            .map_err(xml_error)?;

        Ok(())
    }

    // ---------- 查询 ----------

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].text.as_deref()
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// 第一个名为 `name` 的直接子元素
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.name(c) == name)
    }

    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.name(c) == name)
    }

    /// 逐级取第一个同名子元素
    pub fn descend(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter().try_fold(id, |node, name| self.child(node, name))
    }

    /// 子元素 `name` 的文本
    pub fn child_text(&self, id: NodeId, name: &str) -> Option<&str> {
        self.child(id, name).and_then(|c| self.text(c))
    }

    /// 以 `id` 为根的先序（文档顺序）遍历，包含 `id` 本身
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    // ---------- 修改 ----------

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.nodes[id.0].text = Some(text.into());
    }

    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        let value = value.into();
        let attributes = &mut self.nodes[id.0].attributes;
        match attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, key: &str) -> Option<String> {
        let attributes = &mut self.nodes[id.0].attributes;
        let pos = attributes.iter().position(|(k, _)| k == key)?;
        Some(attributes.remove(pos).1)
    }

    /// 在 `parent` 的第 `index` 个位置插入新元素（越界时追加到末尾）
    pub fn insert_element(&mut self, parent: NodeId, index: usize, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(XmlNode::new(name, Some(parent)));

        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.insert_element(parent, usize::MAX, name)
    }

    /// 追加一个带文本的叶子元素
    pub fn append_text_element(
        &mut self,
        parent: NodeId,
        name: &str,
        text: impl Into<String>,
    ) -> NodeId {
        let id = self.append_element(parent, name);
        self.set_text(id, text);
        id
    }

    /// 取名为 `name` 的子元素，不存在时追加
    pub fn ensure_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        match self.child(parent, name) {
            Some(id) => id,
            None => self.append_element(parent, name),
        }
    }

    /// 将节点从父节点摘除；节点本身仍留在存储中
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }
}

fn open_node(
    nodes: &mut Vec<XmlNode>,
    root: &mut Option<NodeId>,
    stack: &[NodeId],
    start: &BytesStart<'_>,
) -> Result<NodeId> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| KdbxError::format("element name is not valid UTF-8"))?
        .to_string();

    let parent = stack.last().copied();
    if parent.is_none() && root.is_some() {
        return Err(KdbxError::format("XML document has more than one root element"));
    }

    let id = NodeId(nodes.len());
    let mut node = XmlNode::new(&name, parent);
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| KdbxError::format("attribute name is not valid UTF-8"))?
            .to_string();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        node.attributes.push((key, value));
    }
    nodes.push(node);

    match parent {
        Some(parent) => nodes[parent.0].children.push(id),
        None => *root = Some(id),
    }
    Ok(id)
}

fn push_text(nodes: &mut [XmlNode], stack: &[NodeId], text: &str) -> Result<()> {
    match stack.last() {
        Some(id) => {
            nodes[id.0]
                .text
                .get_or_insert_with(String::new)
                .push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(KdbxError::format("text outside of the root element")),
    }
}

fn xml_error(err: impl Display) -> KdbxError {
    KdbxError::format(format!("XML error: {err}"))
}
