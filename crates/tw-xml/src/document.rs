use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use roxmltree::{Document, Node, NodeType, ParsingOptions, NS_XML_URI};

use crate::error::XmlError;
use crate::serialize::write_subtree;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Placeholder namespace bound to prefixes the input uses without declaring.
const UNDECLARED_NAMESPACE: &str = "urn:tweak-undeclared:";
const MAX_UNDECLARED_PREFIXES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable reference to one arena slot of one document. A handle stops
/// resolving once its slot is freed (removed or moved out), because the slot
/// generation moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    document: DocumentId,
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub fn document(&self) -> DocumentId {
        self.document
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<u32>,
    pub(crate) children: Vec<u32>,
    generation: u32,
    usages: u32,
    live: bool,
}

#[derive(Debug)]
pub struct XmlDocument {
    id: DocumentId,
    records: Vec<NodeRecord>,
    free: Vec<u32>,
    root: u32,
    declaration: Option<String>,
}

impl XmlDocument {
    /// Parses `text`, keeping qualified names and namespace declarations as
    /// written. Prefixes used without a declaration are accepted and kept.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let mut undeclared: Vec<String> = Vec::new();
        loop {
            let source = if undeclared.is_empty() {
                Cow::Borrowed(text)
            } else {
                Cow::Owned(declare_prefixes(text, &undeclared)?)
            };
            match Document::parse_with_options(&source, options) {
                Ok(parsed) => return Self::from_parsed(&parsed, xml_declaration(text)),
                Err(roxmltree::Error::UnknownNamespace(prefix, _))
                    if !undeclared.contains(&prefix)
                        && undeclared.len() < MAX_UNDECLARED_PREFIXES =>
                {
                    undeclared.push(prefix);
                }
                Err(error) => return Err(XmlError::Parse(error.to_string())),
            }
        }
    }

    fn from_parsed(parsed: &Document<'_>, declaration: Option<String>) -> Result<Self, XmlError> {
        let Some(root) = parsed.root().children().find(|node| node.is_element()) else {
            return Err(XmlError::MissingRoot);
        };

        let mut document = Self::empty();
        document.root = document.import_parsed(root, None);
        document.declaration = declaration;
        Ok(document)
    }

    pub fn with_root(name: &str) -> Self {
        let mut document = Self::empty();
        document.root = document.alloc(
            NodeKind::Element {
                name: name.to_string(),
                attributes: Vec::new(),
            },
            None,
        );
        document
    }

    fn empty() -> Self {
        Self {
            id: DocumentId::next(),
            records: Vec::new(),
            free: Vec::new(),
            root: 0,
            declaration: None,
        }
    }

    fn import_parsed(&mut self, node: Node<'_, '_>, parent: Option<u32>) -> u32 {
        let mut attributes = declared_namespaces(node);
        attributes.extend(node.attributes().map(|attribute| {
            let name = match attribute.namespace() {
                Some(uri) => prefixed(prefix_for(node, uri), attribute.name()),
                None => attribute.name().to_string(),
            };
            (name, attribute.value().to_string())
        }));
        let tag = node.tag_name();
        let name = match tag.namespace() {
            Some(uri) if node.default_namespace() != Some(uri) => {
                prefixed(prefix_for(node, uri), tag.name())
            }
            _ => tag.name().to_string(),
        };
        let index = self.alloc(NodeKind::Element { name, attributes }, parent);

        for child in node.children() {
            let child_index = match child.node_type() {
                NodeType::Element => self.import_parsed(child, Some(index)),
                NodeType::Text => {
                    let value = child.text().unwrap_or_default();
                    if value.is_empty() {
                        continue;
                    }
                    self.alloc(NodeKind::Text(value.to_string()), Some(index))
                }
                NodeType::Comment => self.alloc(
                    NodeKind::Comment(child.text().unwrap_or_default().to_string()),
                    Some(index),
                ),
                _ => continue,
            };
            self.records[index as usize].children.push(child_index);
        }

        index
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn root(&self) -> NodeHandle {
        self.handle_at(self.root)
    }

    /// The `<?xml ...?>` declaration the document was parsed with, if any.
    pub fn declaration(&self) -> Option<&str> {
        self.declaration.as_deref()
    }

    pub fn node_count(&self) -> usize {
        self.records.iter().filter(|record| record.live).count()
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.index_of(handle).is_ok()
    }

    pub fn kind(&self, handle: NodeHandle) -> Result<&NodeKind, XmlError> {
        let index = self.index_of(handle)?;
        Ok(&self.records[index].kind)
    }

    pub fn is_element(&self, handle: NodeHandle) -> Result<bool, XmlError> {
        Ok(matches!(self.kind(handle)?, NodeKind::Element { .. }))
    }

    pub fn name(&self, handle: NodeHandle) -> Result<&str, XmlError> {
        match self.kind(handle)? {
            NodeKind::Element { name, .. } => Ok(name),
            _ => Err(XmlError::NotAnElement),
        }
    }

    pub fn set_name(&mut self, handle: NodeHandle, new_name: &str) -> Result<(), XmlError> {
        let (name, _) = self.element_mut(handle)?;
        *name = new_name.to_string();
        Ok(())
    }

    pub fn attribute(&self, handle: NodeHandle, key: &str) -> Result<Option<&str>, XmlError> {
        match self.kind(handle)? {
            NodeKind::Element { attributes, .. } => Ok(attributes
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())),
            _ => Err(XmlError::NotAnElement),
        }
    }

    pub fn set_attribute(
        &mut self,
        handle: NodeHandle,
        key: &str,
        value: &str,
    ) -> Result<(), XmlError> {
        let (_, attributes) = self.element_mut(handle)?;
        match attributes.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attributes.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attribute(
        &mut self,
        handle: NodeHandle,
        key: &str,
    ) -> Result<Option<String>, XmlError> {
        let (_, attributes) = self.element_mut(handle)?;
        let position = attributes.iter().position(|(name, _)| name == key);
        Ok(position.map(|position| attributes.remove(position).1))
    }

    pub fn attribute_names(&self, handle: NodeHandle) -> Result<Vec<String>, XmlError> {
        match self.kind(handle)? {
            NodeKind::Element { attributes, .. } => {
                Ok(attributes.iter().map(|(name, _)| name.clone()).collect())
            }
            _ => Err(XmlError::NotAnElement),
        }
    }

    /// Concatenated text of the node and all of its descendants.
    pub fn text(&self, handle: NodeHandle) -> Result<String, XmlError> {
        let index = self.index_of(handle)?;
        let mut out = String::new();
        self.collect_text(index as u32, &mut out);
        Ok(out)
    }

    fn collect_text(&self, index: u32, out: &mut String) {
        let record = &self.records[index as usize];
        match &record.kind {
            NodeKind::Text(value) => out.push_str(value),
            NodeKind::Element { .. } => {
                for child in &record.children {
                    self.collect_text(*child, out);
                }
            }
            NodeKind::Comment(_) => {}
        }
    }

    pub fn set_text(&mut self, handle: NodeHandle, text: &str) -> Result<(), XmlError> {
        let index = self.index_of(handle)? as u32;
        if let NodeKind::Text(value) = &mut self.records[index as usize].kind {
            *value = text.to_string();
            return Ok(());
        }
        if !matches!(self.records[index as usize].kind, NodeKind::Element { .. }) {
            return Err(XmlError::NotAnElement);
        }

        let children = std::mem::take(&mut self.records[index as usize].children);
        for child in children {
            self.free_subtree(child);
        }
        if !text.is_empty() {
            let text_index = self.alloc(NodeKind::Text(text.to_string()), Some(index));
            self.records[index as usize].children.push(text_index);
        }
        Ok(())
    }

    pub fn parent(&self, handle: NodeHandle) -> Result<Option<NodeHandle>, XmlError> {
        let index = self.index_of(handle)?;
        Ok(self.records[index]
            .parent
            .map(|parent| self.handle_at(parent)))
    }

    /// Element children only; text and comments are skipped.
    pub fn children(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>, XmlError> {
        let index = self.index_of(handle)?;
        Ok(self.records[index]
            .children
            .iter()
            .copied()
            .filter(|child| self.is_element_index(*child))
            .map(|child| self.handle_at(child))
            .collect())
    }

    pub fn first_child(&self, handle: NodeHandle) -> Result<Option<NodeHandle>, XmlError> {
        Ok(self.children(handle)?.into_iter().next())
    }

    pub fn next_sibling(&self, handle: NodeHandle) -> Result<Option<NodeHandle>, XmlError> {
        let index = self.index_of(handle)? as u32;
        let Some(parent) = self.records[index as usize].parent else {
            return Ok(None);
        };
        let siblings = &self.records[parent as usize].children;
        let position = siblings
            .iter()
            .position(|child| *child == index)
            .ok_or(XmlError::StaleHandle)?;
        Ok(siblings[position + 1..]
            .iter()
            .copied()
            .find(|sibling| self.is_element_index(*sibling))
            .map(|sibling| self.handle_at(sibling)))
    }

    pub fn find_children(
        &self,
        handle: NodeHandle,
        name: &str,
    ) -> Result<Vec<NodeHandle>, XmlError> {
        let children = self.children(handle)?;
        Ok(children
            .into_iter()
            .filter(|child| matches!(self.name(*child), Ok(child_name) if child_name == name))
            .collect())
    }

    pub fn create_element(
        &mut self,
        parent: NodeHandle,
        name: &str,
    ) -> Result<NodeHandle, XmlError> {
        let parent_index = self.element_index(parent)?;
        let index = self.alloc(
            NodeKind::Element {
                name: name.to_string(),
                attributes: Vec::new(),
            },
            Some(parent_index),
        );
        self.records[parent_index as usize].children.push(index);
        Ok(self.handle_at(index))
    }

    /// Appends a deep copy of `node` (owned by `source`) under `parent`.
    pub fn append_copy(
        &mut self,
        parent: NodeHandle,
        source: &XmlDocument,
        node: NodeHandle,
    ) -> Result<NodeHandle, XmlError> {
        if source.id == self.id {
            return self.duplicate(parent, node);
        }
        let parent_index = self.element_index(parent)?;
        let source_index = source.index_of(node)? as u32;
        let copied = source.copy_subtree_into(source_index, self, Some(parent_index));
        self.records[parent_index as usize].children.push(copied);
        Ok(self.handle_at(copied))
    }

    /// Deep copy of a node of this document appended under `parent`, also of
    /// this document.
    pub fn duplicate(
        &mut self,
        parent: NodeHandle,
        node: NodeHandle,
    ) -> Result<NodeHandle, XmlError> {
        let staging = self.clone_subtree(node)?;
        let staging_root = staging.root();
        self.append_copy(parent, &staging, staging_root)
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Result<(), XmlError> {
        let index = self.detach(handle)?;
        self.free_subtree(index);
        Ok(())
    }

    /// Detaches the subtree rooted at `handle` and returns it as a new
    /// document. Handles into the moved subtree no longer resolve here.
    pub fn move_to_new_document(&mut self, handle: NodeHandle) -> Result<XmlDocument, XmlError> {
        self.element_index(handle)?;
        let index = self.detach(handle)?;
        let mut moved = Self::empty();
        moved.root = self.copy_subtree_into(index, &mut moved, None);
        self.free_subtree(index);
        Ok(moved)
    }

    /// Copies the subtree rooted at `handle` into a new document, leaving
    /// this one untouched.
    pub fn clone_subtree(&self, handle: NodeHandle) -> Result<XmlDocument, XmlError> {
        let index = self.index_of(handle)? as u32;
        if !self.is_element_index(index) {
            return Err(XmlError::NotAnElement);
        }
        let mut cloned = Self::empty();
        cloned.root = self.copy_subtree_into(index, &mut cloned, None);
        Ok(cloned)
    }

    /// Appends copies of this root's children to the end of `other`'s root.
    pub fn merge_into(&self, other: &mut XmlDocument) -> Result<(), XmlError> {
        if self.id == other.id {
            return Err(XmlError::SameDocument);
        }
        let target = other.root;
        for child in &self.records[self.root as usize].children {
            let copied = self.copy_subtree_into(*child, other, Some(target));
            other.records[target as usize].children.push(copied);
        }
        Ok(())
    }

    pub fn retain(&mut self, handle: NodeHandle) -> Result<u32, XmlError> {
        let index = self.index_of(handle)?;
        let record = &mut self.records[index];
        record.usages = record.usages.saturating_add(1);
        Ok(record.usages)
    }

    pub fn release(&mut self, handle: NodeHandle) -> Result<u32, XmlError> {
        let index = self.index_of(handle)?;
        let record = &mut self.records[index];
        record.usages = record.usages.saturating_sub(1);
        Ok(record.usages)
    }

    pub fn usages(&self, handle: NodeHandle) -> Result<u32, XmlError> {
        let index = self.index_of(handle)?;
        Ok(self.records[index].usages)
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        if let Some(declaration) = &self.declaration {
            out.push_str(declaration);
        }
        write_subtree(&self.records, self.root, &mut out);
        out
    }

    pub fn node_to_string(&self, handle: NodeHandle) -> Result<String, XmlError> {
        let index = self.index_of(handle)?;
        let mut out = String::new();
        write_subtree(&self.records, index as u32, &mut out);
        Ok(out)
    }

    fn index_of(&self, handle: NodeHandle) -> Result<usize, XmlError> {
        if handle.document != self.id {
            return Err(XmlError::ForeignHandle);
        }
        let index = handle.index as usize;
        match self.records.get(index) {
            Some(record) if record.live && record.generation == handle.generation => Ok(index),
            _ => Err(XmlError::StaleHandle),
        }
    }

    fn element_index(&self, handle: NodeHandle) -> Result<u32, XmlError> {
        let index = self.index_of(handle)? as u32;
        if !self.is_element_index(index) {
            return Err(XmlError::NotAnElement);
        }
        Ok(index)
    }

    fn element_mut(
        &mut self,
        handle: NodeHandle,
    ) -> Result<(&mut String, &mut Vec<(String, String)>), XmlError> {
        let index = self.index_of(handle)?;
        match &mut self.records[index].kind {
            NodeKind::Element { name, attributes } => Ok((name, attributes)),
            _ => Err(XmlError::NotAnElement),
        }
    }

    fn is_element_index(&self, index: u32) -> bool {
        matches!(
            self.records[index as usize].kind,
            NodeKind::Element { .. }
        )
    }

    fn handle_at(&self, index: u32) -> NodeHandle {
        NodeHandle {
            document: self.id,
            index,
            generation: self.records[index as usize].generation,
        }
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<u32>) -> u32 {
        if let Some(index) = self.free.pop() {
            let record = &mut self.records[index as usize];
            record.kind = kind;
            record.parent = parent;
            record.children.clear();
            record.usages = 0;
            record.live = true;
            return index;
        }
        self.records.push(NodeRecord {
            kind,
            parent,
            children: Vec::new(),
            generation: 0,
            usages: 0,
            live: true,
        });
        (self.records.len() - 1) as u32
    }

    /// Unlinks a non-root node from its parent and returns its slot index.
    fn detach(&mut self, handle: NodeHandle) -> Result<u32, XmlError> {
        let index = self.index_of(handle)? as u32;
        if index == self.root {
            return Err(XmlError::RootNode);
        }
        if let Some(parent) = self.records[index as usize].parent.take() {
            self.records[parent as usize]
                .children
                .retain(|child| *child != index);
        }
        Ok(index)
    }

    fn free_subtree(&mut self, index: u32) {
        let mut pending = vec![index];
        while let Some(current) = pending.pop() {
            let record = &mut self.records[current as usize];
            pending.append(&mut record.children);
            record.kind = NodeKind::Text(String::new());
            record.parent = None;
            record.usages = 0;
            record.live = false;
            record.generation = record.generation.wrapping_add(1);
            self.free.push(current);
        }
    }

    fn copy_subtree_into(&self, index: u32, target: &mut XmlDocument, parent: Option<u32>) -> u32 {
        let record = &self.records[index as usize];
        let copied = target.alloc(record.kind.clone(), parent);
        for child in &record.children {
            let child_copy = self.copy_subtree_into(*child, target, Some(copied));
            target.records[copied as usize].children.push(child_copy);
        }
        copied
    }
}

/// Namespace declarations made on `node` itself, as `xmlns` attributes.
fn declared_namespaces(node: Node<'_, '_>) -> Vec<(String, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| {
            parent
                .namespaces()
                .map(|namespace| (namespace.name(), namespace.uri()))
                .collect()
        })
        .unwrap_or_default();
    node.namespaces()
        .filter(|namespace| {
            namespace.uri() != NS_XML_URI && !namespace.uri().starts_with(UNDECLARED_NAMESPACE)
        })
        .filter(|namespace| !inherited.contains(&(namespace.name(), namespace.uri())))
        .map(|namespace| {
            let key = match namespace.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            (key, namespace.uri().to_string())
        })
        .collect()
}

fn prefix_for<'a>(node: Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == NS_XML_URI {
        return Some("xml");
    }
    node.namespaces()
        .find(|namespace| namespace.uri() == uri && namespace.name().is_some())
        .and_then(|namespace| namespace.name())
}

fn prefixed(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn xml_declaration(text: &str) -> Option<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text.strip_prefix("<?xml")?;
    if !rest.starts_with(|ch: char| ch.is_ascii_whitespace()) {
        return None;
    }
    text.find("?>").map(|end| text[..end + 2].to_string())
}

/// Re-declares `prefixes` under placeholder namespaces on the root start tag.
fn declare_prefixes(text: &str, prefixes: &[String]) -> Result<String, XmlError> {
    let at = root_name_end(text).ok_or(XmlError::MissingRoot)?;
    let mut patched = String::with_capacity(text.len() + prefixes.len() * 48);
    patched.push_str(&text[..at]);
    for prefix in prefixes {
        patched.push_str(&format!(" xmlns:{prefix}=\"{UNDECLARED_NAMESPACE}{prefix}\""));
    }
    patched.push_str(&text[at..]);
    Ok(patched)
}

/// Byte offset just past the root element's tag name.
fn root_name_end(text: &str) -> Option<usize> {
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find('<') {
        let start = cursor + offset;
        let tail = &text[start..];
        if tail.starts_with("<?") {
            cursor = start + tail.find("?>")? + 2;
        } else if tail.starts_with("<!--") {
            cursor = start + tail.find("-->")? + 3;
        } else if tail.starts_with("<!") {
            cursor = start + markup_declaration_len(tail)?;
        } else {
            let name_len =
                tail[1..].find(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>')?;
            return Some(start + 1 + name_len);
        }
    }
    None
}

fn markup_declaration_len(tail: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, ch) in tail.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '>' if depth == 0 => return Some(offset + 1),
            _ => {}
        }
    }
    None
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEAPON: &str = r#"<weapon id="ak47"><stats damage="40" spread="3"/><sounds><fire>ak_fire</fire></sounds></weapon>"#;

    fn child_named(document: &XmlDocument, parent: NodeHandle, name: &str) -> NodeHandle {
        document
            .find_children(parent, name)
            .expect("find children")
            .into_iter()
            .next()
            .expect("child should exist")
    }

    #[test]
    fn parse_and_serialize_preserve_structure() {
        let document = XmlDocument::parse(WEAPON).expect("xml should parse");
        assert_eq!(document.to_xml_string(), WEAPON);
        assert_eq!(document.name(document.root()).expect("root name"), "weapon");
        assert_eq!(document.node_count(), 5);
    }

    #[test]
    fn parse_rejects_invalid_or_rootless_input() {
        assert!(matches!(
            XmlDocument::parse("<weapon>"),
            Err(XmlError::Parse(_))
        ));
        assert!(XmlDocument::parse("<?xml version=\"1.0\"?><!-- only -->").is_err());
    }

    #[test]
    fn parse_keeps_comments_and_escapes_on_output() {
        let document =
            XmlDocument::parse(r#"<a note="x &amp; y"><!-- c --><b>1 &lt; 2</b></a>"#)
                .expect("xml should parse");
        assert_eq!(
            document.to_xml_string(),
            r#"<a note="x &amp; y"><!-- c --><b>1 &lt; 2</b></a>"#
        );
    }

    #[test]
    fn namespace_prefixes_and_declarations_round_trip() {
        let text = r#"<a xmlns:x="urn:x"><x:b x:k="1" xml:lang="en"/><c xmlns="urn:d"><e/></c></a>"#;
        let document = XmlDocument::parse(text).expect("xml should parse");
        assert_eq!(document.to_xml_string(), text);

        let root = document.root();
        assert_eq!(document.attribute(root, "xmlns:x").expect("attr"), Some("urn:x"));
        let b = child_named(&document, root, "x:b");
        assert_eq!(document.attribute(b, "x:k").expect("attr"), Some("1"));
        assert_eq!(document.attribute(b, "xml:lang").expect("attr"), Some("en"));
    }

    #[test]
    fn undeclared_prefixes_are_kept_as_written() {
        let text = r#"<a><x:b y:k="1"/></a>"#;
        let document = XmlDocument::parse(text).expect("xml should parse");
        assert_eq!(document.to_xml_string(), text);
        assert_eq!(
            document.attribute_names(document.root()).expect("names"),
            Vec::<String>::new()
        );

        let with_prolog = "<?xml version=\"1.0\"?>\n<!-- <z:decoy/> --><q:root/>";
        let document = XmlDocument::parse(with_prolog).expect("xml should parse");
        assert_eq!(document.name(document.root()).expect("name"), "q:root");
    }

    #[test]
    fn xml_declaration_is_written_back() {
        let document =
            XmlDocument::parse(r#"<?xml version="1.0" encoding="utf-8"?><a/>"#).expect("parse");
        assert_eq!(
            document.declaration(),
            Some(r#"<?xml version="1.0" encoding="utf-8"?>"#)
        );
        assert_eq!(
            document.to_xml_string(),
            r#"<?xml version="1.0" encoding="utf-8"?><a/>"#
        );
        assert_eq!(document.node_to_string(document.root()).expect("xml"), "<a/>");

        let plain = XmlDocument::parse("<a/>").expect("parse");
        assert_eq!(plain.declaration(), None);
    }

    #[test]
    fn attributes_can_be_read_written_and_removed() {
        let mut document = XmlDocument::parse(WEAPON).expect("xml should parse");
        let stats = child_named(&document, document.root(), "stats");
        assert_eq!(document.attribute(stats, "damage").expect("attr"), Some("40"));

        document.set_attribute(stats, "damage", "55").expect("set attr");
        document.set_attribute(stats, "recoil", "2").expect("add attr");
        assert_eq!(
            document.attribute_names(stats).expect("names"),
            vec!["damage".to_string(), "spread".to_string(), "recoil".to_string()]
        );
        assert_eq!(
            document.remove_attribute(stats, "spread").expect("remove"),
            Some("3".to_string())
        );
        assert_eq!(document.remove_attribute(stats, "spread").expect("remove"), None);
        assert_eq!(
            document.node_to_string(stats).expect("stats xml"),
            r#"<stats damage="55" recoil="2"/>"#
        );
    }

    #[test]
    fn navigation_skips_text_nodes() {
        let document = XmlDocument::parse("<a>\n  <b/>\n  text\n  <c/>\n</a>").expect("parse");
        let root = document.root();
        let first = document.first_child(root).expect("first").expect("some");
        assert_eq!(document.name(first).expect("name"), "b");
        let next = document.next_sibling(first).expect("next").expect("some");
        assert_eq!(document.name(next).expect("name"), "c");
        assert_eq!(document.next_sibling(next).expect("next"), None);
        assert_eq!(document.parent(next).expect("parent"), Some(root));
        assert_eq!(document.parent(root).expect("parent"), None);
    }

    #[test]
    fn set_text_replaces_children() {
        let mut document = XmlDocument::parse(WEAPON).expect("parse");
        let sounds = child_named(&document, document.root(), "sounds");
        let fire = child_named(&document, sounds, "fire");
        assert_eq!(document.text(sounds).expect("text"), "ak_fire");

        document.set_text(sounds, "silenced").expect("set text");
        assert_eq!(document.node_to_string(sounds).expect("xml"), "<sounds>silenced</sounds>");
        assert_eq!(document.name(fire), Err(XmlError::StaleHandle));
    }

    #[test]
    fn create_and_remove_elements() {
        let mut document = XmlDocument::parse("<a/>").expect("parse");
        let root = document.root();
        let child = document.create_element(root, "b").expect("create");
        document.set_attribute(child, "k", "v").expect("attr");
        assert_eq!(document.to_xml_string(), r#"<a><b k="v"/></a>"#);

        document.remove(child).expect("remove");
        assert_eq!(document.to_xml_string(), "<a/>");
        assert!(!document.contains(child));
        assert_eq!(document.remove(root), Err(XmlError::RootNode));
    }

    #[test]
    fn freed_slots_are_reused_without_reviving_old_handles() {
        let mut document = XmlDocument::parse("<a><b/></a>").expect("parse");
        let root = document.root();
        let old = document.first_child(root).expect("first").expect("some");
        document.remove(old).expect("remove");
        let fresh = document.create_element(root, "c").expect("create");
        assert_ne!(old, fresh);
        assert_eq!(document.name(old), Err(XmlError::StaleHandle));
        assert_eq!(document.name(fresh).expect("name"), "c");
    }

    #[test]
    fn move_to_new_document_partitions_the_tree() {
        let mut document = XmlDocument::parse(WEAPON).expect("parse");
        let sounds = child_named(&document, document.root(), "sounds");
        let before = document.node_to_string(sounds).expect("subtree xml");
        let count_before = document.node_count();

        let moved = document.move_to_new_document(sounds).expect("move");
        assert_eq!(moved.to_xml_string(), before);
        assert_eq!(
            document.to_xml_string(),
            r#"<weapon id="ak47"><stats damage="40" spread="3"/></weapon>"#
        );
        assert_eq!(document.node_count() + moved.node_count(), count_before);
        assert_eq!(document.name(sounds), Err(XmlError::StaleHandle));
        assert_eq!(moved.name(sounds), Err(XmlError::ForeignHandle));
    }

    #[test]
    fn move_to_new_document_rejects_root() {
        let mut document = XmlDocument::parse(WEAPON).expect("parse");
        let root = document.root();
        assert!(matches!(
            document.move_to_new_document(root),
            Err(XmlError::RootNode)
        ));
    }

    #[test]
    fn moving_or_cloning_requires_an_element() {
        let mut document = XmlDocument::parse("<a>text<!-- note --><b/></a>").expect("parse");
        let root = document.root();
        let text = document.handle_at(document.records[root.index as usize].children[0]);
        let comment = document.handle_at(document.records[root.index as usize].children[1]);

        for node in [text, comment] {
            assert!(matches!(
                document.move_to_new_document(node),
                Err(XmlError::NotAnElement)
            ));
            assert!(matches!(
                document.clone_subtree(node),
                Err(XmlError::NotAnElement)
            ));
        }
        assert_eq!(document.to_xml_string(), "<a>text<!-- note --><b/></a>");
    }

    #[test]
    fn clone_subtree_leaves_source_untouched() {
        let document = XmlDocument::parse(WEAPON).expect("parse");
        let stats = child_named(&document, document.root(), "stats");
        let cloned = document.clone_subtree(stats).expect("clone");
        assert_eq!(cloned.to_xml_string(), r#"<stats damage="40" spread="3"/>"#);
        assert_eq!(document.to_xml_string(), WEAPON);
        assert_ne!(cloned.id(), document.id());
    }

    #[test]
    fn merge_into_appends_root_children() {
        let fragment = XmlDocument::parse(r#"<tweak><extra a="1"/><more/></tweak>"#).expect("parse");
        let mut target = XmlDocument::parse("<weapon><stats/></weapon>").expect("parse");
        fragment.merge_into(&mut target).expect("merge");
        assert_eq!(
            target.to_xml_string(),
            r#"<weapon><stats/><extra a="1"/><more/></weapon>"#
        );
        assert_eq!(
            fragment.to_xml_string(),
            r#"<tweak><extra a="1"/><more/></tweak>"#
        );
    }

    #[test]
    fn append_copy_works_across_and_within_documents() {
        let source = XmlDocument::parse("<s><item n=\"1\"/></s>").expect("parse");
        let item = source.first_child(source.root()).expect("first").expect("some");
        let mut target = XmlDocument::parse("<t/>").expect("parse");
        let target_root = target.root();
        target.append_copy(target_root, &source, item).expect("copy across");
        assert_eq!(target.to_xml_string(), r#"<t><item n="1"/></t>"#);

        let own = target.first_child(target_root).expect("first").expect("some");
        target.duplicate(own, own).expect("copy within");
        assert_eq!(
            target.to_xml_string(),
            r#"<t><item n="1"><item n="1"/></item></t>"#
        );
    }

    #[test]
    fn usage_counter_tracks_retain_and_release() {
        let mut document = XmlDocument::parse("<a/>").expect("parse");
        let root = document.root();
        assert_eq!(document.retain(root).expect("retain"), 1);
        assert_eq!(document.retain(root).expect("retain"), 2);
        assert_eq!(document.release(root).expect("release"), 1);
        assert_eq!(document.release(root).expect("release"), 0);
        assert_eq!(document.release(root).expect("release"), 0);
    }

    #[test]
    fn handles_from_another_document_are_rejected() {
        let first = XmlDocument::parse("<a/>").expect("parse");
        let second = XmlDocument::parse("<a/>").expect("parse");
        assert_eq!(second.name(first.root()), Err(XmlError::ForeignHandle));
    }

    #[test]
    fn with_root_builds_single_element_document() {
        let mut document = XmlDocument::with_root("tweaks");
        let root = document.root();
        document.set_text(root, "x").expect("text");
        assert_eq!(document.to_string(), "<tweaks>x</tweaks>");
    }
}
