use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rhai::{Array, Dynamic, NativeCallContext, INT};
use tw_xml::{NodeHandle, XmlDocument, XmlError};

use super::manifest::XML_NATIVE;
use super::{
    foreign, script_error, string_arg, typed_arg, ForeignClass, ForeignFn, ForeignResolver,
    ScriptResult,
};

type SharedDocument = Arc<Mutex<XmlDocument>>;

fn lock(document: &Mutex<XmlDocument>) -> MutexGuard<'_, XmlDocument> {
    document.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Script value owning one XML document.
#[derive(Clone)]
pub struct ScriptDocument {
    inner: SharedDocument,
}

impl ScriptDocument {
    pub fn new(document: XmlDocument) -> Self {
        Self {
            inner: Arc::new(Mutex::new(document)),
        }
    }

    pub fn parse(text: &str) -> Result<Self, XmlError> {
        XmlDocument::parse(text).map(Self::new)
    }

    pub fn root(&self) -> ScriptNode {
        let mut document = lock(&self.inner);
        let root = document.root();
        ScriptNode::attach(&self.inner, &mut document, root)
    }

    pub fn to_xml_string(&self) -> String {
        lock(&self.inner).to_xml_string()
    }

    pub fn merge_into(&self, other: &ScriptDocument) -> Result<(), XmlError> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Err(XmlError::SameDocument);
        }
        let source = lock(&self.inner);
        let mut target = lock(&other.inner);
        source.merge_into(&mut target)
    }

    /// Appends a copy of `node`, from any document, under this document's root.
    pub fn clone_node(&self, node: &ScriptNode) -> Result<ScriptNode, XmlError> {
        let source = node.document()?;
        let mut target = lock(&self.inner);
        let root = target.root();
        let copied = if Arc::ptr_eq(&source, &self.inner) {
            target.duplicate(root, node.handle)?
        } else {
            let source = lock(&source);
            target.append_copy(root, &source, node.handle)?
        };
        Ok(ScriptNode::attach(&self.inner, &mut target, copied))
    }
}

/// Script value naming one node. It holds only a weak link to its document
/// and keeps the node's usage counter up to date while it is alive.
pub struct ScriptNode {
    document: Weak<Mutex<XmlDocument>>,
    handle: NodeHandle,
}

impl ScriptNode {
    fn attach(shared: &SharedDocument, document: &mut XmlDocument, handle: NodeHandle) -> Self {
        let _ = document.retain(handle);
        Self {
            document: Arc::downgrade(shared),
            handle,
        }
    }

    fn document(&self) -> Result<SharedDocument, XmlError> {
        self.document.upgrade().ok_or(XmlError::Released)
    }

    fn read<R>(
        &self,
        f: impl FnOnce(&XmlDocument, NodeHandle) -> Result<R, XmlError>,
    ) -> Result<R, XmlError> {
        let shared = self.document()?;
        let document = lock(&shared);
        f(&document, self.handle)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut XmlDocument, NodeHandle) -> Result<R, XmlError>,
    ) -> Result<R, XmlError> {
        let shared = self.document()?;
        let mut document = lock(&shared);
        f(&mut document, self.handle)
    }

    fn related(
        &self,
        f: impl FnOnce(&XmlDocument, NodeHandle) -> Result<Vec<NodeHandle>, XmlError>,
    ) -> Result<Vec<ScriptNode>, XmlError> {
        let shared = self.document()?;
        let mut document = lock(&shared);
        let handles = f(&document, self.handle)?;
        Ok(handles
            .into_iter()
            .map(|handle| ScriptNode::attach(&shared, &mut document, handle))
            .collect())
    }

    pub fn is_valid(&self) -> bool {
        self.read(|document, handle| Ok(document.contains(handle)))
            .unwrap_or(false)
    }

    pub fn usages(&self) -> Result<u32, XmlError> {
        self.read(|document, handle| document.usages(handle))
    }

    pub fn name(&self) -> Result<String, XmlError> {
        self.read(|document, handle| document.name(handle).map(str::to_string))
    }

    pub fn set_name(&self, name: &str) -> Result<(), XmlError> {
        self.write(|document, handle| document.set_name(handle, name))
    }

    pub fn attribute(&self, key: &str) -> Result<Option<String>, XmlError> {
        self.read(|document, handle| {
            document
                .attribute(handle, key)
                .map(|value| value.map(str::to_string))
        })
    }

    pub fn set_attribute(&self, key: &str, value: &str) -> Result<(), XmlError> {
        self.write(|document, handle| document.set_attribute(handle, key, value))
    }

    pub fn remove_attribute(&self, key: &str) -> Result<Option<String>, XmlError> {
        self.write(|document, handle| document.remove_attribute(handle, key))
    }

    pub fn attribute_names(&self) -> Result<Vec<String>, XmlError> {
        self.read(|document, handle| document.attribute_names(handle))
    }

    pub fn text(&self) -> Result<String, XmlError> {
        self.read(|document, handle| document.text(handle))
    }

    pub fn set_text(&self, text: &str) -> Result<(), XmlError> {
        self.write(|document, handle| document.set_text(handle, text))
    }

    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        self.read(|document, handle| document.node_to_string(handle))
    }

    pub fn parent(&self) -> Result<Option<ScriptNode>, XmlError> {
        let nodes = self.related(|document, handle| {
            Ok(document.parent(handle)?.into_iter().collect())
        })?;
        Ok(nodes.into_iter().next())
    }

    pub fn children(&self) -> Result<Vec<ScriptNode>, XmlError> {
        self.related(|document, handle| document.children(handle))
    }

    pub fn first_child(&self) -> Result<Option<ScriptNode>, XmlError> {
        let nodes = self.related(|document, handle| {
            Ok(document.first_child(handle)?.into_iter().collect())
        })?;
        Ok(nodes.into_iter().next())
    }

    pub fn next_sibling(&self) -> Result<Option<ScriptNode>, XmlError> {
        let nodes = self.related(|document, handle| {
            Ok(document.next_sibling(handle)?.into_iter().collect())
        })?;
        Ok(nodes.into_iter().next())
    }

    pub fn find_children(&self, name: &str) -> Result<Vec<ScriptNode>, XmlError> {
        self.related(|document, handle| document.find_children(handle, name))
    }

    pub fn create_element(&self, name: &str) -> Result<ScriptNode, XmlError> {
        let shared = self.document()?;
        let mut document = lock(&shared);
        let created = document.create_element(self.handle, name)?;
        Ok(ScriptNode::attach(&shared, &mut document, created))
    }

    /// Appends a deep copy of `source` as the last child of this node.
    pub fn append_copy(&self, source: &ScriptNode) -> Result<ScriptNode, XmlError> {
        let shared = self.document()?;
        let source_shared = source.document()?;
        let mut document = lock(&shared);
        let copied = if Arc::ptr_eq(&shared, &source_shared) {
            document.duplicate(self.handle, source.handle)?
        } else {
            let source_document = lock(&source_shared);
            document.append_copy(self.handle, &source_document, source.handle)?
        };
        Ok(ScriptNode::attach(&shared, &mut document, copied))
    }

    pub fn remove(&self) -> Result<(), XmlError> {
        self.write(|document, handle| document.remove(handle))
    }

    pub fn move_to_new_document(&self) -> Result<ScriptDocument, XmlError> {
        self.write(|document, handle| document.move_to_new_document(handle))
            .map(ScriptDocument::new)
    }

    pub fn clone_to_document(&self) -> Result<ScriptDocument, XmlError> {
        self.read(|document, handle| document.clone_subtree(handle))
            .map(ScriptDocument::new)
    }
}

impl Clone for ScriptNode {
    fn clone(&self) -> Self {
        if let Some(shared) = self.document.upgrade() {
            let _ = lock(&shared).retain(self.handle);
        }
        Self {
            document: Weak::clone(&self.document),
            handle: self.handle,
        }
    }
}

impl Drop for ScriptNode {
    fn drop(&mut self) {
        if let Some(shared) = self.document.upgrade() {
            let _ = lock(&shared).release(self.handle);
        }
    }
}

pub struct XmlBindings;

impl ForeignResolver for XmlBindings {
    fn bind_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        if module != XML_NATIVE {
            return None;
        }
        match class {
            "XML" => Some(ForeignClass::of::<ScriptDocument>("XML")),
            "XMLNode" => Some(ForeignClass::of::<ScriptNode>("XMLNode")),
            _ => None,
        }
    }

    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn> {
        if module != XML_NATIVE {
            return None;
        }
        let method = match (class, is_static, signature) {
            ("XML", true, "parse(_)") => foreign(xml_parse),
            ("XML", true, "new_document(_)") => foreign(xml_new_document),
            ("XML", false, "root()") => foreign(xml_root),
            ("XML", false, "to_string()") => foreign(xml_to_string),
            ("XML", false, "merge_into(_)") => foreign(xml_merge_into),
            ("XML", false, "clone_node(_)") => foreign(xml_clone_node),
            ("XMLNode", false, "name()") => foreign(node_name),
            ("XMLNode", false, "set_name(_)") => foreign(node_set_name),
            ("XMLNode", false, "attribute(_)") => foreign(node_attribute),
            ("XMLNode", false, "set_attribute(_,_)") => foreign(node_set_attribute),
            ("XMLNode", false, "remove_attribute(_)") => foreign(node_remove_attribute),
            ("XMLNode", false, "attribute_names()") => foreign(node_attribute_names),
            ("XMLNode", false, "text()") => foreign(node_text),
            ("XMLNode", false, "set_text(_)") => foreign(node_set_text),
            ("XMLNode", false, "parent()") => foreign(node_parent),
            ("XMLNode", false, "children()") => foreign(node_children),
            ("XMLNode", false, "first_child()") => foreign(node_first_child),
            ("XMLNode", false, "next_sibling()") => foreign(node_next_sibling),
            ("XMLNode", false, "find_children(_)") => foreign(node_find_children),
            ("XMLNode", false, "create_element(_)") => foreign(node_create_element),
            ("XMLNode", false, "append_copy(_)") => foreign(node_append_copy),
            ("XMLNode", false, "remove()") => foreign(node_remove),
            ("XMLNode", false, "move_to_new_document()") => foreign(node_move_to_new_document),
            ("XMLNode", false, "clone_to_document()") => foreign(node_clone_to_document),
            ("XMLNode", false, "is_valid()") => foreign(node_is_valid),
            ("XMLNode", false, "usages()") => foreign(node_usages),
            ("XMLNode", false, "to_string()") => foreign(node_to_string),
            _ => return None,
        };
        Some(method)
    }
}

fn xml_failure(call: &str, error: XmlError) -> Box<rhai::EvalAltResult> {
    script_error(format!("{}: {}", call, error))
}

fn optional_node(node: Option<ScriptNode>) -> Dynamic {
    node.map(Dynamic::from).unwrap_or(Dynamic::UNIT)
}

fn optional_string(value: Option<String>) -> Dynamic {
    value.map(Dynamic::from).unwrap_or(Dynamic::UNIT)
}

fn node_array(nodes: Vec<ScriptNode>) -> Dynamic {
    Dynamic::from_array(nodes.into_iter().map(Dynamic::from).collect::<Array>())
}

fn document_arg<'a>(
    args: &'a [&mut Dynamic],
    index: usize,
    call: &str,
) -> Result<impl std::ops::Deref<Target = ScriptDocument> + 'a, Box<rhai::EvalAltResult>> {
    typed_arg::<ScriptDocument>(args, index, call, "an XML document")
}

fn node_arg<'a>(
    args: &'a [&mut Dynamic],
    index: usize,
    call: &str,
) -> Result<impl std::ops::Deref<Target = ScriptNode> + 'a, Box<rhai::EvalAltResult>> {
    typed_arg::<ScriptNode>(args, index, call, "an XMLNode")
}

fn xml_parse(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let text = string_arg(args, 0, "XML.parse")?;
    let document = ScriptDocument::parse(&text).map_err(|err| xml_failure("XML.parse", err))?;
    Ok(Dynamic::from(document))
}

fn xml_new_document(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let name = string_arg(args, 0, "XML.new_document")?;
    Ok(Dynamic::from(ScriptDocument::new(XmlDocument::with_root(&name))))
}

fn xml_root(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let document = document_arg(args, 0, "XML.root")?;
    Ok(Dynamic::from(document.root()))
}

fn xml_to_string(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let document = document_arg(args, 0, "XML.to_string")?;
    Ok(Dynamic::from(document.to_xml_string()))
}

fn xml_merge_into(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let document = document_arg(args, 0, "XML.merge_into")?;
    let target = document_arg(args, 1, "XML.merge_into")?;
    document
        .merge_into(&target)
        .map_err(|err| xml_failure("XML.merge_into", err))?;
    Ok(Dynamic::UNIT)
}

fn xml_clone_node(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let document = document_arg(args, 0, "XML.clone_node")?;
    let node = node_arg(args, 1, "XML.clone_node")?;
    let copied = document
        .clone_node(&node)
        .map_err(|err| xml_failure("XML.clone_node", err))?;
    Ok(Dynamic::from(copied))
}

fn node_name(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.name")?;
    let name = node.name().map_err(|err| xml_failure("XMLNode.name", err))?;
    Ok(Dynamic::from(name))
}

fn node_set_name(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let name = string_arg(args, 1, "XMLNode.set_name")?;
    let node = node_arg(args, 0, "XMLNode.set_name")?;
    node.set_name(&name)
        .map_err(|err| xml_failure("XMLNode.set_name", err))?;
    Ok(Dynamic::UNIT)
}

fn node_attribute(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let key = string_arg(args, 1, "XMLNode.attribute")?;
    let node = node_arg(args, 0, "XMLNode.attribute")?;
    let value = node
        .attribute(&key)
        .map_err(|err| xml_failure("XMLNode.attribute", err))?;
    Ok(optional_string(value))
}

fn node_set_attribute(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let key = string_arg(args, 1, "XMLNode.set_attribute")?;
    let value = args
        .get(2)
        .map(|value| value.to_string())
        .unwrap_or_default();
    let node = node_arg(args, 0, "XMLNode.set_attribute")?;
    node.set_attribute(&key, &value)
        .map_err(|err| xml_failure("XMLNode.set_attribute", err))?;
    Ok(Dynamic::UNIT)
}

fn node_remove_attribute(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let key = string_arg(args, 1, "XMLNode.remove_attribute")?;
    let node = node_arg(args, 0, "XMLNode.remove_attribute")?;
    let removed = node
        .remove_attribute(&key)
        .map_err(|err| xml_failure("XMLNode.remove_attribute", err))?;
    Ok(optional_string(removed))
}

fn node_attribute_names(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.attribute_names")?;
    let names = node
        .attribute_names()
        .map_err(|err| xml_failure("XMLNode.attribute_names", err))?;
    Ok(Dynamic::from_array(
        names.into_iter().map(Dynamic::from).collect::<Array>(),
    ))
}

fn node_text(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.text")?;
    let text = node.text().map_err(|err| xml_failure("XMLNode.text", err))?;
    Ok(Dynamic::from(text))
}

fn node_set_text(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let text = args
        .get(1)
        .map(|value| value.to_string())
        .unwrap_or_default();
    let node = node_arg(args, 0, "XMLNode.set_text")?;
    node.set_text(&text)
        .map_err(|err| xml_failure("XMLNode.set_text", err))?;
    Ok(Dynamic::UNIT)
}

fn node_parent(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.parent")?;
    let parent = node.parent().map_err(|err| xml_failure("XMLNode.parent", err))?;
    Ok(optional_node(parent))
}

fn node_children(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.children")?;
    let children = node
        .children()
        .map_err(|err| xml_failure("XMLNode.children", err))?;
    Ok(node_array(children))
}

fn node_first_child(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.first_child")?;
    let child = node
        .first_child()
        .map_err(|err| xml_failure("XMLNode.first_child", err))?;
    Ok(optional_node(child))
}

fn node_next_sibling(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.next_sibling")?;
    let sibling = node
        .next_sibling()
        .map_err(|err| xml_failure("XMLNode.next_sibling", err))?;
    Ok(optional_node(sibling))
}

fn node_find_children(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let name = string_arg(args, 1, "XMLNode.find_children")?;
    let node = node_arg(args, 0, "XMLNode.find_children")?;
    let found = node
        .find_children(&name)
        .map_err(|err| xml_failure("XMLNode.find_children", err))?;
    Ok(node_array(found))
}

fn node_create_element(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let name = string_arg(args, 1, "XMLNode.create_element")?;
    let node = node_arg(args, 0, "XMLNode.create_element")?;
    let created = node
        .create_element(&name)
        .map_err(|err| xml_failure("XMLNode.create_element", err))?;
    Ok(Dynamic::from(created))
}

fn node_append_copy(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.append_copy")?;
    let source = node_arg(args, 1, "XMLNode.append_copy")?;
    let copied = node
        .append_copy(&source)
        .map_err(|err| xml_failure("XMLNode.append_copy", err))?;
    Ok(Dynamic::from(copied))
}

fn node_remove(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.remove")?;
    node.remove().map_err(|err| xml_failure("XMLNode.remove", err))?;
    Ok(Dynamic::UNIT)
}

fn node_move_to_new_document(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.move_to_new_document")?;
    let document = node
        .move_to_new_document()
        .map_err(|err| xml_failure("XMLNode.move_to_new_document", err))?;
    Ok(Dynamic::from(document))
}

fn node_clone_to_document(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.clone_to_document")?;
    let document = node
        .clone_to_document()
        .map_err(|err| xml_failure("XMLNode.clone_to_document", err))?;
    Ok(Dynamic::from(document))
}

fn node_is_valid(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.is_valid")?;
    Ok(Dynamic::from_bool(node.is_valid()))
}

fn node_usages(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.usages")?;
    let usages = node
        .usages()
        .map_err(|err| xml_failure("XMLNode.usages", err))?;
    Ok(Dynamic::from_int(INT::from(usages)))
}

fn node_to_string(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let node = node_arg(args, 0, "XMLNode.to_string")?;
    let text = node
        .to_xml_string()
        .map_err(|err| xml_failure("XMLNode.to_string", err))?;
    Ok(Dynamic::from(text))
}
