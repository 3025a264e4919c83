use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("XML document must contain a root element.")]
    MissingRoot,
    #[error("Node handle belongs to another document.")]
    ForeignHandle,
    #[error("Node handle is stale; the node was removed or moved to another document.")]
    StaleHandle,
    #[error("Node is not an element.")]
    NotAnElement,
    #[error("Operation is not allowed on the root node.")]
    RootNode,
    #[error("A document cannot be merged into itself.")]
    SameDocument,
    #[error("XML document has been released.")]
    Released,
}
