//! Selector-based node lookup over parsed HTML.
//!
//! A [`NodeSelector`] names an element kind, an optional attribute that must
//! carry an exact value, and which occurrence (0-indexed, document order) to
//! pick. Text extraction is shallow: only the first text child of a node is
//! read, so values split across inline markup or formatted with thousands
//! separators are not handled.

use scraper::{ElementRef, Html};
use scraper::node::Element;

use crate::error::AppError;

/// Attribute constraint of a [`NodeSelector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatch {
    pub key: String,
    pub value: String,
}

/// Describes which node of a document carries the value of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSelector {
    pub element_kind: String,
    pub attribute: Option<AttributeMatch>,
    pub occurrence: usize,
}

impl NodeSelector {
    /// Match every element of the given kind, first occurrence.
    pub fn element(kind: impl Into<String>) -> Self {
        Self {
            element_kind: kind.into(),
            attribute: None,
            occurrence: 0,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute = Some(AttributeMatch {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn at(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }

    fn matches(&self, element: &Element) -> bool {
        if !element.name().eq_ignore_ascii_case(&self.element_kind) {
            return false;
        }
        match &self.attribute {
            Some(attr) => element.attr(&attr.key) == Some(attr.value.as_str()),
            None => true,
        }
    }
}

/// Searchable tree built from a raw HTML document.
pub struct DocumentIndex {
    html: Html,
}

impl DocumentIndex {
    /// Parse raw document bytes.
    ///
    /// The HTML5 tree builder recovers from structural errors, so only input
    /// that is not UTF-8 or carries no content at all is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self, AppError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| AppError::Parse(format!("document is not valid UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Err(AppError::Parse("document is empty".into()));
        }

        let html = Html::parse_document(text);
        if !html.errors.is_empty() {
            tracing::debug!(errors = html.errors.len(), "Recovered from HTML parse errors");
        }
        Ok(Self { html })
    }

    /// All elements matching `selector`, in depth-first pre-order (document
    /// order). `selector.occurrence` is not applied here.
    pub fn find_nodes(&self, selector: &NodeSelector) -> Vec<ElementRef<'_>> {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| selector.matches(el.value()))
            .collect()
    }

    /// The matching element at `selector.occurrence`.
    pub fn select(&self, selector: &NodeSelector) -> Result<ElementRef<'_>, AppError> {
        let nodes = self.find_nodes(selector);
        let found = nodes.len();
        nodes
            .into_iter()
            .nth(selector.occurrence)
            .ok_or(AppError::SelectorOutOfRange {
                occurrence: selector.occurrence,
                found,
            })
    }
}

/// Literal content of the node's first text child, or an empty string.
/// Never descends into grandchildren.
pub fn text_of(node: &ElementRef<'_>) -> String {
    node.children()
        .find_map(|child| child.value().as_text().map(|t| String::from(&**t)))
        .unwrap_or_default()
}
