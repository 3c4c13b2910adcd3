//! Owned tokens emitted by the tokenizer.
//!
//! Token payloads are copied (and entity-decoded) at emit time rather than
//! borrowed from the document buffer: a script handler may splice bytes into
//! the buffer mid-parse, and nothing already emitted may move underneath the
//! consumer.

use crate::tag::TagId;

/// One parsed attribute. Names are lowercase ASCII; values hold the raw
/// attribute text with character references resolved to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: Box<[u8]>,
    pub value: Box<[u8]>,
}

/// Ordered attribute list. Duplicate names are retained in document order;
/// lookup returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    attributes: Vec<Attribute>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Box<[u8]>, value: Box<[u8]>) {
        self.attributes.push(Attribute { name, value });
    }

    /// Value of the first attribute with this lowercase name.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|attribute| &*attribute.name == name)
            .map(|attribute| &*attribute.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A token from the document stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text {
        /// Decoded text bytes (UTF-8).
        text: Box<[u8]>,
        /// Drop one leading newline when appending to the tree; set on text
        /// immediately following a `<pre>`-like start tag.
        trim_leading_newline: bool,
        /// Drop one trailing newline; set when the run is immediately
        /// followed by a `</pre>`-like end tag.
        trim_trailing_newline: bool,
    },

    Start {
        tag: TagId,
        attributes: AttributeList,
        /// Byte offset of the opening `<` in the document buffer.
        offset: usize,
        /// The tag carried `/>`. Honored in XML mode and for void elements.
        self_closing: bool,
        /// Source name for tags outside the catalogue (XML mode only).
        raw_name: Option<Box<[u8]>>,
    },

    End {
        /// End-tag id (`start.end()`), or `TagId::UNKNOWN` in XML mode.
        tag: TagId,
        offset: usize,
        raw_name: Option<Box<[u8]>>,
    },
}
