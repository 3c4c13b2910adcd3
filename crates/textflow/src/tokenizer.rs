//! The restartable, byte-driven lexer over the document buffer.
//!
//! The tokenizer owns the append-only document buffer and a cursor. It is a
//! pull parser: [`Tokenizer::next_token`] drives the state machine as far as
//! one complete token and returns it, or returns `None` when the remaining
//! bytes do not yet form a complete token. An incomplete token rewinds the
//! cursor to the token start so the next call, after more bytes arrive,
//! resumes cleanly. Feeding the same bytes in any chunking therefore yields
//! the same token stream.

use crate::str_fns::{strpos, stripos};
use crate::tag::{self, tags, TagCatalogue, TagId};
use crate::token::{AttributeList, Token};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Attribute names longer than this abort attribute parsing for the
/// remainder of the tag.
const MAX_ATTRIBUTE_NAME: usize = 200;

/// Outcome of one attempt to parse markup at the cursor.
enum Step {
    /// A token was produced; the cursor advanced past it.
    Emit(Token),
    /// Markup was consumed without producing a token (comment, unknown tag).
    Skip,
    /// Not enough bytes buffered; the cursor was left at the token start.
    Incomplete,
}

pub struct Tokenizer {
    doc: Vec<u8>,
    parsed: usize,
    xml_mode: bool,

    /// Tags whose bodies are opaque because a script handler is registered,
    /// in addition to the catalogue's `PCDATA` set.
    script_tags: FxHashSet<TagId>,

    /// Tokens synthesized alongside an already-returned one (the body and
    /// end tag of an opaque element).
    pending: VecDeque<Token>,

    /// The next text token should drop one leading newline.
    trim_next_leading: bool,
}

impl Tokenizer {
    pub fn new(xml_mode: bool) -> Self {
        Self {
            doc: Vec::new(),
            parsed: 0,
            xml_mode,
            script_tags: FxHashSet::default(),
            pending: VecDeque::new(),
            trim_next_leading: false,
        }
    }

    /// Appends bytes at the end of the document buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.doc.extend_from_slice(bytes);
    }

    /// Inserts bytes at an arbitrary offset at or after the cursor. Used by
    /// reentrant `write text` calls; the consumed prefix is never touched.
    pub fn splice(&mut self, at: usize, bytes: &[u8]) {
        debug_assert!(at >= self.parsed && at <= self.doc.len());
        self.doc.splice(at..at, bytes.iter().copied());
    }

    pub fn buffer(&self) -> &[u8] {
        &self.doc
    }

    /// Current cursor position: everything before it has been consumed.
    pub fn offset(&self) -> usize {
        self.parsed
    }

    pub fn mark_script_tag(&mut self, tag: TagId) {
        self.script_tags.insert(tag);
    }

    /// Discards the buffer and all parse state. Script-tag registrations
    /// survive; they belong to the engine configuration, not the document.
    pub fn reset(&mut self) {
        self.doc.clear();
        self.parsed = 0;
        self.pending.clear();
        self.trim_next_leading = false;
    }

    /// Produces the next token, or `None` when the buffered bytes do not
    /// form one. With `is_final` set, trailing text is flushed and any
    /// half-received construct is discarded.
    pub fn next_token(&mut self, catalogue: &TagCatalogue, is_final: bool) -> Option<Token> {
        if let Some(token) = self.pending.pop_front() {
            return Some(token);
        }

        loop {
            if self.parsed >= self.doc.len() {
                return None;
            }

            if self.opens_markup(self.parsed) {
                match self.next_markup(catalogue, is_final) {
                    Step::Emit(token) => return Some(token),
                    Step::Skip => continue,
                    Step::Incomplete => {
                        if is_final {
                            // Unterminated construct at end of input.
                            self.parsed = self.doc.len();
                        }
                        return None;
                    }
                }
            }

            return self.next_text(catalogue, is_final);
        }
    }

    /// True when the byte at `at` begins a markup construct rather than
    /// plaintext. A `<` followed by anything that cannot start a token
    /// (e.g. `<3`) is rendered, not parsed.
    fn opens_markup(&self, at: usize) -> bool {
        if self.doc[at] != b'<' {
            return false;
        }
        match self.doc.get(at + 1) {
            Some(&b'!') | Some(&b'/') | Some(&b'?') => true,
            Some(c) => c.is_ascii_alphabetic(),
            // A lone `<` at the end of the buffer: treat as markup so the
            // incomplete path buffers it until the next byte classifies it.
            None => true,
        }
    }

    fn next_text(&mut self, catalogue: &TagCatalogue, is_final: bool) -> Option<Token> {
        let start = self.parsed;
        let mut at = start;
        let end;

        loop {
            match memchr::memchr(b'<', &self.doc[at..]) {
                Some(pos) => {
                    let lt = at + pos;
                    if lt + 1 >= self.doc.len() {
                        // Cannot yet classify this `<`.
                        if is_final {
                            end = self.doc.len();
                            break;
                        }
                        return None;
                    }
                    if self.opens_markup(lt) {
                        end = lt;
                        break;
                    }
                    at = lt + 1;
                }
                None => {
                    if is_final {
                        end = self.doc.len();
                        break;
                    }
                    // No tag boundary seen yet; keep the run buffered.
                    return None;
                }
            }
        }

        if end == start {
            return None;
        }

        // The trailing-newline trim depends on the identity of the end tag
        // that follows the run, so resolve it before emitting.
        let mut trim_trailing = false;
        if end < self.doc.len() && self.doc.get(end + 1) == Some(&b'/') {
            match self.peek_end_tag(catalogue, end) {
                PeekedEndTag::Tag(tag) => {
                    trim_trailing = is_pre_like(tag, catalogue);
                }
                PeekedEndTag::Incomplete => {
                    if !is_final {
                        return None;
                    }
                }
                PeekedEndTag::NotATag => {}
            }
        }

        let text = entities::decode(&self.doc[start..end]);
        self.parsed = end;
        let trim_leading = std::mem::take(&mut self.trim_next_leading);
        Some(Token::Text {
            text,
            trim_leading_newline: trim_leading,
            trim_trailing_newline: trim_trailing,
        })
    }

    /// Resolves the name of the end tag starting at `lt` (which points at
    /// `<` with `/` following) without moving the cursor.
    fn peek_end_tag(&self, catalogue: &TagCatalogue, lt: usize) -> PeekedEndTag {
        let name_at = lt + 2;
        let alpha = strspn!(self.doc, b'a'..=b'z' | b'A'..=b'Z', name_at);
        if alpha == 0 {
            return if name_at < self.doc.len() {
                PeekedEndTag::NotATag
            } else {
                PeekedEndTag::Incomplete
            };
        }
        let name_length = alpha
            + strcspn!(
                self.doc,
                b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>',
                name_at + alpha
            );
        if name_at + name_length >= self.doc.len() {
            return PeekedEndTag::Incomplete;
        }
        match catalogue.lookup(&self.doc[name_at..name_at + name_length]) {
            Some(tag) => PeekedEndTag::Tag(tag),
            None => PeekedEndTag::NotATag,
        }
    }

    fn next_markup(&mut self, catalogue: &TagCatalogue, is_final: bool) -> Step {
        let at = self.parsed;
        let doc_length = self.doc.len();

        let second = match self.doc.get(at + 1) {
            Some(b) => *b,
            None => return Step::Incomplete,
        };

        if second == b'!' {
            return self.next_declaration(at);
        }

        if second == b'?' {
            // Processing instructions are not part of the document model;
            // skip to the closing angle bracket.
            return match strpos(&self.doc, b">", at + 2) {
                Some(closer_at) => {
                    self.parsed = closer_at + 1;
                    self.trim_next_leading = false;
                    Step::Skip
                }
                None => Step::Incomplete,
            };
        }

        let is_closing = second == b'/';
        let name_at = at + 1 + usize::from(is_closing);

        let alpha = strspn!(self.doc, b'a'..=b'z' | b'A'..=b'Z', name_at);
        if alpha == 0 {
            if name_at >= doc_length {
                return Step::Incomplete;
            }
            // `</>` and kin: a missing end-tag name is discarded wholesale.
            return match strpos(&self.doc, b">", name_at) {
                Some(closer_at) => {
                    self.parsed = closer_at + 1;
                    self.trim_next_leading = false;
                    Step::Skip
                }
                None => Step::Incomplete,
            };
        }

        let name_length = alpha
            + strcspn!(
                self.doc,
                b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>',
                name_at + alpha
            );
        if name_at + name_length >= doc_length {
            return Step::Incomplete;
        }
        let tag = catalogue.lookup(&self.doc[name_at..name_at + name_length]);

        // Parse attributes for openers and closers alike; a discarded tag
        // still has to be measured so quoted `>` bytes don't truncate it.
        let mut attributes = AttributeList::new();
        let mut cursor = name_at + name_length;
        let mut self_closing = false;

        loop {
            cursor += strspn!(self.doc, b' ' | b'\t' | 0x0c | b'\r' | b'\n', cursor);
            if cursor >= doc_length {
                return Step::Incomplete;
            }

            match self.doc[cursor] {
                b'>' => {
                    cursor += 1;
                    break;
                }
                b'/' => {
                    if self.doc.get(cursor + 1) == Some(&b'>') {
                        self_closing = true;
                        cursor += 2;
                        break;
                    }
                    cursor += 1;
                    continue;
                }
                _ => {}
            }

            /*
             * An equals sign at the start of an attribute name is taken as
             * part of the name.
             *
             * @see https://html.spec.whatwg.org/multipage/parsing.html#before-attribute-name-state
             */
            let start_shift = usize::from(self.doc[cursor] == b'=');
            let attr_name_length = start_shift
                + strcspn!(
                    self.doc,
                    b'=' | b'/' | b'>' | b' ' | b'\t' | 0x0c | b'\r' | b'\n',
                    cursor + start_shift
                );
            if cursor + attr_name_length >= doc_length {
                return Step::Incomplete;
            }

            if attr_name_length > MAX_ATTRIBUTE_NAME {
                // Oversized name: drop this and every following attribute.
                match strpos(&self.doc, b">", cursor) {
                    Some(closer_at) => {
                        cursor = closer_at + 1;
                        break;
                    }
                    None => return Step::Incomplete,
                }
            }

            let attr_name = self.doc[cursor..cursor + attr_name_length].to_ascii_lowercase();
            cursor += attr_name_length;
            cursor += strspn!(self.doc, b' ' | b'\t' | 0x0c | b'\r' | b'\n', cursor);
            if cursor >= doc_length {
                return Step::Incomplete;
            }

            let value: &[u8] = if self.doc[cursor] == b'=' {
                cursor += 1;
                cursor += strspn!(self.doc, b' ' | b'\t' | 0x0c | b'\r' | b'\n', cursor);
                if cursor >= doc_length {
                    return Step::Incomplete;
                }
                match self.doc[cursor] {
                    quote @ (b'\'' | b'"') => {
                        let value_at = cursor + 1;
                        match strpos(&self.doc, &[quote], value_at) {
                            Some(end_quote_at) => {
                                cursor = end_quote_at + 1;
                                &self.doc[value_at..end_quote_at]
                            }
                            None => return Step::Incomplete,
                        }
                    }
                    _ => {
                        let value_at = cursor;
                        let value_length = strcspn!(
                            self.doc,
                            b'>' | b' ' | b'\t' | 0x0c | b'\r' | b'\n',
                            value_at
                        );
                        if value_at + value_length >= doc_length {
                            return Step::Incomplete;
                        }
                        cursor = value_at + value_length;
                        &self.doc[value_at..value_at + value_length]
                    }
                }
            } else {
                b""
            };

            if !is_closing {
                let value = entities::decode(value);
                attributes.push(attr_name.into_boxed_slice(), value);
            }
        }

        self.trim_next_leading = false;

        if is_closing {
            return match tag {
                Some(tag) => {
                    self.parsed = cursor;
                    Step::Emit(Token::End {
                        tag: tag.end(),
                        offset: at,
                        raw_name: None,
                    })
                }
                None if self.xml_mode => {
                    let raw_name = self.doc[name_at..name_at + name_length].into();
                    self.parsed = cursor;
                    Step::Emit(Token::End {
                        tag: TagId::UNKNOWN,
                        offset: at,
                        raw_name: Some(raw_name),
                    })
                }
                None => {
                    self.parsed = cursor;
                    Step::Skip
                }
            };
        }

        let tag = match tag {
            Some(tag) => tag,
            None if self.xml_mode => {
                let raw_name = self.doc[name_at..name_at + name_length].into();
                self.parsed = cursor;
                return Step::Emit(Token::Start {
                    tag: TagId::UNKNOWN,
                    attributes,
                    offset: at,
                    self_closing,
                    raw_name: Some(raw_name),
                });
            }
            None => {
                // Unknown tag in HTML mode: the whole tag vanishes.
                self.parsed = cursor;
                return Step::Skip;
            }
        };

        /*
         * The first linefeed after a <pre> opener is an authoring
         * convenience and is trimmed from the following text node.
         */
        if matches!(tag, tags::PRE | tags::LISTING) {
            self.trim_next_leading = true;
        }

        let opaque_body = !self_closing
            && (catalogue.flags(tag) & tag::PCDATA != 0 || self.script_tags.contains(&tag));
        if opaque_body {
            return match self.find_opaque_close(catalogue, tag, cursor) {
                Some((body_end, close_at, close_end)) => {
                    let body: Box<[u8]> = self.doc[cursor..body_end].into();
                    self.parsed = close_end;
                    self.pending.push_back(Token::Text {
                        text: body,
                        trim_leading_newline: true,
                        trim_trailing_newline: true,
                    });
                    self.pending.push_back(Token::End {
                        tag: tag.end(),
                        offset: close_at,
                        raw_name: None,
                    });
                    Step::Emit(Token::Start {
                        tag,
                        attributes,
                        offset: at,
                        self_closing: false,
                        raw_name: None,
                    })
                }
                // Wait at the opening tag until the closer arrives.
                None => Step::Incomplete,
            };
        }

        self.parsed = cursor;
        Step::Emit(Token::Start {
            tag,
            attributes,
            offset: at,
            self_closing,
            raw_name: None,
        })
    }

    /// Markup declarations: comments, CDATA sections (XML mode), and
    /// anything else bracketed by `<!` and `>`.
    fn next_declaration(&mut self, at: usize) -> Step {
        let body = &self.doc[at + 2..];

        if body.len() < 2 && b"--".starts_with(body) {
            return Step::Incomplete;
        }
        if body.starts_with(b"--") {
            return match strpos(&self.doc, b"-->", at + 4) {
                Some(closer_at) => {
                    self.parsed = closer_at + 3;
                    self.trim_next_leading = false;
                    Step::Skip
                }
                None => Step::Incomplete,
            };
        }

        if self.xml_mode {
            const CDATA_OPEN: &[u8] = b"[CDATA[";
            if body.len() < CDATA_OPEN.len() && CDATA_OPEN.starts_with(body) {
                return Step::Incomplete;
            }
            if body.starts_with(CDATA_OPEN) {
                let text_at = at + 2 + CDATA_OPEN.len();
                return match strpos(&self.doc, b"]]>", text_at) {
                    Some(closer_at) => {
                        let text: Box<[u8]> = self.doc[text_at..closer_at].into();
                        self.parsed = closer_at + 3;
                        self.trim_next_leading = false;
                        Step::Emit(Token::Text {
                            text,
                            trim_leading_newline: false,
                            trim_trailing_newline: false,
                        })
                    }
                    None => Step::Incomplete,
                };
            }
        }

        // DOCTYPE and other declarations carry no document content.
        match strpos(&self.doc, b">", at + 2) {
            Some(closer_at) => {
                self.parsed = closer_at + 1;
                self.trim_next_leading = false;
                Step::Skip
            }
            None => Step::Incomplete,
        }
    }

    /// Finds the end of an opaque element body: `</name`, case-insensitive,
    /// followed by optional whitespace and `>`. Quoting inside the body is
    /// ignored; a candidate not closed by `>` (e.g. `</script "...`) does
    /// not end the body.
    ///
    /// Returns `(body_end, close_at, close_end)` byte offsets.
    fn find_opaque_close(
        &self,
        catalogue: &TagCatalogue,
        tag: TagId,
        from: usize,
    ) -> Option<(usize, usize, usize)> {
        let mut pattern = Vec::with_capacity(2 + 10);
        pattern.extend_from_slice(b"</");
        pattern.extend_from_slice(catalogue.name(tag).as_bytes());

        let mut search = from;
        loop {
            let close_at = stripos(&self.doc, &pattern, search)?;
            let after_name = close_at + pattern.len();

            // Reject matches on a longer name, e.g. "</scriptx".
            match self.doc.get(after_name) {
                None => return None,
                Some(&(b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'>')) => {}
                Some(_) => {
                    search = close_at + 1;
                    continue;
                }
            }

            let gap = strspn!(self.doc, b' ' | b'\t' | 0x0c | b'\r' | b'\n', after_name);
            match self.doc.get(after_name + gap) {
                Some(&b'>') => return Some((close_at, close_at, after_name + gap + 1)),
                None => return None,
                Some(_) => {
                    search = close_at + 1;
                }
            }
        }
    }
}

enum PeekedEndTag {
    Tag(TagId),
    Incomplete,
    NotATag,
}

/// Tags whose adjacent newlines are authoring artifacts: the preformatted
/// pair and every opaque-bodied element.
fn is_pre_like(tag: TagId, catalogue: &TagCatalogue) -> bool {
    matches!(tag, tags::PRE | tags::LISTING) || catalogue.flags(tag) & tag::PCDATA != 0
}
