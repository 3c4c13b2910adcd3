//! The document engine: tokenization driver, tree construction with
//! implicit-close inference, and the reentrant write interface.
//!
//! All input is pushed in through [`Engine::feed`]. A script handler fired
//! synchronously during a feed may splice new source at the tokenizer's
//! insertion point with [`Engine::write_text`], or park the whole parse
//! with [`Engine::write_wait`] until [`Engine::write_continue`].

use crate::compat::CompatMode;
use crate::dom::{NodeRef, Tree};
use crate::errors::EngineError;
use crate::tag::{self, Disposition, TagCatalogue, TagId};
use crate::token::{AttributeList, Token};
use crate::tokenizer::Tokenizer;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Callback fired when a registered tag's (opaque) element is parsed.
/// Receives the engine, the start tag's attributes, and the raw body.
pub type ScriptHandler = dyn Fn(&mut Engine, &AttributeList, &[u8]) -> Result<(), String>;

/// Callback fired per matching node after the tree is fully built.
pub type NodeHandler = dyn Fn(&mut Engine, NodeRef);

/// Receiver for tree mutation signals.
pub trait DocumentObserver {
    fn node_inserted(&mut self, _node: NodeRef) {}
    fn subtree_replaced(&mut self, _parent: NodeRef) {}
    /// Styles at and below this node must be recomputed. Emitted at most
    /// once per feed, for the shallowest affected node.
    fn restyle_from(&mut self, _node: NodeRef) {}
}

/// Progress of the reentrant write interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WriteState {
    /// No script handler on the stack, parsing freely.
    #[default]
    None,
    /// A script handler is running.
    InHandler,
    /// The running handler asked to pause tokenization.
    InHandlerWait,
    /// The running handler reset the engine; the feed unwinds.
    InHandlerReset,
    /// Parked: tokenization stops until `write_continue`.
    Wait,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub mode: CompatMode,
    pub xml_mode: bool,
}

pub struct Engine {
    options: EngineOptions,
    catalogue: TagCatalogue,
    tokenizer: Tokenizer,
    tree: Tree,

    /// Deepest open element, the insertion point.
    current: Option<NodeRef>,

    write_state: WriteState,
    /// Byte offset where `write_text` splices new input.
    write_insert: usize,

    /// `is_final` has been requested by the caller.
    final_requested: bool,
    /// The final token has been consumed and node handlers have run.
    parse_finished: bool,

    script_handlers: FxHashMap<TagId, Rc<ScriptHandler>>,
    node_handlers: FxHashMap<TagId, Rc<NodeHandler>>,
    observer: Option<Box<dyn DocumentObserver>>,
    restyle_from: Option<NodeRef>,

    poisoned: bool,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            catalogue: TagCatalogue::new(),
            tokenizer: Tokenizer::new(options.xml_mode),
            tree: Tree::new(),
            current: None,
            options,
            write_state: WriteState::default(),
            write_insert: 0,
            final_requested: false,
            parse_finished: false,
            script_handlers: FxHashMap::default(),
            node_handlers: FxHashMap::default(),
            observer: None,
            restyle_from: None,
            poisoned: false,
        }
    }

    pub fn mode(&self) -> CompatMode {
        self.options.mode
    }

    pub fn catalogue(&self) -> &TagCatalogue {
        &self.catalogue
    }

    /// Read-only view of the document tree for layout and the node-command
    /// surface. Node handles are weak; the tree re-validates on access.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> Option<NodeRef> {
        self.tree.root()
    }

    pub fn set_observer(&mut self, observer: Box<dyn DocumentObserver>) {
        self.observer = Some(observer);
    }

    /// Registers a script handler: the element's body becomes opaque to the
    /// tree and is delivered to the callback instead.
    pub fn register_script_handler(&mut self, tag: TagId, handler: Rc<ScriptHandler>) {
        self.tokenizer.mark_script_tag(tag);
        self.script_handlers.insert(tag, handler);
    }

    /// Registers a callback fired in post-order once the tree is built.
    pub fn register_node_handler(&mut self, tag: TagId, handler: Rc<NodeHandler>) {
        self.node_handlers.insert(tag, handler);
    }

    fn check_usable(&self) -> Result<(), EngineError> {
        if self.poisoned {
            Err(EngineError::Unusable)
        } else {
            Ok(())
        }
    }

    fn poison(&mut self) {
        log::warn!("engine poisoned; all further operations will fail");
        self.poisoned = true;
    }

    /// Appends source bytes and drives tokenization as far as possible.
    /// While parked in `write_wait` the bytes only accumulate.
    pub fn feed(&mut self, bytes: &[u8], is_final: bool) -> Result<(), EngineError> {
        self.check_usable()?;
        if bytes.is_empty() && !is_final && self.write_state == WriteState::None {
            return Ok(());
        }

        self.tokenizer.append(bytes);
        if is_final {
            self.final_requested = true;
        }

        if self.write_state == WriteState::None {
            self.run_tokenizer();
            self.flush_restyle();
        }
        Ok(())
    }

    /// Splices text at the tokenizer's insertion point. Only valid while a
    /// script handler is on the stack or the parse is parked.
    pub fn write_text(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.check_usable()?;
        match self.write_state {
            WriteState::InHandler | WriteState::InHandlerWait | WriteState::Wait => {
                self.tokenizer.splice(self.write_insert, bytes);
                self.write_insert += bytes.len();
                Ok(())
            }
            _ => Err(EngineError::InvalidState),
        }
    }

    /// Pauses tokenization once the current handler returns.
    pub fn write_wait(&mut self) -> Result<(), EngineError> {
        self.check_usable()?;
        if self.write_state != WriteState::InHandler {
            return Err(EngineError::InvalidState);
        }
        self.write_state = WriteState::InHandlerWait;
        Ok(())
    }

    /// Resumes a parse paused by `write_wait`.
    pub fn write_continue(&mut self) -> Result<(), EngineError> {
        self.check_usable()?;
        match self.write_state {
            WriteState::Wait => {
                self.write_state = WriteState::None;
                self.run_tokenizer();
                self.flush_restyle();
                Ok(())
            }
            WriteState::InHandlerWait => {
                self.write_state = WriteState::InHandler;
                Ok(())
            }
            _ => Err(EngineError::InvalidState),
        }
    }

    /// Discards the document buffer, the tree, and every outstanding node
    /// handle. Handler registrations and the observer survive. Called from
    /// within a script handler, the in-flight feed unwinds immediately.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.check_usable()?;
        let in_handler = matches!(
            self.write_state,
            WriteState::InHandler | WriteState::InHandlerWait
        );
        self.tokenizer.reset();
        self.tree.reset();
        self.current = None;
        self.final_requested = false;
        self.parse_finished = false;
        self.restyle_from = None;
        self.write_insert = 0;
        self.write_state = if in_handler {
            WriteState::InHandlerReset
        } else {
            WriteState::None
        };
        Ok(())
    }

    fn run_tokenizer(&mut self) {
        loop {
            let is_final = self.final_requested;
            let token = match self.tokenizer.next_token(&self.catalogue, is_final) {
                Some(token) => token,
                None => break,
            };

            match token {
                Token::Start {
                    tag,
                    attributes,
                    self_closing,
                    ..
                } => {
                    if let Some(handler) = self.script_handlers.get(&tag).cloned() {
                        if !self.dispatch_script(tag, handler, attributes) {
                            return;
                        }
                    } else {
                        self.insert_element(tag, attributes, self_closing);
                    }
                }
                Token::End { tag, .. } => self.insert_end(tag),
                Token::Text {
                    text,
                    trim_leading_newline,
                    trim_trailing_newline,
                } => self.insert_text(&text, trim_leading_newline, trim_trailing_newline),
            }
        }

        if self.final_requested
            && !self.parse_finished
            && self.tokenizer.offset() >= self.tokenizer.buffer().len()
        {
            self.parse_finished = true;
            // Remaining open elements close implicitly down to the root.
            self.current = None;
            self.run_node_handlers();
            if let Some(root) = self.tree.root() {
                self.note_restyle(root);
            }
        }
    }

    /// Runs a script handler for an opaque element. Returns false when the
    /// feed must unwind (wait or reset).
    fn dispatch_script(
        &mut self,
        tag: TagId,
        handler: Rc<ScriptHandler>,
        attributes: AttributeList,
    ) -> bool {
        // The tokenizer queued the body and end tag right behind the start.
        let body = match self.tokenizer.next_token(&self.catalogue, self.final_requested) {
            Some(Token::Text { text, .. }) => text,
            _ => {
                self.poison();
                return false;
            }
        };
        if !matches!(
            self.tokenizer.next_token(&self.catalogue, self.final_requested),
            Some(Token::End { .. })
        ) {
            self.poison();
            return false;
        }

        self.write_state = WriteState::InHandler;
        self.write_insert = self.tokenizer.offset();

        if let Err(message) = handler(self, &attributes, &body) {
            log::warn!(
                "script handler for <{}> failed: {message}",
                self.catalogue.name(tag)
            );
        }

        match self.write_state {
            WriteState::InHandler => {
                self.write_state = WriteState::None;
                true
            }
            WriteState::InHandlerWait => {
                self.write_state = WriteState::Wait;
                false
            }
            WriteState::InHandlerReset => {
                // The handler reset the document; the caller restarts.
                self.write_state = WriteState::None;
                false
            }
            other => {
                debug_assert!(false, "impossible write state {other:?} after handler");
                self.poison();
                false
            }
        }
    }

    /// The insertion point, reopening the root for content that arrives
    /// after every element has closed. Returns `None` when the tree is
    /// still completely empty.
    fn insertion_parent(&mut self) -> Option<NodeRef> {
        if self.current.is_none() {
            self.current = self.tree.root();
        }
        self.current
    }

    fn insert_element(&mut self, tag: TagId, attributes: AttributeList, self_closing: bool) {
        let descend = self.catalogue.flags(tag) & tag::EMPTY == 0
            && !(self_closing && self.options.xml_mode);

        let parent = match self.insertion_parent() {
            Some(parent) => parent,
            None => {
                // The first element of the document becomes the root.
                let node = self.tree.create_element(tag, attributes);
                self.tree.set_root(node);
                self.note_insert(node);
                if descend {
                    self.current = Some(node);
                }
                return;
            }
        };

        // A TextRun root can parent nothing; elements after it dangle.
        if self.tree.is_text(parent) {
            return;
        }

        /*
         * The implicit-close probe. Walk up from the insertion point
         * asking each ancestor's content model about the incoming tag:
         * OK stops the probe, CLOSE pops everything down to and including
         * that ancestor, PARENT keeps walking. Running out of ancestors
         * means OK.
         */
        let mut parent = parent;
        let mut probe = Some(parent);
        while let Some(node) = probe {
            let ancestor_tag = match self.tree.tag(node) {
                Some(ancestor_tag) => ancestor_tag,
                None => {
                    self.poison();
                    return;
                }
            };
            let model = match self.catalogue.model(ancestor_tag) {
                Some(model) => model,
                None => break,
            };
            match model.disposition(ancestor_tag, tag, self.options.mode, &self.catalogue) {
                Disposition::Ok => break,
                Disposition::Close => {
                    self.current = self.tree.parent(node);
                    parent = match self.insertion_parent() {
                        Some(parent) => parent,
                        None => return,
                    };
                    break;
                }
                Disposition::Parent => probe = self.tree.parent(node),
            }
        }

        let node = self.tree.create_element(tag, attributes);
        self.tree.append_child(parent, node);
        self.note_insert(node);
        if descend {
            self.current = Some(node);
        }
    }

    fn insert_end(&mut self, end_tag: TagId) {
        // An end tag closes the nearest open ancestor it explicitly
        // matches, or nothing at all.
        let mut walk = self.current;
        while let Some(node) = walk {
            match self.tree.tag(node) {
                Some(open_tag) if open_tag.end() == end_tag => {
                    self.current = self.tree.parent(node);
                    return;
                }
                _ => walk = self.tree.parent(node),
            }
        }
    }

    fn insert_text(&mut self, bytes: &[u8], trim_leading: bool, trim_trailing: bool) {
        let mut text = bytes;
        if trim_leading {
            text = strip_leading_newline(text);
        }
        if trim_trailing {
            text = strip_trailing_newline(text);
        }
        if text.is_empty() {
            return;
        }

        let parent = match self.insertion_parent() {
            Some(parent) => parent,
            None => {
                /*
                 * Leading whitespace vanishes, but a document that opens
                 * with real text roots the tree with a TextRun, the same
                 * way the first element would.
                 */
                let content_at = match text.iter().position(|b| !b.is_ascii_whitespace()) {
                    Some(content_at) => content_at,
                    None => return,
                };
                let run = self.tree.create_text_run();
                self.tree.set_root(run);
                self.tree.append_text(run, &text[content_at..]);
                self.note_insert(run);
                self.current = Some(run);
                return;
            }
        };

        if self.tree.is_text(parent) {
            // The root itself is a TextRun; later text coalesces into it.
            self.tree.append_text(parent, text);
            return;
        }

        match self.tree.last_child(parent) {
            Some(last) if self.tree.is_text(last) => {
                self.tree.append_text(last, text);
            }
            _ => {
                let run = self.tree.create_text_run();
                self.tree.append_child(parent, run);
                self.tree.append_text(run, text);
                self.note_insert(run);
            }
        }
    }

    fn run_node_handlers(&mut self) {
        if self.node_handlers.is_empty() {
            return;
        }
        if let Some(root) = self.tree.root() {
            self.walk_node_handlers(root);
        }
    }

    fn walk_node_handlers(&mut self, node: NodeRef) {
        // Handlers may mutate the subtree under their node, so the child
        // list is re-read from the tree after every callback.
        let mut index = 0;
        loop {
            let child = match self.tree.child(node, index) {
                Some(child) => child,
                None => break,
            };
            self.walk_node_handlers(child);
            index += 1;
        }

        let tag = match self.tree.tag(node) {
            Some(tag) => tag,
            None => return,
        };
        if let Some(handler) = self.node_handlers.get(&tag).cloned() {
            handler(self, node);
        }
    }

    /// Detaches and frees a subtree; part of the mutation surface offered
    /// to node handlers and scripting commands.
    pub fn remove_subtree(&mut self, node: NodeRef) -> Result<(), EngineError> {
        self.check_usable()?;
        if !self.tree.is_alive(node) {
            return Err(EngineError::InvalidState);
        }
        let parent = self.tree.parent(node);
        if self.current == Some(node) {
            self.current = parent;
        }
        self.tree.remove_subtree(node);
        if let Some(parent) = parent {
            if let Some(observer) = self.observer.as_mut() {
                observer.subtree_replaced(parent);
            }
            self.note_restyle(parent);
        }
        Ok(())
    }

    fn note_insert(&mut self, node: NodeRef) {
        if let Some(observer) = self.observer.as_mut() {
            observer.node_inserted(node);
        }
        self.note_restyle(node);
    }

    fn note_restyle(&mut self, node: NodeRef) {
        self.restyle_from = match self.restyle_from {
            None => Some(node),
            Some(existing) => self
                .tree
                .common_ancestor(existing, node)
                .or(Some(existing)),
        };
    }

    fn flush_restyle(&mut self) {
        if let (Some(node), Some(observer)) = (self.restyle_from.take(), self.observer.as_mut()) {
            observer.restyle_from(node);
        }
    }
}

fn strip_leading_newline(text: &[u8]) -> &[u8] {
    match text {
        [b'\r', b'\n', rest @ ..] => rest,
        [b'\n', rest @ ..] | [b'\r', rest @ ..] => rest,
        _ => text,
    }
}

fn strip_trailing_newline(text: &[u8]) -> &[u8] {
    match text {
        [rest @ .., b'\r', b'\n'] => rest,
        [rest @ .., b'\n'] | [rest @ .., b'\r'] => rest,
        _ => text,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tag::tags;
    use std::cell::RefCell;

    /// Renders the tree as `tag(child,child,"text")` for compact asserts.
    fn dump(engine: &Engine) -> String {
        match engine.root() {
            Some(root) => dump_node(engine, root),
            None => String::new(),
        }
    }

    fn dump_node(engine: &Engine, node: NodeRef) -> String {
        let tree = engine.tree();
        if tree.is_text(node) {
            let bytes = tree.text_bytes(node).unwrap_or_default();
            return format!("\"{}\"", String::from_utf8_lossy(&bytes));
        }
        let tag = tree.tag(node).expect("node is alive");
        let name = engine.catalogue().name(tag);
        let children: Vec<String> = tree
            .children(node)
            .into_iter()
            .map(|child| dump_node(engine, child))
            .collect();
        if children.is_empty() {
            name.to_string()
        } else {
            format!("{}({})", name, children.join(","))
        }
    }

    fn parse(html: &[u8]) -> Engine {
        let mut engine = Engine::new(EngineOptions::default());
        engine.feed(html, true).expect("feed succeeds");
        engine
    }

    #[test]
    fn implicit_list_item_close() {
        let engine = parse(b"<ul><li>a<li>b</ul>");
        assert_eq!(dump(&engine), "ul(li(\"a\"),li(\"b\"))");
    }

    #[test]
    fn stray_table_end_tag_is_dropped() {
        let engine = parse(b"<p>x</td>y</p>");
        assert_eq!(dump(&engine), "p(\"xy\")");
    }

    #[test]
    fn table_closes_paragraph_in_no_quirks_mode() {
        let engine = parse(b"<html><p>a<table><tr><td>b</td></tr></table>c</html>");
        assert_eq!(
            dump(&engine),
            "html(p(\"a\"),table(tr(td(\"b\"))),\"c\")"
        );
    }

    #[test]
    fn quirks_mode_table_stays_inside_paragraph() {
        let mut engine = Engine::new(EngineOptions {
            mode: CompatMode::Quirks,
            xml_mode: false,
        });
        engine
            .feed(b"<p>a<table><tr><td>b</td></tr></table>c</p>", true)
            .expect("feed succeeds");
        assert_eq!(dump(&engine), "p(\"a\",table(tr(td(\"b\"))),\"c\")");
    }

    #[test]
    fn head_closes_on_body() {
        let engine = parse(b"<html><head><title>t</title><body>x");
        assert_eq!(dump(&engine), "html(head(title(\"t\")),body(\"x\"))");
    }

    #[test]
    fn definition_lists_hold_both_item_kinds() {
        let engine = parse(b"<dl><dt>term<dd>meaning<dt>term2</dl>");
        assert_eq!(
            dump(&engine),
            "dl(dt(\"term\"),dd(\"meaning\"),dt(\"term2\"))"
        );
    }

    #[test]
    fn anchors_do_not_nest() {
        let engine = parse(b"<p><a href=x>one<a href=y>two</a></p>");
        assert_eq!(dump(&engine), "p(a(\"one\"),a(\"two\"))");
    }

    #[test]
    fn empty_elements_never_open() {
        let engine = parse(b"<p>a<br>b<img src=i>c</p>");
        assert_eq!(dump(&engine), "p(\"a\",br,\"b\",img,\"c\")");
    }

    #[test]
    fn tree_depth_is_bounded_by_start_tags() {
        let engine = parse(b"<div><div><div>deep</div></div></div>");
        let tree = engine.tree();
        let mut depth = 0;
        let mut walk = engine.root();
        while let Some(node) = walk {
            depth += 1;
            walk = tree.child(node, 0);
        }
        assert_eq!(depth, 4); // three divs and a text run
    }

    #[test]
    fn leading_text_becomes_the_root() {
        let engine = parse(b"plain text, no markup");
        assert_eq!(dump(&engine), "\"plain text, no markup\"");
        assert!(engine.tree().is_text(engine.root().unwrap()));
    }

    #[test]
    fn whitespace_before_the_root_is_dropped() {
        assert_eq!(parse(b"  \n\t").root(), None);
        assert_eq!(dump(&parse(b" \n <p>x</p>")), "p(\"x\")");
        // Mixed leading runs lose only the whitespace prefix.
        assert_eq!(dump(&parse(b" \n hello")), "\"hello\"");
    }

    #[test]
    fn text_root_absorbs_text_but_no_elements() {
        let engine = parse(b"hello <b>world</b>");
        assert_eq!(dump(&engine), "\"hello world\"");
    }

    #[test]
    fn attributes_reach_the_tree() {
        let engine = parse(b"<p id=\"intro\" class=lead>x</p>");
        let root = engine.root().unwrap();
        assert_eq!(
            engine.tree().attribute(root, b"id"),
            Some(b"intro".as_slice())
        );
        assert_eq!(
            engine.tree().attribute(root, b"class"),
            Some(b"lead".as_slice())
        );
    }

    #[test]
    fn script_handler_receives_attributes_and_body() {
        let captured: Rc<RefCell<Vec<(Vec<u8>, Vec<u8>)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = captured.clone();

        let mut engine = Engine::new(EngineOptions::default());
        engine.register_script_handler(
            tags::SCRIPT,
            Rc::new(move |_engine, attributes, body| {
                let kind = attributes.get(b"type").unwrap_or(b"").to_vec();
                sink.borrow_mut().push((kind, body.to_vec()));
                Ok(())
            }),
        );
        engine
            .feed(
                b"<html><script type=\"text/tcl\">if(a<b){c=\"</SCRIPT  \"}</script>x</html>",
                true,
            )
            .expect("feed succeeds");

        let captured = captured.borrow();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, b"text/tcl".to_vec());
        assert_eq!(captured[0].1, b"if(a<b){c=\"</SCRIPT  \"}".to_vec());
        // The script element itself never reaches the tree.
        assert_eq!(dump(&engine), "html(\"x\")");
    }

    #[test]
    fn script_handler_can_write_text() {
        let mut engine = Engine::new(EngineOptions::default());
        engine.register_script_handler(
            tags::SCRIPT,
            Rc::new(|engine, _attributes, _body| {
                engine
                    .write_text(b"<p>generated</p>")
                    .map_err(|e| e.to_string())
            }),
        );
        engine
            .feed(b"<html><script>emit()</script><p>static</p></html>", true)
            .expect("feed succeeds");
        assert_eq!(dump(&engine), "html(p(\"generated\"),p(\"static\"))");
    }

    #[test]
    fn write_wait_parks_the_parse() {
        let mut engine = Engine::new(EngineOptions::default());
        engine.register_script_handler(
            tags::SCRIPT,
            Rc::new(|engine, _attributes, _body| {
                engine.write_wait().map_err(|e| e.to_string())
            }),
        );
        engine
            .feed(b"<html><script>wait()</script><p>later</p>", true)
            .expect("feed succeeds");

        // Nothing after the script has been parsed yet.
        assert_eq!(dump(&engine), "html");

        // Feeding while parked only buffers.
        engine.feed(b"<p>more</p></html>", true).expect("feed succeeds");
        assert_eq!(dump(&engine), "html");

        engine.write_continue().expect("continue succeeds");
        assert_eq!(dump(&engine), "html(p(\"later\"),p(\"more\"))");
    }

    #[test]
    fn handler_errors_do_not_stop_the_parse() {
        let mut engine = Engine::new(EngineOptions::default());
        engine.register_script_handler(
            tags::SCRIPT,
            Rc::new(|_engine, _attributes, _body| Err("boom".to_string())),
        );
        engine
            .feed(b"<html><script>x</script><p>after</p></html>", true)
            .expect("feed succeeds");
        assert_eq!(dump(&engine), "html(p(\"after\"))");
    }

    #[test]
    fn write_calls_outside_handlers_are_invalid() {
        let mut engine = Engine::new(EngineOptions::default());
        assert_eq!(engine.write_wait(), Err(EngineError::InvalidState));
        assert_eq!(engine.write_continue(), Err(EngineError::InvalidState));
        assert_eq!(
            engine.write_text(b"x"),
            Err(EngineError::InvalidState)
        );
    }

    #[test]
    fn reset_invalidates_node_handles() {
        let mut engine = parse(b"<p>x</p>");
        let root = engine.root().unwrap();
        assert!(engine.tree().is_alive(root));
        engine.reset().expect("reset succeeds");
        assert!(!engine.tree().is_alive(root));
        assert_eq!(engine.root(), None);

        // The engine parses fresh input afterwards.
        engine.feed(b"<ul><li>y</ul>", true).expect("feed succeeds");
        assert_eq!(dump(&engine), "ul(li(\"y\"))");
    }

    #[test]
    fn reset_during_handler_unwinds_the_feed() {
        let mut engine = Engine::new(EngineOptions::default());
        engine.register_script_handler(
            tags::SCRIPT,
            Rc::new(|engine, _attributes, _body| {
                engine.reset().map_err(|e| e.to_string())
            }),
        );
        engine
            .feed(b"<html><script>reset()</script><p>gone</p></html>", true)
            .expect("feed succeeds");
        // Everything before and after the script was discarded.
        assert_eq!(engine.root(), None);

        engine.feed(b"<p>fresh</p>", true).expect("feed succeeds");
        assert_eq!(dump(&engine), "p(\"fresh\")");
    }

    #[test]
    fn node_handlers_run_post_order_and_may_mutate() {
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let li_order = order.clone();
        let ul_order = order.clone();

        let mut engine = Engine::new(EngineOptions::default());
        engine.register_node_handler(
            tags::LI,
            Rc::new(move |engine, node| {
                li_order.borrow_mut().push("li");
                // Drop every list item's children.
                for child in engine.tree().children(node) {
                    engine.remove_subtree(child).expect("child is alive");
                }
            }),
        );
        engine.register_node_handler(
            tags::UL,
            Rc::new(move |_engine, _node| {
                ul_order.borrow_mut().push("ul");
            }),
        );

        engine.feed(b"<ul><li>a<li>b</ul>", true).expect("feed succeeds");
        assert_eq!(*order.borrow(), vec!["li", "li", "ul"]);
        assert_eq!(dump(&engine), "ul(li,li)");
    }

    #[test]
    fn restyle_signal_coalesces_to_common_ancestor() {
        struct Recorder(Rc<RefCell<Vec<NodeRef>>>);
        impl DocumentObserver for Recorder {
            fn restyle_from(&mut self, node: NodeRef) {
                self.0.borrow_mut().push(node);
            }
        }

        let seen: Rc<RefCell<Vec<NodeRef>>> = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new(EngineOptions::default());
        engine.set_observer(Box::new(Recorder(seen.clone())));
        engine
            .feed(b"<html><p>a</p><ul><li>b</ul></html>", true)
            .expect("feed succeeds");

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], engine.root().unwrap());
    }

    #[test]
    fn xml_mode_honors_self_closing_and_interns_unknown_tags() {
        let mut engine = Engine::new(EngineOptions {
            mode: CompatMode::NoQuirks,
            xml_mode: true,
        });
        engine
            .feed(b"<html><p/><widget>w</widget><p>x</p></html>", true)
            .expect("feed succeeds");
        assert_eq!(
            dump(&engine),
            "html(p,#unknown(\"w\"),p(\"x\"))"
        );
    }

    #[test]
    fn poisoned_engine_rejects_everything() {
        let mut engine = Engine::new(EngineOptions::default());
        engine.poison();
        assert_eq!(engine.feed(b"<p>", false), Err(EngineError::Unusable));
        assert_eq!(engine.reset(), Err(EngineError::Unusable));
        assert_eq!(engine.write_continue(), Err(EngineError::Unusable));
    }

    #[test]
    fn chunked_feeding_builds_the_same_tree() {
        let html: &[u8] =
            b"<html><head><title>t</title><body><ul><li>a &amp; b<li>c</ul><pre>\nd</pre></html>";
        let expected = dump(&parse(html));
        for chunk_size in 1..html.len() {
            let mut engine = Engine::new(EngineOptions::default());
            for chunk in html.chunks(chunk_size) {
                engine.feed(chunk, false).expect("feed succeeds");
            }
            engine.feed(b"", true).expect("final feed succeeds");
            assert_eq!(dump(&engine), expected, "chunk size {chunk_size}");
        }
    }
}
