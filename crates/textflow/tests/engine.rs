//! End-to-end checks: feed bytes in, inspect the tree, lay out a block's
//! inline content, and hold the cross-component laws.

use quickcheck_macros::quickcheck;
use textflow::canvas::Primitive;
use textflow::dom::NodeRef;
use textflow::inline::{InlineBorder, InlineContext, LineBoxResult, FORCE_BOX, FORCE_LINE};
use textflow::style::{ComputedValues, FixedMeasure};
use textflow::{CompatMode, Engine, EngineOptions};

fn dump(engine: &Engine) -> String {
    fn node(engine: &Engine, at: NodeRef, out: &mut String) {
        let tree = engine.tree();
        if tree.is_text(at) {
            let bytes = tree.text_bytes(at).unwrap_or_default();
            out.push('"');
            out.push_str(&String::from_utf8_lossy(&bytes));
            out.push('"');
            return;
        }
        let Some(tag) = tree.tag(at) else { return };
        out.push_str(engine.catalogue().name(tag));
        let children = tree.children(at);
        if !children.is_empty() {
            out.push('(');
            for (i, child) in children.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                node(engine, child, out);
            }
            out.push(')');
        }
    }

    let mut out = String::new();
    if let Some(root) = engine.root() {
        node(engine, root, &mut out);
    }
    out
}

fn parse(html: &[u8]) -> Engine {
    let mut engine = Engine::new(EngineOptions::default());
    engine.feed(html, true).expect("feed succeeds");
    engine
}

#[test]
fn implicit_list_item_close() {
    assert_eq!(parse(b"<ul><li>a<li>b</ul>").root().is_some(), true);
    assert_eq!(dump(&parse(b"<ul><li>a<li>b</ul>")), "ul(li(\"a\"),li(\"b\"))");
}

#[test]
fn stray_cell_end_tag_is_ignored() {
    assert_eq!(dump(&parse(b"<p>x</td>y</p>")), "p(\"xy\")");
}

#[test]
fn quirks_mode_admits_table_in_paragraph() {
    let mut engine = Engine::new(EngineOptions {
        mode: CompatMode::Quirks,
        xml_mode: false,
    });
    engine
        .feed(b"<p>a<table><tr><td>b</td></tr></table>c</p>", true)
        .expect("feed succeeds");
    assert_eq!(dump(&engine), "p(\"a\",table(tr(td(\"b\"))),\"c\")");

    // The same input closes the paragraph in no-quirks mode.
    assert_eq!(
        dump(&parse(b"<html><p>a<table><tr><td>b</td></tr></table>c</p></html>")),
        "html(p(\"a\"),table(tr(td(\"b\"))),\"c\")"
    );
}

#[test]
fn script_bodies_are_opaque_to_the_tree() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let body: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = body.clone();

    let mut engine = Engine::new(EngineOptions::default());
    engine.register_script_handler(
        textflow::tag::tags::SCRIPT,
        Rc::new(move |_engine, _attributes, script| {
            sink.borrow_mut().extend_from_slice(script);
            Ok(())
        }),
    );
    engine
        .feed(b"<html><script>if(a<b){c=\"</SCRIPT  \"}</script></html>", true)
        .expect("feed succeeds");

    assert_eq!(body.borrow().as_slice(), b"if(a<b){c=\"</SCRIPT  \"}");
    assert_eq!(dump(&engine), "html");
}

#[test]
fn parsed_text_lays_out_into_bounded_lines() {
    let engine = parse(b"<html><p>the quick brown fox jumps over the lazy dog</p></html>");

    let tree = engine.tree();
    let root = engine.root().expect("document has a root");
    let paragraph = tree.child(root, 0).expect("root has the paragraph");
    let text = tree.child(paragraph, 0).expect("paragraph has text");
    assert!(tree.is_text(text));
    let fragments = tree.fragments(text).expect("text run has fragments").to_vec();

    let measure = FixedMeasure { char_width: 10 };
    let values = ComputedValues::default();
    let mut context = InlineContext::new(
        &measure,
        Some(paragraph),
        &values,
        CompatMode::NoQuirks,
        false,
        0,
        false,
    );
    let root_border = context.push_border(InlineBorder::new(Some(paragraph), &values));
    context.add_text(Some(text), &fragments, &values);
    context.pop_border(root_border);

    const AVAILABLE: i32 = 120;
    let mut lines = 0;
    loop {
        match context.get_line_box(AVAILABLE, FORCE_LINE) {
            LineBoxResult::Line(line) => {
                lines += 1;
                assert!(
                    line.canvas.right() <= AVAILABLE,
                    "line {lines} overflows: {}px",
                    line.canvas.right()
                );
                assert!(line.height > 0);
                assert!(line.ascent > 0);
            }
            LineBoxResult::NeedMoreInput => break,
            LineBoxResult::NeedsWidth(_) => panic!("every word fits in {AVAILABLE}px"),
        }
        assert!(lines < 100, "layout failed to drain the context");
    }

    assert!(lines >= 3, "expected several lines, got {lines}");
    assert!(context.is_empty());
}

#[test]
fn forced_boxes_may_overflow_but_nothing_else_does() {
    let engine = parse(b"<p>aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa word</p>");
    let tree = engine.tree();
    let paragraph = engine.root().unwrap();
    let text = tree.child(paragraph, 0).unwrap();
    let fragments = tree.fragments(text).unwrap().to_vec();

    let measure = FixedMeasure { char_width: 10 };
    let values = ComputedValues::default();
    let mut context = InlineContext::new(
        &measure,
        None,
        &values,
        CompatMode::NoQuirks,
        false,
        0,
        false,
    );
    let border = context.push_border(InlineBorder::new(None, &values));
    context.add_text(Some(text), &fragments, &values);
    context.pop_border(border);

    match context.get_line_box(100, FORCE_LINE) {
        LineBoxResult::NeedsWidth(min) => assert_eq!(min, 300),
        other => panic!("expected NeedsWidth, got {other:?}"),
    }
    match context.get_line_box(100, FORCE_LINE | FORCE_BOX) {
        LineBoxResult::Line(line) => assert!(line.canvas.right() > 100),
        other => panic!("expected a line, got {other:?}"),
    }
}

#[test]
fn pre_blocks_preserve_line_structure() {
    let engine = parse(b"<pre>\nfirst line\nsecond</pre>");
    let tree = engine.tree();
    let pre = engine.root().unwrap();
    let text = tree.child(pre, 0).unwrap();

    // The authoring newline right after <pre> was trimmed.
    assert_eq!(
        tree.text_bytes(text).unwrap(),
        b"first line\nsecond".to_vec()
    );

    let fragments = tree.fragments(text).unwrap().to_vec();
    let measure = FixedMeasure { char_width: 10 };
    let mut values = ComputedValues::default();
    values.white_space = textflow::style::WhiteSpace::Pre;

    let mut context = InlineContext::new(
        &measure,
        None,
        &values,
        CompatMode::NoQuirks,
        false,
        0,
        false,
    );
    let border = context.push_border(InlineBorder::new(None, &values));
    context.add_text(Some(text), &fragments, &values);
    context.pop_border(border);

    // Preformatted text breaks at the explicit newline.
    let mut text_runs_per_line = Vec::new();
    while let LineBoxResult::Line(line) = context.get_line_box(1000, FORCE_LINE) {
        let texts = line
            .canvas
            .items()
            .iter()
            .filter(|item| {
                matches!(&item.primitive, Primitive::Text { text, .. } if !text.is_empty())
            })
            .count();
        text_runs_per_line.push(texts);
    }
    assert_eq!(text_runs_per_line.len(), 2);
    assert!(context.is_empty());
}

#[test]
fn text_run_bytes_match_source_modulo_trims() {
    let engine = parse(b"<p>alpha &amp; beta</p>");
    let tree = engine.tree();
    let text = tree.child(engine.root().unwrap(), 0).unwrap();
    assert_eq!(tree.text_bytes(text).unwrap(), b"alpha & beta".to_vec());
}

#[quickcheck]
fn any_chunking_builds_the_same_tree(cuts: Vec<usize>) -> bool {
    let html: &[u8] = b"<html><head><title>t</title></head><body>\
        <ul><li>one &amp; two<li>three</ul>\
        <p>a<a href='x'>link</a>b</p>\
        <pre>\nkeep  this</pre><!-- note --></body></html>";

    let expected = dump(&parse(html));

    let mut boundaries: Vec<usize> = cuts.iter().map(|c| c % (html.len() + 1)).collect();
    boundaries.push(0);
    boundaries.push(html.len());
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut engine = Engine::new(EngineOptions::default());
    for window in boundaries.windows(2) {
        engine
            .feed(&html[window[0]..window[1]], false)
            .expect("feed succeeds");
    }
    engine.feed(b"", true).expect("final feed succeeds");

    dump(&engine) == expected
}
