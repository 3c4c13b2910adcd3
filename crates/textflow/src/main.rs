use std::fs;

use textflow::dom::NodeRef;
use textflow::{Engine, EngineOptions};

fn print_node(engine: &Engine, node: NodeRef, depth: usize) {
    let tree = engine.tree();
    let indent = "  ".repeat(depth);
    if tree.is_text(node) {
        let text = tree.text(node).unwrap_or_default();
        println!("{indent}\"{}\"", String::from_utf8_lossy(&text));
        return;
    }
    let Some(tag) = tree.tag(node) else { return };
    println!("{indent}<{}>", engine.catalogue().name(tag));
    for child in tree.children(node) {
        print_node(engine, child, depth + 1);
    }
}

pub fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./index.html".to_string());
    let html = fs::read(&path).expect("Missing input!");

    let mut engine = Engine::new(EngineOptions::default());
    engine.feed(&html, true).expect("engine is fresh");

    match engine.root() {
        Some(root) => print_node(&engine, root, 0),
        None => println!("(empty document)"),
    }
}
