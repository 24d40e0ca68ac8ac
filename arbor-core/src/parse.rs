//! Tree-sitter parser adapter for Python source

use crate::ArborError;
use tree_sitter::{Node as TsNode, Parser, Tree};

/// Parse Python source into a concrete syntax tree.
///
/// A fresh parser is built per call, so concurrent parses on distinct
/// inputs are safe.
pub fn parse(source: &[u8]) -> crate::Result<Tree> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ArborError::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ArborError::Parse("grammar produced no tree".to_string()))
}

/// Source text covered by a node
pub fn node_text(node: TsNode<'_>, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.start_byte()..node.end_byte()]).into_owned()
}

/// All children in tree order
pub fn children<'t>(node: TsNode<'t>) -> impl Iterator<Item = TsNode<'t>> {
    (0..node.child_count()).filter_map(move |i| node.child(i))
}

/// First child with the given node-type tag
pub fn child_of_kind<'t>(node: TsNode<'t>, kind: &str) -> Option<TsNode<'t>> {
    children(node).find(|c| c.kind() == kind)
}
