//! Skeletonizer: strip function bodies, keep signatures and docstrings

use crate::parse::{self, child_of_kind, children};
use std::path::Path;
use tree_sitter::Node as TsNode;

/// Replace function and method bodies with an ellipsis placeholder,
/// preserving signatures, decorators, and leading docstrings. Class bodies
/// are recursed into, not elided, so method signatures survive.
pub fn skeletonize(source: &str) -> crate::Result<String> {
    let bytes = source.as_bytes();
    let tree = parse::parse(bytes)?;

    let mut replacements: Vec<(usize, usize, Vec<u8>)> = Vec::new();
    collect_replacements(tree.root_node(), bytes, &mut replacements);

    // Apply in descending start order so earlier ranges stay valid
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result = bytes.to_vec();
    for (start, end, replacement) in replacements {
        result.splice(start..end, replacement);
    }
    Ok(String::from_utf8_lossy(&result).into_owned())
}

/// Skeletonize a file from disk
pub fn skeletonize_file(path: &Path) -> crate::Result<String> {
    skeletonize(&std::fs::read_to_string(path)?)
}

fn collect_replacements(node: TsNode<'_>, source: &[u8], replacements: &mut Vec<(usize, usize, Vec<u8>)>) {
    for child in children(node) {
        let mut actual = child;
        if child.kind() == "decorated_definition" {
            if let Some(inner) = child_of_kind(child, "function_definition")
                .or_else(|| child_of_kind(child, "class_definition"))
            {
                actual = inner;
            }
        }

        match actual.kind() {
            "function_definition" => {
                if let Some(body) = actual.child_by_field_name("body") {
                    if body.kind() == "block" {
                        replace_body(body, source, replacements);
                    }
                }
            }
            "class_definition" => {
                if let Some(body) = actual.child_by_field_name("body") {
                    if body.kind() == "block" {
                        collect_replacements(body, source, replacements);
                    }
                }
            }
            _ => collect_replacements(child, source, replacements),
        }
    }
}

/// Schedule the replacement for one function body, keeping its docstring
fn replace_body(body: TsNode<'_>, source: &[u8], replacements: &mut Vec<(usize, usize, Vec<u8>)>) {
    let statements: Vec<TsNode<'_>> = children(body).filter(|c| c.kind() != "newline").collect();

    let mut rest_start: Option<usize> = None;
    for (i, child) in statements.iter().enumerate() {
        if i == 0 && child.kind() == "expression_statement" {
            let is_docstring = child_of_kind(*child, "string").is_some();
            if is_docstring {
                rest_start = Some(match statements.get(1) {
                    Some(next) => next.start_byte(),
                    None => body.end_byte(),
                });
            } else {
                rest_start = Some(child.start_byte());
            }
            break;
        }
        if !matches!(child.kind(), "indent" | "dedent") {
            rest_start = Some(child.start_byte());
            break;
        }
    }

    let Some(rest_start) = rest_start else {
        return;
    };

    let indent = body_indent(body, source);
    replacements.push((
        rest_start,
        body.end_byte(),
        format!("{indent}...\n").into_bytes(),
    ));
}

/// Indentation prefix of the first in-body statement line
fn body_indent(body: TsNode<'_>, source: &[u8]) -> String {
    for child in children(body) {
        if matches!(child.kind(), "newline" | "indent" | "dedent") {
            continue;
        }
        let start = child.start_byte();
        let line_start = source[..start]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        return String::from_utf8_lossy(&source[line_start..start]).into_owned();
    }
    "    ".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_function_keeps_signature_and_docstring() {
        let source = "def foo(x: int) -> str:\n    \"\"\"A docstring.\"\"\"\n    return str(x)\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("def foo(x: int) -> str:"));
        assert!(result.contains("\"\"\"A docstring.\"\"\""));
        assert!(!result.contains("return str(x)"));
        assert!(result.contains("..."));
    }

    #[test]
    fn function_without_docstring_gets_bare_ellipsis() {
        let source = "def bar(x):\n    return x + 1\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("def bar(x):"));
        assert!(!result.contains("return x + 1"));
        assert!(result.contains("..."));
    }

    #[test]
    fn class_body_survives_method_bodies_do_not() {
        let source = "class Foo:\n    \"\"\"A class.\"\"\"\n\n    def method(self) -> str:\n        \"\"\"Method doc.\"\"\"\n        x = 1\n        return str(x)\n\n    def other(self):\n        pass\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("class Foo:"));
        assert!(result.contains("\"\"\"A class.\"\"\""));
        assert!(result.contains("def method(self) -> str:"));
        assert!(result.contains("\"\"\"Method doc.\"\"\""));
        assert!(!result.contains("x = 1"));
        assert!(result.contains("def other(self):"));
        assert!(!result.contains("pass"));
    }

    #[test]
    fn decorators_are_preserved() {
        let source =
            "@staticmethod\ndef helper():\n    \"\"\"Help.\"\"\"\n    do_stuff()\n    return 42\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("@staticmethod"));
        assert!(result.contains("def helper():"));
        assert!(!result.contains("do_stuff()"));
    }

    #[test]
    fn nested_class_methods_are_elided() {
        let source = "class Outer:\n    class Inner:\n        def inner_method(self):\n            \"\"\"Inner doc.\"\"\"\n            complex_logic()\n            return True\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("class Outer:"));
        assert!(result.contains("class Inner:"));
        assert!(result.contains("def inner_method(self):"));
        assert!(!result.contains("complex_logic()"));
    }

    #[test]
    fn top_level_statements_untouched() {
        let source = "import os\n\nCONSTANT = 42\n\ndef f():\n    return CONSTANT\n";
        let result = skeletonize(source).unwrap();
        assert!(result.contains("import os"));
        assert!(result.contains("CONSTANT = 42"));
        assert!(!result.contains("return CONSTANT"));
    }

    #[test]
    fn output_still_parses_with_names_in_order() {
        let source = "def first():\n    a = 1\n    return a\n\nclass Widget:\n    def render(self):\n        return \"<div>\"\n\ndef last():\n    pass\n";
        let result = skeletonize(source).unwrap();

        let tree = parse::parse(result.as_bytes()).unwrap();
        assert_eq!(tree.root_node().kind(), "module");

        let first = result.find("def first").unwrap();
        let widget = result.find("class Widget").unwrap();
        let render = result.find("def render").unwrap();
        let last = result.find("def last").unwrap();
        assert!(first < widget && widget < render && render < last);
    }
}
