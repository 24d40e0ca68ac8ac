//! Context capsule markdown generator

use crate::graph::Graph;
use crate::model::{EdgeKind, NodeKind};
use crate::observations::ObservationStore;
use crate::skeleton::skeletonize;
use crate::store::Store;
use std::collections::HashSet;

/// Rough token estimate: ~4 chars per token
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Generate a context capsule markdown document for a node.
///
/// Sections in order, each omitted when empty: title and location,
/// signature, docstring, decorators, parent class skeleton, dependency and
/// dependent tables at the requested depth, linked observations, and a
/// token-estimate footer. Returns `None` for an unknown node id.
pub fn generate_capsule(
    store: &Store,
    node_id: &str,
    depth: usize,
) -> crate::Result<Option<String>> {
    let Some(node) = store.get_node(node_id)? else {
        return Ok(None);
    };

    let graph = Graph::new(store);
    let obs_store = ObservationStore::new(store);
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!("# Context Capsule: `{}`\n", node.id));

    sections.push(format!("**Kind:** {}  ", node.kind.as_str()));
    sections.push(format!("**File:** `{}`  ", node.file_path));
    sections.push(format!("**Lines:** {}–{}\n", node.line_start, node.line_end));

    if let Some(signature) = &node.signature {
        sections.push("## Signature\n".to_string());
        sections.push(format!("```python\n{signature}\n```\n"));
    }

    if let Some(docstring) = &node.docstring {
        sections.push("## Docstring\n".to_string());
        sections.push(format!("> {docstring}\n"));
    }

    if !node.decorators.is_empty() {
        sections.push("## Decorators\n".to_string());
        for dec in &node.decorators {
            sections.push(format!("- `@{dec}`"));
        }
        sections.push(String::new());
    }

    if let Some(parent_id) = &node.parent_id {
        if let Some(parent) = store.get_node(parent_id)? {
            if parent.kind == NodeKind::Class {
                sections.push("## Parent Class\n".to_string());
                match class_skeleton(&parent.file_path, &parent.name) {
                    Some(snippet) if !snippet.is_empty() => {
                        sections.push(format!("```python\n{snippet}\n```\n"));
                    }
                    _ => {
                        sections.push(format!(
                            "Parent: `{}` ({})\n",
                            parent.id,
                            parent.kind.as_str()
                        ));
                    }
                }
            }
        }
    }

    let deps = graph.dependencies(node_id, None, depth)?;
    if !deps.is_empty() {
        sections.push("## Dependencies\n".to_string());
        sections.push("| Target | Kind | Line |".to_string());
        sections.push("|--------|------|------|".to_string());
        let mut seen: HashSet<(String, EdgeKind)> = HashSet::new();
        for edge in &deps {
            if seen.insert((edge.target_id.clone(), edge.kind)) {
                sections.push(format!(
                    "| `{}` | {} | {} |",
                    edge.target_id,
                    edge.kind.as_str(),
                    edge.line.map_or("—".to_string(), |l| l.to_string())
                ));
            }
        }
        sections.push(String::new());
    }

    let dependents = graph.dependents(node_id, None, depth)?;
    if !dependents.is_empty() {
        sections.push("## Dependents\n".to_string());
        sections.push("| Source | Kind | Line |".to_string());
        sections.push("|--------|------|------|".to_string());
        let mut seen: HashSet<(String, EdgeKind)> = HashSet::new();
        for edge in &dependents {
            if seen.insert((edge.source_id.clone(), edge.kind)) {
                sections.push(format!(
                    "| `{}` | {} | {} |",
                    edge.source_id,
                    edge.kind.as_str(),
                    edge.line.map_or("—".to_string(), |l| l.to_string())
                ));
            }
        }
        sections.push(String::new());
    }

    let observations = obs_store.list(Some(node_id), None)?;
    if !observations.is_empty() {
        sections.push("## Observations\n".to_string());
        for obs in &observations {
            let tags = if obs.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", obs.tags.join(", "))
            };
            sections.push(format!("- {}{tags}", obs.content));
        }
        sections.push(String::new());
    }

    let mut content = sections.join("\n");
    let tokens = estimate_tokens(&content);
    content.push_str(&format!("\n---\n*Estimated tokens: ~{tokens}*\n"));
    Ok(Some(content))
}

/// Skeletonize the parent's source file and cut out the lines from the
/// class header through the end of its indented region. Any I/O or parse
/// failure degrades to `None` and the caller falls back to one line.
fn class_skeleton(file_path: &str, class_name: &str) -> Option<String> {
    let source = std::fs::read_to_string(file_path).ok()?;
    let skeleton = skeletonize(&source).ok()?;

    let mut class_lines: Vec<&str> = Vec::new();
    let mut in_class = false;
    let header = format!("class {class_name}");
    for line in skeleton.lines() {
        if line.contains(&header) {
            in_class = true;
        }
        if in_class {
            class_lines.push(line);
            let top_level = line
                .chars()
                .next()
                .is_some_and(|c| !c.is_whitespace());
            if !class_lines.is_empty()
                && !line.is_empty()
                && top_level
                && !line.starts_with("class")
            {
                class_lines.pop();
                break;
            }
        }
    }

    if class_lines.is_empty() {
        None
    } else {
        Some(class_lines.join("\n"))
    }
}
