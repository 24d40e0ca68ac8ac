//! Tree-sitter based Python indexer: symbols, imports, calls, incremental skip

use crate::config::Config;
use crate::model::{now_epoch, Edge, EdgeKind, IndexedFile, Node, NodeKind};
use crate::parse::{self, child_of_kind, children, node_text};
use crate::store::Store;
use crate::ArborError;
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree_sitter::Node as TsNode;

/// Lowercase hex sha256 of file contents
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Convert a file path to its module-style qualified name: relative to the
/// project root, `__init__` sentinel dropped at the leaf, extension stripped,
/// joined with dots.
pub fn module_id_from_path(
    file_path: &Path,
    project_root: &Path,
    extension: &str,
) -> crate::Result<String> {
    let rel = file_path.strip_prefix(project_root).map_err(|_| {
        ArborError::InvalidInput(format!(
            "{} is outside the project root",
            file_path.display()
        ))
    })?;
    let mut parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let suffix = format!(".{extension}");
    let init = format!("__init__{suffix}");
    if parts.last().is_some_and(|last| *last == init) {
        parts.pop();
    } else if let Some(last) = parts.last_mut() {
        if let Some(trimmed) = last.strip_suffix(&suffix) {
            *last = trimmed.to_string();
        }
    }
    Ok(parts.join("."))
}

/// Resolve a path even when the file no longer exists (deletion events):
/// canonicalize the parent and re-append the file name.
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf()),
            _ => path.to_path_buf(),
        }
    })
}

/// Everything derived from one file, ready for a single write transaction
struct IndexUnit {
    file_path: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    file: IndexedFile,
}

/// Indexes Python files into the store
pub struct Indexer {
    store: Arc<Store>,
    project_root: PathBuf,
    config: Config,
}

impl Indexer {
    pub fn new(
        store: Arc<Store>,
        project_root: impl AsRef<Path>,
        config: Config,
    ) -> crate::Result<Self> {
        let project_root = project_root.as_ref().canonicalize()?;
        Ok(Self {
            store,
            project_root,
            config,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Index a single file. Skips the parse when an indexed-file row with the
    /// same content hash exists and `force` is false, returning the stored
    /// nodes instead.
    pub fn index_file(&self, path: &Path, force: bool) -> crate::Result<Vec<Node>> {
        let file_path = normalize_path(path);
        let bytes = fs::read(&file_path)?;
        let fp = file_path.to_string_lossy().to_string();
        let fhash = content_hash(&bytes);

        if !force {
            if let Some(existing) = self.store.get_indexed_file(&fp)? {
                if existing.file_hash == fhash {
                    return self.store.list_nodes(Some(&fp), None, None, None);
                }
            }
        }

        let unit = self.extract_unit(&file_path, &bytes, fhash)?;
        self.store
            .apply_index_batch(&unit.file_path, &unit.nodes, &unit.edges, &unit.file)?;
        Ok(unit.nodes)
    }

    /// Drop all index data for a file
    pub fn remove_file(&self, path: &Path) -> crate::Result<()> {
        let fp = normalize_path(path).to_string_lossy().to_string();
        self.store.delete_nodes_for_file(&fp)?;
        self.store.delete_edges_for_file(&fp)?;
        self.store.delete_indexed_file(&fp)?;
        Ok(())
    }

    /// Index every matching file under the project root. Files are parsed on
    /// the rayon pool and drained by this thread, which owns all writes; a
    /// file that fails to read or parse is skipped, never aborting the walk.
    /// Returns the number of files walked (indexed or skipped).
    pub fn index_project(&self, force: bool) -> crate::Result<usize> {
        let files = self.project_files()?;
        let count = files.len();
        let existing: HashMap<String, String> = self
            .store
            .list_indexed_files()?
            .into_iter()
            .map(|f| (f.file_path, f.file_hash))
            .collect();

        let (tx, rx) = crossbeam_channel::bounded::<IndexUnit>(64);
        let result: crate::Result<()> = std::thread::scope(|s| {
            let existing = &existing;
            let indexer = &*self;
            s.spawn(move || {
                files.par_iter().for_each_with(tx, |sender, path| {
                    match indexer.parse_candidate(path, existing, force) {
                        Ok(Some(unit)) => {
                            // Writer gone means the walk is aborting; drop quietly
                            let _ = sender.send(unit);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            tracing::debug!("skipping {}: {err}", path.display());
                        }
                    }
                });
            });

            for unit in rx {
                self.store
                    .apply_index_batch(&unit.file_path, &unit.nodes, &unit.edges, &unit.file)?;
            }
            Ok(())
        });
        result?;
        Ok(count)
    }

    /// Read, hash-check, and parse one candidate off the store thread.
    /// `Ok(None)` means the stored hash already matches.
    fn parse_candidate(
        &self,
        path: &Path,
        existing: &HashMap<String, String>,
        force: bool,
    ) -> crate::Result<Option<IndexUnit>> {
        let file_path = normalize_path(path);
        let bytes = fs::read(&file_path)?;
        let fp = file_path.to_string_lossy().to_string();
        let fhash = content_hash(&bytes);
        if !force && existing.get(&fp).is_some_and(|h| *h == fhash) {
            return Ok(None);
        }
        Ok(Some(self.extract_unit(&file_path, &bytes, fhash)?))
    }

    /// Enumerate matching files under the project root, skipping dot-prefixed
    /// segments and the fixed ignore set. Sorted for deterministic walks.
    fn project_files(&self) -> crate::Result<Vec<PathBuf>> {
        let mut builder = WalkBuilder::new(&self.project_root);
        builder
            .hidden(true)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false);

        let mut files = Vec::new();
        for entry in builder.build() {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_none_or(|t| !t.is_file()) {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str())
                != Some(self.config.indexing.extension.as_str())
            {
                continue;
            }
            let rel = path.strip_prefix(&self.project_root).unwrap_or(path);
            if self.config.is_ignored(rel) {
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        Ok(files)
    }

    fn extract_unit(
        &self,
        file_path: &Path,
        bytes: &[u8],
        file_hash: String,
    ) -> crate::Result<IndexUnit> {
        let module_id = module_id_from_path(
            file_path,
            &self.project_root,
            &self.config.indexing.extension,
        )?;
        let fp = file_path.to_string_lossy().to_string();
        let now = now_epoch();

        let tree = parse::parse(bytes)?;
        let root = tree.root_node();

        let mut walker = Walker {
            source: bytes,
            file_path: &fp,
            file_hash: &file_hash,
            indexed_at: now,
            nodes: Vec::new(),
            edges: Vec::new(),
        };

        walker.nodes.push(Node {
            id: module_id.clone(),
            kind: NodeKind::Module,
            name: module_id
                .rsplit('.')
                .next()
                .unwrap_or(&module_id)
                .to_string(),
            file_path: fp.clone(),
            line_start: root.start_position().row + 1,
            line_end: root.end_position().row + 1,
            parent_id: None,
            signature: None,
            docstring: None,
            decorators: Vec::new(),
            is_external: false,
            file_hash: file_hash.clone(),
            indexed_at: now,
        });

        walker.walk_container(root, &module_id, false);
        walker.walk_imports(root, &module_id);

        let Walker { nodes, edges, .. } = walker;
        let node_count = nodes.len();
        Ok(IndexUnit {
            file_path: fp.clone(),
            nodes,
            edges,
            file: IndexedFile {
                file_path: fp,
                file_hash,
                indexed_at: now,
                node_count,
            },
        })
    }
}

/// Single traversal that maintains the scope stack while emitting nodes,
/// symbol edges, and call edges together.
struct Walker<'a> {
    source: &'a [u8],
    file_path: &'a str,
    file_hash: &'a str,
    indexed_at: f64,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Walker<'_> {
    /// Walk the direct children of a module root or definition body
    fn walk_container(&mut self, container: TsNode<'_>, scope_id: &str, in_class: bool) {
        for child in children(container) {
            let (actual, decorators) = self.unwrap_decorated(child);
            match actual.kind() {
                "function_definition" => self.emit_function(actual, decorators, scope_id, in_class),
                "class_definition" => self.emit_class(actual, decorators, scope_id),
                _ => self.scan_calls(child, scope_id),
            }
        }
    }

    fn unwrap_decorated<'t>(&self, node: TsNode<'t>) -> (TsNode<'t>, Vec<String>) {
        if node.kind() != "decorated_definition" {
            return (node, Vec::new());
        }
        let decorators = children(node)
            .filter(|c| c.kind() == "decorator")
            .map(|d| {
                node_text(d, self.source)
                    .trim_start_matches('@')
                    .trim()
                    .to_string()
            })
            .collect();
        let inner = child_of_kind(node, "function_definition")
            .or_else(|| child_of_kind(node, "class_definition"))
            .unwrap_or(node);
        (inner, decorators)
    }

    fn emit_function(
        &mut self,
        def: TsNode<'_>,
        decorators: Vec<String>,
        parent_id: &str,
        in_class: bool,
    ) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let node_id = format!("{parent_id}.{name}");
        let kind = if in_class {
            NodeKind::Method
        } else {
            NodeKind::Function
        };
        let body = def.child_by_field_name("body");
        let line = def.start_position().row + 1;

        for dec in &decorators {
            let head = dec.split('(').next().unwrap_or(dec);
            self.edges.push(Edge::new(
                &node_id,
                head,
                EdgeKind::Decorates,
                self.file_path,
                line,
            ));
        }

        self.nodes.push(Node {
            id: node_id.clone(),
            kind,
            name,
            file_path: self.file_path.to_string(),
            line_start: line,
            line_end: def.end_position().row + 1,
            parent_id: Some(parent_id.to_string()),
            signature: Some(self.build_signature(def)),
            docstring: self.extract_docstring(body),
            decorators,
            is_external: false,
            file_hash: self.file_hash.to_string(),
            indexed_at: self.indexed_at,
        });

        if let Some(body) = body {
            self.walk_container(body, &node_id, false);
        }
    }

    fn emit_class(&mut self, def: TsNode<'_>, decorators: Vec<String>, parent_id: &str) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let node_id = format!("{parent_id}.{name}");
        let body = def.child_by_field_name("body");
        let line = def.start_position().row + 1;

        if let Some(superclasses) = def.child_by_field_name("superclasses") {
            for arg in children(superclasses) {
                if arg.kind() == "identifier" {
                    self.edges.push(Edge::new(
                        &node_id,
                        node_text(arg, self.source),
                        EdgeKind::Inherits,
                        self.file_path,
                        line,
                    ));
                }
            }
        }

        for dec in &decorators {
            let head = dec.split('(').next().unwrap_or(dec);
            self.edges.push(Edge::new(
                &node_id,
                head,
                EdgeKind::Decorates,
                self.file_path,
                line,
            ));
        }

        self.nodes.push(Node {
            id: node_id.clone(),
            kind: NodeKind::Class,
            name,
            file_path: self.file_path.to_string(),
            line_start: line,
            line_end: def.end_position().row + 1,
            parent_id: Some(parent_id.to_string()),
            signature: None,
            docstring: self.extract_docstring(body),
            decorators,
            is_external: false,
            file_hash: self.file_hash.to_string(),
            indexed_at: self.indexed_at,
        });

        if let Some(body) = body {
            self.walk_container(body, &node_id, true);
        }
    }

    /// Find call expressions under a non-definition statement. Definitions
    /// nested in other statements (conditional defs) still extend the scope
    /// id even though the symbol walk does not materialize them.
    fn scan_calls(&mut self, node: TsNode<'_>, scope_id: &str) {
        let (actual, _) = self.unwrap_decorated(node);
        match actual.kind() {
            "function_definition" | "class_definition" => {
                if let Some(name_node) = actual.child_by_field_name("name") {
                    let new_scope = format!("{scope_id}.{}", node_text(name_node, self.source));
                    if let Some(body) = actual.child_by_field_name("body") {
                        for child in children(body) {
                            self.scan_calls(child, &new_scope);
                        }
                    }
                }
                return;
            }
            "call" => {
                if let Some(func) = actual.child_by_field_name("function") {
                    self.edges.push(Edge::new(
                        scope_id,
                        node_text(func, self.source),
                        EdgeKind::Calls,
                        self.file_path,
                        actual.start_position().row + 1,
                    ));
                }
            }
            _ => {}
        }
        for child in children(node) {
            self.scan_calls(child, scope_id);
        }
    }

    /// Top-level import statements only; not recursive
    fn walk_imports(&mut self, root: TsNode<'_>, module_id: &str) {
        for child in children(root) {
            let line = child.start_position().row + 1;
            match child.kind() {
                "import_statement" => {
                    for sub in children(child) {
                        if sub.kind() == "dotted_name" {
                            self.edges.push(Edge::new(
                                module_id,
                                node_text(sub, self.source),
                                EdgeKind::Imports,
                                self.file_path,
                                line,
                            ));
                        }
                    }
                }
                "import_from_statement" => {
                    let mut module_name: Option<String> = None;
                    let mut imported: Vec<String> = Vec::new();
                    for sub in children(child) {
                        match sub.kind() {
                            "dotted_name" if module_name.is_none() => {
                                module_name = Some(node_text(sub, self.source));
                            }
                            "dotted_name" => imported.push(node_text(sub, self.source)),
                            "aliased_import" => {
                                if let Some(name_node) = sub.child_by_field_name("name") {
                                    imported.push(node_text(name_node, self.source));
                                }
                            }
                            _ => {}
                        }
                    }
                    if let Some(module_name) = module_name {
                        if imported.is_empty() {
                            // wildcard or bare re-export
                            self.edges.push(Edge::new(
                                module_id,
                                module_name,
                                EdgeKind::Imports,
                                self.file_path,
                                line,
                            ));
                        } else {
                            for name in &imported {
                                self.edges.push(Edge::new(
                                    module_id,
                                    format!("{module_name}.{name}"),
                                    EdgeKind::Imports,
                                    self.file_path,
                                    line,
                                ));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Definition header tokens up to the colon, space-joined, colon re-appended
    fn build_signature(&self, def: TsNode<'_>) -> String {
        let mut parts = Vec::new();
        for child in children(def) {
            if child.kind() == ":" {
                break;
            }
            parts.push(node_text(child, self.source));
        }
        format!("{}:", parts.join(" "))
    }

    /// Docstring when the first statement of the body is a string literal
    fn extract_docstring(&self, body: Option<TsNode<'_>>) -> Option<String> {
        let body = body?;
        if body.kind() != "block" {
            return None;
        }
        for child in children(body) {
            if child.kind() == "expression_statement" {
                if let Some(sub) = child_of_kind(child, "string") {
                    return Some(clean_docstring(&node_text(sub, self.source)));
                }
                break;
            }
            if !matches!(child.kind(), "comment" | "newline") {
                break;
            }
        }
        None
    }
}

fn clean_docstring(raw: &str) -> String {
    for quote in ["\"\"\"", "'''"] {
        if raw.len() >= 6 && raw.starts_with(quote) && raw.ends_with(quote) {
            return raw[3..raw.len() - 3].trim().to_string();
        }
    }
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return raw[1..raw.len() - 1].trim().to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SIMPLE_MODULE: &str = r#""""A simple module for testing."""

import os
from pathlib import Path


def greet(name: str) -> str:
    """Return a greeting string."""
    return f"Hello, {name}!"


def farewell(name: str) -> str:
    """Say goodbye."""
    msg = greet(name)
    return msg.replace("Hello", "Goodbye")


CONSTANT = 42
"#;

    const CLASS_MODULE: &str = r#""""Module with a class hierarchy."""

from dataclasses import dataclass


@dataclass
class Base:
    """A base class."""
    name: str

    def describe(self) -> str:
        """Describe this object."""
        return f"Base({self.name})"


class Child(Base):
    """A child class inheriting from Base."""

    def describe(self) -> str:
        """Override describe."""
        base = super().describe()
        return f"Child -> {base}"

    def greet(self) -> str:
        """Greet using name."""
        return f"Hi, I'm {self.name}"
"#;

    fn setup(files: &[(&str, &str)]) -> (TempDir, Arc<Store>, Indexer) {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let store = Arc::new(Store::open_in_memory().unwrap());
        let indexer = Indexer::new(Arc::clone(&store), dir.path(), Config::default()).unwrap();
        (dir, store, indexer)
    }

    #[test]
    fn simple_module_nodes_and_edges() {
        let (dir, store, indexer) = setup(&[("simple_module.py", SIMPLE_MODULE)]);
        indexer
            .index_file(&dir.path().join("simple_module.py"), false)
            .unwrap();

        let module = store.get_node("simple_module").unwrap().unwrap();
        assert_eq!(module.kind, NodeKind::Module);
        assert!(module.parent_id.is_none());

        let greet = store.get_node("simple_module.greet").unwrap().unwrap();
        assert_eq!(greet.kind, NodeKind::Function);
        assert_eq!(greet.parent_id.as_deref(), Some("simple_module"));
        let signature = greet.signature.unwrap();
        assert!(signature.contains("name: str"));
        assert!(signature.contains("-> str"));
        assert!(signature.ends_with(':'));
        assert_eq!(greet.docstring.as_deref(), Some("Return a greeting string."));

        let imports = store
            .get_edges(Some("simple_module"), None, Some(EdgeKind::Imports))
            .unwrap();
        let targets: Vec<&str> = imports.iter().map(|e| e.target_id.as_str()).collect();
        assert!(targets.contains(&"os"));
        assert!(targets.contains(&"pathlib.Path"));

        let calls = store
            .get_edges(Some("simple_module.farewell"), None, Some(EdgeKind::Calls))
            .unwrap();
        assert!(calls.iter().any(|e| e.target_id == "greet"));
    }

    #[test]
    fn class_hierarchy_methods_and_inheritance() {
        let (dir, store, indexer) = setup(&[("class_with_methods.py", CLASS_MODULE)]);
        indexer
            .index_file(&dir.path().join("class_with_methods.py"), false)
            .unwrap();

        let base = store.get_node("class_with_methods.Base").unwrap().unwrap();
        assert_eq!(base.kind, NodeKind::Class);
        assert_eq!(base.decorators, vec!["dataclass"]);

        let greet = store
            .get_node("class_with_methods.Child.greet")
            .unwrap()
            .unwrap();
        assert_eq!(greet.kind, NodeKind::Method);
        assert_eq!(greet.parent_id.as_deref(), Some("class_with_methods.Child"));

        let inherits = store
            .get_edges(
                Some("class_with_methods.Child"),
                None,
                Some(EdgeKind::Inherits),
            )
            .unwrap();
        assert!(inherits.iter().any(|e| e.target_id == "Base"));

        let decorates = store
            .get_edges(
                Some("class_with_methods.Base"),
                None,
                Some(EdgeKind::Decorates),
            )
            .unwrap();
        assert!(decorates.iter().any(|e| e.target_id == "dataclass"));
    }

    #[test]
    fn nested_function_is_not_a_method() {
        let source = "def outer():\n    def inner():\n        pass\n    return inner\n";
        let (dir, store, indexer) = setup(&[("m.py", source)]);
        indexer.index_file(&dir.path().join("m.py"), false).unwrap();

        let inner = store.get_node("m.outer.inner").unwrap().unwrap();
        assert_eq!(inner.kind, NodeKind::Function);
        assert_eq!(inner.parent_id.as_deref(), Some("m.outer"));
    }

    #[test]
    fn wildcard_import_falls_back_to_module() {
        let source = "from os import *\n";
        let (dir, store, indexer) = setup(&[("m.py", source)]);
        indexer.index_file(&dir.path().join("m.py"), false).unwrap();

        let imports = store
            .get_edges(Some("m"), None, Some(EdgeKind::Imports))
            .unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].target_id, "os");
    }

    #[test]
    fn module_level_calls_use_module_scope() {
        let source = "import os\n\nprint(os.getcwd())\n";
        let (dir, store, indexer) = setup(&[("m.py", source)]);
        indexer.index_file(&dir.path().join("m.py"), false).unwrap();

        let calls = store
            .get_edges(Some("m"), None, Some(EdgeKind::Calls))
            .unwrap();
        let targets: Vec<&str> = calls.iter().map(|e| e.target_id.as_str()).collect();
        assert!(targets.contains(&"print"));
        assert!(targets.contains(&"os.getcwd"));
    }

    #[test]
    fn hash_skip_and_force_reindex() {
        let (dir, store, indexer) = setup(&[("simple_module.py", SIMPLE_MODULE)]);
        let path = dir.path().join("simple_module.py");

        let first = indexer.index_file(&path, false).unwrap();
        let stamped = store.get_node("simple_module").unwrap().unwrap().indexed_at;

        // Unchanged bytes: no writes, stored nodes come back
        let second = indexer.index_file(&path, false).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(
            store.get_node("simple_module").unwrap().unwrap().indexed_at,
            stamped
        );

        let forced = indexer.index_file(&path, true).unwrap();
        assert_eq!(forced.len(), first.len());
    }

    #[test]
    fn reindex_purges_stale_rows() {
        let (dir, store, indexer) = setup(&[("m.py", "def old_name():\n    pass\n")]);
        let path = dir.path().join("m.py");
        indexer.index_file(&path, false).unwrap();
        assert!(store.get_node("m.old_name").unwrap().is_some());

        std::fs::write(&path, "def new_name():\n    pass\n").unwrap();
        indexer.index_file(&path, false).unwrap();

        assert!(store.get_node("m.old_name").unwrap().is_none());
        assert!(store.get_node("m.new_name").unwrap().is_some());
        let fp = path.canonicalize().unwrap().to_string_lossy().to_string();
        for node in store.list_nodes(Some(&fp), None, None, None).unwrap() {
            assert_eq!(
                node.file_hash,
                store.get_indexed_file(&fp).unwrap().unwrap().file_hash
            );
        }
    }

    #[test]
    fn remove_file_purges_everything() {
        let (dir, store, indexer) = setup(&[("simple_module.py", SIMPLE_MODULE)]);
        let path = dir.path().join("simple_module.py");
        indexer.index_file(&path, false).unwrap();

        indexer.remove_file(&path).unwrap();
        let fp = path.canonicalize().unwrap().to_string_lossy().to_string();
        assert!(store
            .list_nodes(Some(&fp), None, None, None)
            .unwrap()
            .is_empty());
        assert!(store.get_indexed_file(&fp).unwrap().is_none());
        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.edges, 0);
    }

    #[test]
    fn package_init_module_ids() {
        let (dir, store, indexer) = setup(&[
            ("pkg/__init__.py", "\"\"\"Package.\"\"\"\n"),
            ("pkg/core.py", "def process():\n    pass\n"),
        ]);
        indexer
            .index_file(&dir.path().join("pkg/__init__.py"), false)
            .unwrap();
        indexer
            .index_file(&dir.path().join("pkg/core.py"), false)
            .unwrap();

        assert!(store.get_node("pkg").unwrap().is_some());
        assert!(store.get_node("pkg.core.process").unwrap().is_some());
    }

    #[test]
    fn project_walk_honors_ignore_set() {
        let (_dir, store, indexer) = setup(&[
            ("a.py", "def a():\n    pass\n"),
            ("pkg/b.py", "def b():\n    pass\n"),
            ("__pycache__/c.py", "def c():\n    pass\n"),
            (".hidden/d.py", "def d():\n    pass\n"),
            ("node_modules/e.py", "def e():\n    pass\n"),
            ("notes.txt", "not python"),
        ]);
        let count = indexer.index_project(false).unwrap();
        assert_eq!(count, 2);

        assert!(store.get_node("a.a").unwrap().is_some());
        assert!(store.get_node("pkg.b.b").unwrap().is_some());
        assert!(store.get_node("__pycache__.c.c").unwrap().is_none());
    }

    #[test]
    fn project_walk_skips_unchanged_files() {
        let (dir, store, indexer) = setup(&[("m.py", "def f():\n    pass\n")]);
        indexer.index_project(false).unwrap();
        let stamped = store.get_node("m").unwrap().unwrap().indexed_at;

        indexer.index_project(false).unwrap();
        assert_eq!(store.get_node("m").unwrap().unwrap().indexed_at, stamped);

        std::fs::write(dir.path().join("m.py"), "def g():\n    pass\n").unwrap();
        indexer.index_project(false).unwrap();
        assert!(store.get_node("m.g").unwrap().is_some());
    }

    #[test]
    fn broken_file_does_not_abort_project_walk() {
        let (_dir, store, indexer) = setup(&[
            ("good.py", "def ok():\n    pass\n"),
            ("bad.py", "def broken(:\n"),
        ]);
        // tree-sitter tolerates errors, so both files walk; the good one
        // must be present either way
        indexer.index_project(false).unwrap();
        assert!(store.get_node("good.ok").unwrap().is_some());
    }

    #[test]
    fn module_id_derivation() {
        let root = Path::new("/proj");
        assert_eq!(
            module_id_from_path(Path::new("/proj/pkg/mod.py"), root, "py").unwrap(),
            "pkg.mod"
        );
        assert_eq!(
            module_id_from_path(Path::new("/proj/pkg/__init__.py"), root, "py").unwrap(),
            "pkg"
        );
        assert!(module_id_from_path(Path::new("/other/mod.py"), root, "py").is_err());
    }
}
