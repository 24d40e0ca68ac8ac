//! Record types for the code knowledge graph

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of a structural node extracted from source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    Method,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "class" => Some(Self::Class),
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            _ => None,
        }
    }
}

/// Kind of a directed relation between two node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    Decorates,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::Decorates => "decorates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calls" => Some(Self::Calls),
            "imports" => Some(Self::Imports),
            "inherits" => Some(Self::Inherits),
            "decorates" => Some(Self::Decorates),
            _ => None,
        }
    }
}

/// Structural entity extracted from source.
///
/// `id` is the qualified dotted name ("pkg.mod.Class.method"), unique within
/// a project. Every node except modules carries a `parent_id` pointing at its
/// enclosing node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Unqualified short name
    pub name: String,
    pub file_path: String,
    /// 1-based inclusive source range
    pub line_start: usize,
    pub line_end: usize,
    pub parent_id: Option<String>,
    /// Definition header up to (excluding) the body separator; absent for
    /// classes and modules
    pub signature: Option<String>,
    pub docstring: Option<String>,
    /// Decorator expressions in source order, leading `@` stripped
    pub decorators: Vec<String>,
    /// Reserved for synthesized placeholder nodes; the indexer never sets it
    pub is_external: bool,
    pub file_hash: String,
    pub indexed_at: f64,
}

/// Directed relation between two node ids.
///
/// `target_id` may be unresolved: the walks record syntactic references
/// verbatim, so targets are opaque strings until a resolver rewrites them.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: Option<i64>,
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    /// Location of the reference in source
    pub file_path: String,
    pub line: Option<usize>,
    /// Reserved; the writer sets false
    pub resolved: bool,
}

impl Edge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: EdgeKind,
        file_path: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            id: None,
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            file_path: file_path.into(),
            line: Some(line),
            resolved: false,
        }
    }
}

/// Free-form session note, optionally linked to a node
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub id: Option<i64>,
    pub content: String,
    pub node_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: f64,
    /// Coarse origin tag: "user" | "claude" | "git" | "hook" | ...
    pub source: String,
}

/// One row per ingested file
#[derive(Debug, Clone, Serialize)]
pub struct IndexedFile {
    pub file_path: String,
    pub file_hash: String,
    pub indexed_at: f64,
    pub node_count: usize,
}

/// Current wall-clock time as epoch seconds
pub fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
