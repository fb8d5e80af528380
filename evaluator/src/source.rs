// source.rs — Source positions, context source trees, lexical anchors
//
// A context type's source tree is a nesting of spans (type body, functions,
// blocks, local declarations). Anchor lookup picks the deepest node that
// contains a source offset; the compile service uses the anchor to recover
// the declarations visible at that point.
//
// Preconditions: child spans lie within their parent's span.
// Postconditions: `deepest_at` returns a node containing the offset, or None.
// Failure modes: none (lookups return Option).
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

// ── Span ────────────────────────────────────────────────────────────────────

/// Half-open byte range `[start, end)` in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ── Source tree ─────────────────────────────────────────────────────────────

/// What a source node declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// The body of a context type.
    Type { name: String },
    Function {
        name: String,
        #[serde(default)]
        is_static: bool,
    },
    Block,
    /// A local variable declaration, visible from its start onward.
    Local { name: String, ty: ValueType },
    Closure,
    Statement,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Type { name } => write!(f, "type {name}"),
            NodeKind::Function { name, is_static } => {
                if *is_static {
                    write!(f, "static fn {name}")
                } else {
                    write!(f, "fn {name}")
                }
            }
            NodeKind::Block => write!(f, "block"),
            NodeKind::Local { name, ty } => write!(f, "local {name}: {ty}"),
            NodeKind::Closure => write!(f, "closure"),
            NodeKind::Statement => write!(f, "statement"),
        }
    }
}

/// One node of a context type's source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub span: Span,
    #[serde(default)]
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        SourceNode {
            kind,
            span,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SourceNode) -> Self {
        self.children.push(child);
        self
    }

    /// Deepest node containing `offset`, plus the child-index path leading to it.
    ///
    /// Returns None if `offset` lies outside this node. Among overlapping
    /// siblings the first one wins.
    pub fn deepest_at(&self, offset: usize) -> Option<(&SourceNode, Vec<usize>)> {
        if !self.span.contains(offset) {
            return None;
        }
        let mut node = self;
        let mut path = Vec::new();
        while let Some((index, child)) = node
            .children
            .iter()
            .enumerate()
            .find(|(_, c)| c.span.contains(offset))
        {
            path.push(index);
            node = child;
        }
        Some((node, path))
    }

    /// Follow a child-index path from this node, returning every node visited
    /// (this node first). Stops early if the path leaves the tree.
    pub fn walk_path(&self, path: &[usize]) -> Vec<&SourceNode> {
        let mut chain = vec![self];
        let mut node = self;
        for &index in path {
            match node.children.get(index) {
                Some(child) => {
                    chain.push(child);
                    node = child;
                }
                None => break,
            }
        }
        chain
    }
}

// ── Lexical anchor ──────────────────────────────────────────────────────────

/// The deepest source node of a context type enclosing the evaluation offset.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalAnchor {
    /// Name of the context type whose source tree holds the anchor.
    pub context: String,
    /// Child-index path from the tree root to the anchor node.
    pub path: Vec<usize>,
    pub kind: NodeKind,
    pub span: Span,
}

impl LexicalAnchor {
    /// Locate the anchor for `offset` inside `root`.
    pub fn locate(context: &str, root: &SourceNode, offset: usize) -> Option<Self> {
        let (node, path) = root.deepest_at(offset)?;
        Some(LexicalAnchor {
            context: context.to_string(),
            path,
            kind: node.kind.clone(),
            span: node.span,
        })
    }

    /// Nodes from `root` down to the anchor, outermost first.
    pub fn scope_chain<'a>(&self, root: &'a SourceNode) -> Vec<&'a SourceNode> {
        root.walk_path(&self.path)
    }

    /// True if any scope between the root and the anchor is a static function.
    pub fn in_static_scope(&self, root: &SourceNode) -> bool {
        self.scope_chain(root).iter().any(|n| {
            matches!(
                n.kind,
                NodeKind::Function {
                    is_static: true,
                    ..
                }
            )
        })
    }
}

impl fmt::Display for LexicalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} in {}", self.kind, self.span, self.context)
    }
}
