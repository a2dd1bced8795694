//src/tree.rs

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use ahash::{AHashMap, AHashSet};
use flate2::read::MultiGzDecoder;

use crate::errors::InsertionError;

/// Integer handle into the tree arena.
pub type NodeId = usize;

/// One node of the arena. The root has `parent == None`; a tip has an empty
/// `children` list. `length` is the weight of the edge to the parent and stays
/// `None` until branch-length repair runs.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,
    pub length: Option<f64>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }
}

/// A rooted phylogeny stored as a flat vector of nodes.
///
/// Children/parents are integer indices rather than pointers, so shearing and
/// pruning never have to fight ownership cycles. Tip names are unique and
/// indexed; internal labels (taxonomic ranks like `g__Foo`) may repeat freely.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    tip_index: AHashMap<String, NodeId>,
}

impl Tree {
    /// Parse a newick string into an arena tree.
    ///
    /// Handles unquoted and single-quoted labels ('' is an escaped quote) and
    /// optional `:length` suffixes. Duplicate tip names are a validity
    /// violation and fail the parse.
    pub fn parse_newick(text: &str) -> Result<Self, InsertionError> {
        let mut nodes: Vec<Node> = vec![Node::default()];
        let mut cur: NodeId = 0;
        let mut terminated = false;

        let mut chars = text.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                '(' => {
                    // open a group: the next tokens describe the first child
                    chars.next();
                    let id = nodes.len();
                    nodes.push(Node {
                        parent: Some(cur),
                        ..Node::default()
                    });
                    nodes[cur].children.push(id);
                    cur = id;
                }
                ',' => {
                    chars.next();
                    let parent = nodes[cur].parent.ok_or_else(|| {
                        InsertionError::Format("newick: ',' outside of any group".to_string())
                    })?;
                    let id = nodes.len();
                    nodes.push(Node {
                        parent: Some(parent),
                        ..Node::default()
                    });
                    nodes[parent].children.push(id);
                    cur = id;
                }
                ')' => {
                    chars.next();
                    // labels/lengths that follow belong to the closed group
                    cur = nodes[cur].parent.ok_or_else(|| {
                        InsertionError::Format("newick: unbalanced ')'".to_string())
                    })?;
                }
                ':' => {
                    chars.next();
                    let mut num = String::new();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() || matches!(d, '+' | '-' | '.' | 'e' | 'E') {
                            num.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let length: f64 = num.parse().map_err(|_| {
                        InsertionError::Format(format!("newick: bad branch length '{}'", num))
                    })?;
                    nodes[cur].length = Some(length);
                }
                ';' => {
                    chars.next();
                    terminated = true;
                    break;
                }
                '\'' => {
                    nodes[cur].name = Some(read_quoted_label(&mut chars)?);
                }
                c if c.is_whitespace() => {
                    chars.next();
                }
                _ => {
                    let mut label = String::new();
                    while let Some(&d) = chars.peek() {
                        if matches!(d, '(' | ')' | ',' | ':' | ';') || d.is_whitespace() {
                            break;
                        }
                        label.push(d);
                        chars.next();
                    }
                    nodes[cur].name = Some(label);
                }
            }
        }

        if cur != 0 {
            return Err(InsertionError::Format(
                "newick: unbalanced '(' at end of input".to_string(),
            ));
        }
        if !terminated && nodes.len() > 1 {
            return Err(InsertionError::Format(
                "newick: missing terminating ';'".to_string(),
            ));
        }

        let mut tree = Tree {
            nodes,
            root: 0,
            tip_index: AHashMap::new(),
        };
        tree.rebuild_tip_index()?;
        Ok(tree)
    }

    /// Read a newick file, transparently un-gzipping `*.gz`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, InsertionError> {
        let text = read_maybe_gz(path.as_ref())?;
        Self::parse_newick(&text)
    }

    fn rebuild_tip_index(&mut self) -> Result<(), InsertionError> {
        let mut index = AHashMap::with_capacity(self.nodes.len() / 2 + 1);
        for (id, node) in self.nodes.iter().enumerate() {
            if !node.is_tip() {
                continue;
            }
            if let Some(name) = &node.name {
                if index.insert(name.clone(), id).is_some() {
                    return Err(InsertionError::Format(format!(
                        "duplicate tip name '{}' in tree",
                        name
                    )));
                }
            }
        }
        self.tip_index = index;
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Tip handles in left-to-right (parse) order.
    pub fn tips(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| self.nodes[id].is_tip())
    }

    pub fn tip_count(&self) -> usize {
        self.tips().count()
    }

    /// The set of all named tip names.
    pub fn tip_name_set(&self) -> AHashSet<String> {
        self.tip_index.keys().cloned().collect()
    }

    /// Look up the tip carrying exactly this name.
    pub fn find_tip(&self, name: &str) -> Option<NodeId> {
        self.tip_index.get(name).copied()
    }

    /// Ancestors of `id` from its parent up to (and including) the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = id;
        while let Some(p) = self.nodes[cur].parent {
            out.push(p);
            cur = p;
        }
        out
    }

    /// Full pre-order traversal (parents before children).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Post-order traversal of the subtree under `start` (children before
    /// parents, left to right).
    pub fn postorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in &self.nodes[id].children {
                stack.push(child);
            }
        }
        out.reverse();
        out
    }

    /// Full post-order traversal.
    pub fn postorder(&self) -> Vec<NodeId> {
        self.postorder_from(self.root)
    }

    /// Branch-length repair: every absent edge weight becomes 0 so distance
    /// code never sees an undefined length. Present values, zero or negative
    /// included, pass through untouched. Returns how many edges were filled;
    /// running it twice is a no-op the second time.
    pub fn fill_missing_lengths(&mut self) -> usize {
        let mut filled = 0;
        for node in &mut self.nodes {
            if node.length.is_none() {
                node.length = Some(0.0);
                filled += 1;
            }
        }
        if filled > 0 {
            log::info!("branch-length repair: set {} missing lengths to 0", filled);
        }
        filled
    }

    /// Keep only the tips named in `keep`; drop everything else and collapse
    /// internal nodes left with a single child (their edge length folds into
    /// the surviving child). Used by cross-validation workflows that re-insert
    /// known sequences into a reference that must not contain them.
    pub fn shear(&self, keep: &AHashSet<String>) -> Result<Tree, InsertionError> {
        let mut mark = vec![false; self.nodes.len()];
        let mut kept_tips = 0;
        for id in self.tips() {
            let retain = self.nodes[id]
                .name
                .as_ref()
                .map(|n| keep.contains(n))
                .unwrap_or(false);
            if retain {
                kept_tips += 1;
                mark[id] = true;
                let mut cur = id;
                while let Some(p) = self.nodes[cur].parent {
                    if mark[p] {
                        break;
                    }
                    mark[p] = true;
                    cur = p;
                }
            }
        }
        if kept_tips == 0 {
            return Err(InsertionError::EmptyResult(
                "shearing removed every tip of the tree".to_string(),
            ));
        }

        let mut out: Vec<Node> = Vec::with_capacity(kept_tips * 2);
        let root = self
            .copy_marked(self.root, &mark, &mut out)
            .expect("root is marked whenever any tip is kept");

        let mut tree = Tree {
            nodes: out,
            root,
            tip_index: AHashMap::new(),
        };
        tree.rebuild_tip_index()?;
        Ok(tree)
    }

    fn copy_marked(&self, old: NodeId, mark: &[bool], out: &mut Vec<Node>) -> Option<NodeId> {
        if !mark[old] {
            return None;
        }
        let node = &self.nodes[old];
        if node.is_tip() {
            let id = out.len();
            out.push(Node {
                name: node.name.clone(),
                length: node.length,
                parent: None,
                children: Vec::new(),
            });
            return Some(id);
        }

        let kids: Vec<NodeId> = node
            .children
            .iter()
            .filter_map(|&c| self.copy_marked(c, mark, out))
            .collect();

        match kids.len() {
            0 => None,
            1 => {
                // unary node: merge its edge into the single surviving child
                let child = kids[0];
                out[child].length = match (out[child].length, node.length) {
                    (Some(a), Some(b)) => Some(a + b),
                    (Some(a), None) => Some(a),
                    (None, b) => b,
                };
                Some(child)
            }
            _ => {
                let id = out.len();
                out.push(Node {
                    name: node.name.clone(),
                    length: node.length,
                    parent: None,
                    children: kids.clone(),
                });
                for &k in &kids {
                    out[k].parent = Some(id);
                }
                Some(id)
            }
        }
    }

    /// Serialize back to newick. Labels with structural characters get
    /// single-quoted; explicit lengths are written wherever present.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        self.write_newick_node(self.root, &mut out);
        out.push(';');
        out
    }

    fn write_newick_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        if !node.children.is_empty() {
            out.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_newick_node(child, out);
            }
            out.push(')');
        }
        if let Some(name) = &node.name {
            out.push_str(&quote_label(name));
        }
        if let Some(length) = node.length {
            let _ = write!(out, ":{}", length);
        }
    }
}

fn read_quoted_label(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, InsertionError> {
    chars.next(); // opening quote
    let mut label = String::new();
    loop {
        match chars.next() {
            Some('\'') => {
                // '' inside a quoted label is a literal quote
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    label.push('\'');
                } else {
                    return Ok(label);
                }
            }
            Some(c) => label.push(c),
            None => {
                return Err(InsertionError::Format(
                    "newick: unterminated quoted label".to_string(),
                ))
            }
        }
    }
}

fn quote_label(name: &str) -> String {
    let needs_quotes = name
        .chars()
        .any(|c| matches!(c, '(' | ')' | ',' | ':' | ';' | '\'' | '[' | ']') || c.is_whitespace());
    if needs_quotes {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// Slurp a whole text file, un-gzipping when the name ends in `.gz`.
pub(crate) fn read_maybe_gz(path: &Path) -> Result<String, InsertionError> {
    let f = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let mut text = String::new();
    if is_gz {
        BufReader::new(MultiGzDecoder::new(f)).read_to_string(&mut text)?;
    } else {
        BufReader::new(f).read_to_string(&mut text)?;
    }
    Ok(text)
}
