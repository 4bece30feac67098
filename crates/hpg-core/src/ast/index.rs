use std::collections::HashMap;

use super::{AstId, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("duplicate AST node id {0}")]
pub struct DuplicateAstId(pub AstId);

/// Id-based lookup over one or more borrowed programs.
#[derive(Debug, Default)]
pub struct AstIndex<'a> {
    nodes: HashMap<AstId, &'a Node>,
    parents: HashMap<AstId, AstId>,
    roots: Vec<AstId>,
    max_id: u32,
}

impl<'a> AstIndex<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every node under `root`, rejecting ids that are already known.
    pub fn insert_root(&mut self, root: &'a Node) -> Result<(), DuplicateAstId> {
        let mut stack = vec![(root, None)];
        while let Some((node, parent)) = stack.pop() {
            if self.nodes.insert(node.id, node).is_some() {
                return Err(DuplicateAstId(node.id));
            }
            if let Some(parent) = parent {
                self.parents.insert(node.id, parent);
            }
            self.max_id = self.max_id.max(node.id.0);
            for child in node.children().into_iter().rev() {
                stack.push((child.node, Some(node.id)));
            }
        }
        self.roots.push(root.id);
        Ok(())
    }

    pub fn get(&self, id: AstId) -> Option<&'a Node> {
        self.nodes.get(&id).copied()
    }

    pub fn parent(&self, id: AstId) -> Option<AstId> {
        self.parents.get(&id).copied()
    }

    pub fn parent_node(&self, id: AstId) -> Option<&'a Node> {
        self.parent(id).and_then(|parent| self.get(parent))
    }

    pub fn roots(&self) -> &[AstId] {
        &self.roots
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All indexed nodes ordered by id.
    pub fn nodes_by_id(&self) -> Vec<&'a Node> {
        let mut nodes: Vec<_> = self.nodes.values().copied().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Node {
        Node::from_json(json).unwrap()
    }

    #[test]
    fn indexes_nodes_and_parents() {
        let program = parse(
            r#"{"type": "Program", "_id": 10, "body": [
                {"type": "ExpressionStatement", "_id": 11, "expression":
                    {"type": "Identifier", "_id": 12, "name": "x"}}
            ]}"#,
        );
        let mut index = AstIndex::new();
        index.insert_root(&program).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.max_id(), 12);
        assert_eq!(index.parent(AstId(12)), Some(AstId(11)));
        assert_eq!(index.parent(AstId(10)), None);
        assert_eq!(index.get(AstId(12)).and_then(Node::as_identifier), Some("x"));
        assert_eq!(index.roots(), &[AstId(10)]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let program = parse(
            r#"{"type": "Program", "_id": 1, "body": [
                {"type": "EmptyStatement", "_id": 2},
                {"type": "EmptyStatement", "_id": 2}
            ]}"#,
        );
        let mut index = AstIndex::new();

        assert_eq!(index.insert_root(&program), Err(DuplicateAstId(AstId(2))));
    }

    #[test]
    fn same_program_cannot_be_indexed_twice() {
        let program = parse(r#"{"type": "Program", "_id": 1, "body": []}"#);
        let mut index = AstIndex::new();
        index.insert_root(&program).unwrap();

        assert!(index.insert_root(&program).is_err());
    }
}
