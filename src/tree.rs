//! Thread assembler: turns a flat, pre-sorted comment list into a nested
//! reply forest.
//!
//! Pure in-memory transform over a point-in-time snapshot. It never sorts:
//! root order is input order and child lists are input-visit order, so the
//! read path decides the ordering by how it fetches. A comment whose parent
//! is not in the input set (deleted parent, or a parent on another post) is
//! demoted to a root rather than dropped.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Comment, Id};

/// One comment plus its ordered replies. Serializes with the comment fields
/// inline and a `replies` array, matching the flat comment payload shape.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Assemble the reply forest for one post.
///
/// Arena-style: comments are indexed by id first, parents are resolved to
/// slot indices, and child lists are populated by index, so no shared
/// mutable node references are ever aliased. A parent chain that loops
/// (corrupted data) is cut by demoting the node that closes the loop to a
/// root; assembly always terminates and no comment disappears.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let n = comments.len();
    let index: HashMap<Id, usize> = comments
        .iter()
        .enumerate()
        .map(|(slot, c)| (c.id, slot))
        .collect();

    // Resolved parent slot per comment; None means root. A self-referencing
    // parent is treated as unresolved up front.
    let mut parent: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(slot, c)| {
            c.parent_id
                .and_then(|pid| index.get(&pid).copied())
                .filter(|&p| p != slot)
        })
        .collect();

    break_cycles(&mut parent);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots: Vec<usize> = Vec::new();
    for slot in 0..n {
        match parent[slot] {
            Some(p) => children[p].push(slot),
            None => roots.push(slot),
        }
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    roots
        .into_iter()
        .map(|r| materialize(r, &mut slots, &children))
        .collect()
}

/// Walk every parent chain once; when a chain re-enters itself, demote the
/// node that closes the loop to a root.
fn break_cycles(parent: &mut [Option<usize>]) {
    // 0 = unvisited, 1 = on the current walk, 2 = settled
    let mut state = vec![0u8; parent.len()];
    for start in 0..parent.len() {
        if state[start] != 0 {
            continue;
        }
        let mut trail = Vec::new();
        let mut cur = start;
        loop {
            state[cur] = 1;
            trail.push(cur);
            match parent[cur] {
                Some(next) if state[next] == 0 => cur = next,
                Some(next) if state[next] == 1 => {
                    parent[next] = None;
                    break;
                }
                // Root, or a parent already settled on an earlier walk.
                _ => break,
            }
        }
        for slot in trail {
            state[slot] = 2;
        }
    }
}

fn materialize(slot: usize, slots: &mut [Option<Comment>], children: &[Vec<usize>]) -> CommentNode {
    // Cycle breaking guarantees the slots form a forest, so each slot is
    // consumed exactly once.
    let comment = slots[slot].take().expect("comment slot consumed twice");
    let replies = children[slot]
        .iter()
        .map(|&c| materialize(c, slots, children))
        .collect();
    CommentNode { comment, replies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(id: Id, parent_id: Option<Id>) -> Comment {
        Comment {
            id,
            post_id: 1,
            parent_id,
            content: format!("comment {id}"),
            created_at: Utc::now(),
            upvotes: 0,
            downvotes: 0,
            score: 0,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<Id> {
        nodes.iter().map(|n| n.comment.id).collect()
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(build_tree(Vec::new()).is_empty());
    }

    #[test]
    fn nests_replies_under_parents() {
        let tree = build_tree(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, Some(1)),
            comment(4, Some(2)),
        ]);
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].replies), vec![2, 3]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![4]);
        assert!(tree[0].replies[1].replies.is_empty());
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let tree = build_tree(vec![comment(5, Some(999))]);
        assert_eq!(ids(&tree), vec![5]);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn preserves_input_order_for_roots_and_children() {
        let tree = build_tree(vec![
            comment(30, None),
            comment(10, None),
            comment(20, None),
            comment(7, Some(10)),
            comment(6, Some(10)),
        ]);
        assert_eq!(ids(&tree), vec![30, 10, 20]);
        assert_eq!(ids(&tree[1].replies), vec![7, 6]);
    }

    #[test]
    fn self_parent_is_demoted_to_root() {
        let tree = build_tree(vec![comment(1, Some(1)), comment(2, Some(1))]);
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].replies), vec![2]);
    }

    #[test]
    fn parent_cycle_is_cut_not_looped() {
        // 1 -> 2 -> 3 -> 1, plus a normal reply hanging off the cycle.
        let tree = build_tree(vec![
            comment(1, Some(3)),
            comment(2, Some(1)),
            comment(3, Some(2)),
            comment(4, Some(3)),
        ]);
        // Every comment still appears exactly once.
        fn count(nodes: &[CommentNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.replies)).sum()
        }
        assert_eq!(count(&tree), 4);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn serializes_flat_fields_with_replies() {
        let tree = build_tree(vec![comment(1, None), comment(2, Some(1))]);
        let v = serde_json::to_value(&tree).unwrap();
        assert_eq!(v[0]["id"], 1);
        assert_eq!(v[0]["replies"][0]["id"], 2);
        assert_eq!(v[0]["replies"][0]["parent_id"], 1);
    }
}
