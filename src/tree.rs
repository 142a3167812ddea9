use std::collections::{HashMap, HashSet};

use crate::record::{row_metric, ProcRecord, SortKey};

#[derive(Clone, Debug)]
pub struct TreeNode {
    pub record: ProcRecord,
    pub depth: usize,
    pub prefix: String,
}

/// Builds a flattened parent/child forest from a pre-filtered subset,
/// typically one application's processes. A record whose parent is not
/// in the subset, or which is its own parent, becomes a root. Roots and
/// siblings are sorted by the sort key descending. The forest is
/// rebuilt from scratch every pass.
pub fn build_tree(rows: &[ProcRecord], key: SortKey) -> Vec<TreeNode> {
    let by_pid: HashMap<u32, &ProcRecord> = rows.iter().map(|r| (r.pid, r)).collect();
    let pids: HashSet<u32> = rows.iter().map(|r| r.pid).collect();

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut roots: Vec<u32> = Vec::new();
    for r in rows {
        if pids.contains(&r.ppid) && r.ppid != r.pid {
            children.entry(r.ppid).or_default().push(r.pid);
        } else {
            roots.push(r.pid);
        }
    }

    let metric = |pid: u32| by_pid.get(&pid).map_or(0.0, |r| row_metric(r, key));
    roots.sort_by(|a, b| metric(*b).total_cmp(&metric(*a)));
    for kids in children.values_mut() {
        kids.sort_by(|a, b| metric(*b).total_cmp(&metric(*a)));
    }

    let mut out = Vec::with_capacity(rows.len());
    for root in roots {
        walk(root, 0, &[], &by_pid, &children, &mut out);
    }
    out
}

//continuation[i] is true when the ancestor at depth i+1 has more
//siblings after it; passed by value down the recursion
fn walk(
    pid: u32,
    depth: usize,
    continuation: &[bool],
    by_pid: &HashMap<u32, &ProcRecord>,
    children: &HashMap<u32, Vec<u32>>,
    out: &mut Vec<TreeNode>,
) {
    let Some(record) = by_pid.get(&pid) else {
        return;
    };

    let mut prefix = String::new();
    if depth > 0 {
        for &has_more in &continuation[..continuation.len() - 1] {
            prefix.push_str(if has_more { "│   " } else { "    " });
        }
        prefix.push_str(if continuation[continuation.len() - 1] {
            "├── "
        } else {
            "└── "
        });
    }
    out.push(TreeNode {
        record: (*record).clone(),
        depth,
        prefix,
    });

    if let Some(kids) = children.get(&pid) {
        for (i, &child) in kids.iter().enumerate() {
            let mut cont = continuation.to_vec();
            cont.push(i < kids.len() - 1);
            walk(child, depth + 1, &cont, by_pid, children, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_row;

    #[test]
    fn every_record_appears_once() {
        let rows = vec![
            test_row(1, 0, "a", 10.0),
            test_row(2, 1, "a", 5.0),
            test_row(3, 1, "a", 7.0),
            test_row(4, 99, "a", 1.0),
        ];
        let tree = build_tree(&rows, SortKey::Rss);
        assert_eq!(tree.len(), rows.len());
        let mut pids: Vec<u32> = tree.iter().map(|n| n.record.pid).collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn absent_parent_makes_root() {
        let rows = vec![test_row(4, 99, "a", 1.0)];
        let tree = build_tree(&rows, SortKey::Rss);
        assert_eq!(tree[0].depth, 0);
        assert!(tree[0].prefix.is_empty());
    }

    #[test]
    fn self_parented_record_is_root() {
        let rows = vec![test_row(7, 7, "a", 1.0), test_row(8, 7, "a", 2.0)];
        let tree = build_tree(&rows, SortKey::Rss);
        assert_eq!(tree[0].record.pid, 7);
        assert_eq!(tree[0].depth, 0);
        assert_eq!(tree[1].record.pid, 8);
        assert_eq!(tree[1].depth, 1);
    }

    #[test]
    fn siblings_sorted_descending_with_connectors() {
        let rows = vec![
            test_row(1, 0, "a", 100.0),
            test_row(2, 1, "a", 5.0),
            test_row(3, 1, "a", 50.0),
            test_row(4, 1, "a", 20.0),
        ];
        let tree = build_tree(&rows, SortKey::Rss);
        assert_eq!(tree[0].record.pid, 1);
        let kids: Vec<u32> = tree[1..].iter().map(|n| n.record.pid).collect();
        assert_eq!(kids, vec![3, 4, 2]);
        assert_eq!(tree[1].prefix, "├── ");
        assert_eq!(tree[2].prefix, "├── ");
        assert_eq!(tree[3].prefix, "└── ");
    }

    #[test]
    fn ancestor_continuation_glyphs() {
        //root 1 has children 2 (with child 4) and 3; while under 2,
        //the ancestor line continues to sibling 3
        let rows = vec![
            test_row(1, 0, "a", 100.0),
            test_row(2, 1, "a", 50.0),
            test_row(3, 1, "a", 10.0),
            test_row(4, 2, "a", 1.0),
        ];
        let tree = build_tree(&rows, SortKey::Rss);
        let n4 = tree.iter().find(|n| n.record.pid == 4).unwrap();
        assert_eq!(n4.depth, 2);
        assert_eq!(n4.prefix, "│   └── ");
        let n3 = tree.iter().find(|n| n.record.pid == 3).unwrap();
        assert_eq!(n3.prefix, "└── ");
    }
}
