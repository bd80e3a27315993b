//! Pure in-memory tree assembly over a flat unit list.
//!
//! The flat list is fetched once per tenant; assembly builds a
//! parent-to-children index first so the whole forest comes together in
//! O(n) instead of the naive O(n^2) filter-per-level.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::OrganizationUnit;

/// Upper bound on nodes accepted for in-memory assembly. Larger tenants must
/// use the flat listing (or a store-side recursive query).
pub const MAX_TREE_NODES: usize = 10_000;

/// A unit with its recursively assembled children.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitTreeNode {
    pub unit: OrganizationUnit,
    pub children: Vec<UnitTreeNode>,
}

/// Assemble a nested forest rooted at `root_parent` (usually `None`).
///
/// Units whose parent is neither `root_parent` nor present in the input are
/// dropped, matching the flat-filter semantics of the store queries. Input
/// order is preserved within each sibling group.
pub fn build_tree(units: Vec<OrganizationUnit>, root_parent: Option<Uuid>) -> Vec<UnitTreeNode> {
    let mut children_index: HashMap<Option<Uuid>, Vec<OrganizationUnit>> = HashMap::new();
    for unit in units {
        children_index
            .entry(unit.parent_unit_id)
            .or_default()
            .push(unit);
    }
    assemble(&mut children_index, root_parent)
}

fn assemble(
    children_index: &mut HashMap<Option<Uuid>, Vec<OrganizationUnit>>,
    parent: Option<Uuid>,
) -> Vec<UnitTreeNode> {
    // Each sibling group is consumed exactly once, so even corrupted data
    // with a parent cycle cannot make this walk diverge.
    let Some(group) = children_index.remove(&parent) else {
        return Vec::new();
    };
    group
        .into_iter()
        .map(|unit| {
            let children = assemble(children_index, Some(unit.unit_id));
            UnitTreeNode { unit, children }
        })
        .collect()
}

/// Flatten a forest back into the units it was assembled from.
pub fn flatten(forest: Vec<UnitTreeNode>) -> Vec<OrganizationUnit> {
    let mut out = Vec::new();
    let mut stack: Vec<UnitTreeNode> = forest.into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node.unit);
        stack.extend(node.children.into_iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitStatus;
    use chrono::Utc;
    use std::collections::HashSet;

    fn unit(name: &str, parent: Option<Uuid>) -> OrganizationUnit {
        OrganizationUnit {
            unit_id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: name.to_string(),
            parent_unit_id: parent,
            description: None,
            leader_user_id: None,
            status: UnitStatus::Active,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn assembles_two_level_forest() {
        let root_a = unit("A", None);
        let root_b = unit("B", None);
        let child_a1 = unit("A1", Some(root_a.unit_id));
        let child_a2 = unit("A2", Some(root_a.unit_id));

        let forest = build_tree(
            vec![root_a.clone(), child_a1.clone(), child_a2.clone(), root_b.clone()],
            None,
        );

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].unit.name, "A");
        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(forest[0].children[0].unit.name, "A1");
        assert_eq!(forest[1].unit.name, "B");
        assert!(forest[1].children.is_empty());
    }

    #[test]
    fn assembles_subtree_from_non_null_root() {
        let root = unit("A", None);
        let child = unit("A1", Some(root.unit_id));
        let grandchild = unit("A1a", Some(child.unit_id));

        let forest = build_tree(
            vec![root.clone(), child.clone(), grandchild.clone()],
            Some(root.unit_id),
        );

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].unit.unit_id, child.unit_id);
        assert_eq!(forest[0].children[0].unit.unit_id, grandchild.unit_id);
    }

    #[test]
    fn flatten_is_right_inverse_of_build() {
        let root = unit("A", None);
        let child1 = unit("A1", Some(root.unit_id));
        let child2 = unit("A2", Some(root.unit_id));
        let grandchild = unit("A1a", Some(child1.unit_id));
        let units = vec![root, child1, child2, grandchild];

        let expected: HashSet<Uuid> = units.iter().map(|u| u.unit_id).collect();
        let flattened = flatten(build_tree(units, None));
        let got: HashSet<Uuid> = flattened.iter().map(|u| u.unit_id).collect();

        assert_eq!(got, expected);
    }

    #[test]
    fn drops_units_with_dangling_parents() {
        let root = unit("A", None);
        let orphan = unit("lost", Some(Uuid::new_v4()));

        let forest = build_tree(vec![root.clone(), orphan], None);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].unit.unit_id, root.unit_id);
    }

    #[test]
    fn deep_chain_assembles_without_recursion_blowup() {
        let mut units = Vec::new();
        let mut parent = None;
        for i in 0..500 {
            let u = unit(&format!("n{}", i), parent);
            parent = Some(u.unit_id);
            units.push(u);
        }

        let forest = build_tree(units, None);

        assert_eq!(forest.len(), 1);
        let mut depth = 0;
        let mut cursor = &forest[0];
        while let Some(next) = cursor.children.first() {
            depth += 1;
            cursor = next;
        }
        assert_eq!(depth, 499);
    }

    #[test]
    fn terminates_on_corrupted_parent_cycle() {
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let mut a = unit("a", Some(id_b));
        a.unit_id = id_a;
        let mut b = unit("b", Some(id_a));
        b.unit_id = id_b;

        // Neither node is reachable from the root, so the forest is empty,
        // but assembly must not loop.
        let forest = build_tree(vec![a, b], None);
        assert!(forest.is_empty());
    }
}
