//! Positional child diff.
//!
//! The old child at index `i` is paired with the new element at index `i`.
//! Children are not keyed, so reordering a dynamic list replaces or patches
//! the nodes in place instead of moving them.

use smallvec::SmallVec;

use crate::element::Element;
use crate::fiber::{EffectTag, Fiber, FiberArena, FiberId};

/// Builds `parent`'s new child list from `elements`, pairing them with the
/// children of `parent`'s alternate. Old children with no same-type
/// counterpart are tagged [`EffectTag::Delete`] and appended to `deletions`.
pub fn reconcile_children(
    arena: &mut FiberArena,
    deletions: &mut Vec<FiberId>,
    generation: u64,
    parent: FiberId,
    elements: &[Element],
) {
    let old_fibers: SmallVec<[FiberId; 8]> = match arena[parent].alternate {
        Some(alternate) => arena.children(alternate),
        None => SmallVec::new(),
    };

    let mut reused: SmallVec<[Option<FiberId>; 8]> = SmallVec::new();
    for (index, &old_id) in old_fibers.iter().enumerate() {
        let same_type = elements
            .get(index)
            .is_some_and(|element| arena[old_id].kind.matches(&element.ty));
        if same_type {
            reused.push(Some(old_id));
        } else {
            arena[old_id].effect_tag = EffectTag::Delete;
            deletions.push(old_id);
            reused.push(None);
        }
    }

    let mut previous: Option<FiberId> = None;
    arena[parent].child = None;
    for (index, element) in elements.iter().enumerate() {
        let fiber = match reused.get(index).copied().flatten() {
            Some(old_id) => Fiber::updated(element, parent, old_id, &arena[old_id], generation),
            None => Fiber::placed(element, parent, generation),
        };
        let id = arena.insert(fiber);
        match previous {
            Some(prev) => arena[prev].sibling = Some(id),
            None => arena[parent].child = Some(id),
        }
        previous = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use std::rc::Rc;

    fn tags(arena: &FiberArena, parent: FiberId) -> Vec<(String, EffectTag)> {
        arena
            .children(parent)
            .iter()
            .map(|&id| (arena[id].label(), arena[id].effect_tag))
            .collect()
    }

    fn first_generation(elements: &[Element]) -> (FiberArena, FiberId) {
        let mut arena = FiberArena::new();
        let root = arena.insert(Fiber::root(0, Rc::new(Props::default()), None, 1));
        let mut deletions = Vec::new();
        reconcile_children(&mut arena, &mut deletions, 1, root, elements);
        assert!(deletions.is_empty());
        (arena, root)
    }

    fn next_generation(
        arena: &mut FiberArena,
        old_root: FiberId,
        elements: &[Element],
    ) -> (FiberId, Vec<FiberId>) {
        let root = arena.insert(Fiber::root(0, Rc::new(Props::default()), Some(old_root), 2));
        let mut deletions = Vec::new();
        reconcile_children(arena, &mut deletions, 2, root, elements);
        (root, deletions)
    }

    #[test]
    fn fresh_children_are_placed_in_order() {
        let (arena, root) = first_generation(&[Element::host("a"), Element::text("b")]);
        assert_eq!(
            tags(&arena, root),
            vec![
                ("a".to_string(), EffectTag::Placement),
                ("#text".to_string(), EffectTag::Placement),
            ]
        );
    }

    #[test]
    fn same_type_reuses_node_and_hooks() {
        let (mut arena, old_root) = first_generation(&[Element::host("h1")]);
        let old_child = arena.children(old_root)[0];
        arena[old_child].state_node = Some(42);

        let (root, deletions) = next_generation(&mut arena, old_root, &[Element::host("h1")]);
        let child = arena.children(root)[0];
        assert!(deletions.is_empty());
        assert_eq!(arena[child].effect_tag, EffectTag::Update);
        assert_eq!(arena[child].state_node, Some(42));
        assert_eq!(arena[child].alternate, Some(old_child));
    }

    #[test]
    fn changed_type_deletes_and_places() {
        let (mut arena, old_root) = first_generation(&[Element::host("h1")]);
        let old_child = arena.children(old_root)[0];

        let (root, deletions) = next_generation(&mut arena, old_root, &[Element::host("h2")]);
        assert_eq!(deletions, vec![old_child]);
        assert_eq!(arena[old_child].effect_tag, EffectTag::Delete);
        assert_eq!(
            tags(&arena, root),
            vec![("h2".to_string(), EffectTag::Placement)]
        );
    }

    #[test]
    fn shorter_list_deletes_the_tail() {
        let (mut arena, old_root) =
            first_generation(&[Element::host("li"), Element::host("li"), Element::host("li")]);
        let old = arena.children(old_root);

        let (root, deletions) = next_generation(&mut arena, old_root, &[Element::host("li")]);
        assert_eq!(deletions, vec![old[1], old[2]]);
        assert_eq!(
            tags(&arena, root),
            vec![("li".to_string(), EffectTag::Update)]
        );
    }

    #[test]
    fn longer_list_places_the_tail() {
        let (mut arena, old_root) = first_generation(&[Element::text("x")]);
        let (root, deletions) =
            next_generation(&mut arena, old_root, &[Element::text("y"), Element::text("z")]);
        assert!(deletions.is_empty());
        assert_eq!(
            tags(&arena, root),
            vec![
                ("#text".to_string(), EffectTag::Update),
                ("#text".to_string(), EffectTag::Placement),
            ]
        );
    }
}
