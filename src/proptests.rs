use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::{BTreeMap, BTreeSet};

fn recompute_weight<T, C>(t: &WbTree<T, C>, index: u32) -> u32 {
    if index as usize >= t.store.len() || t.store.slot(index).is_empty() {
        return 0;
    }
    1 + recompute_weight(t, left_index(index)) + recompute_weight(t, right_index(index))
}

/// Checks every structural invariant at once: store shape, connectivity,
/// weight counters, the balance bound, and comparator order. `strict`
/// distinguishes the reject policy (strictly ascending in-order sequence)
/// from the multiset policy (non-descending).
fn validate_tree<T, C: Comparator<T>>(t: &WbTree<T, C>, strict: bool) {
    assert_eq!(t.store.slots.len() as u64, slot_count(t.store.depth));
    assert_eq!(t.store.weights.len(), t.store.slots.len());

    let mut seen = 0usize;
    let mut prev: Option<&T> = None;
    for (index, payload) in t.iter() {
        seen += 1;

        if index != 0 {
            let parent = parent_of(index).unwrap();
            assert!(
                t.store.slot(parent).is_occupied(),
                "occupied node {index} hangs off an empty parent"
            );
        }

        assert_eq!(
            t.store.weight(index),
            recompute_weight(t, index),
            "stale weight counter at {index}"
        );

        let l = u64::from(t.store.weight(left_index(index)));
        let r = u64::from(t.store.weight(right_index(index)));
        assert!(
            l.max(r) * u64::from(t.alpha_den) <= u64::from(t.alpha_num) * (l + r + 1),
            "node {index} out of balance: left={l} right={r}"
        );

        if let Some(prev) = prev {
            if strict {
                assert!(
                    t.cmp.is_left_of(prev, payload),
                    "in-order sequence not strictly ascending"
                );
            } else {
                assert!(
                    !t.cmp.is_right_of(prev, payload),
                    "in-order sequence descends"
                );
            }
        }
        prev = Some(payload);
    }

    assert_eq!(seen, t.len(), "reachable node count must match len");
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    // A narrow payload range forces duplicate collisions and delete hits.
    Insert(#[proptest(strategy = "0u32..64")] u32),
    DeleteByData(#[proptest(strategy = "0u32..64")] u32),
    DeleteByIndex(#[proptest(strategy = "0u32..512")] u32),
    Find(#[proptest(strategy = "0u32..64")] u32),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_set_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut tree: WbTree<u32, NaturalOrder> = WbTree::new(NaturalOrder);
        let mut model: BTreeSet<u32> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(v) => {
                    if model.insert(v) {
                        let index = tree.insert(v).unwrap();
                        prop_assert_eq!(tree.get(index).unwrap(), &Slot::Occupied(v));
                    } else {
                        prop_assert_eq!(tree.insert(v), Err(WbError::DuplicateRejected));
                    }
                }
                Op::DeleteByData(v) => {
                    if model.remove(&v) {
                        prop_assert_eq!(tree.delete_by_data(&v), Ok(()));
                    } else {
                        prop_assert_eq!(tree.delete_by_data(&v), Err(WbError::NotFound));
                    }
                }
                Op::DeleteByIndex(index) => {
                    if (index as usize) < tree.capacity() {
                        let resident = tree.get(index).unwrap().payload().copied();
                        prop_assert_eq!(tree.delete_by_index(index), Ok(()));
                        if let Some(v) = resident {
                            prop_assert!(model.remove(&v));
                        }
                    } else {
                        prop_assert_eq!(
                            tree.delete_by_index(index),
                            Err(WbError::IndexOutOfRange(index))
                        );
                    }
                }
                Op::Find(v) => {
                    prop_assert_eq!(tree.find(&v).is_ok(), model.contains(&v));
                }
            }

            prop_assert_eq!(tree.len(), model.len());
        }

        validate_tree(&tree, true);
        let got: Vec<u32> = tree.iter().map(|(_, v)| *v).collect();
        let expected: Vec<u32> = model.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_multiset_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut tree: WbTree<u32, NaturalOrder> =
            WbTree::with_policy(NaturalOrder, DuplicatePolicy::Allow);
        let mut model: BTreeMap<u32, usize> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(v) => {
                    let index = tree.insert(v).unwrap();
                    prop_assert_eq!(tree.get(index).unwrap(), &Slot::Occupied(v));
                    *model.entry(v).or_insert(0) += 1;
                }
                Op::DeleteByData(v) => {
                    match model.get_mut(&v) {
                        Some(count) => {
                            prop_assert_eq!(tree.delete_by_data(&v), Ok(()));
                            *count -= 1;
                            if *count == 0 {
                                model.remove(&v);
                            }
                        }
                        None => {
                            prop_assert_eq!(tree.delete_by_data(&v), Err(WbError::NotFound));
                        }
                    }
                }
                Op::DeleteByIndex(index) => {
                    if (index as usize) < tree.capacity() {
                        let resident = tree.get(index).unwrap().payload().copied();
                        prop_assert_eq!(tree.delete_by_index(index), Ok(()));
                        if let Some(v) = resident {
                            let count = model.get_mut(&v).unwrap();
                            *count -= 1;
                            if *count == 0 {
                                model.remove(&v);
                            }
                        }
                    } else {
                        prop_assert_eq!(
                            tree.delete_by_index(index),
                            Err(WbError::IndexOutOfRange(index))
                        );
                    }
                }
                Op::Find(v) => {
                    prop_assert_eq!(tree.find(&v).is_ok(), model.contains_key(&v));
                }
            }

            let total: usize = model.values().sum();
            prop_assert_eq!(tree.len(), total);
        }

        validate_tree(&tree, false);
        let got: Vec<u32> = tree.iter().map(|(_, v)| *v).collect();
        let expected: Vec<u32> = model
            .iter()
            .flat_map(|(&v, &count)| std::iter::repeat(v).take(count))
            .collect();
        prop_assert_eq!(got, expected);
    }
}
