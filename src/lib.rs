//! # wbbst
//!
//! A flat, array-encoded weight-balanced binary search tree for ordering
//! small, largely random payloads (integers, short hashes, compact vectors)
//! without pointer-based nodes.
//!
//! The tree lives in a single growable array organized as rows that double
//! in size with depth: row `r` holds `2^r` slots. A node's position in the
//! array *is* its identity, and parent/child navigation is pure index
//! arithmetic, so there is no per-node allocation and no pointer chasing.
//! Rebalancing is scapegoat-style: when a subtree's weight ratio drifts past
//! the configured bound, the whole subtree is drained in order and re-laid
//! out at minimal depth.
//!
//! ## Example
//!
//! ```rust
//! use wbbst::{NaturalOrder, WbTree};
//!
//! let mut tree: WbTree<u32, NaturalOrder> = WbTree::new(NaturalOrder);
//! tree.insert(50).unwrap();
//! tree.insert(20).unwrap();
//! tree.insert(80).unwrap();
//!
//! assert!(tree.find(&20).is_ok());
//! let ordered: Vec<u32> = tree.iter().map(|(_, v)| *v).collect();
//! assert_eq!(ordered, vec![20, 50, 80]);
//! ```

use std::fmt;
use std::mem;

use smallvec::SmallVec;
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Deepest row the store will allocate. Row 31 would already need `2^31`
/// slots; one more row would push flat indices past the `u32` space.
pub const MAX_DEPTH: u32 = 31;

/// Default balance factor, as a rational: a subtree may hold at most
/// `3/4 · (total + 1)` of its parent's occupied descendants.
const DEFAULT_ALPHA: (u32, u32) = (3, 4);

// =============================================================================
// Errors
// =============================================================================

/// Everything that can go wrong inside the tree. All variants are
/// recoverable; `NotFound` and `DuplicateRejected` are ordinary control flow
/// for callers, the rest signal precondition violations or exhausted
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WbError {
    #[error("cannot walk up from the root")]
    RootHasNoParent,
    #[error("cannot walk below the bottom of the tree")]
    BelowTreeBottom,
    #[error("index {0} is outside the allocated store")]
    IndexOutOfRange(u32),
    #[error("adding a row would overflow the 32-bit index space")]
    MaxDepthExceeded,
    #[error("no node holds the requested payload")]
    NotFound,
    #[error("payload is already present and duplicates are rejected")]
    DuplicateRejected,
}

pub type Result<T> = std::result::Result<T, WbError>;

// =============================================================================
// Index arithmetic
// =============================================================================
//
// The flat index decomposes as (row r, offset o) with `index = 2^r - 1 + o`.
// The parent of (r, o) is (r-1, o/2) and its children are (r+1, 2o) and
// (r+1, 2o+1), which collapses to the classic binary-heap mapping below.

/// Total number of slots in a tree of `depth` rows: `2^depth - 1`.
#[inline]
pub fn slot_count(depth: u32) -> u64 {
    (1u64 << depth) - 1
}

/// Index of the parent of `index`, or `RootHasNoParent` for the root.
#[inline]
pub fn parent_of(index: u32) -> Result<u32> {
    if index == 0 {
        return Err(WbError::RootHasNoParent);
    }
    Ok((index - 1) >> 1)
}

/// Index of the left child of `index` in the row below, or `BelowTreeBottom`
/// when that row is not allocated in a tree of `depth` rows.
#[inline]
pub fn left_child_of(index: u32, depth: u32) -> Result<u32> {
    let child = u64::from(index) * 2 + 1;
    if child >= slot_count(depth) {
        return Err(WbError::BelowTreeBottom);
    }
    Ok(child as u32)
}

/// Index of the right child of `index` in the row below, or
/// `BelowTreeBottom` when that row is not allocated.
#[inline]
pub fn right_child_of(index: u32, depth: u32) -> Result<u32> {
    let child = u64::from(index) * 2 + 2;
    if child >= slot_count(depth) {
        return Err(WbError::BelowTreeBottom);
    }
    Ok(child as u32)
}

/// Unchecked left child. Callers bound the result against the store.
#[inline]
fn left_index(index: u32) -> u32 {
    index * 2 + 1
}

/// Unchecked right child.
#[inline]
fn right_index(index: u32) -> u32 {
    index * 2 + 2
}

/// Unchecked parent. Caller guarantees `index != 0`.
#[inline]
fn parent_index(index: u32) -> u32 {
    debug_assert_ne!(index, 0);
    (index - 1) >> 1
}

// =============================================================================
// Slots and the flat store
// =============================================================================

/// One array cell. Emptiness is an explicit tagged state rather than a magic
/// payload value, so a payload that happens to equal some sentinel can never
/// be mistaken for a free slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<T> {
    Empty,
    Occupied(T),
}

impl<T> Slot<T> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        !self.is_empty()
    }

    #[inline]
    pub fn payload(&self) -> Option<&T> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(payload) => Some(payload),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Empty
    }
}

/// Growable row-doubling backing array plus per-subtree weight counters.
///
/// Rows are appended one at a time and never removed; deleting nodes only
/// clears slots. `weights[i]` counts the occupied slots in the subtree
/// rooted at `i` (inclusive) and is maintained incrementally by the engine,
/// so weight reads are O(1).
#[derive(Debug, Clone)]
pub struct FlatStore<T> {
    slots: Vec<Slot<T>>,
    weights: Vec<u32>,
    depth: u32,
}

impl<T> FlatStore<T> {
    /// An empty store: one row, one empty root slot.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::Empty],
            weights: vec![0],
            depth: 1,
        }
    }

    /// Number of allocated slots, occupied or not. Always `2^depth - 1`.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights[0] == 0
    }

    /// Number of allocated rows.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Appends a row of `2^depth` empty slots and increments the depth.
    /// Fails with `MaxDepthExceeded` once the next row would push flat
    /// indices past 32 bits.
    pub fn add_row(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(WbError::MaxDepthExceeded);
        }
        let new_len = slot_count(self.depth + 1) as usize;
        self.slots.resize_with(new_len, Slot::default);
        self.weights.resize(new_len, 0);
        self.depth += 1;
        Ok(())
    }

    /// Bounds-checked slot read.
    pub fn get(&self, index: u32) -> Result<&Slot<T>> {
        self.slots
            .get(index as usize)
            .ok_or(WbError::IndexOutOfRange(index))
    }

    /// Bounds-checked raw cell write. This is a plain array store: ordering
    /// and weight counters are the engine's responsibility, not the store's.
    pub fn set(&mut self, index: u32, slot: Slot<T>) -> Result<()> {
        match self.slots.get_mut(index as usize) {
            Some(cell) => {
                *cell = slot;
                Ok(())
            }
            None => Err(WbError::IndexOutOfRange(index)),
        }
    }

    /// Occupied descendants of `index`, inclusive. Zero for any index at or
    /// beyond the allocated rows, which lets balance checks probe children
    /// below the bottom without a bounds dance.
    #[inline]
    pub fn weight(&self, index: u32) -> u32 {
        self.weights.get(index as usize).copied().unwrap_or(0)
    }

    #[inline]
    fn slot(&self, index: u32) -> &Slot<T> {
        &self.slots[index as usize]
    }

    #[inline]
    fn put(&mut self, index: u32, payload: T) {
        self.slots[index as usize] = Slot::Occupied(payload);
    }

    #[inline]
    fn take(&mut self, index: u32) -> Slot<T> {
        mem::replace(&mut self.slots[index as usize], Slot::Empty)
    }
}

impl<T> Default for FlatStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Comparator
// =============================================================================

/// Caller-supplied total order over the payload type.
///
/// For any `a`, `b`, exactly one of `is_left_of(a, b)`, `is_right_of(a, b)`,
/// or equality (neither) must hold. The engine treats "neither left nor
/// right" as an exact-equality collision and applies its duplicate policy.
///
/// Implementations may compare only part of the payload (say, the first 32
/// bits of a 64-bit hash) as long as the result is still a total order on
/// the values actually inserted.
pub trait Comparator<T> {
    fn is_left_of(&self, a: &T, b: &T) -> bool;
    fn is_right_of(&self, a: &T, b: &T) -> bool;
}

/// Comparator for anything `Ord`: smaller values sort left, so in-order
/// traversal yields ascending payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> Comparator<T> for NaturalOrder {
    #[inline]
    fn is_left_of(&self, a: &T, b: &T) -> bool {
        a < b
    }

    #[inline]
    fn is_right_of(&self, a: &T, b: &T) -> bool {
        a > b
    }
}

/// What `insert` does when the comparator reports the new payload equal to
/// a resident one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail the insert with `DuplicateRejected`.
    Reject,
    /// Keep both; equal payloads descend into the left subtree, so the left
    /// invariant relaxes to "left of or equal".
    Allow,
}

// =============================================================================
// Tree engine
// =============================================================================

/// Weight-balanced binary search tree over a flat row-doubling store.
///
/// Every public operation is atomic: a failed insert or delete leaves the
/// tree exactly as it was. Mutation requires exclusive access; `&self`
/// reads are safe only while no mutation is in flight.
pub struct WbTree<T, C> {
    store: FlatStore<T>,
    cmp: C,
    policy: DuplicatePolicy,
    alpha_num: u32,
    alpha_den: u32,
}

/// Rebuild state threaded through the recursive re-layout: the drained
/// payloads in order, plus tracking for where one element of interest lands.
struct RebuildCursor<T> {
    items: std::vec::IntoIter<T>,
    consumed: usize,
    tracked_pos: Option<usize>,
    tracked_index: Option<u32>,
}

impl<T, C: Comparator<T>> WbTree<T, C> {
    /// An empty tree that rejects duplicate payloads.
    pub fn new(cmp: C) -> Self {
        Self::with_policy(cmp, DuplicatePolicy::Reject)
    }

    /// An empty tree with an explicit duplicate policy.
    pub fn with_policy(cmp: C, policy: DuplicatePolicy) -> Self {
        let (num, den) = DEFAULT_ALPHA;
        Self::with_balance_factor(cmp, policy, num, den)
    }

    /// An empty tree with an explicit balance factor `num/den`.
    ///
    /// # Panics
    /// Panics unless `1/2 < num/den < 1`; anything outside that range either
    /// rejects legal trees or never triggers a rebuild.
    pub fn with_balance_factor(cmp: C, policy: DuplicatePolicy, num: u32, den: u32) -> Self {
        assert!(
            den < 2 * num && num < den,
            "balance factor must satisfy 1/2 < num/den < 1"
        );
        Self {
            store: FlatStore::new(),
            cmp,
            policy,
            alpha_num: num,
            alpha_den: den,
        }
    }

    /// Number of occupied nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.weight(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of allocated rows. Only ever grows.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.store.depth()
    }

    /// Number of allocated slots, occupied or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Occupied counts of the root's left and right subtrees.
    #[inline]
    pub fn weight(&self) -> [u32; 2] {
        [self.store.weight(1), self.store.weight(2)]
    }

    /// Occupied descendants of the subtree rooted at `index`, inclusive.
    pub fn weight_of(&self, index: u32) -> Result<u32> {
        if (index as usize) < self.store.len() {
            Ok(self.store.weight(index))
        } else {
            Err(WbError::IndexOutOfRange(index))
        }
    }

    /// Bounds-checked slot read.
    pub fn get(&self, index: u32) -> Result<&Slot<T>> {
        self.store.get(index)
    }

    /// Appends one row of empty slots to the store.
    pub fn add_row(&mut self) -> Result<()> {
        self.store.add_row()
    }

    /// Index of the parent of `index`.
    #[inline]
    pub fn walk_up(&self, index: u32) -> Result<u32> {
        parent_of(index)
    }

    /// Index of the left child of `index`, if that row is allocated.
    #[inline]
    pub fn walk_left(&self, index: u32) -> Result<u32> {
        left_child_of(index, self.store.depth())
    }

    /// Index of the right child of `index`, if that row is allocated.
    #[inline]
    pub fn walk_right(&self, index: u32) -> Result<u32> {
        right_child_of(index, self.store.depth())
    }

    /// Index of the node holding a payload equal to `target`, or `NotFound`.
    pub fn find(&self, target: &T) -> Result<u32> {
        let mut index = 0u32;
        while (index as usize) < self.store.len() {
            match self.store.slot(index) {
                Slot::Empty => return Err(WbError::NotFound),
                Slot::Occupied(resident) => {
                    if self.cmp.is_left_of(target, resident) {
                        index = left_index(index);
                    } else if self.cmp.is_right_of(target, resident) {
                        index = right_index(index);
                    } else {
                        return Ok(index);
                    }
                }
            }
        }
        Err(WbError::NotFound)
    }

    /// Inserts `payload` and returns the index it occupies once any
    /// rebalancing has settled.
    ///
    /// Descends like `find`, growing rows on demand, and writes the payload
    /// into the first empty slot on the comparison path. Weight counters are
    /// bumped along the path, and if some ancestor's subtree now exceeds the
    /// balance factor, the shallowest such subtree is rebuilt; the rebuild
    /// can relocate the fresh payload, so its post-rebuild index is the one
    /// reported.
    pub fn insert(&mut self, payload: T) -> Result<u32> {
        let mut path: SmallVec<[u32; 32]> = SmallVec::new();
        let mut index = 0u32;
        loop {
            if index as usize >= self.store.len() {
                self.store.add_row()?;
            }
            let next = match self.store.slot(index) {
                Slot::Empty => None,
                Slot::Occupied(resident) => {
                    if self.cmp.is_left_of(&payload, resident) {
                        Some(left_index(index))
                    } else if self.cmp.is_right_of(&payload, resident) {
                        Some(right_index(index))
                    } else if self.policy == DuplicatePolicy::Reject {
                        return Err(WbError::DuplicateRejected);
                    } else {
                        Some(left_index(index))
                    }
                }
            };
            path.push(index);
            match next {
                Some(child) => index = child,
                None => break,
            }
        }

        self.store.put(index, payload);
        for &i in &path {
            self.store.weights[i as usize] += 1;
        }

        let mut final_index = index;
        if let Some(scapegoat) = self.first_unbalanced(&path) {
            // Every path entry is an ancestor of the new node, so the
            // rebuild always reports where it landed.
            final_index = self.rebuild(scapegoat, Some(index)).unwrap_or(final_index);
        }
        Ok(final_index)
    }

    /// Clears the node at `index` and rebalances.
    ///
    /// An in-range but already-empty slot is a no-op, not an error. An index
    /// beyond the allocated store fails with `IndexOutOfRange`.
    pub fn delete_by_index(&mut self, index: u32) -> Result<()> {
        if index as usize >= self.store.len() {
            return Err(WbError::IndexOutOfRange(index));
        }
        if self.store.slot(index).is_empty() {
            return Ok(());
        }

        let cleared = self.sink_and_clear(index);

        let mut path: SmallVec<[u32; 32]> = SmallVec::new();
        let mut i = cleared;
        loop {
            self.store.weights[i as usize] -= 1;
            path.push(i);
            if i == 0 {
                break;
            }
            i = parent_index(i);
        }
        path.reverse();

        if let Some(scapegoat) = self.first_unbalanced(&path) {
            self.rebuild(scapegoat, None);
        }
        Ok(())
    }

    /// Finds a node equal to `payload` and deletes it.
    pub fn delete_by_data(&mut self, payload: &T) -> Result<()> {
        let index = self.find(payload)?;
        self.delete_by_index(index)
    }

    /// In-order iterator over `(index, payload)`, ascending per the
    /// comparator.
    pub fn iter(&self) -> Iter<'_, T> {
        let mut iter = Iter {
            store: &self.store,
            stack: Vec::new(),
        };
        iter.push_left_spine(0);
        iter
    }

    /// Replaces the payload at `index` with its in-order neighbor from the
    /// heavier subtree, repeating down the tree until a slot with no
    /// occupied children is cleared. Returns the cleared slot's index.
    /// Weight counters are left untouched; the caller settles them along the
    /// root path afterwards.
    fn sink_and_clear(&mut self, mut index: u32) -> u32 {
        loop {
            let lw = self.store.weight(left_index(index));
            let rw = self.store.weight(right_index(index));
            if lw == 0 && rw == 0 {
                self.store.take(index);
                return index;
            }

            // Heavier child first, then that subtree's in-order extreme:
            // the predecessor when descending left, the successor when
            // descending right.
            let (mut donor, toward_right) = if lw >= rw {
                (left_index(index), true)
            } else {
                (right_index(index), false)
            };
            loop {
                let next = if toward_right {
                    right_index(donor)
                } else {
                    left_index(donor)
                };
                if (next as usize) < self.store.len() && self.store.slot(next).is_occupied() {
                    donor = next;
                } else {
                    break;
                }
            }

            match self.store.take(donor) {
                Slot::Occupied(payload) => self.store.put(index, payload),
                Slot::Empty => unreachable!("positive-weight subtree with an empty root"),
            }
            index = donor;
        }
    }

    /// Shallowest node on `path` (ordered root first) whose subtree violates
    /// the balance factor. Rebuilding that one restores the invariant for
    /// the whole path: deeper path nodes sit inside the rebuilt subtree.
    fn first_unbalanced(&self, path: &[u32]) -> Option<u32> {
        path.iter().copied().find(|&i| self.is_unbalanced(i))
    }

    #[inline]
    fn is_unbalanced(&self, index: u32) -> bool {
        let l = u64::from(self.store.weight(left_index(index)));
        let r = u64::from(self.store.weight(right_index(index)));
        l.max(r) * u64::from(self.alpha_den) > u64::from(self.alpha_num) * (l + r + 1)
    }

    /// Scapegoat rebuild: drains the subtree rooted at `index` in order and
    /// re-lays it out at minimal depth, medians first, leaving it perfectly
    /// weight-balanced. The minimal layout never needs a row the old subtree
    /// did not already reach, so no growth can occur here.
    ///
    /// When `track` names a slot inside the subtree, returns the index its
    /// payload occupies after the rebuild.
    fn rebuild(&mut self, index: u32, track: Option<u32>) -> Option<u32> {
        let expected = self.store.weight(index) as usize;
        let mut drained = Vec::with_capacity(expected);
        let mut tracked_pos = None;
        self.drain_in_order(index, track, &mut drained, &mut tracked_pos);
        debug_assert_eq!(drained.len(), expected);

        let mut cursor = RebuildCursor {
            items: drained.into_iter(),
            consumed: 0,
            tracked_pos,
            tracked_index: None,
        };
        self.lay_out(index, expected, &mut cursor);
        cursor.tracked_index
    }

    fn drain_in_order(
        &mut self,
        index: u32,
        track: Option<u32>,
        out: &mut Vec<T>,
        tracked_pos: &mut Option<usize>,
    ) {
        if index as usize >= self.store.len() || self.store.slot(index).is_empty() {
            return;
        }
        self.drain_in_order(left_index(index), track, out, tracked_pos);
        self.store.weights[index as usize] = 0;
        if let Slot::Occupied(payload) = self.store.take(index) {
            if track == Some(index) {
                *tracked_pos = Some(out.len());
            }
            out.push(payload);
        }
        self.drain_in_order(right_index(index), track, out, tracked_pos);
    }

    /// Consumes `count` drained payloads in order into the subtree at
    /// `index`, splitting each range at its midpoint. Ties go left, keeping
    /// the upper rows full.
    fn lay_out(&mut self, index: u32, count: usize, cursor: &mut RebuildCursor<T>) {
        if count == 0 {
            return;
        }
        let left_n = count / 2;
        self.lay_out(left_index(index), left_n, cursor);
        if let Some(payload) = cursor.items.next() {
            if cursor.tracked_pos == Some(cursor.consumed) {
                cursor.tracked_index = Some(index);
            }
            cursor.consumed += 1;
            self.store.put(index, payload);
            self.store.weights[index as usize] = count as u32;
        }
        self.lay_out(right_index(index), count - left_n - 1, cursor);
    }
}

impl<T, C: Comparator<T> + Default> Default for WbTree<T, C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<T: Clone, C: Clone> Clone for WbTree<T, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cmp: self.cmp.clone(),
            policy: self.policy,
            alpha_num: self.alpha_num,
            alpha_den: self.alpha_den,
        }
    }
}

impl<T: fmt::Debug, C: Comparator<T>> fmt::Debug for WbTree<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// In-order iterator
// =============================================================================

/// In-order traversal over occupied slots, yielding `(index, &payload)`.
pub struct Iter<'a, T> {
    store: &'a FlatStore<T>,
    stack: Vec<u32>,
}

impl<'a, T> Iter<'a, T> {
    fn push_left_spine(&mut self, mut index: u32) {
        while (index as usize) < self.store.len() && self.store.slot(index).is_occupied() {
            self.stack.push(index);
            index = left_index(index);
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (u32, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        self.push_left_spine(right_index(index));
        let store: &'a FlatStore<T> = self.store;
        match store.slot(index) {
            Slot::Occupied(payload) => Some((index, payload)),
            // Only occupied slots are ever stacked.
            Slot::Empty => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================


#[cfg(test)]
mod proptests;
