// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A pooled slot allocator for fixed-layout objects.
//!
//! Requests and batches are allocated and freed on the submission hot path,
//! so they come out of a pool that grows in fixed-size blocks instead of
//! hitting the general-purpose allocator per object. Freed slots are
//! recycled through a free list in constant time.
//!
//! Slots are addressed by [`PoolKey`]s carrying a generation counter, so a
//! key held past its slot's lifetime fails lookups instead of aliasing a
//! recycled object. The pool itself is a plain data structure; callers that
//! share it across threads guard it with their own mutex.

/// Number of slots added every time the pool grows.
pub const BLOCK_SLOTS: usize = 64;

/// A generation-checked handle to a slot in a [`SlotPool`].
///
/// Combines the slot index with a generation count: when a slot is freed its
/// generation is incremented, so stale keys pointing at a recycled slot
/// resolve to `None` rather than to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Index of the slot across all blocks.
    pub index: u32,
    /// Generation the slot had when this key was issued.
    pub generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A growable pool of fixed-size blocks handing out generation-checked slots.
#[derive(Debug)]
pub struct SlotPool<T> {
    blocks: Vec<Box<[Slot<T>]>>,
    free: Vec<u32>,
    live: usize,
    // Lower bound for generations of slots created after a trim, so keys
    // issued before the trim can never match a fresh slot.
    generation_floor: u32,
}

impl<T> SlotPool<T> {
    /// Creates an empty pool. No block is allocated until the first insert.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            free: Vec::new(),
            live: 0,
            generation_floor: 0,
        }
    }

    /// Inserts a value, growing by one block if no slot is free.
    pub fn insert(&mut self, value: T) -> PoolKey {
        if self.free.is_empty() {
            self.grow();
        }
        // grow() always pushes BLOCK_SLOTS entries.
        let index = self.free.pop().unwrap();
        let slot = self.slot_mut(index);
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        let generation = slot.generation;
        self.live += 1;
        PoolKey { index, generation }
    }

    /// Returns the value for `key` if the slot is live and the generation
    /// matches.
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        let block = self.blocks.get(key.index as usize / BLOCK_SLOTS)?;
        let slot = &block[key.index as usize % BLOCK_SLOTS];
        if slot.generation == key.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Mutable counterpart of [`SlotPool::get`].
    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        let block = self.blocks.get_mut(key.index as usize / BLOCK_SLOTS)?;
        let slot = &mut block[key.index as usize % BLOCK_SLOTS];
        if slot.generation == key.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Removes and returns the value for `key`, recycling its slot.
    ///
    /// Stale keys are a safe no-op returning `None`.
    pub fn remove(&mut self, key: PoolKey) -> Option<T> {
        let block = self.blocks.get_mut(key.index as usize / BLOCK_SLOTS)?;
        let slot = &mut block[key.index as usize % BLOCK_SLOTS];
        if slot.generation != key.generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.generation_floor = self.generation_floor.max(slot.generation);
        self.free.push(key.index);
        self.live -= 1;
        value
    }

    /// Releases every block back to the system if no slot is live.
    ///
    /// This exists so a memory-pressure signal can reclaim pool memory when
    /// the pool is idle; with outstanding slots it is a no-op.
    pub fn trim(&mut self) {
        if self.live == 0 {
            self.blocks.clear();
            self.free.clear();
        }
    }

    /// Number of live slots.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of blocks currently owned by the pool.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn grow(&mut self) {
        let base = (self.blocks.len() * BLOCK_SLOTS) as u32;
        let floor = self.generation_floor;
        let block: Box<[Slot<T>]> = (0..BLOCK_SLOTS)
            .map(|_| Slot {
                generation: floor,
                value: None,
            })
            .collect();
        self.blocks.push(block);
        // Reverse so slots are handed out in ascending index order.
        for offset in (0..BLOCK_SLOTS as u32).rev() {
            self.free.push(base + offset);
        }
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot<T> {
        &mut self.blocks[index as usize / BLOCK_SLOTS][index as usize % BLOCK_SLOTS]
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut pool = SlotPool::new();
        let key = pool.insert("alpha");
        assert_eq!(pool.get(key), Some(&"alpha"));
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.remove(key), Some("alpha"));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.get(key), None);
    }

    #[test]
    fn stale_key_misses_recycled_slot() {
        let mut pool = SlotPool::new();
        let old = pool.insert(1u32);
        pool.remove(old);
        let new = pool.insert(2u32);
        assert_eq!(new.index, old.index, "slot should be recycled");
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get_mut(old), None);
        assert_eq!(pool.remove(old), None);
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn tight_alloc_free_loop_stays_within_one_block() {
        let mut pool = SlotPool::new();
        for i in 0..1_000u32 {
            let key = pool.insert(i);
            assert_eq!(pool.remove(key), Some(i));
        }
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn pool_grows_beyond_one_block_under_load() {
        let mut pool = SlotPool::new();
        let keys: Vec<_> = (0..BLOCK_SLOTS as u32 + 1).map(|i| pool.insert(i)).collect();
        assert_eq!(pool.block_count(), 2);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(pool.get(*key), Some(&(i as u32)));
        }
    }

    #[test]
    fn trim_releases_blocks_only_when_idle() {
        let mut pool = SlotPool::new();
        let key = pool.insert(42u32);
        pool.trim();
        assert_eq!(pool.block_count(), 1, "trim with live slots is a no-op");
        pool.remove(key);
        pool.trim();
        assert_eq!(pool.block_count(), 0);
    }

    #[test]
    fn keys_from_before_a_trim_never_match_fresh_slots() {
        let mut pool = SlotPool::new();
        let old = pool.insert(1u32);
        pool.remove(old);
        pool.trim();
        let new = pool.insert(2u32);
        assert_eq!(new.index, old.index);
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get(new), Some(&2));
    }
}
