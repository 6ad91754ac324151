//! Spatial hash from block address to pool slot
//!
//! Fixed bucket array (one entry per bucket) followed by an excess list for
//! collisions. Chains are singly linked through entry ids; the excess list
//! keeps its own free stack.

use crate::core::types::IVec3;

/// What a hash entry points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPtr {
    /// Unused entry
    Empty,
    /// Block exists but only on host storage
    Archived,
    /// Block is device resident in this pool slot
    Slot(u32),
}

impl EntryPtr {
    pub fn is_live(&self) -> bool {
        !matches!(self, EntryPtr::Empty)
    }

    pub fn slot(&self) -> Option<u32> {
        match self {
            EntryPtr::Slot(s) => Some(*s),
            _ => None,
        }
    }
}

/// One entry of the hash table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashEntry {
    /// Block address
    pub pos: IVec3,
    /// Next entry id in this bucket's chain
    pub next: Option<u32>,
    pub ptr: EntryPtr,
}

impl HashEntry {
    const EMPTY: HashEntry = HashEntry {
        pos: IVec3::ZERO,
        next: None,
        ptr: EntryPtr::Empty,
    };
}

/// Bucket index of a block address
#[inline]
pub fn hash_index(pos: IVec3, bucket_count: u32) -> u32 {
    debug_assert!(bucket_count.is_power_of_two());
    let h = (pos.x as u32).wrapping_mul(73_856_093)
        ^ (pos.y as u32).wrapping_mul(19_349_669)
        ^ (pos.z as u32).wrapping_mul(83_492_791);
    h & (bucket_count - 1)
}

/// Bucketed hash with a bounded excess list
pub struct HashTable {
    /// `bucket_count` bucket entries followed by the excess entries
    entries: Vec<HashEntry>,
    bucket_count: u32,
    /// Free excess entry ids
    excess_free: Vec<u32>,
    live_count: u32,
}

impl HashTable {
    /// Create a table. `bucket_count` must be a power of two.
    pub fn new(bucket_count: u32, excess_list_size: u32) -> Self {
        assert!(bucket_count.is_power_of_two(), "bucket count must be a power of two");
        let total = bucket_count + excess_list_size;
        Self {
            entries: vec![HashEntry::EMPTY; total as usize],
            bucket_count,
            excess_free: (bucket_count..total).rev().collect(),
            live_count: 0,
        }
    }

    /// Entry id holding `pos`, if any
    pub fn find(&self, pos: IVec3) -> Option<u32> {
        let mut id = Some(hash_index(pos, self.bucket_count));
        while let Some(i) = id {
            let entry = &self.entries[i as usize];
            if entry.ptr.is_live() && entry.pos == pos {
                return Some(i);
            }
            id = entry.next;
        }
        None
    }

    /// Check if inserting `pos` would find room
    pub fn can_insert(&self, pos: IVec3) -> bool {
        let head = &self.entries[hash_index(pos, self.bucket_count) as usize];
        !head.ptr.is_live() || !self.excess_free.is_empty()
    }

    /// Insert an address that is not yet present.
    ///
    /// Returns the new entry id, or `None` when the bucket is taken and the
    /// excess list is exhausted.
    pub fn insert(&mut self, pos: IVec3, ptr: EntryPtr) -> Option<u32> {
        debug_assert!(self.find(pos).is_none());
        debug_assert!(ptr.is_live());
        let bucket = hash_index(pos, self.bucket_count);
        let head = &mut self.entries[bucket as usize];

        let id = if !head.ptr.is_live() {
            head.pos = pos;
            head.ptr = ptr;
            bucket
        } else {
            let id = self.excess_free.pop()?;
            let head_next = head.next;
            head.next = Some(id);
            self.entries[id as usize] = HashEntry {
                pos,
                next: head_next,
                ptr,
            };
            id
        };
        self.live_count += 1;
        Some(id)
    }

    /// Remove an entry. Bucket heads are emptied in place so the rest of
    /// their chain stays reachable; excess entries are unlinked and freed.
    pub fn remove(&mut self, id: u32) {
        let entry = self.entries[id as usize];
        if !entry.ptr.is_live() {
            return;
        }
        self.live_count -= 1;

        if id < self.bucket_count {
            self.entries[id as usize].ptr = EntryPtr::Empty;
            return;
        }

        let mut prev = hash_index(entry.pos, self.bucket_count);
        while let Some(next) = self.entries[prev as usize].next {
            if next == id {
                self.entries[prev as usize].next = entry.next;
                break;
            }
            prev = next;
        }
        self.entries[id as usize] = HashEntry::EMPTY;
        self.excess_free.push(id);
    }

    #[inline]
    pub fn entry(&self, id: u32) -> &HashEntry {
        &self.entries[id as usize]
    }

    /// Repoint a live entry
    pub fn set_ptr(&mut self, id: u32, ptr: EntryPtr) {
        debug_assert!(self.entries[id as usize].ptr.is_live() && ptr.is_live());
        self.entries[id as usize].ptr = ptr;
    }

    /// Live entries with their ids, in id order
    pub fn iter_live(&self) -> impl Iterator<Item = (u32, &HashEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.ptr.is_live())
            .map(|(i, e)| (i as u32, e))
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Total entries (buckets + excess)
    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Excess entries currently linked into chains
    pub fn excess_used(&self) -> u32 {
        self.entries.len() as u32 - self.bucket_count - self.excess_free.len() as u32
    }
}
