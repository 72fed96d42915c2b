//! The concurrent NodeId → Node map (C7, spec.md §4.7).
//!
//! An open-addressing hash table with double hashing, grown and shrunk
//! across a fixed prime sequence. Readers take a short per-bucket read lock
//! only long enough to clone the bucket's [`NodeRef`]; once cloned, the
//! reference is independent of any further table activity. Writers
//! serialize with each other per bucket via that same lock. Table resizes
//! take the outer lock exclusively, which is the one point where the whole
//! table is briefly unavailable to everyone — rare enough (grow/shrink only)
//! not to violate the spirit of "readers never blocked by writers".

use std::sync::{Arc, RwLock};

use super::node::{Node, NodeRef};
use crate::codec::{write_node_id, Writer};
use crate::core::{
    NodeId, NODESTORE_GROW_LOAD_FACTOR, NODESTORE_MIN_BUCKETS, NODESTORE_PRIME_SIZES,
    NODESTORE_SHRINK_LOAD_FACTOR,
};

/// 32-bit MurmurHash3 (x86), over the node's wire-encoded NodeId bytes plus
/// its namespace index (spec.md §4.7: "Hash is a 32-bit Murmur3 over the
/// variant payload plus namespace index").
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut hash = seed;
    let chunks = data.chunks_exact(4);
    let remainder = chunks.remainder();

    for chunk in chunks {
        let mut k = u32::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        hash ^= k;
        hash = hash.rotate_left(13);
        hash = hash.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let mut k1 = 0u32;
    for (i, byte) in remainder.iter().enumerate() {
        k1 ^= (*byte as u32) << (8 * i);
    }
    if !remainder.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        hash ^= k1;
    }

    hash ^= data.len() as u32;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85ebca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2ae35);
    hash ^= hash >> 16;
    hash
}

fn hash_node_id(id: &NodeId) -> u32 {
    let mut w = Writer::new();
    write_node_id(&mut w, id).expect("NodeId encoding never exceeds an unbounded writer's limit");
    let mut bytes = w.into_bytes();
    bytes.extend_from_slice(&id.namespace.to_le_bytes());
    murmur3_32(&bytes, 0)
}

/// `h2 = 1 + h mod (size - 2)` (spec.md §4.7).
fn second_hash(h: u32, size: usize) -> usize {
    1 + (h as usize % (size - 2))
}

enum Slot {
    Empty,
    Tombstone,
    Occupied(NodeId, NodeRef),
}

struct Table {
    slots: Vec<RwLock<Slot>>,
    len: usize,
}

impl Table {
    fn with_capacity(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || RwLock::new(Slot::Empty));
        Self { slots, len: 0 }
    }

    fn load_factor(&self) -> f64 {
        self.len as f64 / self.slots.len() as f64
    }

    /// Probe sequence for `id`, visiting every slot at most once.
    fn probe(&self, id: &NodeId) -> impl Iterator<Item = usize> + '_ {
        let h = hash_node_id(id);
        let size = self.slots.len();
        let start = h as usize % size;
        let step = second_hash(h, size);
        (0..size).map(move |i| (start + i * step) % size)
    }
}

fn next_prime_up(current: usize) -> usize {
    NODESTORE_PRIME_SIZES
        .iter()
        .copied()
        .find(|&p| p > current)
        .unwrap_or(current * 2 + 1)
}

fn next_prime_down(current: usize) -> usize {
    NODESTORE_PRIME_SIZES
        .iter()
        .rev()
        .copied()
        .find(|&p| p < current)
        .unwrap_or(NODESTORE_MIN_BUCKETS)
}

/// The concurrent node map (spec.md §4.7).
pub struct NodeStore {
    table: RwLock<Table>,
}

/// Insert options (spec.md §4.7 `insert(node, {unique?, return-managed?})`).
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOptions {
    /// Reject the insert if a node with this id already exists.
    pub unique: bool,
}

impl NodeStore {
    /// Start an empty store at the minimum bucket count.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::with_capacity(NODESTORE_MIN_BUCKETS)),
        }
    }

    /// Insert `node`, keyed by its own `node_id`.
    pub fn insert(&self, node: Node, opts: InsertOptions) -> Result<NodeRef, crate::core::AddressSpaceError> {
        self.maybe_grow();
        let id = node.node_id.clone();
        let node_ref: NodeRef = Arc::new(RwLock::new(node));
        let table = self.table.read().unwrap();

        let mut free_slot = None;
        for idx in table.probe(&id) {
            let slot = table.slots[idx].read().unwrap();
            match &*slot {
                Slot::Occupied(existing_id, _) if *existing_id == id => {
                    if opts.unique {
                        return Err(crate::core::AddressSpaceError::NodeExists);
                    }
                    drop(slot);
                    free_slot = Some(idx);
                    break;
                }
                Slot::Empty | Slot::Tombstone if free_slot.is_none() => {
                    free_slot = Some(idx);
                }
                _ => {}
            }
        }

        let idx = free_slot.ok_or(crate::core::AddressSpaceError::NotFound)?;
        let mut slot = table.slots[idx].write().unwrap();
        let was_vacant = matches!(&*slot, Slot::Empty | Slot::Tombstone);
        *slot = Slot::Occupied(id, node_ref.clone());
        drop(slot);
        drop(table);
        if was_vacant {
            let mut table = self.table.write().unwrap();
            table.len += 1;
        }
        Ok(node_ref)
    }

    /// Fetch a borrowed reference to the node with `id`, if present.
    pub fn get(&self, id: &NodeId) -> Option<NodeRef> {
        let table = self.table.read().unwrap();
        for idx in table.probe(id) {
            let slot = table.slots[idx].read().unwrap();
            match &*slot {
                Slot::Occupied(existing, node_ref) if existing == id => return Some(node_ref.clone()),
                Slot::Empty => return None,
                _ => continue,
            }
        }
        None
    }

    /// Replace the node at `node.node_id`, failing if it is absent.
    pub fn replace(&self, node: Node) -> Result<NodeRef, crate::core::AddressSpaceError> {
        let id = node.node_id.clone();
        let node_ref: NodeRef = Arc::new(RwLock::new(node));
        let table = self.table.read().unwrap();
        for idx in table.probe(&id) {
            let mut slot = table.slots[idx].write().unwrap();
            match &*slot {
                Slot::Occupied(existing, _) if *existing == id => {
                    *slot = Slot::Occupied(id, node_ref.clone());
                    return Ok(node_ref);
                }
                Slot::Empty => break,
                _ => continue,
            }
        }
        Err(crate::core::AddressSpaceError::UnknownNode)
    }

    /// Tombstone the node with `id`. Any outstanding [`NodeRef`] clones keep
    /// the node alive until they are dropped (deferred reclamation).
    pub fn remove(&self, id: &NodeId) -> Result<(), crate::core::AddressSpaceError> {
        let table = self.table.read().unwrap();
        for idx in table.probe(id) {
            let mut slot = table.slots[idx].write().unwrap();
            match &*slot {
                Slot::Occupied(existing, _) if existing == id => {
                    *slot = Slot::Tombstone;
                    drop(slot);
                    drop(table);
                    let mut table = self.table.write().unwrap();
                    table.len = table.len.saturating_sub(1);
                    self.maybe_shrink_locked(&mut table);
                    return Ok(());
                }
                Slot::Empty => break,
                _ => continue,
            }
        }
        Err(crate::core::AddressSpaceError::UnknownNode)
    }

    /// Visit every live node in the table. `visitor` sees each node's
    /// reference, not a fixed snapshot of its contents.
    pub fn iterate(&self, mut visitor: impl FnMut(&NodeId, &NodeRef)) {
        let table = self.table.read().unwrap();
        for slot in &table.slots {
            if let Slot::Occupied(id, node_ref) = &*slot.read().unwrap() {
                visitor(id, node_ref);
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.table.read().unwrap().len
    }

    /// True when the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_grow(&self) {
        let need_grow = {
            let table = self.table.read().unwrap();
            table.load_factor() > NODESTORE_GROW_LOAD_FACTOR
        };
        if need_grow {
            self.resize(|current| next_prime_up(current));
        }
    }

    fn maybe_shrink_locked(&self, table: &mut Table) {
        if table.load_factor() < NODESTORE_SHRINK_LOAD_FACTOR && table.slots.len() > NODESTORE_MIN_BUCKETS {
            let new_size = next_prime_down(table.slots.len()).max(NODESTORE_MIN_BUCKETS);
            *table = rehash(table, new_size);
        }
    }

    fn resize(&self, new_size_fn: impl Fn(usize) -> usize) {
        let mut table = self.table.write().unwrap();
        let new_size = new_size_fn(table.slots.len());
        *table = rehash(&table, new_size);
    }
}

fn rehash(old: &Table, new_size: usize) -> Table {
    let mut new_table = Table::with_capacity(new_size);
    for slot in &old.slots {
        if let Slot::Occupied(id, node_ref) = &*slot.read().unwrap() {
            for idx in new_table.probe(id) {
                if matches!(*new_table.slots[idx].read().unwrap(), Slot::Empty) {
                    *new_table.slots[idx].write().unwrap() = Slot::Occupied(id.clone(), node_ref.clone());
                    new_table.len += 1;
                    break;
                }
            }
        }
    }
    new_table
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}
