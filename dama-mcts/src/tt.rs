//! Transposition table: direct-indexed, always-replace.
//!
//! Slots point at canonical tree nodes in the arena, so the table must be
//! cleared whenever the arena is reset. Lookups require full component-wise
//! position equality on top of the hash match; a colliding entry is a miss,
//! never an alias.

use crate::node::Node;
use dama_core::Position;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Clone, Copy)]
struct Slot {
    hash: u64,
    node: *const Node,
}

const EMPTY: Slot = Slot {
    hash: 0,
    node: ptr::null(),
};

pub struct TranspositionTable {
    slots: Mutex<Box<[Slot]>>,
    mask: u64,
    hits: AtomicU64,
    collisions: AtomicU64,
}

unsafe impl Send for TranspositionTable {}
unsafe impl Sync for TranspositionTable {}

impl TranspositionTable {
    /// Table with `2^bits` slots.
    pub fn new(bits: u32) -> Self {
        let size = 1usize << bits;
        Self {
            slots: Mutex::new(vec![EMPTY; size].into_boxed_slice()),
            mask: (size - 1) as u64,
            hits: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
        }
    }

    /// Fetch the canonical node for `position`, or `None` on a miss or a
    /// hash collision (full equality guards against aliasing).
    pub(crate) fn lookup(&self, hash: u64, position: &Position) -> Option<&Node> {
        let slots = self.slots.lock().unwrap();
        let slot = slots[(hash & self.mask) as usize];
        if slot.node.is_null() || slot.hash != hash {
            return None;
        }
        let node = unsafe { &*slot.node };
        if node.position() != position {
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(node)
    }

    /// Point the position's slot at `node`, unconditionally.
    pub(crate) fn insert(&self, node: &Node) {
        let hash = node.position().hash();
        let mut slots = self.slots.lock().unwrap();
        let slot = &mut slots[(hash & self.mask) as usize];
        if !slot.node.is_null() && slot.hash != hash {
            self.collisions.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Slot {
            hash,
            node: node as *const Node,
        };
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn collisions(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    /// Drop every entry. Must run before the backing arena is reset.
    pub fn clear(&mut self) {
        let slots = self.slots.get_mut().unwrap();
        slots.fill(EMPTY);
        *self.hits.get_mut() = 0;
        *self.collisions.get_mut() = 0;
    }
}
