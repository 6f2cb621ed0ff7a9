//! A circular list of objects stored in a stable-indexed arena.
//!
//! Every object lives in a slot that never moves while it is linked. Slots are
//! addressed with a [`Key`] that carries a generation, so a key that outlived
//! its object is detected instead of silently pointing at whatever reused the
//! slot. Each slot knows its successor and predecessor, which keeps insertion,
//! unlinking and "next" lookups O(1).

use std::fmt::{Debug, Formatter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Key {
    index: usize,
    generation: u64,
}

struct Node<T> {
    value: T,
    next: usize,
    prev: usize,
}

enum Slot<T> {
    Occupied { generation: u64, node: Node<T> },
    Vacant { generation: u64, next_free: Option<usize> },
}

impl<T> Slot<T> {
    fn generation(&self) -> u64 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
        }
    }
}

pub struct ObjectRing<T> {
    slots: Vec<Slot<T>>,
    free: Option<usize>,
    len: usize,
}

impl<T> ObjectRing<T> {
    pub fn new() -> Self {
        ObjectRing {
            slots: Vec::new(),
            free: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Links `value` as a ring of one. Only valid on an empty ring.
    pub fn push_first(&mut self, value: T) -> Key {
        assert!(self.is_empty(), "push_first on a non-empty ring");
        let key = self.vacant_key();
        self.occupy(key, value, key.index, key.index);
        key
    }

    /// Links `value` right before `anchor`, so a walk starting at `anchor`
    /// reaches it last. Returns `None` when `anchor` is stale.
    pub fn insert_before(&mut self, anchor: Key, value: T) -> Option<Key> {
        let prev = self.node(anchor)?.prev;
        Some(self.link_between(prev, anchor.index, value))
    }

    /// Unlinks the object behind `key` and frees its slot.
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let (next, prev) = {
            let node = self.node(key)?;
            (node.next, node.prev)
        };
        let vacant = Slot::Vacant {
            generation: key.generation + 1,
            next_free: self.free,
        };
        let Slot::Occupied { node, .. } = std::mem::replace(&mut self.slots[key.index], vacant)
        else {
            unreachable!("slot checked occupied above");
        };
        if next != key.index {
            self.node_at_mut(prev).next = next;
            self.node_at_mut(next).prev = prev;
        }
        self.free = Some(key.index);
        self.len -= 1;
        Some(node.value)
    }

    fn contains(&self, key: Key) -> bool {
        self.node(key).is_some()
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.node(key).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.slots.get_mut(key.index) {
            Some(Slot::Occupied { generation, node }) if *generation == key.generation => {
                Some(&mut node.value)
            }
            _ => None,
        }
    }

    fn prev(&self, key: Key) -> Option<Key> {
        let prev = self.node(key)?.prev;
        Some(self.key_at(prev))
    }

    /// Walks the whole ring once starting with the successor of `start` and
    /// ending with `start` itself.
    pub fn iter_after(&self, start: Key) -> IterAfter<'_, T> {
        let remaining = if self.contains(start) { self.len } else { 0 };
        IterAfter {
            ring: self,
            cursor: start.index,
            remaining,
        }
    }

    /// Returns the first object after `start` (ending with `start` itself) that
    /// satisfies `predicate`.
    pub fn find_after<P>(&self, start: Key, mut predicate: P) -> Option<Key>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter_after(start)
            .find(|(_, value)| predicate(value))
            .map(|(key, _)| key)
    }

    /// Unlinks every object, in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        let mut free = None;
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => *generation + 1,
                Slot::Vacant { generation, .. } => *generation,
            };
            let vacant = Slot::Vacant {
                generation,
                next_free: free,
            };
            if let Slot::Occupied { node, .. } = std::mem::replace(slot, vacant) {
                values.push(node.value);
            }
            free = Some(index);
        }
        self.free = free;
        self.len = 0;
        values.reverse();
        values
    }

    fn node(&self, key: Key) -> Option<&Node<T>> {
        match self.slots.get(key.index) {
            Some(Slot::Occupied { generation, node }) if *generation == key.generation => {
                Some(node)
            }
            _ => None,
        }
    }

    fn node_at_mut(&mut self, index: usize) -> &mut Node<T> {
        match &mut self.slots[index] {
            Slot::Occupied { node, .. } => node,
            Slot::Vacant { .. } => unreachable!("ring link points at a vacant slot"),
        }
    }

    fn key_at(&self, index: usize) -> Key {
        Key {
            index,
            generation: self.slots[index].generation(),
        }
    }

    fn link_between(&mut self, prev: usize, next: usize, value: T) -> Key {
        let key = self.vacant_key();
        self.occupy(key, value, next, prev);
        self.node_at_mut(prev).next = key.index;
        self.node_at_mut(next).prev = key.index;
        key
    }

    fn vacant_key(&mut self) -> Key {
        match self.free {
            Some(index) => {
                let Slot::Vacant {
                    generation,
                    next_free,
                } = self.slots[index]
                else {
                    unreachable!("free list points at an occupied slot");
                };
                self.free = next_free;
                Key { index, generation }
            }
            None => {
                self.slots.push(Slot::Vacant {
                    generation: 0,
                    next_free: None,
                });
                Key {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn occupy(&mut self, key: Key, value: T, next: usize, prev: usize) {
        self.slots[key.index] = Slot::Occupied {
            generation: key.generation,
            node: Node { value, next, prev },
        };
        self.len += 1;
    }
}

impl<T> Default for ObjectRing<T> {
    fn default() -> Self {
        ObjectRing::new()
    }
}

impl<T: Debug> Debug for ObjectRing<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        if let Some(first) = self.slots.iter().position(|slot| matches!(slot, Slot::Occupied { .. })) {
            let start = self.key_at(first);
            for (_, value) in self.iter_after(self.prev(start).unwrap_or(start)) {
                list.entry(value);
            }
        }
        list.finish()
    }
}

pub struct IterAfter<'a, T> {
    ring: &'a ObjectRing<T>,
    cursor: usize,
    remaining: usize,
}

impl<'a, T> Iterator for IterAfter<'a, T> {
    type Item = (Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let next = match &self.ring.slots[self.cursor] {
            Slot::Occupied { node, .. } => node.next,
            Slot::Vacant { .. } => return None,
        };
        self.cursor = next;
        let key = self.ring.key_at(next);
        match &self.ring.slots[next] {
            Slot::Occupied { node, .. } => Some((key, &node.value)),
            Slot::Vacant { .. } => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
