use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex {
    pub index: usize,
}

/// Slot arena: removed slots are recycled by later allocations, so an index
/// is only valid while its value is alive.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::default(),
            free: Vec::default(),
        }
    }
}

impl<T> Arena<T> {
    pub fn allocate(&mut self, value: T) -> ArenaIndex {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(value);
                ArenaIndex { index }
            }
            None => {
                self.slots.push(Some(value));
                ArenaIndex {
                    index: self.slots.len() - 1,
                }
            }
        }
    }

    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let value = self.slots.get_mut(index.index)?.take();
        if value.is_some() {
            self.free.push(index.index);
        }
        value
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.slots.get(index.index).and_then(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Index<ArenaIndex> for Arena<T> {
    type Output = T;

    fn index(&self, index: ArenaIndex) -> &Self::Output {
        match &self.slots[index.index] {
            Some(value) => value,
            None => panic!("Arena slot {} was freed", index.index),
        }
    }
}

impl<T> IndexMut<ArenaIndex> for Arena<T> {
    fn index_mut(&mut self, index: ArenaIndex) -> &mut Self::Output {
        match &mut self.slots[index.index] {
            Some(value) => value,
            None => panic!("Arena slot {} was freed", index.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_removed_slots() {
        let mut arena = Arena::default();
        let first = arena.allocate("a");
        let second = arena.allocate("b");
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(first), Some("a"));
        assert_eq!(arena.remove(first), None);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.len(), 1);

        let third = arena.allocate("c");
        assert_eq!(third, first);
        assert_eq!(arena[third], "c");
        assert_eq!(arena[second], "b");
        assert_eq!(arena.len(), 2);
    }
}
