//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 控制块存储池
//!
//! 固定容量的槽位数组，槽位在启动时一次性预留，之后不会再扩容，
//! 因此控制块地址在整个生命周期内保持稳定。
//!
//! 外部通过 [`Handle`]（槽位下标 + 代数）引用控制块。槽位被释放后
//! 代数加一，旧句柄随即失效，查找时返回 `None` 而不是访问到新的占用者。

use alloc::vec::Vec;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// 控制块句柄
///
/// `K` 只是类型标记，用来区分线程句柄与进程句柄
pub struct Handle<K> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation, _kind: PhantomData }
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// 编码为 u64，用于跨越系统调用边界
    #[inline]
    pub const fn to_raw(&self) -> u64 {
        (self.index as u64) | ((self.generation as u64) << 32)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self::new(raw as u32, (raw >> 32) as u32)
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied(T),
    Vacant { next_free: Option<u32> },
}

struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

/// 固定容量存储池
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    capacity: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K, T> Arena<K, T> {
    /// 预留 `capacity` 个槽位
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
            capacity,
            _kind: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 插入新控制块
    ///
    /// 池满时把值原样退回，不会触发扩容
    pub fn insert(&mut self, value: T) -> Result<Handle<K>, T> {
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            self.free_head = match slot.entry {
                Entry::Vacant { next_free } => next_free,
                Entry::Occupied(_) => unreachable!("arena: free list points at occupied slot"),
            };
            slot.entry = Entry::Occupied(value);
            self.len += 1;
            return Ok(Handle::new(index, slot.generation));
        }

        if self.slots.len() >= self.capacity {
            return Err(value);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, entry: Entry::Occupied(value) });
        self.len += 1;
        Ok(Handle::new(index, 0))
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        match self.slots.get(handle.index as usize) {
            Some(Slot { generation, entry: Entry::Occupied(value) })
                if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot { generation, entry: Entry::Occupied(value) })
                if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.get(handle).is_some()
    }

    /// 取出控制块并让该槽位的所有旧句柄失效
    pub fn remove(&mut self, handle: Handle<K>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || matches!(slot.entry, Entry::Vacant { .. }) {
            return None;
        }

        let old = core::mem::replace(&mut slot.entry, Entry::Vacant { next_free: self.free_head });
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(handle.index);
        self.len -= 1;

        match old {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    /// 遍历所有占用的槽位
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.entry {
            Entry::Occupied(value) => Some((Handle::new(index as u32, slot.generation), value)),
            Entry::Vacant { .. } => None,
        })
    }

    /// 可变遍历
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<K>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            match &mut slot.entry {
                Entry::Occupied(value) => Some((Handle::new(index as u32, generation), value)),
                Entry::Vacant { .. } => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Tag {}

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<Tag, u32> = Arena::with_capacity(4);
        let a = arena.insert(10).unwrap();
        let b = arena.insert(20).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&10));
        assert_eq!(arena.remove(a), Some(10));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&20));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena: Arena<Tag, &str> = Arena::with_capacity(1);
        let old = arena.insert("old").unwrap();
        arena.remove(old);
        let new = arena.insert("new").unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.get(new), Some(&"new"));
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut arena: Arena<Tag, u8> = Arena::with_capacity(2);
        arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        assert!(arena.is_full());
        assert_eq!(arena.insert(3), Err(3));
    }

    #[test]
    fn test_raw_roundtrip_keeps_generation() {
        let mut arena: Arena<Tag, u8> = Arena::with_capacity(2);
        let h = arena.insert(7).unwrap();
        arena.remove(h);
        let h2 = arena.insert(8).unwrap();
        let back: Handle<Tag> = Handle::from_raw(h2.to_raw());
        assert_eq!(back, h2);
        assert_eq!(back.generation(), 1);
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut arena: Arena<Tag, u8> = Arena::with_capacity(3);
        let a = arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        arena.insert(3).unwrap();
        arena.remove(a);
        let values: Vec<u8> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, [2, 3]);
    }
}
