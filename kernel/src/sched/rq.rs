//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 运行队列与睡眠队列
//!
//! 队列是侵入式的：链接指针保存在控制块自身（[`ListNode`]），
//! 队列只记录头尾句柄。入队/出队不会分配内存，可以在关中断的
//! 调度路径上使用。
//!
//! - [`RunList`]: 单个 FIFO
//! - [`ReadyQueues`]: 每个优先级一个 FIFO，0 为最高优先级
//! - [`SleepQueue`]: 按唤醒时间升序排列

use super::arena::{Arena, Handle};
use crate::config::PRIO_LEVELS;

/// 侵入式链表节点
pub trait ListNode {
    type Kind;
    fn next_link(&self) -> Option<Handle<Self::Kind>>;
    fn set_next_link(&mut self, next: Option<Handle<Self::Kind>>);
}

/// 侵入式 FIFO
pub struct RunList<K> {
    head: Option<Handle<K>>,
    tail: Option<Handle<K>>,
    len: usize,
}

impl<K> RunList<K> {
    pub const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn front(&self) -> Option<Handle<K>> {
        self.head
    }

    /// 追加到队尾
    pub fn push_back<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>, handle: Handle<K>) {
        if let Some(node) = arena.get_mut(handle) {
            node.set_next_link(None);
        } else {
            return;
        }

        match self.tail {
            Some(tail) => {
                if let Some(node) = arena.get_mut(tail) {
                    node.set_next_link(Some(handle));
                }
            }
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.len += 1;
    }

    /// 取出队头
    pub fn pop_front<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>) -> Option<Handle<K>> {
        let head = self.head?;
        let next = match arena.get_mut(head) {
            Some(node) => {
                let next = node.next_link();
                node.set_next_link(None);
                next
            }
            None => None,
        };

        self.head = next;
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(head)
    }

    /// 插入到 `prev` 之后，`prev` 为 `None` 时插入到队头
    fn insert_after<T: ListNode<Kind = K>>(
        &mut self,
        arena: &mut Arena<K, T>,
        prev: Option<Handle<K>>,
        handle: Handle<K>,
    ) {
        let next = match prev {
            Some(p) => arena.get(p).and_then(|n| n.next_link()),
            None => self.head,
        };

        if let Some(node) = arena.get_mut(handle) {
            node.set_next_link(next);
        } else {
            return;
        }

        match prev {
            Some(p) => {
                if let Some(node) = arena.get_mut(p) {
                    node.set_next_link(Some(handle));
                }
            }
            None => self.head = Some(handle),
        }
        if next.is_none() {
            self.tail = Some(handle);
        }
        self.len += 1;
    }

    /// 从队列中摘除指定节点
    ///
    /// 返回节点是否在队列中
    pub fn remove<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>, handle: Handle<K>) -> bool {
        let mut prev: Option<Handle<K>> = None;
        let mut cursor = self.head;

        while let Some(cur) = cursor {
            let next = arena.get(cur).and_then(|n| n.next_link());
            if cur == handle {
                match prev {
                    Some(p) => {
                        if let Some(node) = arena.get_mut(p) {
                            node.set_next_link(next);
                        }
                    }
                    None => self.head = next,
                }
                if self.tail == Some(handle) {
                    self.tail = prev;
                }
                if let Some(node) = arena.get_mut(handle) {
                    node.set_next_link(None);
                }
                self.len -= 1;
                return true;
            }
            prev = cursor;
            cursor = next;
        }
        false
    }

    /// 按队列顺序遍历
    pub fn iter<'a, T: ListNode<Kind = K>>(&self, arena: &'a Arena<K, T>) -> impl Iterator<Item = Handle<K>> + 'a {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let cur = cursor?;
            cursor = arena.get(cur).and_then(|n| n.next_link());
            Some(cur)
        })
    }
}

impl<K> Default for RunList<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// 多级就绪队列
///
/// 严格优先级：总是从编号最小的非空队列取队头；同一级内 FIFO
pub struct ReadyQueues<K> {
    levels: [RunList<K>; PRIO_LEVELS],
    nr_ready: usize,
}

impl<K> ReadyQueues<K> {
    pub fn new() -> Self {
        Self {
            levels: core::array::from_fn(|_| RunList::new()),
            nr_ready: 0,
        }
    }

    /// 就绪线程总数
    #[inline]
    pub fn nr_ready(&self) -> usize {
        self.nr_ready
    }

    /// 指定优先级上的就绪线程数
    #[inline]
    pub fn len_at(&self, prio: u8) -> usize {
        self.levels.get(prio as usize).map_or(0, |l| l.len())
    }

    pub fn enqueue<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>, prio: u8, handle: Handle<K>) {
        let level = (prio as usize).min(PRIO_LEVELS - 1);
        self.levels[level].push_back(arena, handle);
        self.nr_ready += 1;
    }

    pub fn dequeue<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>, prio: u8, handle: Handle<K>) -> bool {
        let level = (prio as usize).min(PRIO_LEVELS - 1);
        let found = self.levels[level].remove(arena, handle);
        if found {
            self.nr_ready -= 1;
        }
        found
    }

    /// 从最高优先级开始扫描，取出第一个非空队列的队头
    pub fn pop_highest<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>) -> Option<Handle<K>> {
        for level in self.levels.iter_mut() {
            if let Some(handle) = level.pop_front(arena) {
                self.nr_ready -= 1;
                return Some(handle);
            }
        }
        None
    }

    /// 最高的非空优先级
    pub fn highest_ready(&self) -> Option<u8> {
        self.levels.iter().position(|l| !l.is_empty()).map(|p| p as u8)
    }

    /// 高于 `prio`（编号更小）的队列中是否有就绪线程
    pub fn has_ready_above(&self, prio: u8) -> bool {
        self.highest_ready().map_or(false, |p| p < prio)
    }
}

impl<K> Default for ReadyQueues<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// 需要唤醒时间的节点
pub trait Deadline {
    fn deadline(&self) -> u64;
}

/// 睡眠队列
///
/// 按唤醒时间升序排列；唤醒时间相同的节点保持入队顺序
pub struct SleepQueue<K> {
    list: RunList<K>,
}

impl<K> SleepQueue<K> {
    pub const fn new() -> Self {
        Self { list: RunList::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// 按节点自身的唤醒时间插入
    pub fn insert<T: ListNode<Kind = K> + Deadline>(&mut self, arena: &mut Arena<K, T>, handle: Handle<K>) {
        let key = match arena.get(handle) {
            Some(node) => node.deadline(),
            None => return,
        };

        let mut prev = None;
        let mut cursor = self.list.front();
        while let Some(cur) = cursor {
            let node = match arena.get(cur) {
                Some(node) => node,
                None => break,
            };
            if node.deadline() > key {
                break;
            }
            prev = Some(cur);
            cursor = node.next_link();
        }
        self.list.insert_after(arena, prev, handle);
    }

    /// 最早的唤醒时间
    pub fn peek_deadline<T: ListNode<Kind = K> + Deadline>(&self, arena: &Arena<K, T>) -> Option<u64> {
        self.list.front().and_then(|h| arena.get(h)).map(|n| n.deadline())
    }

    pub fn pop_min<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>) -> Option<Handle<K>> {
        self.list.pop_front(arena)
    }

    pub fn remove<T: ListNode<Kind = K>>(&mut self, arena: &mut Arena<K, T>, handle: Handle<K>) -> bool {
        self.list.remove(arena, handle)
    }
}

impl<K> Default for SleepQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    enum Tag {}

    struct Node {
        deadline: u64,
        next: Option<Handle<Tag>>,
    }

    impl ListNode for Node {
        type Kind = Tag;
        fn next_link(&self) -> Option<Handle<Tag>> {
            self.next
        }
        fn set_next_link(&mut self, next: Option<Handle<Tag>>) {
            self.next = next;
        }
    }

    impl Deadline for Node {
        fn deadline(&self) -> u64 {
            self.deadline
        }
    }

    fn node(deadline: u64) -> Node {
        Node { deadline, next: None }
    }

    #[test]
    fn test_run_list_fifo() {
        let mut arena = Arena::with_capacity(8);
        let a = arena.insert(node(0)).ok().unwrap();
        let b = arena.insert(node(0)).ok().unwrap();
        let c = arena.insert(node(0)).ok().unwrap();

        let mut list = RunList::new();
        list.push_back(&mut arena, a);
        list.push_back(&mut arena, b);
        list.push_back(&mut arena, c);
        assert_eq!(list.len(), 3);

        assert_eq!(list.pop_front(&mut arena), Some(a));
        assert_eq!(list.pop_front(&mut arena), Some(b));
        list.push_back(&mut arena, a);
        assert_eq!(list.pop_front(&mut arena), Some(c));
        assert_eq!(list.pop_front(&mut arena), Some(a));
        assert_eq!(list.pop_front(&mut arena), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_run_list_remove_middle_and_tail() {
        let mut arena = Arena::with_capacity(8);
        let hs: Vec<_> = (0..4).map(|_| arena.insert(node(0)).ok().unwrap()).collect();
        let mut list = RunList::new();
        for &h in &hs {
            list.push_back(&mut arena, h);
        }

        assert!(list.remove(&mut arena, hs[1]));
        assert!(list.remove(&mut arena, hs[3]));
        assert!(!list.remove(&mut arena, hs[3]));

        // 摘除队尾后追加，链接必须接在新的队尾之后
        list.push_back(&mut arena, hs[1]);
        let order: Vec<_> = list.iter(&arena).collect();
        assert_eq!(order, [hs[0], hs[2], hs[1]]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_ready_queues_strict_priority() {
        let mut arena = Arena::with_capacity(8);
        let low = arena.insert(node(0)).ok().unwrap();
        let high = arena.insert(node(0)).ok().unwrap();
        let mid = arena.insert(node(0)).ok().unwrap();

        let mut rq = ReadyQueues::new();
        rq.enqueue(&mut arena, 9, low);
        rq.enqueue(&mut arena, 0, high);
        rq.enqueue(&mut arena, 4, mid);
        assert_eq!(rq.nr_ready(), 3);
        assert_eq!(rq.highest_ready(), Some(0));
        assert!(rq.has_ready_above(4));
        assert!(!rq.has_ready_above(0));

        assert_eq!(rq.pop_highest(&mut arena), Some(high));
        assert_eq!(rq.pop_highest(&mut arena), Some(mid));
        assert_eq!(rq.pop_highest(&mut arena), Some(low));
        assert_eq!(rq.pop_highest(&mut arena), None);
        assert_eq!(rq.nr_ready(), 0);
    }

    #[test]
    fn test_sleep_queue_ordering_and_ties() {
        let mut arena = Arena::with_capacity(8);
        let late = arena.insert(node(300)).ok().unwrap();
        let early = arena.insert(node(100)).ok().unwrap();
        let tie_first = arena.insert(node(200)).ok().unwrap();
        let tie_second = arena.insert(node(200)).ok().unwrap();

        let mut sq = SleepQueue::new();
        sq.insert(&mut arena, late);
        sq.insert(&mut arena, early);
        sq.insert(&mut arena, tie_first);
        sq.insert(&mut arena, tie_second);

        assert_eq!(sq.peek_deadline(&arena), Some(100));
        assert_eq!(sq.pop_min(&mut arena), Some(early));
        assert_eq!(sq.pop_min(&mut arena), Some(tie_first));
        assert_eq!(sq.pop_min(&mut arena), Some(tie_second));
        assert_eq!(sq.pop_min(&mut arena), Some(late));
        assert!(sq.is_empty());
    }
}
