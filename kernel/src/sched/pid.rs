//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! TID / PID 管理
//!
//! - TID 0..nr_cpus: 每个 CPU 的 idle 线程
//! - PID 1: init 进程（同时拥有 idle 线程）
//! - PID 2+: fork 出的进程
//!
//! 编号单调递增，整个内核生命周期内不复用

use core::sync::atomic::{AtomicU32, Ordering};

pub const PID_MAX_LIMIT: u32 = 4194304; // 4M

pub const TID_MAX_LIMIT: u32 = u32::MAX;

pub const PID_INIT: u32 = 1;     // init 进程

/// 线程 ID
pub type Tid = u32;

/// 进程 ID
pub type Pid = u32;

/// 单调递增的编号分配器
pub struct IdAllocator {
    next_tid: AtomicU32,
    next_pid: AtomicU32,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next_tid: AtomicU32::new(0),
            next_pid: AtomicU32::new(PID_INIT),
        }
    }

    pub fn alloc_tid(&self) -> Option<Tid> {
        Self::alloc(&self.next_tid, TID_MAX_LIMIT)
    }

    pub fn alloc_pid(&self) -> Option<Pid> {
        Self::alloc(&self.next_pid, PID_MAX_LIMIT)
    }

    /// 编号用尽后计数器停在上限，不会回绕
    fn alloc(next: &AtomicU32, limit: u32) -> Option<u32> {
        next.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
            if id >= limit {
                None
            } else {
                Some(id + 1)
            }
        })
        .ok()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pid_is_init() {
        let ids = IdAllocator::new();
        assert_eq!(ids.alloc_pid(), Some(PID_INIT));
        assert_eq!(ids.alloc_pid(), Some(PID_INIT + 1));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let ids = IdAllocator::new();
        let a = ids.alloc_tid().unwrap();
        let b = ids.alloc_tid().unwrap();
        let c = ids.alloc_tid().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_pid_limit() {
        let ids = IdAllocator::new();
        ids.next_pid.store(PID_MAX_LIMIT - 1, Ordering::Relaxed);
        assert_eq!(ids.alloc_pid(), Some(PID_MAX_LIMIT - 1));
        assert_eq!(ids.alloc_pid(), None);
        assert_eq!(ids.alloc_pid(), None);
    }

    #[test]
    fn test_tid_exhaustion_does_not_wrap() {
        let ids = IdAllocator::new();
        ids.next_tid.store(TID_MAX_LIMIT - 1, Ordering::Relaxed);
        assert_eq!(ids.alloc_tid(), Some(TID_MAX_LIMIT - 1));
        assert_eq!(ids.alloc_tid(), None);
        // 计数器停在上限，不会从 0 重新分配
        assert_eq!(ids.alloc_tid(), None);
        assert_eq!(ids.next_tid.load(Ordering::Relaxed), TID_MAX_LIMIT);
    }
}
