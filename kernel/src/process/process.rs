//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程控制块 (Process Control Block)
//!
//! 进程只是线程的容器：持有地址空间、子进程集合与线程集合。
//! 父子关系、主线程都用句柄表示，进程销毁后旧句柄自动失效。

use alloc::vec::Vec;

use crate::arch::Platform;
use crate::sched::arena::Handle;
use crate::sched::pid::Pid;

use super::task::{ExitRecord, ThreadHandle};

/// 进程句柄的类型标记
pub enum ProcessTag {}

/// 进程句柄
pub type ProcessHandle = Handle<ProcessTag>;

/// 进程控制块
pub struct Process<P: Platform> {
    pub(crate) pid: Pid,
    /// init 进程没有父进程
    pub(crate) parent: Option<ProcessHandle>,
    pub(crate) children: Vec<ProcessHandle>,
    pub(crate) threads: Vec<ThreadHandle>,
    pub(crate) main: Option<ThreadHandle>,
    /// 地址空间，销毁时被取走
    pub(crate) address_space: Option<P::AddressSpace>,
    /// 主线程的退出记录，主线程被单独 join 之后 waitpid 从这里取
    pub(crate) exit: Option<ExitRecord>,
    /// 父进程已销毁，由 init 回收
    pub(crate) orphaned: bool,
}

impl<P: Platform> Process<P> {
    pub(crate) fn new(pid: Pid, parent: Option<ProcessHandle>, address_space: Option<P::AddressSpace>) -> Self {
        Self {
            pid,
            parent,
            children: Vec::new(),
            threads: Vec::new(),
            main: None,
            address_space,
            exit: None,
            orphaned: false,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn parent(&self) -> Option<ProcessHandle> {
        self.parent
    }

    #[inline]
    pub fn is_orphaned(&self) -> bool {
        self.orphaned
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    #[inline]
    pub fn count_children(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn count_threads(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn add_child(&mut self, child: ProcessHandle) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ProcessHandle) {
        self.children.retain(|&c| c != child);
    }

    pub(crate) fn add_thread(&mut self, thread: ThreadHandle) {
        if !self.threads.contains(&thread) {
            self.threads.push(thread);
        }
    }

    pub(crate) fn remove_thread(&mut self, thread: ThreadHandle) {
        self.threads.retain(|&t| t != thread);
    }
}

/// 进程信息快照（用于查询）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub children: Vec<Pid>,
    pub threads: Vec<u32>,
    pub main_tid: Option<u32>,
    pub exit: Option<ExitRecord>,
}
