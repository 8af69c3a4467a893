//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 线程控制块 (Thread Control Block)
//!
//! 关键设计要点：
//! 1. 线程之间、线程与进程之间只通过句柄互相引用，不保存裸指针
//! 2. 调度路径会修改的字段（状态、链接、唤醒时间、时间片）只在
//!    调度器临界区内访问
//! 3. 线程退出后保留为 Zombie，直到被 join（或 init 回收）

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::arch::{MemoryOps, Platform, StackRegion, ThreadEntry};
use crate::sched::arena::Handle;
use crate::sched::pid::{Pid, Tid};
use crate::sched::rq::{Deadline, ListNode};
use crate::sync::BlockType;

use super::process::ProcessHandle;

/// 线程句柄的类型标记
pub enum ThreadTag {}

/// 线程句柄
pub type ThreadHandle = Handle<ThreadTag>;

/// 线程状态
///
/// ```text
/// Copying ──► Ready ◄──────────────┐
///               │                  │
///               ▼                  │
///            Running ──► Sleeping / Waiting / Joining
///               │
///               ▼
///            Zombie ──► Dead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// 在就绪队列中等待 CPU
    Ready,
    /// 正在某个 CPU 上运行
    Running,
    /// 在睡眠队列中，等待唤醒时间到达
    Sleeping,
    /// 被同步原语阻塞
    Waiting(BlockType),
    /// 等待另一个线程退出
    Joining,
    /// 已退出，等待 join 取走结果
    Zombie,
    /// 已被回收
    Dead,
    /// fork 过程中，尚未第一次入队
    Copying,
}

/// 线程结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// 线程自己调用 exit 或入口函数返回
    Normal,
    /// 被 terminate 或随进程销毁
    Killed,
}

/// 线程返回状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnState {
    Success,
    Error,
}

/// 线程退出记录，join / waitpid 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    pub value: usize,
    pub cause: ExitCause,
    pub state: ReturnState,
    pub end_time: u64,
}

/// 线程标志
pub mod thread_flags {
    use bitflags::bitflags;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ThreadFlags: u32 {
            /// 每个 CPU 的 idle 线程
            const IDLE   = 0x0001;
            /// 进程的主线程
            const MAIN   = 0x0002;
            /// 所属进程已销毁，转交给 init 回收
            const ORPHAN = 0x0004;
            /// 没有用户栈
            const KTHREAD = 0x0008;
        }
    }
}

pub use thread_flags::ThreadFlags;

/// 线程拥有的资源
///
/// 在线程被回收时按注册顺序释放，每个资源只释放一次
pub enum Resource<A> {
    /// 栈内存，归还给内存子系统
    Stack(StackRegion),
    /// 额外的地址空间，交给内存子系统销毁
    AddressSpace(A),
    /// 上层注册的清理回调（例如持有的互斥锁）
    Custom(Box<dyn FnOnce() + Send>),
}

impl<A> Resource<A> {
    /// 释放资源
    pub fn release<M>(self, mem: &M)
    where
        M: MemoryOps<AddressSpace = A> + ?Sized,
    {
        match self {
            Resource::Stack(stack) => mem.free_stack(stack.base, stack.size),
            Resource::AddressSpace(space) => mem.destroy_address_space(space),
            Resource::Custom(cleanup) => cleanup(),
        }
    }
}

impl<A> fmt::Debug for Resource<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Stack(stack) => write!(f, "Stack({:#x}+{:#x})", stack.base, stack.size),
            Resource::AddressSpace(_) => f.write_str("AddressSpace"),
            Resource::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// 线程当前挂在哪个队列上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSlot {
    None,
    Ready,
    Sleep,
}

/// 线程控制块
pub struct Thread<P: Platform> {
    pub(crate) tid: Tid,
    pub(crate) pid: Pid,
    pub(crate) process: ProcessHandle,
    pub(crate) name: String,

    /// 0 为最高优先级
    pub(crate) priority: u8,
    pub(crate) state: ThreadState,
    pub(crate) flags: ThreadFlags,

    /// 绑定的 CPU，创建后不再改变
    pub(crate) cpu: usize,

    pub(crate) entry: ThreadEntry,
    pub(crate) arg: usize,

    /// 退出记录（Zombie 状态时有效）
    pub(crate) exit: Option<ExitRecord>,

    pub(crate) kernel_stack: StackRegion,
    pub(crate) user_stack: Option<StackRegion>,

    /// 唤醒时间（仅 Sleeping 状态有效）
    pub(crate) wake_deadline: u64,

    /// 正在 join 本线程的线程（至多一个）
    pub(crate) joiner: Option<ThreadHandle>,
    /// 本线程正在 join 的目标
    pub(crate) joining: Option<ThreadHandle>,

    pub(crate) resources: Vec<Resource<P::AddressSpace>>,

    /// 保存的寄存器，放在堆上以保证切换期间地址不变
    pub(crate) context: Box<P::Context>,

    pub(crate) time_slice: u32,
    pub(crate) start_time: u64,
    pub(crate) end_time: Option<u64>,

    /// 侵入式队列链接
    pub(crate) link: Option<ThreadHandle>,
    pub(crate) queued: QueueSlot,
}

impl<P: Platform> Thread<P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tid: Tid,
        pid: Pid,
        process: ProcessHandle,
        name: &str,
        priority: u8,
        cpu: usize,
        entry: ThreadEntry,
        arg: usize,
        kernel_stack: StackRegion,
        user_stack: Option<StackRegion>,
        context: P::Context,
        now: u64,
    ) -> Self {
        let mut flags = ThreadFlags::empty();
        if user_stack.is_none() {
            flags |= ThreadFlags::KTHREAD;
        }

        Self {
            tid,
            pid,
            process,
            name: truncate_name(name),
            priority,
            state: ThreadState::Ready,
            flags,
            cpu,
            entry,
            arg,
            exit: None,
            kernel_stack,
            user_stack,
            wake_deadline: 0,
            joiner: None,
            joining: None,
            resources: Vec::new(),
            context: Box::new(context),
            time_slice: 0,
            start_time: now,
            end_time: None,
            link: None,
            queued: QueueSlot::None,
        }
    }

    #[inline]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.flags.contains(ThreadFlags::IDLE)
    }

    #[inline]
    pub fn is_zombie(&self) -> bool {
        self.state == ThreadState::Zombie
    }

    /// 时钟中断时消耗一个 tick
    ///
    /// 返回时间片是否还有剩余
    pub fn tick_time_slice(&mut self) -> bool {
        if self.time_slice > 0 {
            self.time_slice -= 1;
        }
        self.time_slice > 0
    }

    pub fn reset_time_slice(&mut self, ticks: u32) {
        self.time_slice = ticks;
    }

    /// 取出回收时要释放的所有资源
    ///
    /// 顺序：上层注册的资源（按注册顺序），然后是用户栈、内核栈
    pub(crate) fn take_resources(&mut self) -> Vec<Resource<P::AddressSpace>> {
        let mut all = core::mem::take(&mut self.resources);
        if let Some(stack) = self.user_stack.take() {
            all.push(Resource::Stack(stack));
        }
        all.push(Resource::Stack(self.kernel_stack));
        all
    }

    pub fn info(&self) -> ThreadInfo {
        ThreadInfo {
            tid: self.tid,
            pid: self.pid,
            name: self.name.clone(),
            priority: self.priority,
            state: self.state,
            cpu: self.cpu,
            start_time: self.start_time,
            end_time: self.end_time,
            exit: self.exit,
        }
    }
}

impl<P: Platform> ListNode for Thread<P> {
    type Kind = ThreadTag;

    #[inline]
    fn next_link(&self) -> Option<ThreadHandle> {
        self.link
    }

    #[inline]
    fn set_next_link(&mut self, next: Option<ThreadHandle>) {
        self.link = next;
    }
}

impl<P: Platform> Deadline for Thread<P> {
    #[inline]
    fn deadline(&self) -> u64 {
        self.wake_deadline
    }
}

/// 线程信息快照（用于查询）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: Tid,
    pub pid: Pid,
    pub name: String,
    pub priority: u8,
    pub state: ThreadState,
    pub cpu: usize,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub exit: Option<ExitRecord>,
}

fn truncate_name(name: &str) -> String {
    let max = crate::config::MAX_NAME_LEN;
    if name.len() <= max {
        return String::from(name);
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&name[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_NAME_LEN;
    use alloc::string::ToString;

    #[test]
    fn test_name_truncated_on_char_boundary() {
        let long = "线".repeat(MAX_NAME_LEN);
        let name = truncate_name(&long);
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.chars().all(|c| c == '线'));
        assert_eq!(truncate_name("worker"), "worker".to_string());
    }

    #[test]
    fn test_custom_resource_runs_once() {
        use crate::tests::mock::MockPlatform;
        use core::sync::atomic::{AtomicUsize, Ordering};
        use alloc::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let res: Resource<<MockPlatform as MemoryOps>::AddressSpace> =
            Resource::Custom(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        let platform = MockPlatform::new();
        res.release(&platform);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
