//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 等待队列
//!
//! 只用 [`Kernel::lock`] / [`Kernel::unlock`] 实现：等待者按 FIFO 顺序被唤醒。
//! 被唤醒的线程需要重新检查自己等待的条件。
//!
//! 队列锁只在关中断时持有，中断处理程序可以直接调用 `wake_one`。

use alloc::collections::VecDeque;
use spin::Mutex;

use crate::arch::{InterruptGuard, Platform};
use crate::errno::SchedError;
use crate::process::task::ThreadHandle;
use crate::sched::Kernel;

use super::block::BlockType;

/// 等待队列头
pub struct WaitQueue {
    block: BlockType,
    waiters: Mutex<VecDeque<ThreadHandle>>,
}

impl WaitQueue {
    pub const fn new(block: BlockType) -> Self {
        Self {
            block,
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    pub fn block_type(&self) -> BlockType {
        self.block
    }

    /// 关中断后持有队列锁执行 `f`
    fn with_waiters<P: Platform, R>(
        &self,
        kernel: &Kernel<P>,
        f: impl FnOnce(&mut VecDeque<ThreadHandle>) -> R,
    ) -> R {
        // 先释放队列锁，再开中断
        let _irq = InterruptGuard::new(kernel.platform());
        let mut waiters = self.waiters.lock();
        f(&mut waiters)
    }

    pub fn len<P: Platform>(&self, kernel: &Kernel<P>) -> usize {
        self.with_waiters(kernel, |w| w.len())
    }

    pub fn is_empty<P: Platform>(&self, kernel: &Kernel<P>) -> bool {
        self.with_waiters(kernel, |w| w.is_empty())
    }

    /// 当前线程进入等待并让出 CPU
    ///
    /// 登记与入队在同一把队列锁内完成，唤醒者不会错过刚登记的线程
    pub fn wait<P: Platform>(&self, kernel: &Kernel<P>) -> Result<(), SchedError> {
        self.with_waiters(kernel, |waiters| {
            let me = kernel.lock(self.block)?;
            waiters.push_back(me);
            Ok::<(), SchedError>(())
        })?;
        kernel.yield_now();
        Ok(())
    }

    /// 唤醒最早的等待者
    ///
    /// 已经被终止或回收的等待者直接跳过
    pub fn wake_one<P: Platform>(&self, kernel: &Kernel<P>) -> bool {
        loop {
            let next = self.with_waiters(kernel, |w| w.pop_front());
            match next {
                Some(handle) => {
                    if kernel.unlock(handle, self.block, false).is_ok() {
                        return true;
                    }
                }
                None => return false,
            }
        }
    }

    /// 唤醒全部等待者，返回唤醒的数量
    pub fn wake_all<P: Platform>(&self, kernel: &Kernel<P>) -> usize {
        let mut woken = 0;
        while self.wake_one(kernel) {
            woken += 1;
        }
        woken
    }
}
