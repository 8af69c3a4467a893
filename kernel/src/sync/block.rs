//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 阻塞原语适配层
//!
//! 互斥锁、信号量等上层原语通过这两个操作挂起/唤醒线程：
//! - `lock(block)`: 把当前线程标记为 Waiting(block)，返回它的句柄，
//!   原语自己保存句柄并随后 yield
//! - `unlock(handle, block, reschedule)`: 把等待中的线程放回就绪队列
//!
//! `lock` 本身不切换线程。

use crate::arch::Platform;
use crate::errno::SchedError;
use crate::process::task::{ThreadHandle, ThreadState};
use crate::sched::sched::ReschedSet;
use crate::sched::Kernel;

/// 阻塞类型，unlock 时必须与 lock 时一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Mutex,
    Semaphore,
    Mailbox,
    Event,
}

impl<P: Platform> Kernel<P> {
    /// 把当前线程标记为等待 `block`
    pub fn lock(&self, block: BlockType) -> Result<ThreadHandle, SchedError> {
        let cpu = self.this_cpu();
        let mut state = self.lock_sched();
        let current = state.current(cpu);
        let t = state.threads.get_mut(current).ok_or(SchedError::NoSuchId)?;
        if t.is_idle() {
            return Err(SchedError::Unauthorized);
        }
        t.state = ThreadState::Waiting(block);

        #[cfg(feature = "debug_log")]
        log::trace!("block: thread {} waits on {:?}", t.tid, block);

        Ok(current)
    }

    /// 唤醒等待 `block` 的线程
    ///
    /// 目标优先级高于所在 CPU 的当前线程时，标记该 CPU 需要重新调度；
    /// `reschedule` 为真时当前 CPU 立即重新调度。
    pub fn unlock(&self, handle: ThreadHandle, block: BlockType, reschedule: bool) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let resched = {
            let mut state = self.lock_sched();
            let t = state.threads.get(handle).ok_or(SchedError::NoSuchId)?;
            if t.state != ThreadState::Waiting(block) {
                log::warn!("block: thread {} is {:?}, not waiting on {:?}", t.tid, t.state, block);
                return Err(SchedError::TagMismatch);
            }
            let mut resched = ReschedSet::default();
            state.wake(handle, &mut resched);
            resched
        };

        let local = self.apply_resched(resched, cpu);
        if reschedule {
            self.schedule();
        } else if local {
            self.resched_cpu(cpu);
        }
        Ok(())
    }
}
