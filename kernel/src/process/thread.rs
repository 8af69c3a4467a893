//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 线程生命周期
//!
//! 创建 -> 就绪/运行 -> 退出 (Zombie) -> join 取走结果 (Dead)
//!
//! [`Kernel::thread_join`] 阻塞到目标退出为止。系统调用入口使用
//! [`Kernel::thread_join_restart`]：目标尚未退出时调用者阻塞并返回
//! [`JoinStatus::Pending`]，被唤醒后重新调用 join 取得结果。

use alloc::vec::Vec;

use crate::arch::{ContextFrame, Platform, StackRegion, ThreadEntry};
use crate::config::{IDLE_PRIORITY, STACK_ALIGN};
use crate::errno::SchedError;
use crate::sched::sched::{ReschedSet, SchedState};
use crate::sched::Kernel;

use super::task::{
    ExitCause, ExitRecord, Resource, ReturnState, Thread, ThreadFlags, ThreadHandle, ThreadState,
};

/// join 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// 目标已退出并被回收
    Joined(ExitRecord),
    /// 调用者已阻塞，唤醒后需要重新 join
    Pending,
}

pub(crate) enum JoinStep<A> {
    Harvested(ExitRecord, Vec<Resource<A>>),
    Blocked,
}

impl<P: Platform> SchedState<P> {
    /// 把线程变为 Zombie
    ///
    /// 线程仍在某个 CPU 上运行时，该 CPU 记入 `resched`，等待它的 join
    /// 者在线程真正换出后由 dispatch 唤醒；否则立即唤醒 join 者。
    pub(crate) fn make_zombie(
        &mut self,
        handle: ThreadHandle,
        cause: ExitCause,
        ret: ReturnState,
        value: usize,
        now: u64,
        resched: &mut ReschedSet,
    ) -> Result<ExitRecord, SchedError> {
        let (idle, state) = self.threads.get(handle)
            .map(|t| (t.is_idle(), t.state))
            .ok_or(SchedError::NoSuchId)?;
        if idle {
            return Err(SchedError::Unauthorized);
        }
        if matches!(state, ThreadState::Zombie | ThreadState::Dead) {
            return Err(SchedError::NoSuchId);
        }

        self.dequeue(handle);

        let record = ExitRecord { value, cause, state: ret, end_time: now };
        let (joining, joiner, process, is_main, cpu) = match self.threads.get_mut(handle) {
            Some(t) => {
                t.state = ThreadState::Zombie;
                t.exit = Some(record);
                t.end_time = Some(now);
                (t.joining.take(), t.joiner, t.process, t.flags.contains(ThreadFlags::MAIN), t.cpu)
            }
            None => return Err(SchedError::NoSuchId),
        };

        // 它自己正在 join 别人：撤销登记
        if let Some(target) = joining {
            if let Some(t) = self.threads.get_mut(target) {
                if t.joiner == Some(handle) {
                    t.joiner = None;
                }
            }
        }

        if is_main {
            if let Some(p) = self.processes.get_mut(process) {
                p.exit = Some(record);
            }
        }

        // 还占着 CPU 的线程由 dispatch 或 finish_switch 唤醒 join 者
        if self.rqs[cpu].current == handle {
            resched.add(cpu);
        } else if !self.is_on_cpu(handle) {
            if let Some(joiner) = joiner {
                self.wake_joiner(joiner, handle, resched);
            }
        }
        Ok(record)
    }

    /// 唤醒正在等待 `target` 的 join 者
    pub(crate) fn wake_joiner(&mut self, joiner: ThreadHandle, target: ThreadHandle, resched: &mut ReschedSet) {
        let waiting = match self.threads.get_mut(joiner) {
            Some(j) if j.state == ThreadState::Joining && j.joining == Some(target) => {
                j.joining = None;
                true
            }
            _ => false,
        };
        if waiting {
            self.wake(joiner, resched);
        }
    }

    /// 回收线程控制块
    ///
    /// 摘除队列与进程中的记录，返回需要在锁外释放的资源。
    /// 线程仍在 CPU 上时不能回收，返回 `None`。
    pub(crate) fn reap_thread(
        &mut self,
        handle: ThreadHandle,
        resched: &mut ReschedSet,
    ) -> Option<Vec<Resource<P::AddressSpace>>> {
        if self.is_on_cpu(handle) {
            return None;
        }
        self.dequeue(handle);

        let (joining, joiner, process) = self.threads.get(handle)
            .map(|t| (t.joining, t.joiner, t.process))?;

        if let Some(target) = joining {
            if let Some(t) = self.threads.get_mut(target) {
                if t.joiner == Some(handle) {
                    t.joiner = None;
                }
            }
        }
        if let Some(joiner) = joiner {
            self.wake_joiner(joiner, handle, resched);
        }
        if let Some(p) = self.processes.get_mut(process) {
            p.remove_thread(handle);
        }

        let mut thread = self.threads.remove(handle)?;
        thread.state = ThreadState::Dead;
        Some(thread.take_resources())
    }

    /// join 的一步：已退出则回收，否则登记并阻塞调用者
    pub(crate) fn join_step(
        &mut self,
        caller: ThreadHandle,
        target: ThreadHandle,
        resched: &mut ReschedSet,
    ) -> Result<JoinStep<P::AddressSpace>, SchedError> {
        if caller == target {
            return Err(SchedError::Unauthorized);
        }
        if self.threads.get(caller).map_or(true, |t| t.is_idle()) {
            return Err(SchedError::Unauthorized);
        }

        let (idle, state, exit, joiner) = self.threads.get(target)
            .map(|t| (t.is_idle(), t.state, t.exit, t.joiner))
            .ok_or(SchedError::NoSuchId)?;
        if idle {
            return Err(SchedError::Unauthorized);
        }
        if let Some(j) = joiner {
            if j != caller && self.threads.contains(j) {
                return Err(SchedError::Unauthorized);
            }
        }

        if state == ThreadState::Zombie && !self.is_on_cpu(target) {
            let record = exit.ok_or(SchedError::NoSuchId)?;
            let resources = self.reap_thread(target, resched).ok_or(SchedError::NoSuchId)?;
            return Ok(JoinStep::Harvested(record, resources));
        }

        if let Some(t) = self.threads.get_mut(target) {
            t.joiner = Some(caller);
        }
        if let Some(c) = self.threads.get_mut(caller) {
            c.state = ThreadState::Joining;
            c.joining = Some(target);
        }
        Ok(JoinStep::Blocked)
    }
}

impl<P: Platform> Kernel<P> {
    /// 在当前进程中创建线程
    ///
    /// 新线程绑定到当前 CPU，放入对应优先级队列的队尾。
    /// 进程的第一个线程成为主线程。
    pub fn thread_create(
        &self,
        priority: u8,
        name: &str,
        stack_size: usize,
        entry: ThreadEntry,
        arg: usize,
    ) -> Result<ThreadHandle, SchedError> {
        if priority >= IDLE_PRIORITY {
            return Err(SchedError::ForbiddenPriority);
        }
        if stack_size == 0 {
            return Err(SchedError::NullArgument);
        }
        if stack_size % STACK_ALIGN != 0 {
            return Err(SchedError::Unauthorized);
        }

        let cpu = self.this_cpu();
        {
            let state = self.lock_sched();
            if state.threads.is_full() {
                log::warn!("sched: thread pool exhausted ({} threads)", state.threads.capacity());
                return Err(SchedError::OutOfMemory);
            }
        }

        // 栈在锁外分配
        let kernel_stack = self.alloc_stack_region(self.config.kernel_stack_size)?;
        let user_stack = match self.alloc_stack_region(stack_size) {
            Ok(stack) => stack,
            Err(e) => {
                self.platform.free_stack(kernel_stack.base, kernel_stack.size);
                return Err(e);
            }
        };

        let created = {
            let mut state = self.lock_sched();
            self.insert_thread(&mut state, cpu, priority, name, entry, arg, kernel_stack, user_stack)
        };

        match created {
            Ok((handle, tid, preempt)) => {
                if preempt {
                    self.resched_cpu(cpu);
                }
                log::debug!("sched: created thread {} '{}' prio {} on cpu{}", tid, name, priority, cpu);
                Ok(handle)
            }
            Err(e) => {
                self.platform.free_stack(user_stack.base, user_stack.size);
                self.platform.free_stack(kernel_stack.base, kernel_stack.size);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_thread(
        &self,
        state: &mut SchedState<P>,
        cpu: usize,
        priority: u8,
        name: &str,
        entry: ThreadEntry,
        arg: usize,
        kernel_stack: StackRegion,
        user_stack: StackRegion,
    ) -> Result<(ThreadHandle, u32, bool), SchedError> {
        let current = state.current(cpu);
        let (process, pid, current_prio) = state.threads.get(current)
            .map(|t| (t.process, t.pid, t.priority))
            .ok_or(SchedError::NoSuchId)?;
        if !state.processes.contains(process) {
            return Err(SchedError::NoSuchId);
        }

        let tid = self.ids.alloc_tid().ok_or(SchedError::OutOfMemory)?;
        let context = self.platform.init_context(&ContextFrame {
            tid,
            entry,
            arg,
            kernel_stack_top: kernel_stack.top(),
            user_stack_top: Some(user_stack.top()),
        });
        let now = self.platform.now_ms();
        let thread = Thread::new(
            tid, pid, process, name, priority, cpu, entry, arg, kernel_stack, Some(user_stack), context, now,
        );

        let handle = state.threads.insert(thread).map_err(|_| SchedError::OutOfMemory)?;

        let first = match state.processes.get_mut(process) {
            Some(p) => {
                p.add_thread(handle);
                let first = p.main.is_none();
                if first {
                    p.main = Some(handle);
                }
                first
            }
            None => false,
        };
        if first {
            if let Some(t) = state.threads.get_mut(handle) {
                t.flags |= ThreadFlags::MAIN;
            }
        }

        state.enqueue_ready(handle);
        Ok((handle, tid, priority < current_prio))
    }

    pub(crate) fn alloc_stack_region(&self, size: usize) -> Result<StackRegion, SchedError> {
        match self.platform.alloc_stack(size) {
            Some(base) => Ok(StackRegion { base, size }),
            None => {
                log::warn!("sched: failed to allocate {:#x} byte stack", size);
                Err(SchedError::OutOfMemory)
            }
        }
    }

    /// 当前线程退出
    ///
    /// 线程变为 Zombie 并让出 CPU，资源在被 join 时释放
    pub fn thread_exit(&self, cause: ExitCause, ret: ReturnState, value: usize) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let resched = {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            let current = state.current(cpu);
            let mut resched = ReschedSet::default();
            state.make_zombie(current, cause, ret, value, now, &mut resched)?;
            if let Some(t) = state.threads.get(current) {
                log::debug!("sched: thread {} exited with {:#x}", t.tid, value);
            }
            resched
        };

        self.apply_resched(resched, cpu);
        self.schedule();
        Ok(())
    }

    /// 强制结束线程
    ///
    /// 目标正在其他 CPU 上运行时，只标记该 CPU 需要重新调度；
    /// 目标是调用者自己时立即让出 CPU。
    pub fn thread_terminate(&self, target: ThreadHandle, value: usize) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let (resched, self_exit) = {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            let current = state.current(cpu);
            let mut resched = ReschedSet::default();
            state.make_zombie(target, ExitCause::Killed, ReturnState::Error, value, now, &mut resched)?;
            if let Some(t) = state.threads.get(target) {
                log::info!("sched: thread {} terminated", t.tid);
            }
            (resched, target == current)
        };

        if self.apply_resched(resched, cpu) || self_exit {
            self.schedule();
        }
        Ok(())
    }

    /// 等待线程结束并取走退出记录
    ///
    /// 每个线程的结果只能被取走一次，之后再 join 返回 `NoSuchId`
    pub fn thread_join(&self, target: ThreadHandle) -> Result<ExitRecord, SchedError> {
        loop {
            if let JoinStatus::Joined(record) = self.thread_join_restart(target)? {
                return Ok(record);
            }
        }
    }

    /// join 的单步版本
    ///
    /// 目标还没退出时阻塞调用者并返回 [`JoinStatus::Pending`]，
    /// 调用者被唤醒后需要重新调用
    pub fn thread_join_restart(&self, target: ThreadHandle) -> Result<JoinStatus, SchedError> {
        let cpu = self.this_cpu();
        let (step, resched) = {
            let mut state = self.lock_sched();
            let caller = state.current(cpu);
            let mut resched = ReschedSet::default();
            let step = state.join_step(caller, target, &mut resched)?;
            (step, resched)
        };
        self.apply_resched(resched, cpu);

        match step {
            JoinStep::Harvested(record, resources) => {
                self.release_all(resources);
                Ok(JoinStatus::Joined(record))
            }
            JoinStep::Blocked => {
                self.schedule();
                Ok(JoinStatus::Pending)
            }
        }
    }

    /// 给当前线程登记一个资源，在线程被回收时释放
    pub fn register_resource(&self, resource: Resource<P::AddressSpace>) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let mut state = self.lock_sched();
        let current = state.current(cpu);
        let t = state.threads.get_mut(current).ok_or(SchedError::NoSuchId)?;
        if t.is_idle() {
            return Err(SchedError::Unauthorized);
        }
        t.resources.push(resource);
        Ok(())
    }
}
