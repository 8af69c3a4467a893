//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程创建 (fork)
//!
//! 流程:
//! 1. 检查进程数上限，在锁外分配子线程的栈
//! 2. 分配子进程控制块与主线程控制块（状态 Copying，不可调度）
//! 3. 复制寄存器上下文 (fork_context)
//! 4. 复制地址空间 (copy_address_space)
//! 5. 挂到父进程下，主线程入就绪队列
//!
//! 任何一步失败都会撤销前面的步骤，不留下半成品。

use crate::arch::{ContextFrame, Platform, StackRegion, ThreadEntry};
use crate::errno::SchedError;
use crate::sched::pid::Pid;
use crate::sched::sched::SchedState;
use crate::sched::Kernel;

use super::process::{Process, ProcessHandle};
use super::task::{Thread, ThreadFlags, ThreadHandle, ThreadState};

/// fork 时从父线程取得的信息
struct ForkSnapshot {
    parent: ThreadHandle,
    process: ProcessHandle,
    name: alloc::string::String,
    priority: u8,
    entry: ThreadEntry,
    arg: usize,
    user_stack_size: Option<usize>,
}

impl<P: Platform> Kernel<P> {
    /// 复制当前进程
    ///
    /// 子进程只有一个线程（调用线程的副本），绑定在当前 CPU 上。
    /// 返回子进程 PID。
    pub fn fork(&self) -> Result<Pid, SchedError> {
        let cpu = self.this_cpu();

        let snap = {
            let state = self.lock_sched();
            let current = state.current(cpu);
            let t = state.threads.get(current).ok_or(SchedError::NoSuchId)?;
            if t.is_idle() {
                return Err(SchedError::Unauthorized);
            }
            if state.processes.is_full() || state.threads.is_full() {
                log::warn!("fork: process or thread pool exhausted");
                return Err(SchedError::OutOfMemory);
            }
            ForkSnapshot {
                parent: current,
                process: t.process,
                name: t.name.clone(),
                priority: t.priority,
                entry: t.entry,
                arg: t.arg,
                user_stack_size: t.user_stack.map(|s| s.size),
            }
        };

        let kernel_stack = self.alloc_stack_region(self.config.kernel_stack_size)?;
        let user_stack = match snap.user_stack_size {
            Some(size) => match self.alloc_stack_region(size) {
                Ok(stack) => Some(stack),
                Err(e) => {
                    self.platform.free_stack(kernel_stack.base, kernel_stack.size);
                    return Err(e);
                }
            },
            None => None,
        };

        let result = {
            let mut state = self.lock_sched();
            self.copy_process(&mut state, cpu, &snap, kernel_stack, user_stack)
        };

        match result {
            Ok(pid) => {
                log::info!("fork: pid {} created child pid {}", self.pid_of(snap.process), pid);
                Ok(pid)
            }
            Err(e) => {
                if let Some(stack) = user_stack {
                    self.platform.free_stack(stack.base, stack.size);
                }
                self.platform.free_stack(kernel_stack.base, kernel_stack.size);
                log::warn!("fork: failed: {}", e);
                Err(e)
            }
        }
    }

    /// 在调度锁内完成复制，失败时撤销已经插入的控制块
    fn copy_process(
        &self,
        state: &mut SchedState<P>,
        cpu: usize,
        snap: &ForkSnapshot,
        kernel_stack: StackRegion,
        user_stack: Option<StackRegion>,
    ) -> Result<Pid, SchedError> {
        if state.current(cpu) != snap.parent || !state.processes.contains(snap.process) {
            return Err(SchedError::NoSuchId);
        }

        let pid = self.ids.alloc_pid().ok_or(SchedError::OutOfMemory)?;
        let tid = self.ids.alloc_tid().ok_or(SchedError::OutOfMemory)?;

        let child = state.processes
            .insert(Process::new(pid, Some(snap.process), None))
            .map_err(|_| SchedError::OutOfMemory)?;

        let frame = ContextFrame {
            tid,
            entry: snap.entry,
            arg: snap.arg,
            kernel_stack_top: kernel_stack.top(),
            user_stack_top: user_stack.map(|s| s.top()),
        };
        let context = match state.threads.get(snap.parent) {
            Some(parent) => self.platform.fork_context(&parent.context, &frame),
            None => {
                state.processes.remove(child);
                return Err(SchedError::NoSuchId);
            }
        };

        let now = self.platform.now_ms();
        let mut thread = Thread::new(
            tid, pid, child, &snap.name, snap.priority, cpu, snap.entry, snap.arg,
            kernel_stack, user_stack, context, now,
        );
        thread.state = ThreadState::Copying;
        thread.flags |= ThreadFlags::MAIN;

        let handle = match state.threads.insert(thread) {
            Ok(h) => h,
            Err(_) => {
                state.processes.remove(child);
                return Err(SchedError::OutOfMemory);
            }
        };

        let space = state.processes.get(snap.process)
            .and_then(|p| p.address_space.as_ref())
            .and_then(|src| self.platform.copy_address_space(src));
        let space = match space {
            Some(space) => space,
            None => {
                // 控制块里的栈由调用者释放
                state.threads.remove(handle);
                state.processes.remove(child);
                return Err(SchedError::OutOfMemory);
            }
        };

        if let Some(p) = state.processes.get_mut(child) {
            p.address_space = Some(space);
            p.main = Some(handle);
            p.add_thread(handle);
        }
        if let Some(parent) = state.processes.get_mut(snap.process) {
            parent.add_child(child);
        }
        state.enqueue_ready(handle);
        Ok(pid)
    }

    fn pid_of(&self, process: ProcessHandle) -> Pid {
        self.lock_sched().processes.get(process).map_or(0, |p| p.pid)
    }
}
