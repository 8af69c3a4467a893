//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 等待子进程 (waitpid) 与进程销毁
//!
//! waitpid 先 join 子进程的主线程，再销毁整个子进程：
//! - 其余线程被强制结束并回收；仍在其他 CPU 上运行的线程转交给 init，
//!   标记为 ORPHAN，由 [`Kernel::reap_orphans`] 稍后回收
//! - 子进程的子进程过继给 init
//! - 地址空间交还内存子系统

use alloc::vec::Vec;
use core::mem;

use crate::arch::Platform;
use crate::errno::SchedError;
use crate::sched::pid::Pid;
use crate::sched::sched::{ReschedSet, SchedState};
use crate::sched::Kernel;

use super::process::ProcessHandle;
use super::task::{ExitCause, ExitRecord, Resource, ReturnState, ThreadFlags, ThreadState};
use super::thread::{JoinStatus, JoinStep};

impl<P: Platform> SchedState<P> {
    /// 按 PID 查找 `parent` 的子进程
    pub(crate) fn find_child(&self, parent: ProcessHandle, pid: Pid) -> Option<ProcessHandle> {
        let p = self.processes.get(parent)?;
        p.children.iter()
            .copied()
            .find(|&c| self.processes.get(c).map_or(false, |cp| cp.pid == pid))
    }

    /// 销毁进程，需要释放的资源追加到 `releases`
    pub(crate) fn teardown_process(
        &mut self,
        handle: ProcessHandle,
        now: u64,
        releases: &mut Vec<Resource<P::AddressSpace>>,
        resched: &mut ReschedSet,
    ) -> Result<(), SchedError> {
        if handle == self.init {
            return Err(SchedError::Unauthorized);
        }
        let init = self.init;
        let init_pid = self.processes.get(init).map_or(0, |p| p.pid);

        let (threads, children, parent) = match self.processes.get_mut(handle) {
            Some(p) => (mem::take(&mut p.threads), mem::take(&mut p.children), p.parent),
            None => return Err(SchedError::NoSuchId),
        };

        for th in threads {
            let alive = self.threads.get(th)
                .map_or(false, |t| !matches!(t.state, ThreadState::Zombie | ThreadState::Dead));
            if alive {
                if let Err(e) = self.make_zombie(th, ExitCause::Killed, ReturnState::Error, 0, now, resched) {
                    log::warn!("wait: failed to kill thread {:?}: {}", th, e);
                    continue;
                }
            }

            if self.is_on_cpu(th) {
                // 还在其他 CPU 上，等它换出后由 init 回收
                if let Some(t) = self.threads.get_mut(th) {
                    t.process = init;
                    t.pid = init_pid;
                    t.flags |= ThreadFlags::ORPHAN;
                }
                if let Some(p) = self.processes.get_mut(init) {
                    p.add_thread(th);
                }
                continue;
            }

            if let Some(resources) = self.reap_thread(th, resched) {
                releases.extend(resources);
            }
        }

        for child in children {
            if let Some(c) = self.processes.get_mut(child) {
                c.parent = Some(init);
                c.orphaned = true;
            }
            if let Some(p) = self.processes.get_mut(init) {
                p.add_child(child);
            }
        }

        if let Some(parent) = parent {
            if let Some(p) = self.processes.get_mut(parent) {
                p.remove_child(handle);
            }
        }

        if let Some(mut process) = self.processes.remove(handle) {
            if let Some(space) = process.address_space.take() {
                releases.push(Resource::AddressSpace(space));
            }
        }
        Ok(())
    }
}

impl<P: Platform> Kernel<P> {
    /// 等待子进程结束
    ///
    /// 阻塞到子进程主线程退出，然后销毁整个子进程，返回主线程的退出记录
    pub fn waitpid(&self, pid: Pid) -> Result<ExitRecord, SchedError> {
        loop {
            if let JoinStatus::Joined(record) = self.waitpid_restart(pid)? {
                return Ok(record);
            }
        }
    }

    /// waitpid 的单步版本
    ///
    /// 与 [`Kernel::thread_join_restart`] 相同：子进程主线程尚未退出时返回
    /// [`JoinStatus::Pending`]，调用者被唤醒后重新调用。
    pub fn waitpid_restart(&self, pid: Pid) -> Result<JoinStatus, SchedError> {
        let cpu = self.this_cpu();
        let mut releases = Vec::new();
        let mut resched = ReschedSet::default();

        let result = {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            let caller = state.current(cpu);
            let process = match state.threads.get(caller) {
                Some(t) if !t.is_idle() => t.process,
                _ => return Err(SchedError::NoSuchId),
            };
            let child = state.find_child(process, pid).ok_or(SchedError::NoSuchId)?;

            let main = state.processes.get(child).and_then(|p| p.main);
            let step = match main {
                Some(m) if state.threads.contains(m) => state.join_step(caller, m, &mut resched)?,
                // 主线程已经被单独 join 过
                _ => match state.processes.get(child).and_then(|p| p.exit) {
                    Some(record) => JoinStep::Harvested(record, Vec::new()),
                    None => return Err(SchedError::NoSuchId),
                },
            };

            match step {
                JoinStep::Harvested(record, resources) => {
                    releases.extend(resources);
                    state.teardown_process(child, now, &mut releases, &mut resched)?;
                    JoinStatus::Joined(record)
                }
                JoinStep::Blocked => JoinStatus::Pending,
            }
        };

        self.release_all(releases);
        let local = self.apply_resched(resched, cpu);

        match result {
            JoinStatus::Joined(record) => {
                log::debug!("wait: reaped child pid {} (value {:#x})", pid, record.value);
                if local {
                    self.schedule();
                }
            }
            JoinStatus::Pending => self.schedule(),
        }
        Ok(result)
    }

    /// 回收转交给 init 的线程与进程
    ///
    /// - 带 ORPHAN 标志、已经换出 CPU 的 Zombie 线程
    /// - 过继给 init 且主线程已退出的进程
    ///
    /// 返回回收的线程与进程总数
    pub fn reap_orphans(&self) -> usize {
        let cpu = self.this_cpu();
        let mut releases = Vec::new();
        let mut resched = ReschedSet::default();
        let mut reaped = 0;

        {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            let init = state.init;

            let (threads, children) = match state.processes.get(init) {
                Some(p) => (p.threads.clone(), p.children.clone()),
                None => return 0,
            };

            for th in threads {
                let ready = state.threads.get(th).map_or(false, |t| {
                    t.flags.contains(ThreadFlags::ORPHAN) && t.state == ThreadState::Zombie
                });
                if !ready {
                    continue;
                }
                if let Some(resources) = state.reap_thread(th, &mut resched) {
                    releases.extend(resources);
                    reaped += 1;
                }
            }

            for child in children {
                let (orphaned, main, exit) = match state.processes.get(child) {
                    Some(p) => (p.orphaned, p.main, p.exit),
                    None => continue,
                };
                if !orphaned {
                    continue;
                }
                let main_done = match main {
                    Some(m) => match state.threads.get(m) {
                        Some(t) => t.state == ThreadState::Zombie && !state.is_on_cpu(m),
                        None => exit.is_some(),
                    },
                    None => false,
                };
                if !main_done {
                    continue;
                }
                if state.teardown_process(child, now, &mut releases, &mut resched).is_ok() {
                    reaped += 1;
                }
            }
        }

        self.release_all(releases);
        if self.apply_resched(resched, cpu) {
            self.schedule();
        }
        if reaped > 0 {
            log::debug!("wait: init reaped {} orphan(s)", reaped);
        }
        reaped
    }
}
