//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程树测试
//!
//! 父进程销毁时子进程过继给 init，由 init 回收

use alloc::sync::Arc;

use super::mock::MockPlatform;
use super::{boot, spawn};
use crate::errno::SchedError;
use crate::process::task::{ExitCause, ReturnState};
use crate::process::thread::JoinStatus;
use crate::sched::pid::Pid;
use crate::sched::Kernel;

/// 所有进程线程数之和
fn tree_threads(kernel: &Kernel<MockPlatform>, pids: &[Pid]) -> usize {
    pids.iter()
        .filter_map(|&pid| kernel.process_info(pid).ok())
        .map(|info| info.threads.len())
        .sum()
}

/// init 中的线程 A fork 出 P，P 再 fork 出 Q；P 退出后被 A 回收
fn build_tree() -> (Arc<Kernel<MockPlatform>>, Pid, Pid) {
    let kernel = boot(1);
    spawn(&kernel, 0, "A");
    kernel.schedule();

    let p = kernel.fork().unwrap();
    kernel.yield_now();
    assert_eq!(kernel.current_pid(), p);

    let q = kernel.fork().unwrap();
    assert_eq!(kernel.process_info(q).unwrap().ppid, Some(p));

    kernel.thread_exit(ExitCause::Normal, ReturnState::Success, 0).unwrap();
    assert_eq!(kernel.current_pid(), 1);
    (kernel, p, q)
}

#[test]
fn test_orphans_reparented_to_init() {
    let (kernel, p, q) = build_tree();
    let before = tree_threads(&kernel, &[1, p, q]);
    assert_eq!(before, kernel.nr_threads());
    let q_threads = kernel.process_info(q).unwrap().threads.len();

    assert!(matches!(kernel.waitpid_restart(p), Ok(JoinStatus::Joined(_))));

    let q_info = kernel.process_info(q).unwrap();
    assert_eq!(q_info.ppid, Some(1));
    assert_eq!(q_info.threads.len(), q_threads);
    assert!(kernel.process_info(1).unwrap().children.contains(&q));
    assert_eq!(kernel.process_info(p).err(), Some(SchedError::NoSuchId));

    // 只少了 P 的主线程
    let after = tree_threads(&kernel, &[1, q]);
    assert_eq!(after, before - 1);
    assert_eq!(after, kernel.nr_threads());
}

#[test]
fn test_init_reaps_orphan_process() {
    let (kernel, p, q) = build_tree();
    assert!(matches!(kernel.waitpid_restart(p), Ok(JoinStatus::Joined(_))));

    // Q 还在运行
    assert_eq!(kernel.reap_orphans(), 0);
    assert_eq!(kernel.nr_processes(), 2);

    kernel.yield_now();
    assert_eq!(kernel.current_pid(), q);
    kernel.thread_exit(ExitCause::Normal, ReturnState::Success, 5).unwrap();
    assert_eq!(kernel.current_pid(), 1);

    assert_eq!(kernel.reap_orphans(), 1);
    assert_eq!(kernel.nr_processes(), 1);
    assert_eq!(kernel.platform().live_spaces(), 1);
    assert_eq!(kernel.reap_orphans(), 0);
}

#[test]
fn test_init_thread_can_wait_adopted_child() {
    let (kernel, p, q) = build_tree();
    assert!(matches!(kernel.waitpid_restart(p), Ok(JoinStatus::Joined(_))));

    assert_eq!(kernel.waitpid_restart(q), Ok(JoinStatus::Pending));
    assert_eq!(kernel.current_pid(), q);
    kernel.thread_exit(ExitCause::Normal, ReturnState::Success, 8).unwrap();

    match kernel.waitpid_restart(q) {
        Ok(JoinStatus::Joined(record)) => assert_eq!(record.value, 8),
        other => panic!("unexpected waitpid result {:?}", other),
    }
    assert_eq!(kernel.nr_processes(), 1);
}
