//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器测试
//!
//! 严格优先级、同级 FIFO、时间片轮转、idle 独占

use alloc::vec::Vec;

use super::mock::MockPlatform;
use super::{boot, running, spawn, tid};
use crate::errno::SchedError;
use crate::process::task::ThreadState;
use crate::sched::{Kernel, KernelConfig};

#[test]
fn test_boot_runs_idle() {
    let kernel = boot(1);
    let idle = kernel.idle_thread(0).unwrap();

    assert_eq!(kernel.current_thread(), idle);
    assert_eq!(kernel.current_tid(), 0);
    assert_eq!(kernel.current_pid(), 1);
    assert_eq!(kernel.init_pid(), 1);
    assert_eq!(kernel.nr_threads(), 1);
    assert_eq!(kernel.nr_processes(), 1);
    assert_eq!(running(&kernel), "idle");

    // 没有其他线程时只能继续运行 idle
    kernel.schedule();
    assert_eq!(kernel.current_thread(), idle);
    assert_eq!(kernel.nr_switches(0), 0);
    assert_eq!(kernel.platform().irq_depth(), 0);
}

#[test]
fn test_boot_rejects_bad_config() {
    let zero = KernelConfig { nr_cpus: 0, ..KernelConfig::default() };
    assert_eq!(Kernel::new(MockPlatform::new(), zero).err(), Some(SchedError::Unauthorized));

    let too_many = KernelConfig { nr_cpus: crate::config::MAX_CPUS + 1, ..KernelConfig::default() };
    assert_eq!(Kernel::new(MockPlatform::new(), too_many).err(), Some(SchedError::Unauthorized));

    let tiny = KernelConfig { nr_cpus: 2, max_threads: 1, ..KernelConfig::default() };
    assert_eq!(Kernel::new(MockPlatform::new(), tiny).err(), Some(SchedError::OutOfMemory));
}

#[test]
fn test_boot_fails_without_idle_stack() {
    let platform = MockPlatform::new();
    platform.fail_stack_alloc_after(1);
    let config = KernelConfig { nr_cpus: 2, ..KernelConfig::default() };

    // 第二个 CPU 的 idle 栈分配失败
    assert_eq!(Kernel::new(platform, config).err(), Some(SchedError::OutOfMemory));
}

#[test]
fn test_strict_priority_dispatch() {
    let kernel = boot(1);
    let low = spawn(&kernel, 9, "low");
    let high = spawn(&kernel, 0, "high");
    let mid = spawn(&kernel, 4, "mid");

    kernel.schedule();
    assert_eq!(kernel.current_thread(), high);

    kernel.thread_exit(crate::process::ExitCause::Normal, crate::process::ReturnState::Success, 0).unwrap();
    assert_eq!(kernel.current_thread(), mid);
    assert_eq!(kernel.thread_info(low).unwrap().state, ThreadState::Ready);
}

#[test]
fn test_yield_keeps_highest_priority_running() {
    let kernel = boot(1);
    let a = spawn(&kernel, 0, "a");
    let b = spawn(&kernel, 5, "b");

    kernel.schedule();
    assert_eq!(kernel.current_thread(), a);
    let switches = kernel.nr_switches(0);

    for _ in 0..3 {
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), a);
    }
    assert_eq!(kernel.nr_switches(0), switches);
    assert_eq!(kernel.thread_info(b).unwrap().state, ThreadState::Ready);
}

#[test]
fn test_fifo_within_level() {
    let kernel = boot(1);
    let a = spawn(&kernel, 3, "a");
    let b = spawn(&kernel, 3, "b");
    let c = spawn(&kernel, 3, "c");

    kernel.schedule();
    let mut order = Vec::new();
    for _ in 0..6 {
        order.push(kernel.current_thread());
        kernel.yield_now();
    }
    assert_eq!(order, [a, b, c, a, b, c]);
}

#[test]
fn test_time_slice_round_robin() {
    let kernel = boot(1);
    let b = spawn(&kernel, 5, "b");
    let c = spawn(&kernel, 5, "c");
    let platform = kernel.platform();

    kernel.schedule();
    assert_eq!(kernel.current_thread(), b);

    platform.advance(10);
    platform.fire_timer();
    assert_eq!(kernel.current_thread(), c);

    platform.advance(10);
    platform.fire_timer();
    assert_eq!(kernel.current_thread(), b);
}

#[test]
fn test_idle_runs_only_when_nothing_ready() {
    let kernel = boot(1);
    let idle = kernel.idle_thread(0).unwrap();
    let a = spawn(&kernel, 14, "a");

    kernel.schedule();
    assert_eq!(kernel.current_thread(), a);

    // 时间片用完也轮不到 idle
    kernel.platform().fire_timer();
    assert_eq!(kernel.current_thread(), a);

    kernel.sleep(100).unwrap();
    assert_eq!(kernel.current_thread(), idle);
}

#[test]
fn test_creating_higher_priority_thread_sets_need_resched() {
    let kernel = boot(1);
    let b = spawn(&kernel, 5, "b");
    kernel.schedule();
    assert_eq!(kernel.current_thread(), b);
    assert!(!kernel.need_resched());

    let a = spawn(&kernel, 1, "a");
    assert!(kernel.need_resched());

    kernel.platform().fire_timer();
    assert_eq!(kernel.current_thread(), a);
    assert!(!kernel.need_resched());
}

/// A(0)、B(5)、C(5) 各运行一次后睡眠到下一轮：
/// 每一轮 A 先运行，B、C 按 FIFO 交替
#[test]
fn test_three_thread_dispatch_order() {
    let kernel = boot(1);
    let platform = kernel.platform();
    let a = spawn(&kernel, 0, "A");
    let b = spawn(&kernel, 5, "B");
    let c = spawn(&kernel, 5, "C");
    let idle_tid = 0;

    kernel.schedule();
    for round in 1..=3 {
        for _ in 0..3 {
            kernel.sleep(10).unwrap();
        }
        assert_eq!(kernel.current_tid(), idle_tid);
        platform.set_time(10 * round);
        platform.fire_timer();
    }

    let order: Vec<u32> = platform.dispatched().into_iter().filter(|&t| t != idle_tid).collect();
    let (a, b, c) = (tid(&kernel, a), tid(&kernel, b), tid(&kernel, c));
    assert_eq!(&order[..9], &[a, b, c, a, b, c, a, b, c]);
}

#[test]
fn test_set_priority() {
    let kernel = boot(1);
    let a = spawn(&kernel, 0, "a");
    let b = spawn(&kernel, 5, "b");

    kernel.schedule();
    assert_eq!(kernel.current_thread(), a);

    // 仍然最高，不切换
    kernel.set_priority(2).unwrap();
    assert_eq!(kernel.current_thread(), a);

    // 降到 B 之下，立即让出
    kernel.set_priority(7).unwrap();
    assert_eq!(kernel.current_thread(), b);
    assert_eq!(kernel.thread_info(a).unwrap().priority, 7);

    assert_eq!(kernel.set_priority(crate::config::IDLE_PRIORITY), Err(SchedError::ForbiddenPriority));
}

#[test]
fn test_idle_cannot_change_priority() {
    let kernel = boot(1);
    assert_eq!(kernel.set_priority(3), Err(SchedError::Unauthorized));
}

#[test]
fn test_find_thread_by_tid() {
    let kernel = boot(1);
    let a = spawn(&kernel, 0, "a");
    assert_eq!(kernel.find_thread_by_tid(tid(&kernel, a)), Some(a));
    assert_eq!(kernel.find_thread_by_tid(0), kernel.idle_thread(0));
    assert_eq!(kernel.find_thread_by_tid(u32::MAX), None);
}
