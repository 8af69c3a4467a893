//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 系统调用接口测试

use super::mock::MockPlatform;
use super::{boot, worker, STACK};
use crate::errno::constants::{EFAULT, EINVAL, ENOSYS, EPERM, ERESTARTSYS, ESRCH};
use crate::process::task::ThreadHandle;
use crate::sched::Kernel;
use crate::syscall::{SyscallNo, WaitResult};

fn neg(errno: i32) -> u64 {
    (-(errno as i64)) as u64
}

/// 测试里的参数指针都指向有效的局部变量
fn call(kernel: &Kernel<MockPlatform>, no: u64, args: [u64; 6]) -> u64 {
    unsafe { kernel.syscall(no, args) }
}

fn create_args(priority: u64, name: &str) -> [u64; 6] {
    [priority, name.as_ptr() as u64, name.len() as u64, STACK as u64, worker as usize as u64, 7]
}

#[test]
fn test_thread_create_and_join() {
    let kernel = boot(1);
    let raw = call(&kernel, SyscallNo::ThreadCreate as u64, create_args(0, "worker"));
    let handle = ThreadHandle::from_raw(raw);
    let info = kernel.thread_info(handle).unwrap();
    assert_eq!(info.name, "worker");
    assert_eq!(info.priority, 0);

    kernel.schedule();
    assert_eq!(kernel.current_thread(), handle);
    assert_eq!(call(&kernel, SyscallNo::Gettid as u64, [0; 6]), info.tid as u64);
    assert_eq!(call(&kernel, SyscallNo::Getpid as u64, [0; 6]), 1);
    assert_eq!(call(&kernel, SyscallNo::Getppid as u64, [0; 6]), 0);

    let child = call(&kernel, SyscallNo::ThreadCreate as u64, create_args(4, "child"));
    let mut result = WaitResult::default();
    let join_args = [child, &mut result as *mut WaitResult as u64, 0, 0, 0, 0];

    assert_eq!(call(&kernel, SyscallNo::ThreadJoin as u64, join_args), neg(ERESTARTSYS));
    assert_eq!(kernel.sys_exit([13, 0, 0, 0, 0, 0]), 0);
    assert_eq!(call(&kernel, SyscallNo::ThreadJoin as u64, join_args), 0);
    assert_eq!(result, WaitResult { status: 13, cause: 0, error: 0 });

    assert_eq!(call(&kernel, SyscallNo::ThreadJoin as u64, join_args), neg(ESRCH));
}

#[test]
fn test_thread_create_errors() {
    let kernel = boot(1);
    assert_eq!(call(&kernel, SyscallNo::ThreadCreate as u64, create_args(300, "x")), neg(EINVAL));

    let mut args = create_args(0, "x");
    args[4] = 0;
    assert_eq!(unsafe { kernel.sys_thread_create(args) }, neg(EFAULT));

    let mut args = create_args(0, "x");
    args[3] = 100;
    assert_eq!(unsafe { kernel.sys_thread_create(args) }, neg(EPERM));
}

#[test]
fn test_thread_create_rejects_invalid_name() {
    let kernel = boot(1);
    let live = kernel.platform().live_stacks();
    let name = [0xffu8, 0xfe];
    let args = [0, name.as_ptr() as u64, name.len() as u64, STACK as u64, worker as usize as u64, 0];

    assert_eq!(call(&kernel, SyscallNo::ThreadCreate as u64, args), neg(EINVAL));
    assert_eq!(kernel.nr_threads(), 1);
    assert_eq!(kernel.platform().live_stacks(), live);
}

#[test]
fn test_fork_and_waitpid() {
    let kernel = boot(1);
    // idle 不能 fork
    assert_eq!(call(&kernel, SyscallNo::Clone as u64, [0; 6]), u64::MAX);

    call(&kernel, SyscallNo::ThreadCreate as u64, create_args(0, "parent"));
    kernel.schedule();
    let pid = call(&kernel, SyscallNo::Clone as u64, [0; 6]);
    assert_eq!(pid, 2);

    let mut result = WaitResult::default();
    let args = [pid, &mut result as *mut WaitResult as u64, 0, 0, 0, 0];
    assert_eq!(call(&kernel, SyscallNo::Wait4 as u64, args), neg(ERESTARTSYS));
    assert_eq!(call(&kernel, SyscallNo::Getppid as u64, [0; 6]), 1);

    kernel.sys_thread_terminate([kernel.current_thread().to_raw(), 5, 0, 0, 0, 0]);
    assert_eq!(call(&kernel, SyscallNo::Wait4 as u64, args), pid);
    assert_eq!(result, WaitResult { status: 5, cause: 1, error: 0 });

    assert_eq!(call(&kernel, SyscallNo::Wait4 as u64, args), neg(ESRCH));
    assert_eq!(result.error, -ESRCH);
}

#[test]
fn test_sleep_yield_priority() {
    let kernel = boot(1);
    assert_eq!(call(&kernel, SyscallNo::Nanosleep as u64, [10, 0, 0, 0, 0, 0]), neg(EPERM));
    assert_eq!(call(&kernel, SyscallNo::SchedYield as u64, [0; 6]), 0);

    call(&kernel, SyscallNo::ThreadCreate as u64, create_args(3, "t"));
    kernel.schedule();
    assert_eq!(call(&kernel, SyscallNo::SetPriority as u64, [2, 0, 0, 0, 0, 0]), 0);
    assert_eq!(call(&kernel, SyscallNo::SetPriority as u64, [1000, 0, 0, 0, 0, 0]), neg(EINVAL));
    assert_eq!(call(&kernel, SyscallNo::Nanosleep as u64, [10, 0, 0, 0, 0, 0]), 0);
    assert_eq!(kernel.current_thread(), kernel.idle_thread(0).unwrap());
}

#[test]
fn test_unknown_syscall() {
    let kernel = boot(1);
    assert_eq!(call(&kernel, 9999, [0; 6]), neg(ENOSYS));
    assert_eq!(SyscallNo::from_raw(260), Some(SyscallNo::Wait4));
    assert_eq!(SyscallNo::from_raw(0), None);
}
