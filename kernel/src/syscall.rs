//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 系统调用接口
//!
//! 约定与 RISC-V 内核一致：
//! - 系统调用号 + 最多 6 个参数，返回值为 u64
//! - 失败时返回负的错误码（按 i64 解释）
//! - 线程句柄以 `index | generation << 32` 的 u64 形式传递
//!
//! 可能阻塞的调用（join、waitpid）在调用者被挂起时返回 `-ERESTARTSYS`，
//! 陷入处理代码在线程被唤醒后重新发起同一个系统调用。
//!
//! 带指针参数的调用是 `unsafe` 的：陷入处理代码负责在调用前检查
//! 用户指针落在当前地址空间的可访问范围内。

use core::mem;

use crate::arch::{Platform, ThreadEntry};
use crate::errno::{Errno, SchedError};
use crate::process::task::{ExitCause, ExitRecord, ReturnState, ThreadHandle};
use crate::process::thread::JoinStatus;
use crate::sched::pid::Pid;
use crate::sched::Kernel;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SyscallNo {
    /// 进程操作
    Exit = 93,
    Getppid = 110,
    Getpid = 172,
    Gettid = 178,
    Clone = 220,
    Wait4 = 260,

    /// 调度
    Nanosleep = 101,
    SchedYield = 124,

    /// 线程操作
    ThreadCreate = 1100,
    ThreadJoin = 1101,
    ThreadTerminate = 1102,
    SetPriority = 1103,
}

impl SyscallNo {
    pub fn from_raw(no: u64) -> Option<Self> {
        let no = match no {
            93 => SyscallNo::Exit,
            110 => SyscallNo::Getppid,
            172 => SyscallNo::Getpid,
            178 => SyscallNo::Gettid,
            220 => SyscallNo::Clone,
            260 => SyscallNo::Wait4,
            101 => SyscallNo::Nanosleep,
            124 => SyscallNo::SchedYield,
            1100 => SyscallNo::ThreadCreate,
            1101 => SyscallNo::ThreadJoin,
            1102 => SyscallNo::ThreadTerminate,
            1103 => SyscallNo::SetPriority,
            _ => return None,
        };
        Some(no)
    }
}

/// join / waitpid 写回用户的结果
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WaitResult {
    /// 返回值
    pub status: u64,
    /// 0 = 正常退出，1 = 被终止
    pub cause: u32,
    /// 0 或负的错误码
    pub error: i32,
}

impl From<ExitRecord> for WaitResult {
    fn from(record: ExitRecord) -> Self {
        Self {
            status: record.value as u64,
            cause: match record.cause {
                ExitCause::Normal => 0,
                ExitCause::Killed => 1,
            },
            error: 0,
        }
    }
}

#[inline]
fn err(e: SchedError) -> u64 {
    e.as_neg_i32() as i64 as u64
}

#[inline]
fn errno(e: Errno) -> u64 {
    e.as_neg_i32() as i64 as u64
}

/// 写回结果，空指针直接忽略
///
/// # Safety
///
/// `out` 为空，或者指向一个可写的 `WaitResult`
unsafe fn write_result(out: *mut WaitResult, result: WaitResult) {
    if let Some(out) = out.as_mut() {
        *out = result;
    }
}

impl<P: Platform> Kernel<P> {
    /// 系统调用分发
    ///
    /// # Safety
    ///
    /// 参数中的指针必须已经过陷入处理代码的检查，具体要求见各个
    /// `sys_*` 函数
    pub unsafe fn syscall(&self, no: u64, args: [u64; 6]) -> u64 {
        match SyscallNo::from_raw(no) {
            Some(SyscallNo::Exit) => self.sys_exit(args),
            Some(SyscallNo::Getppid) => self.sys_getppid(args),
            Some(SyscallNo::Getpid) => self.sys_getpid(args),
            Some(SyscallNo::Gettid) => self.sys_gettid(args),
            Some(SyscallNo::Clone) => self.sys_fork(args),
            Some(SyscallNo::Wait4) => self.sys_waitpid(args),
            Some(SyscallNo::Nanosleep) => self.sys_sleep(args),
            Some(SyscallNo::SchedYield) => self.sys_yield(args),
            Some(SyscallNo::ThreadCreate) => self.sys_thread_create(args),
            Some(SyscallNo::ThreadJoin) => self.sys_thread_join(args),
            Some(SyscallNo::ThreadTerminate) => self.sys_thread_terminate(args),
            Some(SyscallNo::SetPriority) => self.sys_set_priority(args),
            None => {
                log::debug!("sched: unknown syscall {}", no);
                errno(Errno::NoSys)
            }
        }
    }

    /// args: [priority, name_ptr, name_len, stack_size, entry, arg]
    ///
    /// 名字不是合法的 UTF-8 时返回 `-EINVAL`
    ///
    /// # Safety
    ///
    /// - `name_ptr` 为 0，或者指向 `name_len` 个在调用期间可读的字节
    /// - `entry` 为 0，或者是一个 `fn(usize) -> usize` 的地址
    pub unsafe fn sys_thread_create(&self, args: [u64; 6]) -> u64 {
        let priority = match u8::try_from(args[0]) {
            Ok(p) => p,
            Err(_) => return err(SchedError::ForbiddenPriority),
        };
        if args[4] == 0 {
            return err(SchedError::NullArgument);
        }

        let name = if args[1] == 0 {
            ""
        } else {
            let bytes = core::slice::from_raw_parts(args[1] as *const u8, args[2] as usize);
            match core::str::from_utf8(bytes) {
                Ok(name) => name,
                Err(_) => return errno(Errno::InvalidArgument),
            }
        };
        let entry: ThreadEntry = mem::transmute::<usize, ThreadEntry>(args[4] as usize);

        match self.thread_create(priority, name, args[3] as usize, entry, args[5] as usize) {
            Ok(handle) => handle.to_raw(),
            Err(e) => err(e),
        }
    }

    /// args: [handle, result_ptr]
    ///
    /// # Safety
    ///
    /// `result_ptr` 为 0，或者指向一个可写的 `WaitResult`
    pub unsafe fn sys_thread_join(&self, args: [u64; 6]) -> u64 {
        let out = args[1] as *mut WaitResult;
        match self.thread_join_restart(ThreadHandle::from_raw(args[0])) {
            Ok(JoinStatus::Joined(record)) => {
                write_result(out, record.into());
                0
            }
            Ok(JoinStatus::Pending) => errno(Errno::RestartSyscall),
            Err(e) => err(e),
        }
    }

    /// args: [handle, value]
    pub fn sys_thread_terminate(&self, args: [u64; 6]) -> u64 {
        match self.thread_terminate(ThreadHandle::from_raw(args[0]), args[1] as usize) {
            Ok(()) => 0,
            Err(e) => err(e),
        }
    }

    /// args: [value]
    pub fn sys_exit(&self, args: [u64; 6]) -> u64 {
        match self.thread_exit(ExitCause::Normal, ReturnState::Success, args[0] as usize) {
            Ok(()) => 0,
            Err(e) => err(e),
        }
    }

    /// args: [ms]
    pub fn sys_sleep(&self, args: [u64; 6]) -> u64 {
        match self.sleep(args[0]) {
            Ok(()) => 0,
            Err(e) => err(e),
        }
    }

    pub fn sys_yield(&self, _args: [u64; 6]) -> u64 {
        self.yield_now();
        0
    }

    /// args: [level]
    pub fn sys_set_priority(&self, args: [u64; 6]) -> u64 {
        let level = match u8::try_from(args[0]) {
            Ok(l) => l,
            Err(_) => return err(SchedError::ForbiddenPriority),
        };
        match self.set_priority(level) {
            Ok(()) => 0,
            Err(e) => err(e),
        }
    }

    /// 成功返回子进程 PID，失败返回 -1
    pub fn sys_fork(&self, _args: [u64; 6]) -> u64 {
        match self.fork() {
            Ok(pid) => pid as u64,
            Err(_) => (-1_i64) as u64,
        }
    }

    /// args: [pid, result_ptr]
    ///
    /// 成功返回子进程 PID；失败时错误码同时写入 `WaitResult::error`
    ///
    /// # Safety
    ///
    /// `result_ptr` 为 0，或者指向一个可写的 `WaitResult`
    pub unsafe fn sys_waitpid(&self, args: [u64; 6]) -> u64 {
        let out = args[1] as *mut WaitResult;
        let pid: Pid = match u32::try_from(args[0]) {
            Ok(pid) => pid,
            Err(_) => {
                let e = SchedError::NoSuchId;
                write_result(out, WaitResult { error: e.as_neg_i32(), ..WaitResult::default() });
                return err(e);
            }
        };

        match self.waitpid_restart(pid) {
            Ok(JoinStatus::Joined(record)) => {
                write_result(out, record.into());
                pid as u64
            }
            Ok(JoinStatus::Pending) => errno(Errno::RestartSyscall),
            Err(e) => {
                write_result(out, WaitResult { error: e.as_neg_i32(), ..WaitResult::default() });
                err(e)
            }
        }
    }

    pub fn sys_gettid(&self, _args: [u64; 6]) -> u64 {
        self.current_tid() as u64
    }

    pub fn sys_getpid(&self, _args: [u64; 6]) -> u64 {
        self.current_pid() as u64
    }

    /// init 进程返回 0
    pub fn sys_getppid(&self, _args: [u64; 6]) -> u64 {
        self.process_info(self.current_pid())
            .ok()
            .and_then(|info| info.ppid)
            .map_or(0, |ppid| ppid as u64)
    }
}
