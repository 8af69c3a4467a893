//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 错误代码定义
//!
//! - `SchedError`: 调度器内部使用的错误类型，所有可失败的操作都返回它
//! - `Errno`: 系统调用边界使用的标准错误码 (include/uapi/asm-generic/errno.h)
//!
//! 使用方法：
//! ```rust
//! use rux_sched::errno::{Errno, SchedError};
//!
//! let err = SchedError::NoSuchId;
//! assert_eq!(err.errno(), Errno::NoSuchProcess);
//! assert_eq!(err.as_neg_i32(), -3);
//! ```

use core::fmt;

/// 调度器错误
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// 优先级超出允许范围（包括 idle 独占的最低一级）
    ForbiddenPriority,
    /// 栈、地址空间或控制块分配失败，或达到数量上限
    OutOfMemory,
    /// 必需的参数为空（例如栈大小为 0）
    NullArgument,
    /// 操作不被允许：idle 线程睡眠/退出、重复 join、栈大小未对齐等
    Unauthorized,
    /// tid/pid 不存在，或句柄已过期
    NoSuchId,
    /// unlock 时目标不处于对应类型的等待状态
    TagMismatch,
}

impl SchedError {
    /// 转换为系统调用错误码
    pub const fn errno(self) -> Errno {
        match self {
            SchedError::ForbiddenPriority => Errno::InvalidArgument,
            SchedError::OutOfMemory => Errno::OutOfMemory,
            SchedError::NullArgument => Errno::BadAddress,
            SchedError::Unauthorized => Errno::OperationNotPermitted,
            SchedError::NoSuchId => Errno::NoSuchProcess,
            SchedError::TagMismatch => Errno::InvalidArgument,
        }
    }

    /// 系统调用风格的负数返回值
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        self.errno().as_neg_i32()
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::ForbiddenPriority => "forbidden priority",
            SchedError::OutOfMemory => "out of memory",
            SchedError::NullArgument => "null argument",
            SchedError::Unauthorized => "unauthorized",
            SchedError::NoSuchId => "no such id",
            SchedError::TagMismatch => "block type mismatch",
        };
        f.write_str(msg)
    }
}

/// 标准错误代码
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Function not implemented (ENOSYS, 38)
    NoSys = 38,

    /// 系统调用需要在被唤醒后重新发起 (ERESTARTSYS, 512)
    ///
    /// 内核内部使用，不会返回给用户态
    RestartSyscall = 512,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 获取错误代码的负数值（isize，用于系统调用返回）
    #[inline]
    pub const fn as_neg_isize(self) -> isize {
        -(self as i32) as isize
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOSYS: i32 = 38;
    pub const ERESTARTSYS: i32 = 512;
}
