//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Rux 线程调度与进程生命周期管理
//!
//! 调度器不依赖具体硬件，通过 [`arch`] 中的 trait 使用 CPU、内存、
//! 时钟和中断控制器。典型的启动流程：
//!
//! ```ignore
//! let kernel = Kernel::new(platform, KernelConfig::default())?;
//! kernel.attach();          // 挂上时钟中断与让出 CPU 软中断
//! kernel.thread_create(0, "init", 4096, init_main, 0)?;
//! kernel.schedule();        // 离开启动上下文，开始调度
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod errno;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(test)]
mod tests;

pub use arch::{CpuOps, IrqOps, MemoryOps, Platform, TimerOps};
pub use errno::{Errno, SchedError};
pub use process::{
    ExitCause, ExitRecord, JoinStatus, ProcessInfo, Resource, ReturnState, ThreadHandle, ThreadInfo,
    ThreadState,
};
pub use sched::{Kernel, KernelConfig, Pid, Tid};
pub use sync::{BlockType, WaitQueue};
