//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程与线程管理
//!
//! - `task`: 线程控制块
//! - `process`: 进程控制块
//! - `thread`: 线程生命周期（创建、退出、终止、join、回收）
//! - `fork`: 复制当前进程
//! - `wait`: waitpid、进程销毁与孤儿回收

pub mod task;
pub mod process;
pub mod thread;
pub mod fork;
pub mod wait;

pub use process::{Process, ProcessHandle, ProcessInfo};
pub use task::{
    ExitCause, ExitRecord, Resource, ReturnState, Thread, ThreadFlags, ThreadHandle, ThreadInfo,
    ThreadState,
};
pub use thread::JoinStatus;
