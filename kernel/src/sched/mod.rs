//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! - `arena`: 控制块池与带代号的句柄
//! - `rq`: 多级就绪队列、睡眠队列（侵入式，不分配内存）
//! - `pid`: TID / PID 分配
//! - `sched`: 运行队列、调度核心、时钟中断
//!
//! 调度策略：严格优先级（0 最高），同优先级 FIFO 轮转；
//! 最低一级只留给每个 CPU 的 idle 线程。

pub mod arena;
pub mod pid;
pub mod rq;
pub mod sched;

pub use arena::Handle;
pub use pid::{Pid, Tid};
pub use sched::{Kernel, KernelConfig, RunQueue};
