//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 同步原语
//!
//! - `block`: 阻塞原语适配层（lock / unlock）
//! - `wait`: 基于适配层的等待队列

pub mod block;
pub mod wait;

pub use block::BlockType;
pub use wait::WaitQueue;
