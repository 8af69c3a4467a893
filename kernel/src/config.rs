//! Rux 调度器配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Rux";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 4;

// ============================================================
// 调度器配置
// ============================================================

/// 优先级级数（0 为最高优先级）
pub const PRIO_LEVELS: usize = 16;

/// idle 线程独占的最低优先级
pub const IDLE_PRIORITY: u8 = 15;

/// 线程控制块上限
pub const MAX_THREADS: usize = 256;

/// 进程控制块上限
pub const MAX_PROCESSES: usize = 64;

/// 每个时间片包含的时钟中断数
pub const TIME_SLICE_TICKS: u32 = 1;

/// 时钟中断周期（毫秒）
pub const TICK_MS: u64 = 10;

/// 主动让出 CPU 的软中断号
pub const YIELD_IRQ: usize = 129;

// ============================================================
// 内存配置
// ============================================================

/// 内核栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = 16384;

/// 栈大小对齐要求（字节）
pub const STACK_ALIGN: usize = 4096;

/// 线程名最大长度
pub const MAX_NAME_LEN: usize = 32;

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "info";
