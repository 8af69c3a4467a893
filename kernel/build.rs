//! Rux 调度器构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs
//! 3. 导出调试相关的环境变量

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let config_content = fs::read_to_string("../Kernel.toml")
        .expect("无法读取 Kernel.toml");

    let config: toml::Value = toml::from_str(&config_content)
        .expect("配置文件解析失败");

    if let Some(general) = config.get("general") {
        if let Some(name) = general.get("name").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
        }
        if let Some(version) = general.get("version").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);
        }
    }

    if let Some(debug) = config.get("debug") {
        if let Some(log_level) = debug.get("log_level").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=RUX_LOG_LEVEL={}", log_level);
        }
    }

    generate_config_code(&config);
}

fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    let kernel_name = get_str(config, "general", "name", "Rux");
    let kernel_version = get_str(config, "general", "version", "0.1.0");

    let max_cpus = get_int(config, "smp", "max_cpus", 4);
    // need_resched 的跨 CPU 请求用一个 u64 位图传递
    if !(1..=64).contains(&max_cpus) {
        panic!("smp.max_cpus 必须在 1..=64 之间，当前为 {}", max_cpus);
    }
    let prio_levels = get_int(config, "scheduler", "prio_levels", 16);
    if prio_levels < 2 {
        panic!("scheduler.prio_levels 至少为 2（idle 占用最低一级）");
    }

    let config_header = format!(
        r#"//! Rux 调度器配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 优先级级数（0 为最高优先级）
pub const PRIO_LEVELS: usize = {};

/// idle 线程独占的最低优先级
pub const IDLE_PRIORITY: u8 = {};

/// 线程控制块上限
pub const MAX_THREADS: usize = {};

/// 进程控制块上限
pub const MAX_PROCESSES: usize = {};

/// 每个时间片包含的时钟中断数
pub const TIME_SLICE_TICKS: u32 = {};

/// 时钟中断周期（毫秒）
pub const TICK_MS: u64 = {};

/// 主动让出 CPU 的软中断号
pub const YIELD_IRQ: usize = {};

// ============================================================
// 内存配置
// ============================================================

/// 内核栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = {};

/// 栈大小对齐要求（字节）
pub const STACK_ALIGN: usize = {};

/// 线程名最大长度
pub const MAX_NAME_LEN: usize = {};

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "{}";
"#,
        kernel_name,
        kernel_version,
        max_cpus,
        prio_levels,
        prio_levels - 1,
        get_int(config, "scheduler", "max_threads", 256),
        get_int(config, "scheduler", "max_processes", 64),
        get_int(config, "scheduler", "time_slice_ticks", 1),
        get_int(config, "scheduler", "tick_ms", 10),
        get_int(config, "scheduler", "yield_irq", 129),
        get_int(config, "memory", "kernel_stack_size", 16384),
        get_int(config, "memory", "stack_align", 4096),
        get_int(config, "memory", "max_name_len", 32),
        get_str(config, "debug", "log_level", "info"),
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
