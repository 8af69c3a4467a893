//! 场景测试
//!
//! 每个文件是一组场景，全部运行在 [`mock::MockPlatform`] 上：
//! 测试代码在 schedule() 之后代表新的当前线程继续调用内核接口。
//!
//! 运行测试：
//! ```bash
//! cargo test --package rux-sched
//! ```


mod process_tree;
mod scheduler;
mod syscall;

use alloc::string::String;
use alloc::sync::Arc;

use crate::process::task::ThreadHandle;
use crate::sched::{Kernel, KernelConfig};

use mock::MockPlatform;

pub(crate) const STACK: usize = 4096;

pub(crate) fn worker(arg: usize) -> usize {
    arg
}

/// 启动一个已经挂好中断的调度器
pub(crate) fn boot_with(config: KernelConfig) -> Arc<Kernel<MockPlatform>> {
    let kernel = Kernel::new(MockPlatform::new(), config).expect("boot");
    kernel.attach();
    kernel
}

pub(crate) fn boot(nr_cpus: usize) -> Arc<Kernel<MockPlatform>> {
    boot_with(KernelConfig { nr_cpus, ..KernelConfig::default() })
}

pub(crate) fn spawn(kernel: &Kernel<MockPlatform>, priority: u8, name: &str) -> ThreadHandle {
    kernel.thread_create(priority, name, STACK, worker, 0).expect("thread_create")
}

pub(crate) fn tid(kernel: &Kernel<MockPlatform>, handle: ThreadHandle) -> u32 {
    kernel.thread_info(handle).expect("thread_info").tid
}

/// 当前 CPU 上运行的线程名
pub(crate) fn running(kernel: &Kernel<MockPlatform>) -> String {
    let current = kernel.current_thread();
    kernel.thread_info(current).expect("current thread").name
}
