//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构与平台协作接口
//!
//! 调度器本身不包含任何汇编，它通过下面几个 trait 使用底层：
//! - [`CpuOps`]: 上下文保存/恢复、软中断、CPU 编号、中断屏蔽
//! - [`MemoryOps`]: 栈分配、地址空间创建/复制/销毁
//! - [`TimerOps`]: 时钟读取、周期回调注册
//! - [`IrqOps`]: 中断处理函数注册
//!
//! 内核移植到新平台时，只需要为平台类型实现这四个 trait，
//! 它会通过 blanket impl 自动成为 [`Platform`]。

use alloc::boxed::Box;

/// 线程入口函数
///
/// 参数为创建线程时传入的 `arg`，返回值作为线程的返回值
pub type ThreadEntry = fn(usize) -> usize;

/// 中断回调（定时器、软中断）
pub type IrqHandler = Box<dyn Fn() + Send + Sync>;

/// 栈描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    /// 栈底（低地址）
    pub base: usize,
    /// 栈大小（字节）
    pub size: usize,
}

impl StackRegion {
    /// 栈顶地址（栈向下增长）
    #[inline]
    pub const fn top(&self) -> usize {
        self.base + self.size
    }
}

/// 构造初始寄存器帧所需的信息
#[derive(Debug, Clone, Copy)]
pub struct ContextFrame {
    pub tid: u32,
    pub entry: ThreadEntry,
    pub arg: usize,
    pub kernel_stack_top: usize,
    /// 内核线程（idle）没有用户栈
    pub user_stack_top: Option<usize>,
}

/// CPU 相关操作
///
/// 对应 Linux 的 arch/riscv/kernel/process.c 与 irqflags.h
pub trait CpuOps: Send + Sync {
    /// 保存的寄存器集合
    type Context: Send;

    /// 当前 CPU 编号
    fn core_id(&self) -> usize;

    /// 禁用本地中断，返回之前的中断状态
    fn enter_critical(&self) -> usize;

    /// 恢复 `enter_critical` 保存的中断状态
    fn exit_critical(&self, saved: usize);

    /// 为新线程构造初始寄存器帧
    ///
    /// 新线程第一次被换入时，入口跳板必须先调用
    /// [`Kernel::finish_switch`](crate::sched::Kernel::finish_switch)，再跳到 `entry`
    fn init_context(&self, frame: &ContextFrame) -> Self::Context;

    /// 为 fork 出的线程复制父线程的寄存器帧
    ///
    /// 实现需要让子线程看到 fork 返回 0
    fn fork_context(&self, parent: &Self::Context, frame: &ContextFrame) -> Self::Context;

    /// 保存 `prev` 的寄存器并恢复 `next`
    ///
    /// 当 `prev` 再次被调度时返回。在 `finish_switch` 之前，`prev` 的栈和
    /// 上下文都不会被回收
    ///
    /// # Safety
    /// 两个指针都必须指向有效的上下文，且在切换完成前不会被释放
    unsafe fn switch_context(&self, prev: *mut Self::Context, next: *const Self::Context);

    /// 只恢复 `next`，不保存当前寄存器（当前线程已经退出）
    ///
    /// # Safety
    /// `next` 必须指向有效的上下文
    unsafe fn restore_context(&self, next: *const Self::Context);

    /// 在当前 CPU 上触发软中断
    fn raise_software_interrupt(&self, line: usize);

    /// idle 线程入口（通常是 `wfi` 循环）
    fn idle_entry(&self) -> ThreadEntry;
}

/// 内存相关操作
pub trait MemoryOps: Send + Sync {
    /// 地址空间句柄（页表根等），由内存子系统解释
    type AddressSpace: Send;

    fn alloc_stack(&self, size: usize) -> Option<usize>;

    fn free_stack(&self, base: usize, size: usize);

    fn create_address_space(&self) -> Option<Self::AddressSpace>;

    /// 复制地址空间（fork 使用，可以是 COW）
    fn copy_address_space(&self, src: &Self::AddressSpace) -> Option<Self::AddressSpace>;

    fn destroy_address_space(&self, space: Self::AddressSpace);
}

/// 定时器操作
pub trait TimerOps: Send + Sync {
    /// 单调时钟（毫秒）
    fn now_ms(&self) -> u64;

    /// 注册周期时钟中断回调
    fn register_periodic(&self, callback: IrqHandler);
}

/// 中断控制器操作
pub trait IrqOps: Send + Sync {
    fn register_handler(&self, line: usize, handler: IrqHandler);
}

/// 调度器需要的全部平台能力
pub trait Platform: CpuOps + MemoryOps + TimerOps + IrqOps + 'static {}

impl<T> Platform for T where T: CpuOps + MemoryOps + TimerOps + IrqOps + 'static {}

/// 中断保护 RAII 守卫
///
/// 在作用域内禁用本地中断，离开时自动恢复
///
/// 对应 Linux 的 local_irq_save()/local_irq_restore()
pub struct InterruptGuard<'a, C: CpuOps + ?Sized> {
    cpu: &'a C,
    flags: usize,
}

impl<'a, C: CpuOps + ?Sized> InterruptGuard<'a, C> {
    #[inline]
    pub fn new(cpu: &'a C) -> Self {
        let flags = cpu.enter_critical();
        InterruptGuard { cpu, flags }
    }
}

impl<C: CpuOps + ?Sized> Drop for InterruptGuard<'_, C> {
    #[inline]
    fn drop(&mut self) {
        self.cpu.exit_critical(self.flags);
    }
}
