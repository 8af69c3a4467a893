//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器实现
//!
//! 调度器架构：
//! - 运行队列 (rq): 每个 CPU 一个 [`RunQueue`]，包含多级就绪队列、睡眠队列、
//!   当前线程与 idle 线程
//! - 调度入口: schedule() -> dispatch() -> context_switch
//! - 时钟中断: scheduler_tick() 消耗时间片，必要时触发 schedule()
//!
//! 并发模型：
//! 所有运行队列与控制块都由一把内核级自旋锁保护，持锁前先关本地中断
//! （[`SchedGuard`]）。调度路径（`dispatch`）只操作已经分配好的结构，
//! 不分配内存、不阻塞。上下文切换在释放自旋锁之后、恢复中断之前进行。

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard};

use crate::arch::{ContextFrame, InterruptGuard, Platform, StackRegion};
use crate::config::{IDLE_PRIORITY, KERNEL_STACK_SIZE, MAX_CPUS, MAX_PROCESSES, MAX_THREADS, TIME_SLICE_TICKS, YIELD_IRQ};
use crate::errno::SchedError;
use crate::process::process::{Process, ProcessHandle, ProcessInfo, ProcessTag};
use crate::process::task::{QueueSlot, Resource, Thread, ThreadFlags, ThreadHandle, ThreadInfo, ThreadState, ThreadTag};
use crate::sched::arena::Arena;
use crate::sched::pid::{IdAllocator, Pid, Tid};
use crate::sched::rq::{ReadyQueues, SleepQueue};

/// 运行时配置
///
/// 默认值来自 Kernel.toml 生成的常量
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub nr_cpus: usize,
    pub max_threads: usize,
    pub max_processes: usize,
    pub time_slice_ticks: u32,
    pub kernel_stack_size: usize,
    pub yield_irq: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nr_cpus: 1,
            max_threads: MAX_THREADS,
            max_processes: MAX_PROCESSES,
            time_slice_ticks: TIME_SLICE_TICKS,
            kernel_stack_size: KERNEL_STACK_SIZE,
            yield_irq: YIELD_IRQ,
        }
    }
}

/// 每个 CPU 的运行队列
pub struct RunQueue {
    pub(crate) ready: ReadyQueues<ThreadTag>,
    pub(crate) sleep: SleepQueue<ThreadTag>,

    /// 当前运行的线程
    pub(crate) current: ThreadHandle,

    /// 空闲线程
    pub(crate) idle: ThreadHandle,

    /// 刚被换出、这个 CPU 还没离开它的栈的线程，由 finish_switch 清除
    pub(crate) switching_out: Option<ThreadHandle>,

    pub(crate) nr_switches: u64,
    pub(crate) ticks: u64,
}

impl RunQueue {
    fn new(idle: ThreadHandle) -> Self {
        Self {
            ready: ReadyQueues::new(),
            sleep: SleepQueue::new(),
            current: idle,
            idle,
            switching_out: None,
            nr_switches: 0,
            ticks: 0,
        }
    }
}

/// 需要重新调度的 CPU 集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReschedSet(u64);

// build.rs 已经拒绝超过 64 个 CPU 的配置
const _: () = assert!(MAX_CPUS <= ReschedSet::CAPACITY);

impl ReschedSet {
    pub(crate) const CAPACITY: usize = u64::BITS as usize;

    #[inline]
    pub(crate) fn add(&mut self, cpu: usize) {
        debug_assert!(cpu < Self::CAPACITY);
        self.0 |= 1u64 << cpu;
    }

    #[inline]
    pub(crate) fn contains(&self, cpu: usize) -> bool {
        cpu < Self::CAPACITY && self.0 & (1u64 << cpu) != 0
    }

    pub(crate) fn iter(self) -> impl Iterator<Item = usize> {
        (0..Self::CAPACITY).filter(move |&cpu| self.0 & (1u64 << cpu) != 0)
    }
}

/// dispatch 的结果，在锁外执行
pub(crate) enum Switch<C> {
    /// 继续运行当前线程
    Stay,
    /// 保存 prev，恢复 next
    To { prev: *mut C, next: *const C },
    /// prev 已退出，只恢复 next
    Restore { next: *const C },
}

/// 调度器共享状态
pub struct SchedState<P: Platform> {
    pub(crate) threads: Arena<ThreadTag, Thread<P>>,
    pub(crate) processes: Arena<ProcessTag, Process<P>>,
    pub(crate) rqs: Vec<RunQueue>,
    pub(crate) init: ProcessHandle,
    pub(crate) time_slice_ticks: u32,
}

impl<P: Platform> SchedState<P> {
    /// 线程是否还占用着某个 CPU：是当前线程，或者正在被换出
    pub(crate) fn is_on_cpu(&self, handle: ThreadHandle) -> bool {
        self.rqs.iter().any(|rq| rq.current == handle || rq.switching_out == Some(handle))
    }

    #[inline]
    pub(crate) fn current(&self, cpu: usize) -> ThreadHandle {
        self.rqs[cpu].current
    }

    /// 放入所属 CPU 的就绪队列
    pub(crate) fn enqueue_ready(&mut self, handle: ThreadHandle) {
        let (cpu, prio) = match self.threads.get_mut(handle) {
            Some(t) => {
                t.state = ThreadState::Ready;
                t.queued = QueueSlot::Ready;
                (t.cpu, t.priority)
            }
            None => return,
        };
        self.rqs[cpu].ready.enqueue(&mut self.threads, prio, handle);
    }

    /// 放入所属 CPU 的睡眠队列（按唤醒时间排序）
    pub(crate) fn enqueue_sleep(&mut self, handle: ThreadHandle) {
        let cpu = match self.threads.get_mut(handle) {
            Some(t) => {
                t.queued = QueueSlot::Sleep;
                t.cpu
            }
            None => return,
        };
        self.rqs[cpu].sleep.insert(&mut self.threads, handle);
    }

    /// 从所在的队列中摘除
    pub(crate) fn dequeue(&mut self, handle: ThreadHandle) {
        let (cpu, prio, queued) = match self.threads.get(handle) {
            Some(t) => (t.cpu, t.priority, t.queued),
            None => return,
        };
        match queued {
            QueueSlot::Ready => {
                self.rqs[cpu].ready.dequeue(&mut self.threads, prio, handle);
            }
            QueueSlot::Sleep => {
                self.rqs[cpu].sleep.remove(&mut self.threads, handle);
            }
            QueueSlot::None => {}
        }
        if let Some(t) = self.threads.get_mut(handle) {
            t.queued = QueueSlot::None;
        }
    }

    /// 唤醒线程
    ///
    /// 线程还没来得及切换出去时（仍是所在 CPU 的当前线程），直接恢复为
    /// Running；否则入就绪队列。需要抢占时把目标 CPU 记入 `resched`。
    pub(crate) fn wake(&mut self, handle: ThreadHandle, resched: &mut ReschedSet) {
        let (cpu, prio) = match self.threads.get(handle) {
            Some(t) => (t.cpu, t.priority),
            None => return,
        };

        if self.rqs[cpu].current == handle {
            if let Some(t) = self.threads.get_mut(handle) {
                t.state = ThreadState::Running;
            }
            return;
        }

        self.enqueue_ready(handle);

        let current = self.rqs[cpu].current;
        let preempt = match self.threads.get(current) {
            Some(cur) => cur.state != ThreadState::Running || prio < cur.priority,
            None => true,
        };
        if preempt {
            resched.add(cpu);
        }
    }

    /// 把到期的睡眠线程移入就绪队列
    ///
    /// 睡眠队列有序，遇到第一个未到期的节点即可停止
    fn wake_sleepers(&mut self, cpu: usize, now: u64) {
        loop {
            match self.rqs[cpu].sleep.peek_deadline(&self.threads) {
                Some(deadline) if deadline <= now => {}
                _ => break,
            }
            let handle = match self.rqs[cpu].sleep.pop_min(&mut self.threads) {
                Some(h) => h,
                None => break,
            };
            if let Some(t) = self.threads.get_mut(handle) {
                t.queued = QueueSlot::None;
            }
            self.enqueue_ready(handle);
        }
    }

    /// 调度核心：选择下一个线程
    ///
    /// 必须在关中断并持有调度锁时调用。不分配内存，不阻塞。
    /// 被唤醒的其他 CPU 上的线程记入 `resched`
    pub(crate) fn dispatch(&mut self, cpu: usize, now: u64, resched: &mut ReschedSet) -> Switch<P::Context> {
        let prev = self.rqs[cpu].current;

        // 1. 处理被换出的线程
        let (prev_state, prev_queued, prev_joiner) = match self.threads.get(prev) {
            Some(t) => (t.state, t.queued, t.joiner),
            None => {
                log::error!("sched: cpu{} current thread {:?} has no control block", cpu, prev);
                panic!("sched: cpu{} current thread {:?} has no control block", cpu, prev);
            }
        };
        match prev_state {
            ThreadState::Running => self.enqueue_ready(prev),
            ThreadState::Sleeping if prev_queued == QueueSlot::None => self.enqueue_sleep(prev),
            ThreadState::Zombie => {
                // 同一 CPU 上的 join 者只能在切换完成后运行，可以现在唤醒；
                // 其他 CPU 上的 join 者等 finish_switch
                if let Some(joiner) = prev_joiner {
                    if self.threads.get(joiner).map_or(false, |j| j.cpu == cpu) {
                        self.wake_joiner(joiner, prev, resched);
                    }
                }
            }
            _ => {}
        }

        // 2. 唤醒到期的睡眠线程
        self.wake_sleepers(cpu, now);

        // 3. 选择下一个线程；idle 永远在最低一级，扫描必然成功
        let next = match self.rqs[cpu].ready.pop_highest(&mut self.threads) {
            Some(h) => h,
            None => {
                log::error!("sched: cpu{} has no runnable thread", cpu);
                panic!("sched: cpu{} has no runnable thread (idle thread missing)", cpu);
            }
        };

        let slice = self.time_slice_ticks;
        match self.threads.get_mut(next) {
            Some(t) if t.state == ThreadState::Ready => {
                t.state = ThreadState::Running;
                t.queued = QueueSlot::None;
                t.reset_time_slice(slice);
            }
            Some(t) => {
                log::error!("sched: thread {} dispatched in state {:?}", t.tid, t.state);
                panic!("sched: thread {} dispatched in state {:?}", t.tid, t.state);
            }
            None => {
                panic!("sched: cpu{} ready queue holds stale handle {:?}", cpu, next);
            }
        }

        let rq = &mut self.rqs[cpu];
        rq.current = next;
        if next == prev {
            return Switch::Stay;
        }
        rq.switching_out = Some(prev);
        rq.nr_switches += 1;

        #[cfg(feature = "debug_log")]
        log::trace!("sched: cpu{} switch {:?} -> {:?}", cpu, prev, next);

        let next_ctx: *const P::Context = match self.threads.get(next) {
            Some(t) => &*t.context,
            None => unreachable!(),
        };
        match self.threads.get_mut(prev) {
            Some(t) if t.state != ThreadState::Zombie => Switch::To {
                prev: &mut *t.context,
                next: next_ctx,
            },
            _ => Switch::Restore { next: next_ctx },
        }
    }

    /// 切换完成：这个 CPU 已经离开被换出线程的栈
    ///
    /// 被换出的线程如果已经退出，现在才唤醒其他 CPU 上等待它的 join 者
    pub(crate) fn finish_switch(&mut self, cpu: usize, resched: &mut ReschedSet) {
        let prev = match self.rqs[cpu].switching_out.take() {
            Some(prev) => prev,
            None => return,
        };
        let joiner = match self.threads.get(prev) {
            Some(t) if t.state == ThreadState::Zombie => t.joiner,
            _ => None,
        };
        if let Some(joiner) = joiner {
            self.wake_joiner(joiner, prev, resched);
        }
    }

    /// 时钟中断记账，返回是否需要重新调度
    fn tick(&mut self, cpu: usize, now: u64) -> bool {
        let rq = &mut self.rqs[cpu];
        rq.ticks += 1;
        let current = rq.current;
        let nr_ready = rq.ready.nr_ready();

        let sleeper_due = self.rqs[cpu].sleep.peek_deadline(&self.threads)
            .map_or(false, |deadline| deadline <= now);

        let (is_idle, prio, expired) = match self.threads.get_mut(current) {
            Some(t) if t.is_idle() => (true, IDLE_PRIORITY, false),
            Some(t) => {
                let expired = !t.tick_time_slice();
                (false, t.priority, expired)
            }
            None => return true,
        };

        if is_idle {
            return nr_ready > 0 || sleeper_due;
        }
        expired || sleeper_due || self.rqs[cpu].ready.has_ready_above(prio)
    }
}

/// 调度临界区守卫：关中断 + 调度锁
///
/// 字段按声明顺序析构：先释放自旋锁，再恢复中断
pub(crate) struct SchedGuard<'a, P: Platform> {
    state: MutexGuard<'a, SchedState<P>>,
    _irq: InterruptGuard<'a, P>,
}

impl<P: Platform> Deref for SchedGuard<'_, P> {
    type Target = SchedState<P>;

    fn deref(&self) -> &SchedState<P> {
        &self.state
    }
}

impl<P: Platform> DerefMut for SchedGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut SchedState<P> {
        &mut self.state
    }
}

/// 调度器运行时句柄
///
/// 内核启动时创建一次，通过 `Arc` 在中断处理函数与系统调用之间共享
pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: KernelConfig,
    pub(crate) ids: IdAllocator,
    pub(crate) state: Mutex<SchedState<P>>,
    need_resched: Vec<AtomicBool>,
}

impl<P: Platform> Kernel<P> {
    /// 初始化调度器
    ///
    /// 创建 init 进程（PID 1）以及每个 CPU 的 idle 线程，idle 线程
    /// 作为各 CPU 的初始当前线程
    pub fn new(platform: P, config: KernelConfig) -> Result<Arc<Self>, SchedError> {
        if config.nr_cpus == 0 || config.nr_cpus > MAX_CPUS {
            log::error!("sched: init: invalid nr_cpus {}", config.nr_cpus);
            return Err(SchedError::Unauthorized);
        }
        if config.max_processes == 0 || config.max_threads < config.nr_cpus {
            log::error!("sched: init: control block pools too small");
            return Err(SchedError::OutOfMemory);
        }
        if config.time_slice_ticks == 0 {
            return Err(SchedError::NullArgument);
        }

        let ids = IdAllocator::new();
        let now = platform.now_ms();

        let space = platform.create_address_space().ok_or(SchedError::OutOfMemory)?;
        let init_pid = match ids.alloc_pid() {
            Some(pid) => pid,
            None => {
                platform.destroy_address_space(space);
                return Err(SchedError::OutOfMemory);
            }
        };

        let mut threads: Arena<ThreadTag, Thread<P>> = Arena::with_capacity(config.max_threads);
        let mut processes: Arena<ProcessTag, Process<P>> = Arena::with_capacity(config.max_processes);

        let mut init = Process::new(init_pid, None, Some(space));
        init.children.reserve(config.max_processes);
        init.threads.reserve(config.max_threads);
        let init_handle = match processes.insert(init) {
            Ok(h) => h,
            Err(init) => {
                if let Some(space) = init.address_space {
                    platform.destroy_address_space(space);
                }
                return Err(SchedError::OutOfMemory);
            }
        };

        let mut rqs = Vec::with_capacity(config.nr_cpus);
        for cpu in 0..config.nr_cpus {
            let idle = match Self::create_idle(&platform, &ids, &config, init_pid, init_handle, cpu, now) {
                Some(t) => t,
                None => {
                    Self::abort_boot(&platform, threads, processes);
                    return Err(SchedError::OutOfMemory);
                }
            };
            let handle = match threads.insert(idle) {
                Ok(h) => h,
                Err(idle) => {
                    platform.free_stack(idle.kernel_stack.base, idle.kernel_stack.size);
                    Self::abort_boot(&platform, threads, processes);
                    return Err(SchedError::OutOfMemory);
                }
            };
            if let Some(p) = processes.get_mut(init_handle) {
                p.add_thread(handle);
            }
            rqs.push(RunQueue::new(handle));
        }

        log::info!(
            "sched: init: {} cpu(s), {} priority levels, init pid {}",
            config.nr_cpus,
            IDLE_PRIORITY as usize + 1,
            init_pid
        );

        let need_resched = (0..config.nr_cpus).map(|_| AtomicBool::new(false)).collect();
        let state = SchedState {
            threads,
            processes,
            rqs,
            init: init_handle,
            time_slice_ticks: config.time_slice_ticks,
        };

        Ok(Arc::new(Self {
            platform,
            config,
            ids,
            state: Mutex::new(state),
            need_resched,
        }))
    }

    fn create_idle(
        platform: &P,
        ids: &IdAllocator,
        config: &KernelConfig,
        init_pid: Pid,
        init: ProcessHandle,
        cpu: usize,
        now: u64,
    ) -> Option<Thread<P>> {
        let tid = ids.alloc_tid()?;
        let base = platform.alloc_stack(config.kernel_stack_size)?;
        let kernel_stack = StackRegion { base, size: config.kernel_stack_size };
        let entry = platform.idle_entry();
        let context = platform.init_context(&ContextFrame {
            tid,
            entry,
            arg: cpu,
            kernel_stack_top: kernel_stack.top(),
            user_stack_top: None,
        });

        let mut idle = Thread::new(
            tid, init_pid, init, "idle", IDLE_PRIORITY, cpu, entry, cpu, kernel_stack, None, context, now,
        );
        idle.flags |= ThreadFlags::IDLE;
        idle.state = ThreadState::Running;
        Some(idle)
    }

    /// 启动失败时归还已经分配的资源
    fn abort_boot(
        platform: &P,
        mut threads: Arena<ThreadTag, Thread<P>>,
        mut processes: Arena<ProcessTag, Process<P>>,
    ) {
        for (_, t) in threads.iter_mut() {
            for res in t.take_resources() {
                res.release(platform);
            }
        }
        for (_, p) in processes.iter_mut() {
            if let Some(space) = p.address_space.take() {
                platform.destroy_address_space(space);
            }
        }
    }

    /// 注册时钟中断与让出 CPU 软中断
    ///
    /// 回调只持有 `Weak`，不会让调度器无法释放
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.platform.register_periodic(Box::new(move || {
            if let Some(kernel) = weak.upgrade() {
                kernel.scheduler_tick();
            }
        }));

        let weak: Weak<Self> = Arc::downgrade(self);
        self.platform.register_handler(self.config.yield_irq, Box::new(move || {
            if let Some(kernel) = weak.upgrade() {
                kernel.schedule();
            }
        }));
        log::debug!("sched: timer and yield irq {} attached", self.config.yield_irq);
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn nr_cpus(&self) -> usize {
        self.config.nr_cpus
    }

    /// 进入调度临界区
    pub(crate) fn lock_sched(&self) -> SchedGuard<'_, P> {
        let irq = InterruptGuard::new(&self.platform);
        let state = self.state.lock();
        SchedGuard { state, _irq: irq }
    }

    /// 当前 CPU 编号，超出范围属于平台错误
    pub(crate) fn this_cpu(&self) -> usize {
        let cpu = self.platform.core_id();
        if cpu >= self.config.nr_cpus {
            log::error!("sched: cpu id {} out of range", cpu);
            panic!("sched: cpu id {} out of range (nr_cpus = {})", cpu, self.config.nr_cpus);
        }
        cpu
    }

    #[inline]
    pub fn need_resched(&self) -> bool {
        let cpu = self.platform.core_id();
        self.need_resched.get(cpu).map_or(false, |f| f.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_need_resched(&self) {
        self.resched_cpu(self.platform.core_id());
    }

    /// 标记指定 CPU 需要重新调度，在它的下一个时钟中断生效
    #[inline]
    pub fn resched_cpu(&self, cpu: usize) {
        if let Some(flag) = self.need_resched.get(cpu) {
            flag.store(true, Ordering::Release);
        }
    }

    #[inline]
    fn clear_need_resched(&self, cpu: usize) {
        if let Some(flag) = self.need_resched.get(cpu) {
            flag.store(false, Ordering::Release);
        }
    }

    /// 处理其他 CPU 的抢占请求，返回当前 CPU 是否需要调度
    pub(crate) fn apply_resched(&self, resched: ReschedSet, this_cpu: usize) -> bool {
        for cpu in resched.iter() {
            if cpu != this_cpu {
                self.resched_cpu(cpu);
            }
        }
        resched.contains(this_cpu)
    }

    /// 在锁外释放资源
    pub(crate) fn release_all(&self, resources: Vec<Resource<P::AddressSpace>>) {
        for res in resources {
            res.release(&self.platform);
        }
    }

    #[inline(never)]
    pub fn schedule(&self) {
        let cpu = self.this_cpu();

        let irq = InterruptGuard::new(&self.platform);
        let mut resched = ReschedSet::default();
        let switch = {
            let mut state = self.state.lock();
            self.clear_need_resched(cpu);
            let now = self.platform.now_ms();
            state.dispatch(cpu, now, &mut resched)
        };
        self.apply_resched(resched, cpu);

        // 上下文切换在锁外、关中断时执行
        match switch {
            Switch::Stay => {}
            Switch::To { prev, next } => unsafe { self.platform.switch_context(prev, next) },
            Switch::Restore { next } => unsafe { self.platform.restore_context(next) },
        }
        // 从这里继续执行的是被换入的线程
        self.finish_switch();
        drop(irq);
    }

    /// 结束本 CPU 上一次上下文切换
    ///
    /// 被换入的线程在离开旧线程的栈之后调用：从 `schedule()` 返回时自动调用，
    /// 第一次运行的新线程由平台的入口跳板调用。在此之前，换出的线程不会被
    /// join 或回收。
    pub fn finish_switch(&self) {
        let cpu = self.this_cpu();
        let mut resched = ReschedSet::default();
        {
            let mut state = self.lock_sched();
            state.finish_switch(cpu, &mut resched);
        }
        // 不在这里切换，交给下一个时钟中断
        for target in resched.iter() {
            self.resched_cpu(target);
        }
    }

    /// 时钟中断入口
    pub fn scheduler_tick(&self) {
        let cpu = self.this_cpu();
        let need = {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            state.tick(cpu, now)
        };

        let flagged = self.need_resched.get(cpu).map_or(false, |f| f.load(Ordering::Acquire));
        if need || flagged {
            self.schedule();
        }
    }

    /// 主动让出 CPU：触发让出软中断，由中断处理函数调用 schedule()
    pub fn yield_now(&self) {
        self.platform.raise_software_interrupt(self.config.yield_irq);
    }

    /// 睡眠 `ms` 毫秒
    ///
    /// 唤醒时间在调用时计算；idle 线程不能睡眠
    pub fn sleep(&self, ms: u64) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        {
            let mut state = self.lock_sched();
            let now = self.platform.now_ms();
            let current = state.current(cpu);
            let t = state.threads.get_mut(current).ok_or(SchedError::NoSuchId)?;
            if t.is_idle() {
                return Err(SchedError::Unauthorized);
            }
            t.wake_deadline = now.saturating_add(ms);
            t.state = ThreadState::Sleeping;
        }
        self.schedule();
        Ok(())
    }

    /// 修改当前线程的优先级
    ///
    /// 降低优先级后如果有更高优先级的线程就绪，立即让出 CPU
    pub fn set_priority(&self, level: u8) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let preempt = {
            let mut state = self.lock_sched();
            let current = state.current(cpu);
            let (idle, queued) = match state.threads.get(current) {
                Some(t) => (t.is_idle(), t.queued),
                None => return Err(SchedError::NoSuchId),
            };
            if idle {
                return Err(SchedError::Unauthorized);
            }
            if level >= IDLE_PRIORITY {
                return Err(SchedError::ForbiddenPriority);
            }

            if queued == QueueSlot::Ready {
                state.dequeue(current);
                if let Some(t) = state.threads.get_mut(current) {
                    t.priority = level;
                }
                state.enqueue_ready(current);
            } else if let Some(t) = state.threads.get_mut(current) {
                t.priority = level;
            }
            state.rqs[cpu].ready.has_ready_above(level)
        };

        if preempt {
            self.schedule();
        }
        Ok(())
    }

    // ========================================================================
    // 查询接口
    // ========================================================================

    /// 当前 CPU 上运行的线程
    pub fn current_thread(&self) -> ThreadHandle {
        let cpu = self.this_cpu();
        self.lock_sched().current(cpu)
    }

    pub fn current_tid(&self) -> Tid {
        let cpu = self.this_cpu();
        let state = self.lock_sched();
        let current = state.current(cpu);
        state.threads.get(current).map_or(0, |t| t.tid)
    }

    pub fn current_pid(&self) -> Pid {
        let cpu = self.this_cpu();
        let state = self.lock_sched();
        let current = state.current(cpu);
        state.threads.get(current).map_or(0, |t| t.pid)
    }

    /// 指定 CPU 的当前线程
    pub fn current_on(&self, cpu: usize) -> Option<ThreadHandle> {
        let state = self.lock_sched();
        state.rqs.get(cpu).map(|rq| rq.current)
    }

    pub fn idle_thread(&self, cpu: usize) -> Option<ThreadHandle> {
        let state = self.lock_sched();
        state.rqs.get(cpu).map(|rq| rq.idle)
    }

    pub fn thread_info(&self, handle: ThreadHandle) -> Result<ThreadInfo, SchedError> {
        let state = self.lock_sched();
        state.threads.get(handle).map(|t| t.info()).ok_or(SchedError::NoSuchId)
    }

    pub fn find_thread_by_tid(&self, tid: Tid) -> Option<ThreadHandle> {
        let state = self.lock_sched();
        let found = state.threads.iter().find(|(_, t)| t.tid == tid).map(|(h, _)| h);
        found
    }

    pub fn process_info(&self, pid: Pid) -> Result<ProcessInfo, SchedError> {
        let state = self.lock_sched();
        let (_, p) = state.processes.iter()
            .find(|(_, p)| p.pid == pid)
            .ok_or(SchedError::NoSuchId)?;

        let ppid = p.parent.and_then(|h| state.processes.get(h)).map(|pp| pp.pid);
        let children = p.children.iter()
            .filter_map(|&c| state.processes.get(c))
            .map(|c| c.pid)
            .collect();
        let threads = p.threads.iter()
            .filter_map(|&t| state.threads.get(t))
            .map(|t| t.tid)
            .collect();
        let main_tid = p.main.and_then(|m| state.threads.get(m)).map(|t| t.tid);

        Ok(ProcessInfo { pid: p.pid, ppid, children, threads, main_tid, exit: p.exit })
    }

    pub fn init_pid(&self) -> Pid {
        let state = self.lock_sched();
        let init = state.init;
        state.processes.get(init).map_or(0, |p| p.pid)
    }

    pub fn nr_threads(&self) -> usize {
        self.lock_sched().threads.len()
    }

    pub fn nr_processes(&self) -> usize {
        self.lock_sched().processes.len()
    }

    pub fn nr_switches(&self, cpu: usize) -> u64 {
        self.lock_sched().rqs.get(cpu).map_or(0, |rq| rq.nr_switches)
    }

    /// 指定 CPU 上就绪队列中的线程数（不含当前线程）
    pub fn nr_ready(&self, cpu: usize) -> usize {
        self.lock_sched().rqs.get(cpu).map_or(0, |rq| rq.ready.nr_ready())
    }

    pub fn nr_sleeping(&self, cpu: usize) -> usize {
        self.lock_sched().rqs.get(cpu).map_or(0, |rq| rq.sleep.len())
    }
}
