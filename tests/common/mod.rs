//! Host harness shared by the integration tests
//!
//! Each host thread stands for one thread of the kernel. The simulated core
//! a thread runs on is a thread-local picked with [`set_cpu`], and
//! [`HostKernel`] maps suspend/ready onto `std::thread::park`/`unpark`,
//! which already has the park-token semantics the primitives rely on.
//!
//! Interrupt masking is per host thread, like PRIMASK is per core, so two
//! threads standing for different cores only exclude each other through
//! the spinlock word. Threads that may hold the same lock at once must
//! therefore run as different cores.

#![allow(dead_code)]

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use critical_section::RawRestoreState;
use rtsmp::kernel::Kernel;
use rtsmp::types::{CpuId, CpuMask, Deadline, ThreadId, Tick};

#[cfg(feature = "smp")]
use rtsmp::smp::{BootCoordinator, ConnectCaps, InterCoreUnit};

thread_local! {
    static CPU: Cell<CpuId> = const { Cell::new(0) };
    static THREAD: Cell<Option<ThreadId>> = const { Cell::new(None) };
    static MASKED: Cell<bool> = const { Cell::new(false) };
}

struct HostCriticalSection;
critical_section::set_impl!(HostCriticalSection);

unsafe impl critical_section::Impl for HostCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        MASKED.with(|masked| masked.replace(true))
    }

    unsafe fn release(was_masked: RawRestoreState) {
        MASKED.with(|masked| masked.set(was_masked));
    }
}

/// Whether the calling host thread has interrupts masked
pub fn irqs_masked() -> bool {
    MASKED.with(Cell::get)
}

static THREADS: Mutex<Vec<Thread>> = Mutex::new(Vec::new());

fn current_cpu() -> CpuId {
    CPU.with(Cell::get)
}

/// Make the calling host thread run as core `cpu`
pub fn set_cpu(cpu: CpuId) {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| rtsmp::port::set_cpu_id_hook(current_cpu));
    CPU.with(|c| c.set(cpu));
}

/// Poll `cond` until it holds, failing the test after five seconds
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timed out waiting for {what}"
        );
        thread::sleep(Duration::from_millis(1));
    }
}

/// Scheduler stand-in, one tick per millisecond of wall time
pub struct HostKernel {
    start: Instant,
    signals: Mutex<Vec<CpuMask>>,
    sched_ipis: AtomicUsize,
}

impl HostKernel {
    pub fn new() -> Self {
        set_cpu(current_cpu());
        HostKernel {
            start: Instant::now(),
            signals: Mutex::new(Vec::new()),
            sched_ipis: AtomicUsize::new(0),
        }
    }

    /// Every `signal_cpus` call so far
    pub fn signals(&self) -> Vec<CpuMask> {
        self.signals.lock().unwrap().clone()
    }

    pub fn sched_ipis(&self) -> usize {
        self.sched_ipis.load(Ordering::SeqCst)
    }
}

impl Kernel for HostKernel {
    fn current_thread(&self) -> ThreadId {
        THREAD.with(|id| match id.get() {
            Some(thread) => thread,
            None => {
                let mut threads = THREADS.lock().unwrap();
                let thread = ThreadId(threads.len() as u32);
                threads.push(thread::current());
                id.set(Some(thread));
                thread
            }
        })
    }

    fn ticks(&self) -> Tick {
        self.start.elapsed().as_millis() as Tick
    }

    fn suspend(&self, deadline: Deadline) {
        match deadline {
            Deadline::Forever => thread::park(),
            Deadline::At(at) => {
                let now = self.ticks();
                if at > now {
                    thread::park_timeout(Duration::from_millis(at - now));
                }
            }
        }
    }

    fn ready(&self, thread: ThreadId) {
        let threads = THREADS.lock().unwrap();
        threads[thread.0 as usize].unpark();
    }

    fn signal_cpus(&self, targets: CpuMask) {
        self.signals.lock().unwrap().push(targets);
    }

    fn sched_ipi(&self) {
        self.sched_ipis.fetch_add(1, Ordering::SeqCst);
    }
}

/// Inter-core unit that records what the boot code asks of it
#[cfg(feature = "smp")]
pub struct RecordingIcu {
    caps: ConnectCaps,
    pub raised: Mutex<Vec<CpuId>>,
    pending: AtomicU32,
    enabled: AtomicU32,
    pub clears: AtomicUsize,
    pub counter_cores: Mutex<Option<CpuMask>>,
    pub halt_group: Mutex<Option<CpuMask>>,
    counter: AtomicU64,
}

#[cfg(feature = "smp")]
impl RecordingIcu {
    pub fn new(caps: ConnectCaps) -> Self {
        RecordingIcu {
            caps,
            raised: Mutex::new(Vec::new()),
            pending: AtomicU32::new(0),
            enabled: AtomicU32::new(0),
            clears: AtomicUsize::new(0),
            counter_cores: Mutex::new(None),
            halt_group: Mutex::new(None),
            counter: AtomicU64::new(1000),
        }
    }

    pub fn raised(&self) -> Vec<CpuId> {
        self.raised.lock().unwrap().clone()
    }

    pub fn pending(&self) -> CpuMask {
        CpuMask(self.pending.load(Ordering::SeqCst))
    }

    pub fn enabled(&self) -> CpuMask {
        CpuMask(self.enabled.load(Ordering::SeqCst))
    }
}

#[cfg(feature = "smp")]
impl InterCoreUnit for RecordingIcu {
    fn caps(&self) -> ConnectCaps {
        self.caps
    }

    fn raise_ipi(&self, cpu: CpuId) {
        self.raised.lock().unwrap().push(cpu);
        self.pending.fetch_or(1 << cpu, Ordering::SeqCst);
    }

    fn clear_ipi(&self, cpu: CpuId) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_and(!(1 << cpu), Ordering::SeqCst);
    }

    fn enable_ipi(&self, cpu: CpuId) {
        self.enabled.fetch_or(1 << cpu, Ordering::SeqCst);
    }

    fn counter_enable(&self, cores: CpuMask) {
        *self.counter_cores.lock().unwrap() = Some(cores);
    }

    fn counter_clear(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    fn counter_read(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    fn debug_halt_group(&self, cores: CpuMask) {
        *self.halt_group.lock().unwrap() = Some(cores);
    }
}

/// Coordinator that outlives the test, for secondaries that never return
#[cfg(feature = "smp")]
pub fn leak_coordinator(
    caps: ConnectCaps,
    num_cpus: usize,
) -> (&'static RecordingIcu, &'static BootCoordinator<'static>) {
    let icu: &'static RecordingIcu = Box::leak(Box::new(RecordingIcu::new(caps)));
    let smp: BootCoordinator<'static> = BootCoordinator::new(icu, num_cpus);
    let smp: &'static BootCoordinator<'static> = Box::leak(Box::new(smp));
    (icu, smp)
}
