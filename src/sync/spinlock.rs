//! Spinlock
//!
//! Interrupt masking plus, on SMP builds, a compare-and-swap lock word. The
//! lock is meant for critical sections of a few dozen instructions: it never
//! yields, never enables interrupts and never allocates.
//!
//! Two flavours are provided:
//! - [`Spinlock`], the raw lock with explicit [`SpinKey`] hand-back
//! - [`SpinLocked`], a data wrapper handing out an RAII [`SpinGuard`]

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::{CFG_SMP, CFG_SPIN_VALIDATE};
use crate::critical::{irq_lock, irq_unlock, IrqKey};
use crate::port;

/// Proof of a held [`Spinlock`], carrying the interrupt state to restore
#[must_use = "a SpinKey must be handed back to Spinlock::unlock"]
pub struct SpinKey {
    irq: IrqKey,
    // Must be released on the core that took it
    _not_send: PhantomData<*const ()>,
}

/// Raw spinlock
pub struct Spinlock {
    locked: AtomicBool,
    /// Owning core + 1, 0 when free. Only maintained with validation on.
    owner: AtomicUsize,
}

impl Spinlock {
    /// Create an unlocked spinlock
    pub const fn new() -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
        }
    }

    /// Mask local interrupts and take the lock, spinning while another core
    /// holds it.
    ///
    /// Taking a lock already held by the calling core never returns; with
    /// validation enabled it panics instead.
    pub fn lock(&self) -> SpinKey {
        let irq = irq_lock();
        let irq = self.validate_lock(irq);

        if CFG_SMP {
            while self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // Spin on a plain load to keep the line shared
                while self.locked.load(Ordering::Relaxed) {
                    port::cpu_relax();
                }
            }
        } else {
            // Masked interrupts are exclusion enough on one core
            self.locked.store(true, Ordering::Relaxed);
        }

        self.set_owner();
        SpinKey {
            irq,
            _not_send: PhantomData,
        }
    }

    /// Take the lock only if it is free right now.
    ///
    /// Never spins. On failure the interrupt state is already restored.
    pub fn try_lock(&self) -> Option<SpinKey> {
        let irq = irq_lock();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            irq_unlock(irq);
            return None;
        }

        self.set_owner();
        Some(SpinKey {
            irq,
            _not_send: PhantomData,
        })
    }

    /// Release the lock and restore the interrupt state captured by `lock`
    pub fn unlock(&self, key: SpinKey) {
        let irq = self.release(key);
        irq_unlock(irq);
    }

    /// Release the lock word but keep interrupts masked.
    ///
    /// The returned key must eventually reach [`irq_unlock`], typically from
    /// the code that switches to the next thread.
    pub fn release(&self, key: SpinKey) -> IrqKey {
        let key = self.validate_unlock(key);
        self.locked.store(false, Ordering::Release);
        key.irq
    }

    /// Run `f` with the lock held
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let key = self.lock();
        let ret = f();
        self.unlock(key);
        ret
    }

    /// Racy snapshot of the lock word, for diagnostics only
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Core holding the lock, when validation tracks it
    pub fn owner(&self) -> Option<usize> {
        match self.owner.load(Ordering::Relaxed) {
            0 => None,
            tag => Some(tag - 1),
        }
    }

    #[inline(always)]
    fn set_owner(&self) {
        if CFG_SPIN_VALIDATE {
            self.owner.store(port::cpu_id() + 1, Ordering::Relaxed);
        }
    }

    // Runs with interrupts masked, so nothing else on this core can take
    // or drop the lock while the owner tag is read.
    #[inline(always)]
    fn validate_lock(&self, irq: IrqKey) -> IrqKey {
        if CFG_SPIN_VALIDATE {
            let cpu = port::cpu_id();
            if self.owner.load(Ordering::Relaxed) == cpu + 1 {
                irq_unlock(irq);
                panic!("recursive spinlock on cpu {}", cpu);
            }
        }
        irq
    }

    #[inline(always)]
    fn validate_unlock(&self, key: SpinKey) -> SpinKey {
        if CFG_SPIN_VALIDATE {
            let cpu = port::cpu_id();
            let tag = self.owner.load(Ordering::Relaxed);
            if tag != cpu + 1 {
                // Unmask before reporting so the panic path can run
                irq_unlock(key.irq);
                if tag == 0 {
                    panic!("unlock of a free spinlock on cpu {}", cpu);
                }
                panic!("spinlock held by cpu {} released on cpu {}", tag - 1, cpu);
            }
            self.owner.store(0, Ordering::Relaxed);
        }
        key
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Data only reachable with its spinlock held
pub struct SpinLocked<T> {
    lock: Spinlock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLocked<T> {}
unsafe impl<T: Send> Send for SpinLocked<T> {}

impl<T> SpinLocked<T> {
    pub const fn new(data: T) -> Self {
        SpinLocked {
            lock: Spinlock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Take the lock, returning a guard that releases it on drop
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let key = self.lock.lock();
        SpinGuard {
            owner: self,
            key: Some(key),
        }
    }

    /// Non-spinning variant of [`SpinLocked::lock`]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        let key = self.lock.try_lock()?;
        Some(SpinGuard {
            owner: self,
            key: Some(key),
        })
    }

    /// Run `f` on the protected data with the lock held
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Exclusive access without locking
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<T: Default> Default for SpinLocked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard of a [`SpinLocked`]
pub struct SpinGuard<'a, T> {
    owner: &'a SpinLocked<T>,
    key: Option<SpinKey>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.owner.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.owner.lock.unlock(key);
        }
    }
}
