use crate::irq::IrqMask;
use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A spin lock whose guard also keeps local interrupts masked.
///
/// Acquisition order is: save and disable interrupts, then spin for the lock.
/// Release happens in reverse order on drop. With interrupts masked, an
/// interrupt handler on the same CPU can never preempt the holder, so the
/// handler's own acquisition only ever spins on a holder running on another
/// CPU.
///
/// # Contract
///
/// The lock is entered from interrupt context, which must never block. Keep
/// the critical section O(1): queue and pointer updates only, no allocation,
/// no compilation and no waiting on hardware.
pub struct IrqSpinLock<T, M: IrqMask> {
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    inner: UnsafeCell<T>,
    _mask: PhantomData<fn() -> M>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send, M: IrqMask> Sync for IrqSpinLock<T, M> {}
unsafe impl<T: Send, M: IrqMask> Send for IrqSpinLock<T, M> {}

impl<T, M: IrqMask> IrqSpinLock<T, M> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
            _mask: PhantomData,
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Masks interrupts and spins until the lock is held (TATAS).
    #[inline]
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T, M> {
        let saved = M::save_and_disable();
        while !self.try_acquire() {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        IrqSpinLockGuard { lock: self, saved }
    }

    /// Single attempt; interrupts are restored again if the lock is taken.
    #[inline]
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T, M>> {
        let saved = M::save_and_disable();
        if self.try_acquire() {
            Some(IrqSpinLockGuard { lock: self, saved })
        } else {
            M::restore(saved);
            None
        }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

pub struct IrqSpinLockGuard<'a, T, M: IrqMask> {
    lock: &'a IrqSpinLock<T, M>,
    saved: M::State,
}

impl<T, M: IrqMask> Deref for IrqSpinLockGuard<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, M: IrqMask> DerefMut for IrqSpinLockGuard<'_, T, M> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, M: IrqMask> Drop for IrqSpinLockGuard<'_, T, M> {
    fn drop(&mut self) {
        // Release publishes the critical section before interrupts come back.
        self.lock.locked.store(false, Ordering::Release);
        M::restore(self.saved);
    }
}
