//! Cooperative cancellation shared between the signal handler and the read loop.
//!
//! The read loop checks [`CancelSignal::is_cancelled`] at the top of every
//! iteration. A read that is already blocked is woken through the interrupt
//! callbacks registered with [`CancelSignal::on_cancel`]. A callback stays
//! registered only while its [`CancelRegistration`] is alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Callback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    registry: Mutex<Registry>,
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable, runtime-agnostic cancellation flag
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and run every registered callback once
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut self.inner.registry().callbacks);
        for (_, callback) in callbacks {
            callback();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Run `callback` on cancellation, or right away if already cancelled
    ///
    /// Dropping the returned registration unregisters the callback.
    pub fn on_cancel(&self, callback: impl Fn() + Send + Sync + 'static) -> CancelRegistration {
        let mut registry = self.inner.registry();
        if self.is_cancelled() {
            drop(registry);
            callback();
            return CancelRegistration { inner: self.inner.clone(), id: None };
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Box::new(callback)));
        CancelRegistration { inner: self.inner.clone(), id: Some(id) }
    }

    /// Number of callbacks still waiting for cancellation
    #[must_use]
    pub fn registered(&self) -> usize {
        self.inner.registry().callbacks.len()
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .field("registered", &self.registered())
            .finish()
    }
}

/// Keeps an `on_cancel` callback registered until dropped
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancelRegistration {
    inner: Arc<Inner>,
    id: Option<u64>,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.inner.registry().callbacks.retain(|(registered, _)| *registered != id);
        }
    }
}

impl std::fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelRegistration").field("id", &self.id).finish()
    }
}
