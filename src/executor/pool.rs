//! Bounded pool of reusable connections.
//!
//! Connections are created lazily up to `max`. A caller that finds the pool
//! exhausted waits for a connection to be returned, up to an optional
//! deadline.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{ExecuteError, ExecuteResult};

type Factory<T> = Box<dyn Fn() -> ExecuteResult<T> + Send + Sync>;

/// A bounded pool for connection-like objects.
pub struct Pool<T> {
    max: usize,
    factory: Factory<T>,
    idle: Mutex<Vec<T>>,
    available: Condvar,
    open: AtomicUsize,
}

/// A pooled value that returns to the pool on drop.
pub struct Pooled<'a, T> {
    pool: &'a Pool<T>,
    value: Option<T>,
}

impl<T> Pool<T> {
    pub fn new<F>(max: usize, factory: F) -> Self
    where
        F: Fn() -> ExecuteResult<T> + Send + Sync + 'static,
    {
        Self {
            max: max.max(1),
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
            available: Condvar::new(),
            open: AtomicUsize::new(0),
        }
    }

    /// Take a connection, creating one if the pool has room.
    ///
    /// `timeout` of `None` waits indefinitely.
    pub fn acquire(&self, timeout: Option<Duration>) -> ExecuteResult<Pooled<'_, T>> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut idle = self.idle.lock();
        loop {
            if let Some(value) = idle.pop() {
                return Ok(self.wrap(value));
            }

            if self.open.load(Ordering::SeqCst) < self.max {
                self.open.fetch_add(1, Ordering::SeqCst);
                drop(idle);
                return match (self.factory)() {
                    Ok(value) => Ok(self.wrap(value)),
                    Err(e) => {
                        self.open.fetch_sub(1, Ordering::SeqCst);
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            match (deadline, timeout) {
                (Some(deadline), Some(limit)) => {
                    if self.available.wait_until(&mut idle, deadline).timed_out() {
                        return match idle.pop() {
                            Some(value) => Ok(self.wrap(value)),
                            None => Err(ExecuteError::PoolTimeout(limit)),
                        };
                    }
                }
                _ => self.available.wait(&mut idle),
            }
        }
    }

    /// Connections created and not yet dropped.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn wrap(&self, value: T) -> Pooled<'_, T> {
        Pooled {
            pool: self,
            value: Some(value),
        }
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value present until drop")
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until drop")
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.idle.lock().push(value);
            self.pool.available.notify_one();
        }
    }
}
