//! Scoped object pools.
//!
//! Line buffers, document parsers and row batches are checked out once per
//! request and checked back in when the guard drops, on every exit path.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Objects that can be wiped before going back into a [`Pool`].
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A bounded free-list of reusable objects.
pub struct Pool<T: Reset> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    make: fn() -> T,
}

impl<T: Reset> Pool<T> {
    /// `max_idle` bounds how many objects are retained between requests.
    pub fn new(max_idle: usize, make: fn() -> T) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            make,
        }
    }

    pub fn get(&self) -> Pooled<'_, T> {
        let item = self.idle.lock().pop().unwrap_or_else(self.make);
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn put(&self, mut item: T) {
        item.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }
}

impl<T: Reset + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new(64, T::default)
    }
}

/// Checked-out pool object. Returned to its pool on drop.
pub struct Pooled<'a, T: Reset> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T: Reset> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the item out.
        match self.item.as_ref() {
            Some(item) => item,
            None => unreachable!("pooled object accessed after check-in"),
        }
    }
}

impl<T: Reset> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.item.as_mut() {
            Some(item) => item,
            None => unreachable!("pooled object accessed after check-in"),
        }
    }
}

impl<T: Reset> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_are_reset_and_reused() {
        let pool: Pool<Vec<u8>> = Pool::new(2, Vec::new);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(b"secret");
        }
        assert_eq!(pool.idle_count(), 1);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 6);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn check_in_happens_on_early_return() {
        fn fails(pool: &Pool<Vec<u8>>) -> Result<(), &'static str> {
            let mut buf = pool.get();
            buf.push(1);
            if buf.len() == 1 {
                return Err("boom");
            }
            buf.push(2);
            Ok(())
        }

        let pool: Pool<Vec<u8>> = Pool::new(4, Vec::new);
        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn surplus_objects_are_dropped() {
        let pool: Pool<Vec<u8>> = Pool::new(1, Vec::new);
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }
}
