//! Process-wide admission control for blocking reads.
//!
//! A [`ConcurrencyLimiter`] bounds how many request streams may sit in a
//! physical read at once, no matter how many requests are open. Each
//! [`LimitedReader`] takes one unit before reading and keeps it until the
//! caller calls [`LimitedReader::release_unit`] after finishing a record.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

pub struct ConcurrencyLimiter {
    capacity: usize,
    max_queue_duration: Duration,
    in_use: Mutex<usize>,
    released: Condvar,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize, max_queue_duration: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            max_queue_duration,
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Default capacity: twice the number of available CPU cores.
    pub fn default_capacity() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(2)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        *self.in_use.lock()
    }

    fn acquire(&self) -> io::Result<()> {
        let mut in_use = self.in_use.lock();
        if *in_use < self.capacity {
            *in_use += 1;
            return Ok(());
        }

        counter!("bulk.concurrency.limit_reached", 1);
        let started = Instant::now();
        let deadline = started + self.max_queue_duration;
        while *in_use >= self.capacity {
            if self.released.wait_until(&mut in_use, deadline).timed_out()
                && *in_use >= self.capacity
            {
                counter!("bulk.concurrency.limit_timeout", 1);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "cannot process insert request for {:.3} seconds because {} concurrent insert requests are executed; \
                         increase insert.max_concurrent_inserts or insert.max_queue_duration_secs",
                        started.elapsed().as_secs_f64(),
                        self.capacity
                    ),
                ));
            }
        }
        *in_use += 1;
        debug!(
            waited_ms = started.elapsed().as_millis() as u64,
            "acquired read concurrency unit"
        );
        Ok(())
    }

    fn release(&self) {
        let mut in_use = self.in_use.lock();
        *in_use = in_use.saturating_sub(1);
        drop(in_use);
        self.released.notify_one();
    }
}

/// Reader that holds one limiter unit from its first read until released.
pub struct LimitedReader<'a, R> {
    inner: R,
    limiter: &'a ConcurrencyLimiter,
    holds_unit: bool,
}

impl<'a, R: Read> LimitedReader<'a, R> {
    pub fn new(inner: R, limiter: &'a ConcurrencyLimiter) -> Self {
        Self {
            inner,
            limiter,
            holds_unit: false,
        }
    }

    /// Give back the unit taken by the last read, if any.
    pub fn release_unit(&mut self) {
        if self.holds_unit {
            self.holds_unit = false;
            self.limiter.release();
        }
    }

    pub fn holds_unit(&self) -> bool {
        self.holds_unit
    }
}

impl<R: Read> Read for LimitedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.holds_unit {
            self.limiter.acquire()?;
            self.holds_unit = true;
        }
        self.inner.read(buf)
    }
}

impl<R> Drop for LimitedReader<'_, R> {
    fn drop(&mut self) {
        if self.holds_unit {
            self.limiter.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unit_is_held_until_released() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(10));
        let mut reader = LimitedReader::new(&b"abc"[..], &limiter);
        let mut buf = [0u8; 2];

        reader.read(&mut buf).unwrap();
        assert!(reader.holds_unit());
        assert_eq!(limiter.in_use(), 1);

        // Second read on the same reader does not take another unit.
        reader.read(&mut buf).unwrap();
        assert_eq!(limiter.in_use(), 1);

        reader.release_unit();
        reader.release_unit();
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn saturated_limiter_times_out() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(20));
        let mut first = LimitedReader::new(&b"abc"[..], &limiter);
        let mut second = LimitedReader::new(&b"def"[..], &limiter);
        let mut buf = [0u8; 1];

        first.read(&mut buf).unwrap();
        let err = second.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("1 concurrent insert requests"));
        assert!(!second.holds_unit());
    }

    #[test]
    fn waiting_reader_proceeds_after_release() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1, Duration::from_secs(5)));
        let mut first = LimitedReader::new(&b"abc"[..], &limiter);
        let mut buf = [0u8; 1];
        first.read(&mut buf).unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                let mut reader = LimitedReader::new(&b"xyz"[..], &limiter);
                let mut buf = [0u8; 3];
                reader.read(&mut buf).map(|n| buf[..n].to_vec())
            })
        };

        thread::sleep(Duration::from_millis(20));
        first.release_unit();
        assert_eq!(waiter.join().unwrap().unwrap(), b"xyz");
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn drop_returns_unit() {
        let limiter = ConcurrencyLimiter::new(2, Duration::from_millis(10));
        {
            let mut reader = LimitedReader::new(&b"abc"[..], &limiter);
            let mut buf = [0u8; 1];
            reader.read(&mut buf).unwrap();
            assert_eq!(limiter.in_use(), 1);
        }
        assert_eq!(limiter.in_use(), 0);
    }
}
