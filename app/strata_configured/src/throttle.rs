/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Limits how many nodes do CPU-bound analysis work at the same time.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dupe::Dupe;
use parking_lot::Mutex;
use strata_dice::FetchObserver;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

/// Stalls are logged at most this often.
const STALL_LOG_INTERVAL: Duration = Duration::from_secs(10);

pub struct CpuPermits {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    stall_threshold: Duration,
    last_stall_log: Mutex<Option<Instant>>,
}

impl CpuPermits {
    pub fn new(permits: usize, stall_threshold: Duration) -> Arc<CpuPermits> {
        let capacity = permits.max(1);
        Arc::new(CpuPermits {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            stall_threshold,
            last_stall_log: Mutex::new(None),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Blocks the calling thread until a permit is free.
    pub fn acquire(&self) -> CpuPermit {
        if let Ok(permit) = self.semaphore.dupe().try_acquire_owned() {
            return CpuPermit {
                _permit: Some(permit),
            };
        }

        let start = Instant::now();
        // Acquiring only fails on a closed semaphore, and this one is never closed.
        let permit = futures::executor::block_on(self.semaphore.dupe().acquire_owned()).ok();
        let waited = start.elapsed();
        if waited > self.stall_threshold {
            self.log_stall(waited);
        }
        CpuPermit { _permit: permit }
    }

    fn log_stall(&self, waited: Duration) {
        let now = Instant::now();
        let mut last = self.last_stall_log.lock();
        if last.map_or(true, |t| now.duration_since(t) >= STALL_LOG_INTERVAL) {
            *last = Some(now);
            tracing::info!(
                "Spent {} ms acquiring a CPU permit for analysis ({} permits)",
                waited.as_millis(),
                self.capacity
            );
        }
    }
}

/// A held permit, released on drop.
pub struct CpuPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// The permit of one evaluation. When installed as the fetch observer of the evaluation the
/// permit is given back for the duration of every request for other values.
pub struct CpuSection {
    pool: Arc<CpuPermits>,
    permit: Mutex<Option<CpuPermit>>,
}

impl CpuSection {
    pub fn enter(pool: &Arc<CpuPermits>) -> Arc<CpuSection> {
        let permit = pool.acquire();
        Arc::new(CpuSection {
            pool: pool.dupe(),
            permit: Mutex::new(Some(permit)),
        })
    }

    pub fn is_holding(&self) -> bool {
        self.permit.lock().is_some()
    }
}

impl FetchObserver for CpuSection {
    fn pre_fetch(&self) {
        self.permit.lock().take();
    }

    fn post_fetch(&self) {
        let mut permit = self.permit.lock();
        if permit.is_none() {
            *permit = Some(self.pool.acquire());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use strata_dice::FetchObserver;

    use crate::throttle::CpuPermits;
    use crate::throttle::CpuSection;

    #[test]
    fn test_acquire_release() {
        let pool = CpuPermits::new(2, Duration::from_millis(5));
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(0, pool.available());
        drop(a);
        assert_eq!(1, pool.available());
        drop(b);
        assert_eq!(2, pool.available());
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let pool = CpuPermits::new(1, Duration::ZERO);
        let held = pool.acquire();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let _permit = pool.acquire();
                pool.available()
            });
            std::thread::sleep(Duration::from_millis(20));
            assert!(!waiter.is_finished());
            drop(held);
            assert_eq!(0, waiter.join().unwrap());
        });
        assert_eq!(1, pool.available());
    }

    #[test]
    fn test_zero_permits_is_one() {
        let pool = CpuPermits::new(0, Duration::from_millis(5));
        assert_eq!(1, pool.capacity());
    }

    #[test]
    fn test_section_released_while_fetching() {
        let pool = CpuPermits::new(1, Duration::from_millis(5));
        let section = CpuSection::enter(&pool);
        assert_eq!(0, pool.available());

        section.pre_fetch();
        assert!(!section.is_holding());
        assert_eq!(1, pool.available());

        section.post_fetch();
        assert!(section.is_holding());
        assert_eq!(0, pool.available());

        drop(section);
        assert_eq!(1, pool.available());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool = CpuPermits::new(2, Duration::from_secs(1));
        let running = AtomicUsize::new(0);
        let max_running = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _permit = pool.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert!(max_running.load(Ordering::SeqCst) <= 2);
        assert_eq!(2, pool.available());
    }
}
