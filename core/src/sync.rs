/*
 * Created on Thu Jun 20 2024
 *
 * This file is a part of Janus
 * Janus is a free and open-source distributed transaction coordinator
 * written by Sayan Nandan ("the Author") with the vision to provide
 * applications with dependable two-phase commit without compromising
 * on durability, recoverability or performance.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::IoResult,
    core::{
        mem,
        ops::Deref,
        ptr,
        sync::atomic::{AtomicBool, AtomicPtr, Ordering},
    },
    std::{
        io::{Error as IoError, ErrorKind as IoErrorKind},
        sync::mpsc,
        thread,
        time::Duration,
    },
};

const ORD_ACQ: Ordering = Ordering::Acquire;
const ORD_SEQ: Ordering = Ordering::SeqCst;

/// Exponential backoff for short CAS waits
pub struct Backoff {
    cur: u8,
}

impl Backoff {
    const MAX_SPIN: u8 = 6;
    pub const fn new() -> Self {
        Self { cur: 0 }
    }
    pub fn snooze(&mut self) {
        if self.cur <= Self::MAX_SPIN {
            for _ in 0..1u32 << self.cur {
                core::hint::spin_loop();
            }
            self.cur += 1;
        } else {
            thread::yield_now();
        }
    }
}

/// A lazily initialized, or _call by need_ value
#[derive(Debug)]
pub struct Lazy<T, F> {
    /// the value (null at first)
    value: AtomicPtr<T>,
    /// the function that will init the value
    init_func: F,
    /// is some thread trying to initialize the value
    init_state: AtomicBool,
}

impl<T, F> Lazy<T, F> {
    pub const fn new(init_func: F) -> Self {
        Self {
            value: AtomicPtr::new(ptr::null_mut()),
            init_func,
            init_state: AtomicBool::new(false),
        }
    }
}

impl<T, F> Deref for Lazy<T, F>
where
    F: Fn() -> T,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        let value_ptr = self.value.load(ORD_ACQ);
        if !value_ptr.is_null() {
            unsafe {
                // UNSAFE(@ohsayan): We've just asserted that the value is not null
                return &*value_ptr;
            }
        }
        // hold on until someone is trying to init
        let mut backoff = Backoff::new();
        while self
            .init_state
            .compare_exchange(false, true, ORD_SEQ, ORD_SEQ)
            .is_err()
        {
            // wait until the other thread finishes
            backoff.snooze();
        }
        // while we were on the loop, some other thread could have initialized it already
        let value_ptr = self.value.load(ORD_ACQ);
        if !value_ptr.is_null() {
            assert!(self.init_state.swap(false, ORD_SEQ));
            unsafe {
                // UNSAFE(@ohsayan): We've already checked that it isn't null
                &*value_ptr
            }
        } else {
            let value = (self.init_func)();
            let value_ptr = Box::into_raw(Box::new(value));
            assert!(self.value.swap(value_ptr, ORD_SEQ).is_null());
            assert!(self.init_state.swap(false, ORD_SEQ));
            unsafe {
                // UNSAFE(@ohsayan): We just initialized the value ourselves
                &*value_ptr
            }
        }
    }
}

impl<T, F> Drop for Lazy<T, F> {
    fn drop(&mut self) {
        if mem::needs_drop::<T>() {
            let value_ptr = self.value.load(ORD_ACQ);
            if !value_ptr.is_null() {
                unsafe {
                    // UNSAFE(@ohsayan): We've just checked if the value is null or not
                    mem::drop(Box::from_raw(value_ptr))
                }
            }
        }
    }
}

/// A once-settable cell with compare-and-set initialization. Unlike [`Lazy`] the initializer is
/// passed at call time which makes this usable for per-instance sub-services.
#[derive(Debug)]
pub struct LateInit<T> {
    value: AtomicPtr<T>,
    init_state: AtomicBool,
}

impl<T> LateInit<T> {
    pub const fn new() -> Self {
        Self {
            value: AtomicPtr::new(ptr::null_mut()),
            init_state: AtomicBool::new(false),
        }
    }
    pub fn get(&self) -> Option<&T> {
        let value_ptr = self.value.load(ORD_ACQ);
        if value_ptr.is_null() {
            None
        } else {
            unsafe {
                // UNSAFE(@ohsayan): non-null pointers are only ever set to leaked boxes
                Some(&*value_ptr)
            }
        }
    }
    /// Get the value, initializing it with `f` if no other thread got there first. Exactly one
    /// caller runs `f` per cell.
    pub fn get_or_init(&self, f: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        let mut backoff = Backoff::new();
        while self
            .init_state
            .compare_exchange(false, true, ORD_SEQ, ORD_SEQ)
            .is_err()
        {
            backoff.snooze();
        }
        let value_ptr = self.value.load(ORD_ACQ);
        if !value_ptr.is_null() {
            assert!(self.init_state.swap(false, ORD_SEQ));
            unsafe {
                // UNSAFE(@ohsayan): checked non-null above
                &*value_ptr
            }
        } else {
            let value_ptr = Box::into_raw(Box::new(f()));
            assert!(self.value.swap(value_ptr, ORD_SEQ).is_null());
            assert!(self.init_state.swap(false, ORD_SEQ));
            unsafe {
                // UNSAFE(@ohsayan): we just initialized it ourselves
                &*value_ptr
            }
        }
    }
}

impl<T> Drop for LateInit<T> {
    fn drop(&mut self) {
        let value_ptr = self.value.load(ORD_ACQ);
        if !value_ptr.is_null() {
            unsafe {
                // UNSAFE(@ohsayan): sole owner at drop
                mem::drop(Box::from_raw(value_ptr))
            }
        }
    }
}

/*
    fan-out pool
*/

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A tiny fixed-size worker pool used to fan an operation out to the legs of a multiplexed
/// journal. Worker `i` serves leg `i`, so the two legs of every operation always run on distinct
/// threads and jobs for one leg retain submission order.
pub struct FanoutPool {
    workers: Vec<Worker>,
}

struct Worker {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FanoutPool {
    pub fn new(size: usize) -> Self {
        let workers = (0..size)
            .map(|id| {
                let (tx, rx) = mpsc::channel::<Job>();
                let handle = thread::Builder::new()
                    .name(format!("jns-mpx-{id}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job()
                        }
                    })
                    .expect("failed to spawn multiplexer worker");
                Worker {
                    tx: Some(tx),
                    handle: Some(handle),
                }
            })
            .collect();
        Self { workers }
    }
    pub fn size(&self) -> usize {
        self.workers.len()
    }
    /// Hand `job` to worker `worker`. Fails if the pool was shut down or the worker died.
    pub fn execute(&self, worker: usize, job: Job) -> IoResult<()> {
        let tx = self.workers[worker]
            .tx
            .as_ref()
            .ok_or_else(|| IoError::new(IoErrorKind::Other, "worker pool is shut down"))?;
        tx.send(job)
            .map_err(|_| IoError::new(IoErrorKind::Other, "worker thread is gone"))
    }
    /// Wait for all previously submitted jobs to finish, bounded by `wait` per worker. The workers
    /// are left running; failing the bound (or an interrupted wait) surfaces as an I/O error.
    pub fn quiesce(&self, wait: Duration) -> IoResult<()> {
        let mut acks = Vec::with_capacity(self.workers.len());
        for worker in 0..self.workers.len() {
            let (tx, rx) = mpsc::channel();
            self.execute(worker, Box::new(move || {
                let _ = tx.send(());
            }))?;
            acks.push(rx);
        }
        for rx in acks {
            rx.recv_timeout(wait).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => IoError::new(
                    IoErrorKind::TimedOut,
                    "timed out awaiting outstanding journal operations",
                ),
                mpsc::RecvTimeoutError::Disconnected => IoError::new(
                    IoErrorKind::Interrupted,
                    "interrupted awaiting outstanding journal operations",
                ),
            })?;
        }
        Ok(())
    }
}

impl Drop for FanoutPool {
    fn drop(&mut self) {
        for worker in self.workers.iter_mut() {
            drop(worker.tx.take());
        }
        for worker in self.workers.iter_mut() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
