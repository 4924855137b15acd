//! The kernel submission ring.
//!
//! This is the "opaque embedded ring" of the design notes: `crate::queue::Queue` is the only
//! caller. It knows nothing about `Request`; it only knows how to hand the kernel one
//! `io_uring_sqe` at a time and report how much room is left.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::mmap::Mmap;
use crate::sys;

pub(crate) struct SubmissionQueue {
    head: *const AtomicU32,
    tail: *const AtomicU32,
    ring_mask: u32,
    ring_entries: u32,
    sqes: *mut sys::io_uring_sqe,

    // Keep the mmaps alive for as long as the queue is; also covers the `array` indirection
    // page, which we set up once to the identity mapping and never touch again.
    _sq_mmap: Mmap,
    _sqe_mmap: Mmap,
}

impl SubmissionQueue {
    /// # Safety
    /// `fd` must be the io_uring instance that `params` came from.
    pub(crate) unsafe fn new(fd: RawFd, params: &sys::io_uring_params) -> io::Result<Self> {
        let sq_len = params.sq_off.array as usize
            + params.sq_entries as usize * std::mem::size_of::<u32>();
        let sqe_len =
            params.sq_entries as usize * std::mem::size_of::<sys::io_uring_sqe>();

        let sq_mmap = Mmap::new(fd, sys::IORING_OFF_SQ_RING, sq_len)?;
        let sqe_mmap = Mmap::new(fd, sys::IORING_OFF_SQES, sqe_len)?;

        let head = sq_mmap.offset(params.sq_off.head) as *const AtomicU32;
        let tail = sq_mmap.offset(params.sq_off.tail) as *const AtomicU32;
        let ring_mask = (sq_mmap.offset(params.sq_off.ring_mask) as *const u32).read();
        let ring_entries = (sq_mmap.offset(params.sq_off.ring_entries) as *const u32).read();
        let array = sq_mmap.offset(params.sq_off.array) as *mut u32;
        let sqes = sqe_mmap.as_ptr() as *mut sys::io_uring_sqe;

        // The array is an indirection from ring slot to sqe slot; we never reorder, so map it
        // once to the identity and index `sqes` directly from then on.
        for i in 0..ring_entries {
            array.add(i as usize).write(i);
        }

        Ok(SubmissionQueue {
            head,
            tail,
            ring_mask,
            ring_entries,
            sqes,
            _sq_mmap: sq_mmap,
            _sqe_mmap: sqe_mmap,
        })
    }

    #[inline]
    fn head(&self) -> u32 {
        unsafe { (*self.head).load(Ordering::Acquire) }
    }

    #[inline]
    fn tail(&self) -> u32 {
        unsafe { (*self.tail).load(Ordering::Acquire) }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u32 {
        self.ring_entries
    }

    #[inline]
    pub(crate) fn len(&self) -> u32 {
        self.tail().wrapping_sub(self.head())
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.ring_entries
    }

    /// Writes `sqe` into the next free ring slot and publishes the new tail. Returns `false`
    /// without writing anything if the ring is full. The kernel does not act on the new entry
    /// until the next `io_uring_enter`, so publishing per-entry costs nothing extra here.
    pub(crate) fn push(&mut self, sqe: sys::io_uring_sqe) -> bool {
        if self.is_full() {
            return false;
        }

        let tail = self.tail();
        unsafe {
            *self.sqes.add((tail & self.ring_mask) as usize) = sqe;
        }
        // SAFETY: tail is only ever written here, from the single owning thread.
        unsafe {
            (*self.tail).store(tail.wrapping_add(1), Ordering::Release);
        }
        true
    }
}
