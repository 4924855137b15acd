//! The kernel completion ring.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::mmap::Mmap;
use crate::sys;

pub(crate) struct CompletionQueue {
    head: *const AtomicU32,
    tail: *const AtomicU32,
    ring_mask: u32,
    cqes: *const sys::io_uring_cqe,

    _cq_mmap: Mmap,
}

impl CompletionQueue {
    /// # Safety
    /// `fd` must be the io_uring instance that `params` came from.
    pub(crate) unsafe fn new(fd: RawFd, params: &sys::io_uring_params) -> io::Result<Self> {
        let cq_len = params.cq_off.cqes as usize
            + params.cq_entries as usize * std::mem::size_of::<sys::io_uring_cqe>();
        let cq_mmap = Mmap::new(fd, sys::IORING_OFF_CQ_RING, cq_len)?;

        let head = cq_mmap.offset(params.cq_off.head) as *const AtomicU32;
        let tail = cq_mmap.offset(params.cq_off.tail) as *const AtomicU32;
        let ring_mask = (cq_mmap.offset(params.cq_off.ring_mask) as *const u32).read();
        let cqes = cq_mmap.offset(params.cq_off.cqes) as *const sys::io_uring_cqe;

        Ok(CompletionQueue {
            head,
            tail,
            ring_mask,
            cqes,
            _cq_mmap: cq_mmap,
        })
    }

    /// Pops the oldest unconsumed completion, if any.
    pub(crate) fn pop(&mut self) -> Option<sys::io_uring_cqe> {
        let head = unsafe { (*self.head).load(Ordering::Acquire) };
        let tail = unsafe { (*self.tail).load(Ordering::Acquire) };

        if head == tail {
            return None;
        }

        let cqe = unsafe { *self.cqes.add((head & self.ring_mask) as usize) };
        // SAFETY: head is only ever written here, from the single owning thread.
        unsafe {
            (*self.head).store(head.wrapping_add(1), Ordering::Release);
        }
        Some(cqe)
    }
}
