//! The ring bridge: Request → submission-queue entry, and completion-queue entry → outcome.
//!
//! Every opcode lowers to a vectored kernel op (`READV`/`WRITEV`) with an iovec count of 1 for
//! the non-vectored cases, since [`crate::request::Request`] already embeds one iovec. This
//! keeps exactly one submission path in [`crate::queue::Queue::submit_n`].

use crate::request::Request;
use crate::sys;

/// Builds the `io_uring_sqe` the kernel will execute for `req`. `req`'s own address becomes the
/// submission's user-data, so the completion side can recover it with no extra lookup (see
/// [`read_completion`]).
///
/// # Safety
/// `req` must remain at a fixed address and its buffer/iovec must remain valid until the
/// resulting entry's completion has been processed — the same contract as
/// [`crate::Queue::insert`].
pub(crate) unsafe fn build_sqe(req: *mut Request) -> sys::io_uring_sqe {
    let r = &*req;

    let (opcode, addr, len) = match r.opcode {
        crate::request::Opcode::Read | crate::request::Opcode::Write => {
            (r.opcode, &r.iovec as *const libc::iovec as u64, 1u32)
        }
        crate::request::Opcode::ReadV | crate::request::Opcode::WriteV => {
            (r.opcode, r.iovec.iov_base as u64, r.iovec.iov_len as u32)
        }
    };

    sys::io_uring_sqe {
        opcode: if opcode.is_write() {
            sys::IORING_OP_WRITEV
        } else {
            sys::IORING_OP_READV
        },
        flags: 0,
        ioprio: 0,
        fd: r.fd,
        off: r.offset,
        addr,
        len,
        rw_flags: 0,
        user_data: req as u64,
        buf_index: 0,
        personality: 0,
        splice_fd_in: 0,
        __pad2: [0; 2],
    }
}

/// The outcome of one completion: `req`, mapped as described in §4.2's `process_responses`, and
/// the errno to hand the callback (`0` on success).
pub(crate) struct Completion {
    pub(crate) req: *mut Request,
    pub(crate) err: i32,
}

/// Maps a raw completion-queue entry back to a [`Request`] pointer and an errno, per the
/// `res < 0` / `res == get_size` / short-I/O rule in §4.2.
///
/// # Safety
/// `cqe.user_data` must be the address of a `Request` that is still alive (i.e. this is the first
/// and only time this completion is processed).
pub(crate) unsafe fn read_completion(cqe: sys::io_uring_cqe) -> Completion {
    let req = cqe.user_data as *mut Request;
    let res = cqe.res;

    let err = if res < 0 {
        res
    } else if res as usize == (*req).get_size() {
        0
    } else {
        crate::error::IO_ERRNO
    };

    Completion { req, err }
}
