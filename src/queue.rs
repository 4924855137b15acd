//! The request queue: the public surface of this crate.

use std::cell::Cell;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::ptr;

use nix::errno::Errno;
use nix::sys::eventfd::{eventfd, EfdFlags};

use crate::cqueue::CompletionQueue;
use crate::error::{Error, Result};
use crate::opcode::{build_sqe, read_completion};
use crate::request::Request;
use crate::squeue::SubmissionQueue;
use crate::sys;

/// The kernel ring and the resources that go with it. Torn down as a unit by
/// [`Queue::uninit`]/`Drop`.
struct Ring {
    // Order matters: the mmaps borrow from `file`'s fd conceptually (not literally, since
    // they're independent mappings of the same fd), but we still want them dropped — and thus
    // munmap'd — strictly before the fd they were mapped from is closed.
    sq: SubmissionQueue,
    cq: CompletionQueue,
    file: File,
    event_fd: Option<RawFd>,
}

impl Drop for Ring {
    fn drop(&mut self) {
        if let Some(fd) = self.event_fd {
            let _ = nix::unistd::close(fd);
        }
    }
}

/// Kernel feature bits observed at construction time, exposed so a caller can tell whether e.g.
/// `IORING_FEAT_NODROP` was actually granted.
#[derive(Debug, Clone, Copy)]
pub struct Parameters {
    single_mmap: bool,
    nodrop: bool,
    iopoll: bool,
}

impl Parameters {
    pub fn is_feature_single_mmap(&self) -> bool {
        self.single_mmap
    }

    pub fn is_feature_nodrop(&self) -> bool {
        self.nodrop
    }

    pub fn is_setup_iopoll(&self) -> bool {
        self.iopoll
    }
}

/// Builder for [`Queue`], mirroring the capacity/polling knobs of `init` while leaving room to
/// grow (e.g. a future `sqpoll` toggle) without breaking callers.
#[derive(Debug, Clone, Copy)]
pub struct Builder {
    capacity: u32,
    use_polling: bool,
}

impl Builder {
    pub fn new(capacity: u32) -> Self {
        Builder {
            capacity,
            use_polling: false,
        }
    }

    pub fn use_polling(mut self, use_polling: bool) -> Self {
        self.use_polling = use_polling;
        self
    }

    pub fn build(self) -> Result<Queue> {
        Queue::new(self.capacity, self.use_polling)
    }
}

/// A user-level request queue over one kernel io_uring instance.
///
/// Exactly one thread may own and call into a given `Queue`; this is enforced by the type not
/// being `Send`/`Sync` (it holds raw pointers into an intrusive, unsynchronized pending list).
///
/// See the crate-level docs for the full lifecycle: [`Queue::new`] → repeated
/// [`insert`](Queue::insert)/[`submit`](Queue::submit)/[`process_responses`] → `cancel` any
/// survivors → `uninit`/drop.
pub struct Queue {
    capacity: u32,
    use_polling: bool,
    ring: Option<Ring>,

    pending_head: Cell<*mut Request>,
    pending_tail: Cell<*mut Request>,
    pending_count: u32,
    in_flight_count: u32,
}

// Intentionally !Send and !Sync: the pending list is a raw-pointer intrusive list with no
// synchronization, and `process_responses` assumes single-threaded draining (§5).

impl Queue {
    /// Initializes a queue with room for `capacity` simultaneously tracked requests (pending plus
    /// in-flight). `use_polling` selects kernel-side I/O polling (IOPOLL) instead of an eventfd
    /// notifier.
    ///
    /// Fails with [`Error::Invalid`] if `capacity == 0`. Any other failure during setup
    /// (`io_uring_setup`, the eventfd registration) leaves nothing behind to clean up — the ring
    /// and notifier are torn down before the error is returned.
    pub fn new(capacity: u32, use_polling: bool) -> Result<Queue> {
        if capacity == 0 {
            return Err(Error::Invalid);
        }

        let mut params = sys::io_uring_params {
            flags: if use_polling { sys::IORING_SETUP_IOPOLL } else { 0 },
            ..Default::default()
        };

        // SAFETY: params is a valid, writable io_uring_params; the return value is checked below.
        let raw_fd = unsafe { sys::io_uring_setup(capacity, &mut params) };
        if raw_fd < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }
        // SAFETY: raw_fd was just returned by a successful io_uring_setup; this struct owns it.
        let file = unsafe { File::from_raw_fd(raw_fd) };

        // SAFETY: file.as_raw_fd() is the instance params was filled in for.
        let sq = match unsafe { SubmissionQueue::new(file.as_raw_fd(), &params) } {
            Ok(sq) => sq,
            Err(e) => return Err(Error::from(e)),
        };
        // SAFETY: same as above.
        let cq = match unsafe { CompletionQueue::new(file.as_raw_fd(), &params) } {
            Ok(cq) => cq,
            Err(e) => return Err(Error::from(e)),
        };

        let event_fd = if use_polling {
            None
        } else {
            let efd = eventfd(0, EfdFlags::EFD_CLOEXEC).map_err(|_| Error::ResourceExhausted)?;
            // SAFETY: efd is valid and alive for the duration of this call; nr_args is 1.
            let reg = unsafe {
                sys::io_uring_register(
                    file.as_raw_fd(),
                    sys::IORING_REGISTER_EVENTFD,
                    &efd as *const RawFd as *const libc::c_void,
                    1,
                )
            };
            if reg < 0 {
                let err = Error::from(io::Error::last_os_error());
                let _ = nix::unistd::close(efd);
                return Err(err);
            }
            Some(efd)
        };

        Ok(Queue {
            capacity,
            use_polling,
            ring: Some(Ring {
                sq,
                cq,
                file,
                event_fd,
            }),
            pending_head: Cell::new(ptr::null_mut()),
            pending_tail: Cell::new(ptr::null_mut()),
            pending_count: 0,
            in_flight_count: 0,
        })
    }

    /// Feature bits the host kernel actually granted.
    pub fn parameters(&self) -> Option<Parameters> {
        self.ring.as_ref().map(|_| Parameters {
            // Both mmap regions are always mapped separately by this port (see DESIGN.md); a
            // future implementation taking advantage of IORING_FEAT_SINGLE_MMAP would thread the
            // real feature bit through here instead.
            single_mmap: false,
            nodrop: true,
            iopoll: self.use_polling,
        })
    }

    /// Tears down the ring and (if present) the event notifier. A no-op if the queue was never
    /// successfully initialized. Does not run any callbacks — the caller must have drained or
    /// [`cancel`](Queue::cancel)led outstanding requests first.
    pub fn uninit(&mut self) {
        self.ring = None;
    }

    /// Appends `req` to the pending FIFO. Does not touch the kernel. The caller must not exceed
    /// `capacity` (see [`Queue::is_full`]) — this is not checked here.
    ///
    /// # Safety
    /// `req` must point to a `Request` that stays at a fixed address and alive until its callback
    /// fires (via `submit`'s completion path or `cancel`). The queue takes exclusive logical
    /// ownership of `*req` until then: the caller must not read or mutate it in that window.
    pub unsafe fn insert(&mut self, req: *mut Request) {
        (*req).next.set(ptr::null_mut());
        if self.pending_tail.get().is_null() {
            self.pending_head.set(req);
        } else {
            (*self.pending_tail.get()).next.set(req);
        }
        self.pending_tail.set(req);
        self.pending_count += 1;
    }

    /// Submits as many pending requests as the kernel ring has room for. Shorthand for
    /// `submit_n(u32::MAX)`.
    pub fn submit(&mut self) -> Result<u32> {
        self.submit_n(u32::MAX)
    }

    /// Submits up to `n` pending requests, draining from the head of the pending FIFO. See §4.2
    /// for the full three-step algorithm.
    pub fn submit_n(&mut self, n: u32) -> Result<u32> {
        let limit = n.min(self.pending_count);
        let fd = match &self.ring {
            Some(ring) => ring.file.as_raw_fd(),
            None => return Err(Error::Invalid),
        };

        // Step 1: push as many sqes as the ring has room for, up to `limit`.
        let mut count = 0u32;
        let mut cursor = self.pending_head.get();
        while count < limit && !cursor.is_null() {
            let sq = &mut self.ring.as_mut().unwrap().sq;
            if sq.is_full() {
                break;
            }
            // SAFETY: cursor is a request this queue owns (inserted via `insert`'s contract) and
            // has not yet been handed to the kernel.
            let sqe = unsafe { build_sqe(cursor) };
            sq.push(sqe);
            cursor = unsafe { (*cursor).next.get() };
            count += 1;
        }

        if count == 0 {
            if self.use_polling && self.in_flight_count > 0 {
                // Poll mode has no interrupt to rely on; poke the kernel so it can make progress
                // and populate the completion ring even though we submitted nothing new.
                let r = unsafe {
                    sys::io_uring_enter(fd, 0, 0, sys::IORING_ENTER_GETEVENTS, ptr::null(), 0)
                };
                if r < 0 {
                    return Err(Error::from(io::Error::last_os_error()));
                }
            }
            return Ok(0);
        }

        // Step 2: atomically detach the first `count` requests from the pending FIFO.
        let detached_head = self.pending_head.get();
        let mut new_head = detached_head;
        for _ in 0..count {
            new_head = unsafe { (*new_head).next.get() };
        }
        self.pending_head.set(new_head);
        if new_head.is_null() {
            self.pending_tail.set(ptr::null_mut());
        }
        self.pending_count -= count;

        // Step 3: ask the kernel to publish the submissions, retrying on transient busy.
        loop {
            // SAFETY: fd is this queue's live io_uring instance.
            let r = unsafe { sys::io_uring_enter(fd, count, 0, 0, ptr::null(), 0) };
            if r >= 0 {
                break;
            }

            let errno = -io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            if Error::is_transient_submit_busy(errno) {
                continue;
            }

            // Fatal: io_uring_enter itself failed, so the kernel never consumed the sqes step 1
            // already wrote into the SQ ring (their tail is published; `sq.push` doesn't roll
            // back). Those slots now reference Requests we're about to hand back via callback,
            // and a later `submit` on this queue could still make the kernel consume them and
            // write completions for freed memory. Treat a fatal submit error as the queue's end
            // of life: complete the detached burst here and `uninit` the queue instead of
            // continuing to use it.
            let mut node = detached_head;
            while !node.is_null() {
                let next = unsafe { (*node).next.get() };
                unsafe { fire_callback(node, errno) };
                node = next;
            }
            return Err(Error::from_errno(errno));
        }

        self.in_flight_count += count;
        Ok(count)
    }

    /// Cancels every pending (not yet submitted) request: each gets exactly one callback
    /// invocation with an `IO` error, and the pending FIFO is cleared. Returns the number
    /// cancelled. In-flight requests are untouched — the caller must keep draining them.
    pub fn cancel(&mut self) -> u32 {
        let mut node = self.pending_head.get();
        self.pending_head.set(ptr::null_mut());
        self.pending_tail.set(ptr::null_mut());

        let n = self.pending_count;
        self.pending_count = 0;

        while !node.is_null() {
            let next = unsafe { (*node).next.get() };
            unsafe { fire_callback(node, Error::Io.to_errno()) };
            node = next;
        }
        n
    }

    /// Drains completions and dispatches their callbacks. In event mode, reads (and requires) one
    /// readiness notification from the event notifier first; the caller must have observed the
    /// notifier as readable (e.g. via `poll`) before calling this, or the read may block — this
    /// is not enforced by the API (§9).
    pub fn process_responses(&mut self) -> Result<u32> {
        if !self.use_polling {
            let event_fd = self
                .ring
                .as_ref()
                .and_then(|r| r.event_fd)
                .ok_or(Error::Invalid)?;

            let mut buf = [0u8; 8];
            match nix::unistd::read(event_fd, &mut buf) {
                Ok(_) => {}
                Err(nix::Error::Sys(Errno::EAGAIN)) => return Ok(0),
                Err(nix::Error::Sys(errno)) => return Err(Error::from_errno(-(errno as i32))),
                Err(_) => return Err(Error::Io),
            }
            if u64::from_ne_bytes(buf) == 0 {
                return Ok(0);
            }
        }

        let ring = self.ring.as_mut().ok_or(Error::Invalid)?;
        let mut processed = 0u32;
        while let Some(cqe) = ring.cq.pop() {
            // SAFETY: cqe.user_data was set to a Request's address by `build_sqe` and this is
            // the first time this completion is processed (the cq ring yields each slot once).
            let completion = unsafe { read_completion(cqe) };
            unsafe { fire_callback(completion.req, completion.err) };
            self.in_flight_count -= 1;
            processed += 1;
        }
        Ok(processed)
    }

    pub fn get_inflight_count(&self) -> u32 {
        self.in_flight_count
    }

    pub fn get_pending_count(&self) -> u32 {
        self.pending_count
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count == 0 && self.in_flight_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.pending_count + self.in_flight_count >= self.capacity
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn get_event_fd(&self) -> Option<RawFd> {
        self.ring.as_ref().and_then(|r| r.event_fd)
    }

    pub fn polling_enabled(&self) -> bool {
        self.use_polling
    }
}

/// # Safety
/// `req` must be a live `Request` whose callback has not yet fired for this submission.
unsafe fn fire_callback(req: *mut Request, err: i32) {
    let r = &mut *req;
    let user_data = r.user_data;
    if let Some(cb) = r.callback {
        cb(r, err, user_data);
    }
}
