//! The request object: one read/write or vectored read/write, plus its completion callback.

use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::ptr;

/// Which operation a [`Request`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Read,
    Write,
    ReadV,
    WriteV,
}

impl Opcode {
    /// Short name for this opcode, e.g. for logging or `Debug` output.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Read => "read",
            Opcode::Write => "write",
            Opcode::ReadV => "readv",
            Opcode::WriteV => "writev",
        }
    }

    pub(crate) fn is_write(self) -> bool {
        matches!(self, Opcode::Write | Opcode::WriteV)
    }
}

/// Invoked exactly once per request that was accepted by [`crate::Queue::insert`], whether it
/// completed, was rejected by a fatal submit error, or was cancelled.
///
/// `err` follows the library's errno convention: `0` on success, a negative errno otherwise
/// (`-EIO` for short transfers; see [`crate::Error`]).
pub type Callback = fn(req: &mut Request, err: i32, user_data: *mut std::ffi::c_void);

/// One read/write or vectored read/write operation and its completion callback.
///
/// A `Request` does not own the memory its buffer or iovec array point to — the caller must keep
/// that memory valid until the callback fires. See the module-level ownership discussion in
/// [`crate::Queue::insert`].
pub struct Request {
    pub(crate) opcode: Opcode,
    pub(crate) fd: RawFd,
    pub(crate) iovec: libc::iovec,
    pub(crate) offset: u64,
    pub(crate) callback: Option<Callback>,
    pub(crate) user_data: *mut std::ffi::c_void,

    /// Intrusive forward pointer used by the queue's pending FIFO. Never touched by callers.
    pub(crate) next: Cell<*mut Request>,
}

impl Request {
    /// An unconfigured request. Must be prepared with [`prep_rw`](Request::prep_rw) (for `Read`/
    /// `Write`) or by setting `opcode`/`fd`/`iovec`/`offset` directly (for `ReadV`/`WriteV`, via
    /// [`Request::prep_rv`]) before it is inserted into a queue.
    pub fn new() -> Self {
        Request {
            opcode: Opcode::Read,
            fd: -1,
            iovec: libc::iovec {
                iov_base: ptr::null_mut(),
                iov_len: 0,
            },
            offset: 0,
            callback: None,
            user_data: ptr::null_mut(),
            next: Cell::new(ptr::null_mut()),
        }
    }

    /// Configures a non-vectored `Read` or `Write` request against `fd`, transferring `len` bytes
    /// at `addr` starting at `offset`.
    ///
    /// # Safety
    /// `addr` must be valid for `len` bytes of reading (`Write`) or writing (`Read`) from the
    /// moment the request is inserted into a queue until its callback runs.
    pub unsafe fn prep_rw(
        &mut self,
        opcode: Opcode,
        fd: RawFd,
        addr: *mut u8,
        len: usize,
        offset: u64,
    ) {
        debug_assert!(matches!(opcode, Opcode::Read | Opcode::Write));
        self.opcode = opcode;
        self.fd = fd;
        self.iovec = libc::iovec {
            iov_base: addr as *mut std::ffi::c_void,
            iov_len: len,
        };
        self.offset = offset;
    }

    /// Configures a vectored `ReadV` or `WriteV` request against `fd`, using `iov_count` entries
    /// of `iov` starting at `offset`.
    ///
    /// # Safety
    /// `iov` must point to `iov_count` valid, non-zero-length [`libc::iovec`]s, each describing
    /// memory valid for the duration of the request, exactly as for `readv(2)`/`writev(2)`.
    pub unsafe fn prep_rv(
        &mut self,
        opcode: Opcode,
        fd: RawFd,
        iov: *mut libc::iovec,
        iov_count: usize,
        offset: u64,
    ) {
        debug_assert!(matches!(opcode, Opcode::ReadV | Opcode::WriteV));
        self.opcode = opcode;
        self.fd = fd;
        self.iovec = libc::iovec {
            iov_base: iov as *mut std::ffi::c_void,
            iov_len: iov_count,
        };
        self.offset = offset;
    }

    pub fn set_callback(&mut self, cb: Callback) {
        self.callback = Some(cb);
    }

    pub fn set_user_data(&mut self, p: *mut std::ffi::c_void) {
        self.user_data = p;
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The iovec base address. Valid for any of the four opcodes: for `Read`/`Write` it is the
    /// buffer address; for `ReadV`/`WriteV` it is the address of the iovec array.
    pub fn get_address(&self) -> *mut u8 {
        self.iovec.iov_base as *mut u8
    }

    pub fn get_offset(&self) -> u64 {
        self.offset
    }

    /// For `Read`/`Write`, the embedded length. For `ReadV`/`WriteV`, the sum of `iov_len` over
    /// the referenced iovec array. Panics (debug) or returns an inflated 0-inclusive sum
    /// (release) if an iovec in the array has a zero length, per the invariant in §4.1.
    pub fn get_size(&self) -> usize {
        match self.opcode {
            Opcode::Read | Opcode::Write => self.iovec.iov_len,
            Opcode::ReadV | Opcode::WriteV => {
                let iov = self.iovec.iov_base as *const libc::iovec;
                let count = self.iovec.iov_len;
                // SAFETY: prep_rv requires `iov` to point to `count` valid iovecs for the life
                // of the request; get_size is only ever called while that contract holds.
                (0..count)
                    .map(|i| {
                        let entry = unsafe { &*iov.add(i) };
                        debug_assert_ne!(entry.iov_len, 0, "zero-length iovec element");
                        entry.iov_len
                    })
                    .sum()
            }
        }
    }
}

impl Default for Request {
    fn default() -> Self {
        Request::new()
    }
}
