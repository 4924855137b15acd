//! Thin wrapper around `mmap(2)`/`munmap(2)` for the two ring regions and the SQE array.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;

pub(crate) struct Mmap {
    addr: NonNull<libc::c_void>,
    len: usize,
}

impl Mmap {
    pub(crate) fn new(fd: RawFd, offset: libc::off_t, len: usize) -> io::Result<Mmap> {
        // SAFETY: fd is a valid io_uring instance fd and len/offset describe one of its
        // documented ring regions; the return value is checked below.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                offset,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: mmap only returns null on failure, which is handled above.
        let addr = unsafe { NonNull::new_unchecked(addr) };
        Ok(Mmap { addr, len })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut libc::c_void {
        self.addr.as_ptr()
    }

    /// # Safety
    /// `offset` must fall within the mapped region.
    #[inline]
    pub(crate) unsafe fn offset(&self, offset: u32) -> *mut libc::c_void {
        self.as_ptr().add(offset as usize)
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        // SAFETY: addr/len were produced together by a successful mmap above.
        unsafe {
            libc::munmap(self.addr.as_ptr(), self.len);
        }
    }
}
