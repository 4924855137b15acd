//! Error taxonomy (§7). Every fallible queue operation returns a non-negative value on success or
//! a negative errno on failure; [`Error`] is the richer side of that same convention — use
//! [`Error::to_errno`] to get the wire value back, or [`Error::from_errno`] to go the other way.

use std::fmt;

/// `-EIO`, the wire value [`crate::queue::Queue::process_responses`] reports for a short
/// transfer (see the ring bridge's `read_completion`).
pub(crate) const IO_ERRNO: i32 = -libc::EIO;

/// An error from this crate, or a kernel errno passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A configuration error, e.g. zero capacity passed to [`crate::Queue::init`].
    Invalid,
    /// An allocation failed during `init` or request setup.
    ResourceExhausted,
    /// A short transfer, or a completion the kernel didn't attach a specific errno to.
    Io,
    /// Any other kernel errno from submission or completion.
    Errno(i32),
}

impl Error {
    /// The negative-errno wire value this error corresponds to, per the library-wide convention.
    pub fn to_errno(self) -> i32 {
        match self {
            Error::Invalid => -libc::EINVAL,
            Error::ResourceExhausted => -libc::ENOMEM,
            Error::Io => IO_ERRNO,
            Error::Errno(e) => e,
        }
    }

    /// Classifies a negative-errno wire value back into an [`Error`].
    pub fn from_errno(errno: i32) -> Error {
        debug_assert!(errno < 0, "from_errno expects a negative errno, got {errno}");
        match -errno {
            libc::EINVAL => Error::Invalid,
            libc::ENOMEM => Error::ResourceExhausted,
            libc::EIO => Error::Io,
            _ => Error::Errno(errno),
        }
    }

    /// Whether `io_uring_enter` should be retried rather than treated as fatal (§4.2 step 2).
    pub(crate) fn is_transient_submit_busy(errno: i32) -> bool {
        errno == -libc::EAGAIN || errno == -libc::EBUSY || errno == -libc::EINTR
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Invalid => f.write_str("invalid queue configuration"),
            Error::ResourceExhausted => f.write_str("resource exhausted during setup"),
            Error::Io => f.write_str("short transfer or unspecified I/O error"),
            Error::Errno(e) => write!(f, "errno {}", -e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        match e.raw_os_error() {
            Some(errno) => Error::from_errno(-errno),
            None => Error::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
