use std::ffi::c_void;
use std::io::Write;
use std::os::unix::io::AsRawFd;

use tempfile::tempfile;

use ring_queue::{Opcode, Queue, Request};

/// Skips the test (rather than failing it) if the host kernel doesn't support the requested
/// queue configuration at all, e.g. a pre-5.1 kernel with no `io_uring_setup`.
macro_rules! require_queue {
    ($capacity:expr, $use_polling:expr) => {
        match Queue::new($capacity, $use_polling) {
            Ok(queue) => queue,
            Err(e) => {
                eprintln!("skipping: io_uring unavailable on this kernel ({e})");
                return Ok(());
            }
        }
    };
}

#[derive(Default)]
struct Outcome {
    err: i32,
    fired: bool,
}

fn record(_req: &mut Request, err: i32, user_data: *mut c_void) {
    // SAFETY: tests below only ever pass a live `&mut Outcome` as user_data, and each request
    // fires its callback exactly once.
    let outcome = unsafe { &mut *(user_data as *mut Outcome) };
    outcome.err = err;
    outcome.fired = true;
}

#[test]
fn empty_submit_is_a_no_op() -> anyhow::Result<()> {
    let mut queue = require_queue!(4, false);
    assert_eq!(queue.submit()?, 0);
    assert!(queue.is_empty());
    Ok(())
}

#[test]
fn zero_capacity_is_rejected() {
    assert!(Queue::new(0, false).is_err());
}

#[test]
fn single_read_round_trip() -> anyhow::Result<()> {
    let text = b"hello io_uring";

    let mut file = tempfile()?;
    file.write_all(text)?;
    file.flush()?;

    let mut queue = require_queue!(1, false);

    let mut buf = vec![0u8; text.len()];
    let mut req = Request::new();
    let mut outcome = Outcome::default();
    unsafe {
        req.prep_rw(Opcode::Read, file.as_raw_fd(), buf.as_mut_ptr(), buf.len(), 0);
    }
    req.set_callback(record);
    req.set_user_data(&mut outcome as *mut Outcome as *mut c_void);

    unsafe {
        queue.insert(&mut req as *mut Request);
    }
    assert_eq!(queue.submit()?, 1);
    assert_eq!(queue.get_inflight_count(), 1);

    queue.process_responses()?;

    assert!(outcome.fired);
    assert_eq!(outcome.err, 0);
    assert_eq!(&buf, text);
    assert!(queue.is_empty());

    Ok(())
}

#[test]
fn copy_one_hundred_kib() -> anyhow::Result<()> {
    const LEN: usize = 100 * 1024;
    let data: Vec<u8> = (0..LEN).map(|i| (i % 251) as u8).collect();

    let mut src = tempfile()?;
    src.write_all(&data)?;
    src.flush()?;
    let dst = tempfile()?;

    let mut queue = require_queue!(2, false);

    let mut read_buf = vec![0u8; LEN];
    let mut read_req = Request::new();
    let mut read_outcome = Outcome::default();
    unsafe {
        read_req.prep_rw(Opcode::Read, src.as_raw_fd(), read_buf.as_mut_ptr(), LEN, 0);
    }
    read_req.set_callback(record);
    read_req.set_user_data(&mut read_outcome as *mut Outcome as *mut c_void);
    unsafe {
        queue.insert(&mut read_req as *mut Request);
    }
    queue.submit()?;
    queue.process_responses()?;
    assert_eq!(read_outcome.err, 0);
    assert_eq!(read_buf, data);

    let mut write_req = Request::new();
    let mut write_outcome = Outcome::default();
    unsafe {
        write_req.prep_rw(Opcode::Write, dst.as_raw_fd(), read_buf.as_mut_ptr(), LEN, 0);
    }
    write_req.set_callback(record);
    write_req.set_user_data(&mut write_outcome as *mut Outcome as *mut c_void);
    unsafe {
        queue.insert(&mut write_req as *mut Request);
    }
    queue.submit()?;
    queue.process_responses()?;
    assert_eq!(write_outcome.err, 0);

    Ok(())
}

#[test]
fn capacity_bound_is_enforced_by_the_caller() -> anyhow::Result<()> {
    let mut file = tempfile()?;
    file.write_all(&[0u8; 16])?;
    file.flush()?;

    let mut queue = require_queue!(2, false);

    let mut bufs = [[0u8; 4], [0u8; 4]];
    let mut reqs = [Request::new(), Request::new()];
    let mut outcomes = [Outcome::default(), Outcome::default()];

    for i in 0..2 {
        unsafe {
            reqs[i].prep_rw(Opcode::Read, file.as_raw_fd(), bufs[i].as_mut_ptr(), 4, 0);
        }
        reqs[i].set_callback(record);
        reqs[i].set_user_data(&mut outcomes[i] as *mut Outcome as *mut c_void);
    }

    unsafe {
        queue.insert(&mut reqs[0] as *mut Request);
    }
    assert!(!queue.is_full());
    unsafe {
        queue.insert(&mut reqs[1] as *mut Request);
    }
    assert!(queue.is_full());
    assert_eq!(queue.get_pending_count(), 2);

    assert_eq!(queue.submit()?, 2);
    assert_eq!(queue.get_pending_count(), 0);
    assert_eq!(queue.get_inflight_count(), 2);

    while queue.get_inflight_count() > 0 {
        queue.process_responses()?;
    }
    assert!(outcomes.iter().all(|o| o.fired && o.err == 0));
    assert!(queue.is_empty());

    Ok(())
}

#[test]
fn cancel_runs_pending_callbacks_without_touching_the_kernel() -> anyhow::Result<()> {
    let file = tempfile()?;

    let mut queue = require_queue!(2, false);

    let mut buf = [0u8; 4];
    let mut req = Request::new();
    let mut outcome = Outcome::default();
    unsafe {
        req.prep_rw(Opcode::Read, file.as_raw_fd(), buf.as_mut_ptr(), 4, 0);
    }
    req.set_callback(record);
    req.set_user_data(&mut outcome as *mut Outcome as *mut c_void);
    unsafe {
        queue.insert(&mut req as *mut Request);
    }

    assert_eq!(queue.cancel(), 1);
    assert!(outcome.fired);
    assert_ne!(outcome.err, 0);
    assert!(queue.is_empty());

    Ok(())
}

// IOPOLL requires the target fd to be backed by a driver that supports polled completion
// (e.g. an NVMe device opened O_DIRECT); a tmpfs-backed tempfile will fail submission with
// EINVAL. Run manually against a real block device.
#[ignore]
#[test]
fn iopoll_mode_makes_progress_without_an_event_fd() -> anyhow::Result<()> {
    let mut file = tempfile()?;
    file.write_all(b"iopoll")?;
    file.flush()?;

    let mut queue = require_queue!(1, true);
    assert!(queue.get_event_fd().is_none());
    assert!(queue.polling_enabled());

    let mut buf = [0u8; 6];
    let mut req = Request::new();
    let mut outcome = Outcome::default();
    unsafe {
        req.prep_rw(Opcode::Read, file.as_raw_fd(), buf.as_mut_ptr(), 6, 0);
    }
    req.set_callback(record);
    req.set_user_data(&mut outcome as *mut Outcome as *mut c_void);
    unsafe {
        queue.insert(&mut req as *mut Request);
    }
    queue.submit()?;

    // In IOPOLL mode nothing drives completions but repeated `submit` calls (an empty pending
    // list still triggers the GETEVENTS poke in `submit_n`) — `process_responses` alone never
    // reaps anything here.
    while !outcome.fired {
        queue.submit()?;
        queue.process_responses()?;
    }
    assert_eq!(outcome.err, 0);
    assert_eq!(&buf, b"iopoll");

    Ok(())
}
