use std::ffi::c_void;
use std::os::unix::io::AsRawFd;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ring_queue::{Opcode, Queue, Request};
use tempfile::tempfile;

fn noop_callback(_req: &mut Request, _err: i32, _user_data: *mut c_void) {}

fn bench_round_trip(c: &mut Criterion) {
    const BATCH: usize = 128;

    let mut queue = Queue::new(BATCH as u32, false).expect("io_uring unavailable");
    let file = tempfile().unwrap();
    let mut buf = [0u8; 4];

    let mut reqs: Vec<Request> = (0..BATCH).map(|_| Request::new()).collect();
    for req in &mut reqs {
        unsafe {
            req.prep_rw(Opcode::Read, file.as_raw_fd(), buf.as_mut_ptr(), buf.len(), 0);
        }
        req.set_callback(noop_callback);
    }

    c.bench_function("submit_and_drain_128", |b| {
        b.iter(|| {
            for req in &mut reqs {
                unsafe {
                    queue.insert(black_box(req as *mut Request));
                }
            }
            queue.submit().unwrap();
            while queue.get_inflight_count() > 0 {
                queue.process_responses().unwrap();
            }
        });
    });
}

criterion_group!(submit, bench_round_trip);
criterion_main!(submit);
