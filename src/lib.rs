//! A small single-threaded asynchronous block-I/O library for Linux, built directly on
//! `io_uring`.
//!
//! The public surface is [`Queue`] and [`Request`]: prepare a `Request` with a read, write,
//! readv, or writev, [`Queue::insert`] it, [`Queue::submit`] to hand work to the kernel, and
//! [`Queue::process_responses`] to run completion callbacks. See each type's docs for the full
//! lifecycle and the ownership contract between caller and queue.
//!
//! This crate speaks directly to the three `io_uring` syscalls (no `io-uring` dependency, no
//! bindgen step) and supports exactly two notification modes: an eventfd-backed readiness
//! notifier, or kernel-side I/O polling (`IORING_SETUP_IOPOLL`). It does not implement fixed
//! files/buffers, `SQPOLL`, linked SQEs, timeouts, or network opcodes — see SPEC_FULL.md for the
//! full list of what this crate intentionally leaves out.

mod cqueue;
mod mmap;
mod opcode;
mod squeue;
mod sys;

pub mod error;
pub mod queue;
pub mod request;

pub use error::{Error, Result};
pub use queue::{Builder, Parameters, Queue};
pub use request::{Callback, Opcode, Request};
