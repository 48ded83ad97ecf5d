#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The [`Buffer`] contract and its reference implementation,
//! [`BoundedBlockingBuffer`]: an in-memory bounded queue sitting between a
//! pipeline's source and its processor workers, with timed writes, batched
//! reads, and explicit checkpointing so that capacity is only released once
//! a batch has been fully processed (at-least-once).

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use model::{CheckpointState, Record};
use tokio::{
    sync::{Mutex, Notify, Semaphore},
    time::Instant,
};

pub mod bounded;

pub use bounded::BoundedBlockingBuffer;

/// All the errors a buffer implementation can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A bounded wait (write or write_all) elapsed before a slot opened up.
    #[error("buffer write timed out (buffer: {buffer}, waited: {waited:?})")]
    Timeout {
        /// The name of the buffer.
        buffer: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// A bulk write exceeded the buffer's total capacity; the buffer state
    /// is left unchanged.
    #[error("write_all of {attempted} records exceeds buffer capacity {capacity} (buffer: {buffer})")]
    SizeOverflow {
        /// The name of the buffer.
        buffer: String,
        /// The number of records the caller attempted to write.
        attempted: usize,
        /// The buffer's total capacity.
        capacity: usize,
    },
}

/// A bounded, in-memory, FIFO queue of [`Record<T>`] values.
///
/// Implementations must uphold: `write`/`write_all` block (up to a timeout)
/// until capacity is available; `read` never blocks longer than its timeout
/// plus a small slack; `checkpoint` is the only operation that releases
/// capacity acquired by a write; `is_empty` is true only when the queue is
/// empty and there is no outstanding un-checkpointed in-flight batch.
#[async_trait]
pub trait Buffer<T: Send + 'static>: Send + Sync {
    /// Enqueues one record, failing with [`Error::Timeout`] if no slot opens
    /// up within `timeout`.
    async fn write(&self, record: Record<T>, timeout: Duration) -> Result<(), Error>;

    /// Atomically enqueues a batch of records. Either all of `records` become
    /// visible to readers, or (on timeout) none do.
    async fn write_all(&self, records: Vec<Record<T>>, timeout: Duration) -> Result<(), Error>;

    /// Returns up to the buffer's configured batch size worth of records,
    /// plus the [`CheckpointState`] identifying that batch. May return a
    /// short (including empty) batch if `timeout` elapses first.
    async fn read(&self, timeout: Duration) -> (Vec<Record<T>>, CheckpointState);

    /// Acknowledges a batch previously returned by `read`, releasing the
    /// capacity it held.
    async fn checkpoint(&self, state: CheckpointState);

    /// True only when the queue holds no records and no un-checkpointed
    /// batch is outstanding.
    async fn is_empty(&self) -> bool;
}

/// Shared building blocks for a semaphore-gated bounded queue. Kept private
/// to this crate; [`bounded::BoundedBlockingBuffer`] is the public type that
/// wires these together per the buffer contract.
pub(crate) struct Inner<T> {
    pub(crate) name: String,
    pub(crate) capacity: usize,
    pub(crate) batch_size: usize,
    pub(crate) queue: Mutex<VecDeque<Record<T>>>,
    pub(crate) permits: Semaphore,
    pub(crate) not_empty: Notify,
    pub(crate) in_flight: std::sync::atomic::AtomicUsize,
}

impl<T> Inner<T> {
    pub(crate) fn new(name: impl Into<String>, capacity: usize, batch_size: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            batch_size,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            permits: Semaphore::new(capacity),
            not_empty: Notify::new(),
            in_flight: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Computes the monotonic deadline for a bounded wait once, up front,
    /// rather than re-arming the full timeout on every retry.
    pub(crate) fn deadline(timeout: Duration) -> Instant {
        Instant::now() + timeout
    }
}
