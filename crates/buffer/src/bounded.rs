//! The reference [`Buffer`] implementation: a FIFO queue of fixed capacity
//! gated by a semaphore whose permits are reclaimed only on checkpoint.

use std::{
    sync::atomic::Ordering,
    time::Duration,
};

use async_trait::async_trait;
use model::{CheckpointState, Record};
use tokio::time::{sleep_until, timeout_at};

use crate::{Buffer, Error, Inner};

/// A bounded, blocking, FIFO buffer.
///
/// Capacity is enforced with a [`tokio::sync::Semaphore`] of `capacity`
/// permits. `write`/`write_all` acquire permits and **forget** them (they are
/// not returned when the guard drops); the only way permits come back is an
/// explicit `checkpoint` call adding them back. This is what makes capacity
/// track "acquired minus checkpointed" rather than "acquired minus read":
/// a record that has been read but not yet checkpointed still counts against
/// capacity, keeping the source under backpressure until the sink confirms.
pub struct BoundedBlockingBuffer<T> {
    inner: Inner<T>,
}

impl<T: Send + 'static> BoundedBlockingBuffer<T> {
    /// Creates a new bounded blocking buffer.
    ///
    /// `name` is used only for diagnostics (log fields, error messages).
    pub fn new(name: impl Into<String>, capacity: usize, batch_size: usize) -> Self {
        Self {
            inner: Inner::new(name, capacity, batch_size.max(1)),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Buffer<T> for BoundedBlockingBuffer<T> {
    async fn write(&self, record: Record<T>, timeout: Duration) -> Result<(), Error> {
        let deadline = Inner::<T>::deadline(timeout);

        let permit = timeout_at(deadline, self.inner.permits.acquire())
            .await
            .map_err(|_| Error::Timeout {
                buffer: self.inner.name.clone(),
                waited: timeout,
            })?
            .expect("buffer semaphore is never closed");
        permit.forget();

        self.inner.queue.lock().await.push_back(record);
        self.inner.not_empty.notify_one();

        Ok(())
    }

    async fn write_all(&self, records: Vec<Record<T>>, timeout: Duration) -> Result<(), Error> {
        let count = records.len();
        if count > self.inner.capacity {
            return Err(Error::SizeOverflow {
                buffer: self.inner.name.clone(),
                attempted: count,
                capacity: self.inner.capacity,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let deadline = Inner::<T>::deadline(timeout);
        let n = u32::try_from(count).expect("write_all batch larger than u32::MAX");

        let permits = timeout_at(deadline, self.inner.permits.acquire_many(n))
            .await
            .map_err(|_| Error::Timeout {
                buffer: self.inner.name.clone(),
                waited: timeout,
            })?
            .expect("buffer semaphore is never closed");
        permits.forget();

        let mut queue = self.inner.queue.lock().await;
        queue.extend(records);
        drop(queue);
        self.inner.not_empty.notify_one();

        Ok(())
    }

    async fn read(&self, timeout: Duration) -> (Vec<Record<T>>, CheckpointState) {
        let deadline = Inner::<T>::deadline(timeout);
        let mut batch = Vec::with_capacity(self.inner.batch_size);

        // One blocking poll for the first record: register the notification
        // before inspecting the queue so a write landing between the check
        // and the wait is never missed.
        loop {
            let notified = self.inner.not_empty.notified();

            {
                let mut queue = self.inner.queue.lock().await;
                if let Some(record) = queue.pop_front() {
                    batch.push(record);
                    break;
                }
            }

            tokio::select! {
                _ = notified => continue,
                _ = sleep_until(deadline) => {
                    return (batch, CheckpointState::empty());
                }
            }
        }

        // Non-blockingly drain up to batch_size - 1 more records while the
        // deadline has not elapsed.
        while batch.len() < self.inner.batch_size && tokio::time::Instant::now() < deadline {
            let mut queue = self.inner.queue.lock().await;
            match queue.pop_front() {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        self.inner.in_flight.fetch_add(batch.len(), Ordering::SeqCst);
        let state = CheckpointState::new(batch.len());
        (batch, state)
    }

    async fn checkpoint(&self, state: CheckpointState) {
        if state.is_empty() {
            return;
        }

        self.inner.in_flight.fetch_sub(state.record_count(), Ordering::SeqCst);
        self.inner.permits.add_permits(state.record_count());
    }

    async fn is_empty(&self) -> bool {
        self.inner.queue.lock().await.is_empty() && self.inner.in_flight.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use model::Record;

    use super::*;

    fn buf(capacity: usize, batch_size: usize) -> BoundedBlockingBuffer<u32> {
        BoundedBlockingBuffer::new("test", capacity, batch_size)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let buffer = buf(4, 2);
        for i in 0..4u32 {
            buffer.write(Record::new(i), Duration::from_millis(50)).await.unwrap();
        }

        let (batch, state) = buffer.read(Duration::from_millis(50)).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(state.record_count(), 2);
        assert!(!buffer.is_empty().await);

        buffer.checkpoint(state).await;

        let (batch2, state2) = buffer.read(Duration::from_millis(50)).await;
        assert_eq!(batch2.len(), 2);
        buffer.checkpoint(state2).await;
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn write_all_overflow_is_rejected_without_mutating_state() {
        let buffer = buf(2, 2);
        let records = vec![Record::new(1u32), Record::new(2), Record::new(3)];
        let err = buffer.write_all(records, Duration::from_millis(10)).await;
        assert!(matches!(err, Err(Error::SizeOverflow { .. })));
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn write_into_full_buffer_times_out() {
        let buffer = buf(1, 1);
        buffer.write(Record::new(1u32), Duration::from_millis(10)).await.unwrap();

        let start = tokio::time::Instant::now();
        let err = buffer.write(Record::new(2u32), Duration::ZERO).await;
        assert!(matches!(err, Err(Error::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn read_on_empty_buffer_times_out_near_deadline() {
        let buffer = buf(4, 2);
        let start = tokio::time::Instant::now();
        let (batch, state) = buffer.read(Duration::from_millis(30)).await;
        assert!(batch.is_empty());
        assert!(state.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn checkpoint_releases_capacity_not_read() {
        let buffer = buf(2, 2);
        buffer.write(Record::new(1u32), Duration::from_millis(10)).await.unwrap();
        buffer.write(Record::new(2u32), Duration::from_millis(10)).await.unwrap();

        let (batch, state) = buffer.read(Duration::from_millis(10)).await;
        assert_eq!(batch.len(), 2);

        // Buffer is full (2 in flight, 0 queued) even though the queue is
        // drained -- writing before checkpoint must time out.
        let err = buffer.write(Record::new(3u32), Duration::from_millis(10)).await;
        assert!(matches!(err, Err(Error::Timeout { .. })));

        buffer.checkpoint(state).await;
        buffer.write(Record::new(3u32), Duration::from_millis(10)).await.unwrap();
    }
}
