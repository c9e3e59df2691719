//! Bounded FIFO of application buffers feeding a media object
//!
//! The application enqueues buffers; the renderer drains bytes from the front
//! buffer, possibly in several partial reads. A fully drained buffer is
//! retired and reported through the callback.
//!
//! The queue lives in an interface slot and is guarded by its object's lock.
//! Mutating methods return the notifications they produced so the interface
//! layer can deliver them once the lock is released.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::constants::MAX_QUEUED_BUFFERS;
use crate::error::{SlError, SlResult};
use crate::object::instance::{Interface, InterfaceSlot};
use crate::object::interface::InterfaceId;

/// Buffer queue notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BufferQueueEvent {
    /// The queue went from empty to non-empty
    Filled,
    /// One buffer was fully consumed and retired
    BufferCompleted,
    /// Consumption emptied the queue
    Emptied,
    /// `clear` emptied the queue
    Cleared,
}

/// Snapshot taken under the object lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferQueueState {
    /// Buffers currently queued
    pub count: usize,
    /// Buffers retired since creation or the last clear
    pub play_index: u64,
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferQueueStats {
    pub enqueued: u64,
    /// Enqueues refused because the queue was full
    pub rejected: u64,
    pub retired: u64,
}

pub type BufferQueueCallback = Arc<dyn Fn(BufferQueueEvent, BufferQueueState) + Send + Sync>;

type Notices = Vec<(BufferQueueEvent, BufferQueueState)>;

/// Ring of buffer descriptors with one spare entry to tell full from empty
pub struct BufferQueue {
    ring: Vec<Option<Bytes>>,
    front: usize,
    rear: usize,
    /// Bytes of the front buffer already consumed
    consumed: usize,
    play_index: u64,
    callback: Option<BufferQueueCallback>,
    stats: BufferQueueStats,
}

impl fmt::Debug for BufferQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferQueue")
            .field("capacity", &self.capacity())
            .field("state", &self.state())
            .field("consumed", &self.consumed)
            .field("stats", &self.stats)
            .finish()
    }
}

impl BufferQueue {
    /// `capacity` is clamped to `1..=MAX_QUEUED_BUFFERS`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_QUEUED_BUFFERS);
        Self {
            ring: vec![None; capacity + 1],
            front: 0,
            rear: 0,
            consumed: 0,
            play_index: 0,
            callback: None,
            stats: BufferQueueStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len() - 1
    }

    pub fn len(&self) -> usize {
        (self.rear + self.ring.len() - self.front) % self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.front == self.rear
    }

    pub fn is_full(&self) -> bool {
        self.advance(self.rear) == self.front
    }

    pub fn state(&self) -> BufferQueueState {
        BufferQueueState {
            count: self.len(),
            play_index: self.play_index,
        }
    }

    pub fn stats(&self) -> BufferQueueStats {
        self.stats
    }

    /// Bytes of the front buffer already consumed
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    fn advance(&self, cursor: usize) -> usize {
        (cursor + 1) % self.ring.len()
    }

    /// Append a buffer. A full queue is left untouched.
    pub fn enqueue(&mut self, data: Bytes) -> SlResult<Notices> {
        if data.is_empty() {
            return Err(SlError::ParameterInvalid);
        }
        if self.is_full() {
            self.stats.rejected += 1;
            return Err(SlError::BufferInsufficient);
        }

        let was_empty = self.is_empty();
        self.ring[self.rear] = Some(data);
        self.rear = self.advance(self.rear);
        self.stats.enqueued += 1;

        let mut notices = Notices::new();
        if was_empty {
            notices.push((BufferQueueEvent::Filled, self.state()));
        }
        Ok(notices)
    }

    /// Drop every queued buffer and restart the play index. The cumulative
    /// `retired` counter in the stats is kept.
    pub fn clear(&mut self) -> Notices {
        let was_empty = self.is_empty();
        for entry in self.ring.iter_mut() {
            *entry = None;
        }
        self.front = 0;
        self.rear = 0;
        self.consumed = 0;
        self.play_index = 0;
        if was_empty {
            return Notices::new();
        }
        vec![(BufferQueueEvent::Cleared, self.state())]
    }

    /// Take up to `max` bytes from the front buffer, retiring it when drained
    pub fn consume(&mut self, max: usize) -> (Option<Bytes>, Notices) {
        let mut notices = Notices::new();
        if max == 0 {
            return (None, notices);
        }
        let Some(front) = self.ring[self.front].as_ref() else {
            return (None, notices);
        };

        let available = front.len() - self.consumed;
        let take = available.min(max);
        let chunk = front.slice(self.consumed..self.consumed + take);
        self.consumed += take;

        if take == available {
            self.ring[self.front] = None;
            self.front = self.advance(self.front);
            self.consumed = 0;
            self.play_index += 1;
            self.stats.retired += 1;
            notices.push((BufferQueueEvent::BufferCompleted, self.state()));
            if self.is_empty() {
                notices.push((BufferQueueEvent::Emptied, self.state()));
            }
        }
        (Some(chunk), notices)
    }

    /// Copy queued bytes into `dest` across buffer boundaries
    pub fn fill(&mut self, dest: &mut [u8]) -> (usize, Notices) {
        let mut written = 0;
        let mut notices = Notices::new();
        while written < dest.len() {
            let (chunk, mut more) = self.consume(dest.len() - written);
            notices.append(&mut more);
            let Some(chunk) = chunk else {
                break;
            };
            dest[written..written + chunk.len()].copy_from_slice(&chunk);
            written += chunk.len();
        }
        (written, notices)
    }
}

fn deliver(callback: Option<BufferQueueCallback>, notices: Notices) {
    if let Some(callback) = callback {
        for (event, state) in notices {
            callback(event, state);
        }
    }
}

/// Typed view of the `BufferQueue` interface
#[derive(Clone)]
pub struct BufferQueueItf {
    itf: Interface,
}

impl fmt::Debug for BufferQueueItf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BufferQueueItf").field(&self.itf).finish()
    }
}

impl Interface {
    pub fn as_buffer_queue(&self) -> SlResult<BufferQueueItf> {
        self.expect_id(InterfaceId::BufferQueue)?;
        Ok(BufferQueueItf { itf: self.clone() })
    }
}

impl BufferQueueItf {
    /// Run `f` on the queue under the object lock; also hands back the
    /// callback to notify after unlocking
    fn with_queue<R>(
        &self,
        f: impl FnOnce(&mut BufferQueue) -> R,
    ) -> SlResult<(R, Option<BufferQueueCallback>)> {
        self.itf
            .object()
            .with_slot(self.itf.index(), |slot| match slot {
                InterfaceSlot::BufferQueue(queue) => {
                    let result = f(queue);
                    Ok((result, queue.callback.clone()))
                }
                _ => Err(SlError::Internal),
            })?
    }

    pub fn enqueue(&self, data: impl Into<Bytes>) -> SlResult<()> {
        let data = data.into();
        let (result, callback) = self.with_queue(|queue| queue.enqueue(data))?;
        deliver(callback, result?);
        Ok(())
    }

    pub fn clear(&self) -> SlResult<()> {
        let (notices, callback) = self.with_queue(BufferQueue::clear)?;
        deliver(callback, notices);
        Ok(())
    }

    pub fn state(&self) -> SlResult<BufferQueueState> {
        Ok(self.with_queue(|queue| queue.state())?.0)
    }

    pub fn stats(&self) -> SlResult<BufferQueueStats> {
        Ok(self.with_queue(|queue| queue.stats())?.0)
    }

    pub fn capacity(&self) -> SlResult<usize> {
        Ok(self.with_queue(|queue| queue.capacity())?.0)
    }

    pub fn register_callback(&self, callback: Option<BufferQueueCallback>) -> SlResult<()> {
        self.with_queue(|queue| queue.callback = callback)?;
        Ok(())
    }

    /// Renderer side: take up to `max` bytes from the front buffer
    pub fn consume(&self, max: usize) -> SlResult<Option<Bytes>> {
        let ((chunk, notices), callback) = self.with_queue(|queue| queue.consume(max))?;
        deliver(callback, notices);
        Ok(chunk)
    }

    /// Renderer side: fill `dest` from queued buffers, returning bytes copied
    pub fn fill(&self, dest: &mut [u8]) -> SlResult<usize> {
        let ((written, notices), callback) = self.with_queue(|queue| queue.fill(dest))?;
        deliver(callback, notices);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::object::lifecycle::Mode;
    use crate::testing;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn events(notices: &Notices) -> Vec<BufferQueueEvent> {
        notices.iter().map(|(event, _)| *event).collect()
    }

    #[test]
    fn test_full_queue_unchanged() {
        let mut queue = BufferQueue::new(2);
        queue.enqueue(Bytes::from_static(b"ab")).unwrap();
        queue.enqueue(Bytes::from_static(b"cd")).unwrap();
        let before = queue.state();
        assert_eq!(
            queue.enqueue(Bytes::from_static(b"ef")),
            Err(SlError::BufferInsufficient)
        );
        assert_eq!(queue.state(), before);
        assert_eq!(queue.stats().rejected, 1);
        assert_eq!(queue.enqueue(Bytes::new()), Err(SlError::ParameterInvalid));
    }

    #[test]
    fn test_filled_fires_once_per_crossing() {
        let mut queue = BufferQueue::new(4);
        let first = queue.enqueue(Bytes::from_static(b"1")).unwrap();
        let second = queue.enqueue(Bytes::from_static(b"2")).unwrap();
        assert_eq!(events(&first), vec![BufferQueueEvent::Filled]);
        assert_eq!(first[0].1.count, 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_partial_consumption() {
        let mut queue = BufferQueue::new(4);
        queue.enqueue(Bytes::from_static(b"hello")).unwrap();

        let (chunk, notices) = queue.consume(3);
        assert_eq!(chunk.unwrap(), Bytes::from_static(b"hel"));
        assert!(notices.is_empty());
        assert_eq!(queue.consumed(), 3);

        let (chunk, notices) = queue.consume(16);
        assert_eq!(chunk.unwrap(), Bytes::from_static(b"lo"));
        assert_eq!(
            events(&notices),
            vec![BufferQueueEvent::BufferCompleted, BufferQueueEvent::Emptied]
        );
        assert_eq!(queue.consumed(), 0);
        assert_eq!(queue.state(), BufferQueueState { count: 0, play_index: 1 });

        let (chunk, notices) = queue.consume(16);
        assert!(chunk.is_none());
        assert!(notices.is_empty());
    }

    #[test]
    fn test_draining_all_buffers() {
        let mut queue = BufferQueue::new(3);
        for data in [&b"aa"[..], b"bbb", b"c"] {
            queue.enqueue(Bytes::copy_from_slice(data)).unwrap();
        }
        let mut dest = [0u8; 8];
        let (written, notices) = queue.fill(&mut dest);
        assert_eq!(written, 6);
        assert_eq!(&dest[..6], b"aabbbc");
        assert_eq!(
            events(&notices),
            vec![
                BufferQueueEvent::BufferCompleted,
                BufferQueueEvent::BufferCompleted,
                BufferQueueEvent::BufferCompleted,
                BufferQueueEvent::Emptied,
            ]
        );
        assert_eq!(queue.state(), BufferQueueState { count: 0, play_index: 3 });
        assert_eq!(queue.consumed(), 0);
        assert_eq!(queue.stats().retired, 3);
    }

    #[test]
    fn test_clear() {
        let mut queue = BufferQueue::new(2);
        assert!(queue.clear().is_empty());
        queue.enqueue(Bytes::from_static(b"xyz")).unwrap();
        queue.consume(1);
        let notices = queue.clear();
        assert_eq!(events(&notices), vec![BufferQueueEvent::Cleared]);
        assert!(queue.is_empty());
        assert_eq!(queue.consumed(), 0);
        assert_eq!(queue.state().play_index, 0);
    }

    #[test]
    fn test_clear_restarts_play_index() {
        let mut queue = BufferQueue::new(2);
        queue.enqueue(Bytes::from_static(b"ab")).unwrap();
        queue.consume(2);
        queue.enqueue(Bytes::from_static(b"cd")).unwrap();
        assert_eq!(queue.state().play_index, 1);

        let notices = queue.clear();
        assert_eq!(events(&notices), vec![BufferQueueEvent::Cleared]);
        assert_eq!(notices[0].1, BufferQueueState { count: 0, play_index: 0 });
        assert_eq!(queue.stats().retired, 1);

        // an empty queue still restarts the index, silently
        queue.enqueue(Bytes::from_static(b"ef")).unwrap();
        queue.consume(2);
        assert_eq!(queue.state().play_index, 1);
        assert!(queue.clear().is_empty());
        assert_eq!(queue.state().play_index, 0);
        assert_eq!(queue.stats().retired, 2);
    }

    #[test]
    fn test_capacity_is_bounded() {
        assert_eq!(BufferQueue::new(0).capacity(), 1);
        assert_eq!(BufferQueue::new(usize::MAX).capacity(), MAX_QUEUED_BUFFERS);
    }

    #[test]
    fn test_interface_gating_and_callbacks() {
        let (engine, itf) = testing::realized_engine(RuntimeConfig::default());
        let player = testing::queue_player(&itf, 2);
        assert!(player.get_interface(InterfaceId::BufferQueue).is_err());
        player.realize(Mode::Sync).unwrap();

        let bq = player
            .get_interface(InterfaceId::BufferQueue)
            .unwrap()
            .as_buffer_queue()
            .unwrap();
        assert_eq!(bq.capacity(), Ok(2));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bq.register_callback(Some(Arc::new(move |event, state: BufferQueueState| {
            sink.lock().push((event, state.count));
        })))
        .unwrap();

        bq.enqueue(vec![1u8; 4]).unwrap();
        bq.enqueue(vec![2u8; 4]).unwrap();
        assert_eq!(bq.enqueue(vec![3u8; 4]), Err(SlError::BufferInsufficient));
        let mut dest = [0u8; 8];
        assert_eq!(bq.fill(&mut dest), Ok(8));
        bq.enqueue(vec![4u8; 4]).unwrap();
        bq.clear().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (BufferQueueEvent::Filled, 1),
                (BufferQueueEvent::BufferCompleted, 1),
                (BufferQueueEvent::BufferCompleted, 0),
                (BufferQueueEvent::Emptied, 0),
                (BufferQueueEvent::Filled, 1),
                (BufferQueueEvent::Cleared, 0),
            ]
        );
        assert_eq!(
            bq.stats(),
            Ok(BufferQueueStats {
                enqueued: 3,
                rejected: 1,
                retired: 2
            })
        );

        player.destroy();
        assert_eq!(bq.enqueue(vec![5u8; 4]), Err(SlError::InvalidState));
        engine.destroy();
    }

    #[test]
    fn test_callback_may_reenter_queue() {
        let (engine, itf) = testing::realized_engine(RuntimeConfig::default());
        let player = testing::queue_player(&itf, 4);
        player.realize(Mode::Sync).unwrap();
        let bq = player
            .get_interface(InterfaceId::BufferQueue)
            .unwrap()
            .as_buffer_queue()
            .unwrap();

        let refill = bq.clone();
        bq.register_callback(Some(Arc::new(move |event: BufferQueueEvent, _| {
            if event == BufferQueueEvent::Emptied {
                refill.enqueue(vec![9u8; 2]).unwrap();
            }
        })))
        .unwrap();

        bq.enqueue(vec![1u8; 2]).unwrap();
        assert_eq!(bq.consume(2).unwrap().unwrap().len(), 2);
        assert_eq!(bq.state().unwrap().count, 1);
        // the callback holds a clone of its own interface
        bq.register_callback(None).unwrap();
        engine.destroy();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(usize),
        Consume(usize),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..16).prop_map(Op::Enqueue),
            (1usize..24).prop_map(Op::Consume),
            Just(Op::Clear),
        ]
    }

    proptest! {
        #[test]
        fn prop_boundary_events_alternate(ops in proptest::collection::vec(op(), 0..64)) {
            let mut queue = BufferQueue::new(3);
            let mut nonempty = false;
            let mut retired = 0u64;
            for op in ops {
                let notices = match op {
                    Op::Enqueue(len) => queue.enqueue(Bytes::from(vec![0u8; len])).unwrap_or_default(),
                    Op::Consume(max) => queue.consume(max).1,
                    Op::Clear => queue.clear(),
                };
                for (event, state) in notices {
                    match event {
                        BufferQueueEvent::Filled => {
                            prop_assert!(!nonempty);
                            nonempty = true;
                        }
                        BufferQueueEvent::Emptied | BufferQueueEvent::Cleared => {
                            prop_assert!(nonempty);
                            nonempty = false;
                            prop_assert_eq!(state.count, 0);
                        }
                        BufferQueueEvent::BufferCompleted => {
                            retired += 1;
                            prop_assert_eq!(state.play_index, retired);
                        }
                    }
                }
                prop_assert_eq!(nonempty, !queue.is_empty());
                prop_assert!(queue.len() <= queue.capacity());
            }
        }
    }
}
