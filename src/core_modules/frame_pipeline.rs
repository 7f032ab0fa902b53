// THEORY:
// The `frame_pipeline` module moves decoded frames from a sequential video source to
// the scoring loop. Decoding and scoring run on different threads so that one does
// not stall the other, but a video can hold far more frames than fit in memory, so
// the hand-off has to be bounded.
//
// Key architectural principles:
// 1.  **One Producer, One Consumer**: Each source gets a fresh `FrameQueue`. A scoped
//     producer thread decodes into it; the calling thread pops and scores. Frames are
//     scored in exactly the order they were decoded.
// 2.  **Backpressure**: When the queue is full the producer waits on a condition
//     variable (re-checking at least every `backoff`) instead of dropping frames or
//     growing the queue. Memory stays bounded by `capacity` frames.
// 3.  **Set-Once Completion**: The producer marks the queue `done` when the source is
//     exhausted, fails, or the producer unwinds. The consumer stops once the queue is
//     both done and empty, so every decoded frame is scored.
// 4.  **Lock Scope**: Only the queue and its flags are shared. No lock is held while a
//     frame is being scored.

use crate::error::{Result, TuneError};
use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_PRODUCER_BACKOFF: Duration = Duration::from_millis(500);

/// A decoded video frame.
pub type Frame = RgbaImage;

/// A sequential source of frames, e.g. one video file.
pub trait FrameSource: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Number of frames this source is expected to yield per pass.
    fn frame_count(&self) -> u64;

    /// Positions the source before its first frame. Called before every pass.
    fn rewind(&mut self) -> Result<()>;

    /// Reads the next frame, or `None` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

struct QueueState {
    frames: VecDeque<Frame>,
    /// Set by the producer once it will push nothing more.
    done: bool,
    /// Set by the consumer when it stops popping early.
    closed: bool,
    high_water: usize,
}

/// A bounded FIFO of frames shared by one producer and one consumer.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    backoff: Duration,
}

impl FrameQueue {
    pub fn new(capacity: usize, backoff: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.min(64)),
                done: false,
                closed: false,
                high_water: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a frame, blocking while the queue is at capacity.
    ///
    /// Returns false, dropping the frame, if the consumer has gone away.
    pub fn push(&self, frame: Frame) -> bool {
        let mut state = self.lock();
        while state.frames.len() >= self.capacity && !state.closed {
            trace!(capacity = self.capacity, "frame queue full, producer waiting");
            let (guard, _) = self
                .not_full
                .wait_timeout(state, self.backoff)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        if state.closed {
            return false;
        }
        state.frames.push_back(frame);
        state.high_water = state.high_water.max(state.frames.len());
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Removes the oldest frame, blocking while the queue is empty and the producer
    /// is still running. Returns `None` once the queue is done and drained.
    pub fn pop(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(frame);
            }
            if state.done {
                return None;
            }
            state = self.not_empty.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks the queue as complete. Never cleared.
    pub fn finish(&self) {
        self.lock().done = true;
        self.not_empty.notify_all();
    }

    /// Tells a blocked producer to give up.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// The largest number of frames the queue has held at once.
    pub fn high_water_mark(&self) -> usize {
        self.lock().high_water
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Marks the queue done when the producer returns or unwinds.
struct FinishOnDrop<'a>(&'a FrameQueue);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Releases a blocked producer when the consumer returns or unwinds.
struct CloseOnDrop<'a>(&'a FrameQueue);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// The outcome of draining one source.
#[derive(Debug)]
pub struct SourceRun {
    /// Frames handed to the consumer.
    pub frames: u64,
    /// Deepest the queue got while draining this source.
    pub high_water: usize,
    /// Set when the source stopped early because of a read error.
    pub error: Option<TuneError>,
}

/// Runs one producer/consumer pass per source.
#[derive(Debug, Clone, Copy)]
pub struct FramePipeline {
    capacity: usize,
    backoff: Duration,
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_PRODUCER_BACKOFF)
    }
}

impl FramePipeline {
    pub fn new(capacity: usize, backoff: Duration) -> Self {
        Self { capacity, backoff }
    }

    /// Drains `source` from its first frame to its last, calling `consume` on every
    /// frame in decode order on the calling thread.
    ///
    /// A read error ends the source early; the frames read before it are still
    /// consumed and the error is reported in the returned `SourceRun`.
    pub fn run<S, F>(&self, source: &mut S, mut consume: F) -> SourceRun
    where
        S: FrameSource + ?Sized,
        F: FnMut(Frame),
    {
        let queue = FrameQueue::new(self.capacity, self.backoff);
        let name = source.name().to_owned();

        let (frames, produced) = thread::scope(|scope| {
            let queue_ref = &queue;
            let producer = scope.spawn(move || produce(source, queue_ref));

            let mut frames = 0u64;
            {
                let _close = CloseOnDrop(&queue);
                while let Some(frame) = queue.pop() {
                    consume(frame);
                    frames += 1;
                }
            }

            let produced = producer.join().unwrap_or_else(|_| {
                Err(TuneError::Source {
                    source_name: name.clone(),
                    message: "frame producer panicked".to_owned(),
                })
            });
            (frames, produced)
        });

        let error = match produced {
            Ok(decoded) => {
                debug!(source = %name, frames, decoded, "source drained");
                None
            }
            Err(e) => {
                warn!(source = %name, frames, error = %e, "source stopped early");
                Some(e)
            }
        };

        SourceRun {
            frames,
            high_water: queue.high_water_mark(),
            error,
        }
    }
}

fn produce<S: FrameSource + ?Sized>(source: &mut S, queue: &FrameQueue) -> Result<u64> {
    let _finish = FinishOnDrop(queue);
    source.rewind()?;
    let mut produced = 0u64;
    while let Some(frame) = source.read_frame()? {
        if !queue.push(frame) {
            break;
        }
        produced += 1;
    }
    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tagged(tag: u8) -> Frame {
        RgbaImage::from_pixel(1, 1, Rgba([tag, 0, 0, 255]))
    }

    struct Counting {
        total: u8,
        next: u8,
        fail_at: Option<u8>,
    }

    impl FrameSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn frame_count(&self) -> u64 {
            self.total as u64
        }

        fn rewind(&mut self) -> Result<()> {
            self.next = 0;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if Some(self.next) == self.fail_at {
                return Err(TuneError::Source {
                    source_name: "counting".into(),
                    message: "corrupt frame".into(),
                });
            }
            if self.next >= self.total {
                return Ok(None);
            }
            let frame = tagged(self.next);
            self.next += 1;
            Ok(Some(frame))
        }
    }

    #[test]
    fn frames_arrive_in_decode_order() {
        let mut source = Counting { total: 50, next: 0, fail_at: None };
        let pipeline = FramePipeline::new(8, Duration::from_millis(5));
        let mut seen = Vec::new();
        let run = pipeline.run(&mut source, |f| seen.push(f.get_pixel(0, 0)[0]));
        assert!(run.error.is_none());
        assert_eq!(run.frames, 50);
        assert_eq!(seen, (0..50).collect::<Vec<u8>>());
    }

    #[test]
    fn slow_consumer_never_overflows_the_queue() {
        let mut source = Counting { total: 40, next: 0, fail_at: None };
        let pipeline = FramePipeline::new(4, Duration::from_millis(5));
        let run = pipeline.run(&mut source, |_| thread::sleep(Duration::from_millis(2)));
        assert_eq!(run.frames, 40);
        assert!(run.high_water <= 4, "queue reached {}", run.high_water);
    }

    #[test]
    fn each_pass_starts_from_the_first_frame() {
        let mut source = Counting { total: 3, next: 0, fail_at: None };
        let pipeline = FramePipeline::new(8, Duration::from_millis(5));
        assert_eq!(pipeline.run(&mut source, |_| {}).frames, 3);
        assert_eq!(pipeline.run(&mut source, |_| {}).frames, 3);
    }

    #[test]
    fn read_error_ends_source_after_draining() {
        let mut source = Counting { total: 10, next: 0, fail_at: Some(6) };
        let pipeline = FramePipeline::new(8, Duration::from_millis(5));
        let run = pipeline.run(&mut source, |_| {});
        assert_eq!(run.frames, 6);
        assert!(matches!(run.error, Some(TuneError::Source { .. })));
    }

    #[test]
    fn producer_pauses_at_capacity() {
        let queue = Arc::new(FrameQueue::new(2, Duration::from_millis(5)));
        assert!(queue.push(tagged(0)));
        assert!(queue.push(tagged(1)));

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                queue.push(tagged(2));
                pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), queue.capacity());

        assert_eq!(queue.pop().map(|f| f.get_pixel(0, 0)[0]), Some(0));
        producer.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.high_water_mark(), 2);
    }

    #[test]
    fn done_and_empty_ends_consumption() {
        let queue = FrameQueue::new(4, Duration::from_millis(5));
        queue.push(tagged(9));
        queue.finish();
        assert!(queue.is_done());
        assert!(queue.pop().is_some());
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = FrameQueue::new(0, Duration::from_millis(5));
        assert_eq!(queue.capacity(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_releases_blocked_producer() {
        let queue = Arc::new(FrameQueue::new(1, Duration::from_millis(5)));
        queue.push(tagged(0));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(tagged(1)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(!producer.join().unwrap());
    }
}
