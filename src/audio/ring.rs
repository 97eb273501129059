// CaptureRing - lock-free buffer pool between the capture callback and the
// detection worker
//
// Two SPSC ring buffers circulate pre-allocated sample buffers so the device
// callback never allocates:
// - FILLED queue: callback pushes buffers of fresh samples, worker consumes
// - FREE queue: worker returns drained buffers, callback recycles
//
// Buffer flow:
// 1. Callback pops an empty buffer from FREE
// 2. Callback copies (downmixed) samples into it
// 3. Callback pushes it to FILLED
// 4. Worker pops it from FILLED and appends to its frame accumulator
// 5. Worker clears it and pushes it back to FREE

use rtrb::{Consumer, Producer};

/// Pre-allocated sample buffer
pub type SampleBuffer = Vec<f32>;

/// Both ends of both queues, before being split between threads
pub struct CaptureRingChannels {
    pub filled_producer: Producer<SampleBuffer>,
    pub filled_consumer: Consumer<SampleBuffer>,
    pub free_producer: Producer<SampleBuffer>,
    pub free_consumer: Consumer<SampleBuffer>,
}

/// Callback-side ends
pub struct CallbackChannels {
    pub free_consumer: Consumer<SampleBuffer>,
    pub filled_producer: Producer<SampleBuffer>,
}

/// Worker-side ends
pub struct WorkerChannels {
    pub filled_consumer: Consumer<SampleBuffer>,
    pub free_producer: Producer<SampleBuffer>,
}

impl CaptureRingChannels {
    pub fn split(self) -> (CallbackChannels, WorkerChannels) {
        (
            CallbackChannels {
                free_consumer: self.free_consumer,
                filled_producer: self.filled_producer,
            },
            WorkerChannels {
                filled_consumer: self.filled_consumer,
                free_producer: self.free_producer,
            },
        )
    }
}

pub struct CaptureRing;

impl CaptureRing {
    /// Allocate `buffer_count` buffers of `buffer_capacity` samples each and
    /// put them all on the FREE queue.
    ///
    /// Counts of zero are bumped to one.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_capacity: usize) -> CaptureRingChannels {
        let buffer_count = buffer_count.max(1);
        let (mut free_producer, free_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (filled_producer, filled_consumer) = rtrb::RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            // Capacity equals buffer_count, so this cannot fail
            let _ = free_producer.push(Vec::with_capacity(buffer_capacity.max(1)));
        }

        CaptureRingChannels {
            filled_producer,
            filled_consumer,
            free_producer,
            free_consumer,
        }
    }
}

impl CallbackChannels {
    /// Copy one callback's worth of interleaved samples into the ring,
    /// keeping only the first channel. Returns false when no free buffer
    /// was available and the samples were dropped.
    pub fn push_interleaved<T: Copy>(
        &mut self,
        data: &[T],
        channels: usize,
        convert: impl Fn(T) -> f32,
    ) -> bool {
        let Ok(mut buffer) = self.free_consumer.pop() else {
            return false;
        };
        buffer.clear();
        buffer.extend(data.chunks(channels.max(1)).map(|frame| convert(frame[0])));
        self.filled_producer.push(buffer).is_ok()
    }
}
