// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Implements an object pool pattern using two lock-free SPSC (Single
// Producer Single Consumer) ring buffers for real-time capture. The
// microphone callback must never allocate or block, so every capture
// buffer is pre-allocated here and recycled between the capture thread
// and the analysis thread.
//
// Buffer flow:
// 1. Capture thread pops an empty buffer from POOL_QUEUE
// 2. Capture thread fills it with raw 16-bit samples
// 3. Capture thread pushes the filled buffer to DATA_QUEUE
// 4. Analysis thread pops the filled buffer from DATA_QUEUE
// 5. Analysis thread copies samples into its window accumulator
// 6. Analysis thread pushes the empty buffer back to POOL_QUEUE

use rtrb::{Consumer, Producer};

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 16;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Capture buffer type - pre-allocated vector of signed 16-bit samples
pub type CaptureBuffer = Vec<i16>;

/// Split buffer pool channels for producer/consumer separation
pub struct BufferPoolChannels {
    /// Producer for sending filled capture buffers to the analysis thread
    pub data_producer: Producer<CaptureBuffer>,
    /// Consumer for receiving filled capture buffers in the analysis thread
    pub data_consumer: Consumer<CaptureBuffer>,
    /// Producer for returning empty buffers from the analysis thread
    pub pool_producer: Producer<CaptureBuffer>,
    /// Consumer for retrieving empty buffers in the capture thread
    pub pool_consumer: Consumer<CaptureBuffer>,
}

/// The capture thread's half of the dual-queue system.
pub struct CaptureThreadChannels {
    pub pool_consumer: Consumer<CaptureBuffer>,
    pub data_producer: Producer<CaptureBuffer>,
}

/// The analysis thread's half of the dual-queue system.
pub struct AnalysisThreadChannels {
    pub data_consumer: Consumer<CaptureBuffer>,
    pub pool_producer: Producer<CaptureBuffer>,
}

impl BufferPoolChannels {
    /// Split into per-thread halves so each endpoint can be moved onto
    /// its owning thread.
    pub fn split_for_threads(self) -> (CaptureThreadChannels, AnalysisThreadChannels) {
        (
            CaptureThreadChannels {
                pool_consumer: self.pool_consumer,
                data_producer: self.data_producer,
            },
            AnalysisThreadChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of capture buffers and circulates them
/// through two lock-free queues. All heap allocation happens during
/// initialization, keeping the capture callback allocation-free.
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with the given buffer count and size
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_size > 0, "buffer_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // The only place where heap allocation occurs
        for _ in 0..buffer_count {
            let buffer = vec![0_i16; buffer_size];
            pool_producer
                .push(buffer)
                .expect("Failed to push buffer to pool queue during initialization");
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
