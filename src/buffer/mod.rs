// Shared buffering utilities for the real-time pipeline

pub mod pool;
pub mod ring;

pub use pool::{
    AnalysisThreadChannels, BufferPool, BufferPoolChannels, CaptureBuffer, CaptureThreadChannels,
};
pub use ring::CircularBuffer;
