//! Handles synchronization
pub mod binary_semaphore;
pub mod memory_barrier;
pub mod semaphore;

pub use binary_semaphore::BinarySemaphore;
pub use memory_barrier::{
    BufferBarrier, DependencyInfo, ImageBarrier, SemaphoreSubmit, Submission,
};
pub use semaphore::TimelineSemaphore;
