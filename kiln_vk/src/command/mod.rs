pub mod command_buffer;
pub mod command_pool;

pub use command_buffer::{CommandBuffer, CommandBufferState};
pub use command_pool::CommandPool;
