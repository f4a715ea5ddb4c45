pub use super::deferred_deletion::DeferredDeletion;
pub use super::error::ContainerError;
pub use super::per_frame::PerFrame;
