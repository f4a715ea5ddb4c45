use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
pub enum ContainerError {
    #[error("Expected at least one slot, got zero")]
    ZeroSlots,
}
