pub mod deferred_deletion;
pub mod error;
pub mod per_frame;
pub mod prelude;
