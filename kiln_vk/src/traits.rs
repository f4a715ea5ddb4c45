/// Describes Vulkan resources which can be destroyed
pub trait Destructible {
    /// Destroy the resource
    fn destroy(&mut self);
}

/// Access to the raw Vulkan handle behind a wrapper
pub trait AsRaw {
    type RawType;

    /// Get a copy of the underlying handle
    ///
    /// # Safety
    /// The handle is not tracked once it leaves the wrapper. Destroying it manually while the
    /// wrapper is alive leads to a double free.
    unsafe fn as_raw(&self) -> &Self::RawType;
}
