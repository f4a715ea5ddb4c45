use std::hash::{Hash, Hasher};

use ash::vk;

/// Information about queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueInfo {
    /// Index to the family queue
    pub family_index: u32,
    /// Queue's index in the family
    pub index: u32,
    /// Flags of the queue family
    pub queue_flags: vk::QueueFlags,
    /// Can the queue present to the device's surface
    pub can_present: bool,
}

/// Represents a [`vk::Queue`] and its indices
///
/// Queues are retrieved by the device selection logic and handed to the graph, every node is bound
/// to exactly one of them for its whole lifetime.
///
/// # Hashing
/// When hashing, the hasher will only hash [`QueueInfo::index`] and [`QueueInfo::family_index`]
#[derive(Debug, Clone, Copy)]
pub struct Queue {
    handle: vk::Queue,
    queue_info: QueueInfo,
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.queue_info.family_index == other.queue_info.family_index
            && self.queue_info.index == other.queue_info.index
    }
}

impl Eq for Queue {}

impl Hash for Queue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.queue_info.family_index.hash(state);
        self.queue_info.index.hash(state);
    }
}

impl Queue {
    pub fn new(handle: vk::Queue, queue_info: QueueInfo) -> Self {
        Self { handle, queue_info }
    }

    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    pub fn get_index(&self) -> u32 {
        self.queue_info.index
    }

    pub fn get_family_index(&self) -> u32 {
        self.queue_info.family_index
    }

    pub fn get_queue_flags(&self) -> vk::QueueFlags {
        self.queue_info.queue_flags
    }

    pub fn can_present(&self) -> bool {
        self.queue_info.can_present
    }

    pub fn info(&self) -> &QueueInfo {
        &self.queue_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn info(family_index: u32, index: u32) -> QueueInfo {
        QueueInfo {
            family_index,
            index,
            queue_flags: vk::QueueFlags::GRAPHICS,
            can_present: false,
        }
    }

    #[test]
    fn equality_ignores_handle() {
        let a = Queue::new(vk::Queue::from_raw(1), info(0, 0));
        let b = Queue::new(vk::Queue::from_raw(2), info(0, 0));
        let c = Queue::new(vk::Queue::from_raw(1), info(1, 0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
