//! Fire and forget notifications between the application and nodes
//!
//! Used to tell an [`crate::nodes::AcquireNode`] the swapchain was recreated. Receivers poll, and
//! dropping a receiver unsubscribes it.

/// Creates a connected sender and receiver pair
pub fn event_channel<T: Send + 'static>() -> (EventSender<T>, EventReceiver<T>) {
    let (send, recv) = crossbeam_channel::unbounded();
    (EventSender::new(send), EventReceiver::new(recv))
}

#[derive(Debug)]
pub struct EventSender<T: Send + 'static> {
    send: crossbeam_channel::Sender<T>,
}

impl<T: Send + 'static> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            send: self.send.clone(),
        }
    }
}

impl<T: Send + 'static> EventSender<T> {
    pub fn new(send: crossbeam_channel::Sender<T>) -> Self {
        Self { send }
    }

    /// Fails only once every receiver was dropped
    pub fn send(&self, event: T) -> Result<(), crossbeam_channel::SendError<T>> {
        self.send.send(event)
    }
}

#[derive(Debug)]
pub struct EventReceiver<T: Send + 'static> {
    recv: crossbeam_channel::Receiver<T>,
}

impl<T: Send + 'static> EventReceiver<T> {
    pub fn new(recv: crossbeam_channel::Receiver<T>) -> Self {
        Self { recv }
    }

    /// Drains every pending event and keeps the newest
    pub fn latest(&mut self) -> Option<T> {
        self.by_ref().last()
    }
}

impl<T: Send + 'static> Iterator for EventReceiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv.try_recv().ok()
    }
}
