//! A [`Device`] which records calls instead of talking to a GPU
//!
//! Submissions complete immediately unless [`TestDevice::set_hold_submissions`] is enabled, in
//! which case their signal operations only land once [`TestDevice::complete_pending`] is called.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use ash::vk::Handle;

use super::{Device, Queue, QueueInfo, SemaphoreKind};
use crate::sync::{BufferBarrier, DependencyInfo, ImageBarrier, SemaphoreSubmit, Submission};
use crate::VkError;

/// A command recorded into a command buffer
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    Reset,
    Begin(vk::CommandBufferUsageFlags),
    End,
    PipelineBarrier {
        buffer_barriers: Vec<BufferBarrier>,
        image_barriers: Vec<ImageBarrier>,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::BufferImageCopy>,
    },
}

/// A queue submission along with a snapshot of the commands it carried
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub queue: vk::Queue,
    pub command_buffer: vk::CommandBuffer,
    pub commands: Vec<RecordedCommand>,
    pub wait_semaphores: Vec<SemaphoreSubmit>,
    pub signal_semaphores: Vec<SemaphoreSubmit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedPresent {
    pub queue: vk::Queue,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
}

#[derive(Debug, Clone, Copy)]
struct SemaphoreState {
    kind: SemaphoreKind,
    value: u64,
}

#[derive(Debug, Default)]
struct TestDeviceState {
    next_handle: u64,
    command_pools: HashMap<vk::CommandPool, u32>,
    command_buffers: HashMap<vk::CommandBuffer, Vec<RecordedCommand>>,
    semaphores: HashMap<vk::Semaphore, SemaphoreState>,
    destroyed_semaphores: Vec<vk::Semaphore>,
    destroyed_command_pools: Vec<vk::CommandPool>,
    submissions: Vec<RecordedSubmission>,
    pending_signals: Vec<(vk::Semaphore, u64)>,
    hold_submissions: bool,
    waits: Vec<Vec<(vk::Semaphore, u64)>>,
    acquire_results: VecDeque<Result<(u32, bool), vk::Result>>,
    present_results: VecDeque<Result<bool, vk::Result>>,
    presents: Vec<RecordedPresent>,
    wait_idle_calls: usize,
}

impl TestDeviceState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn signal(&mut self, semaphore: vk::Semaphore, value: u64) {
        if let Some(state) = self.semaphores.get_mut(&semaphore) {
            state.value = state.value.max(value);
        }
    }
}

/// Recording implementation of [`Device`]
///
/// Clones share the same recorder.
#[derive(Debug, Clone, Default)]
pub struct TestDevice {
    state: Arc<Mutex<TestDeviceState>>,
}

impl TestDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TestDeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a queue with a fresh handle belonging to `family_index`
    pub fn queue(&self, family_index: u32, queue_flags: vk::QueueFlags) -> Queue {
        let raw = self.state().next_raw();
        Queue::new(
            vk::Queue::from_raw(raw),
            QueueInfo {
                family_index,
                index: 0,
                queue_flags,
                can_present: queue_flags.contains(vk::QueueFlags::GRAPHICS),
            },
        )
    }

    /// Hands out a fresh non-null raw handle, used to fake swapchains, buffers and images
    pub fn fresh_handle<T: Handle>(&self) -> T {
        T::from_raw(self.state().next_raw())
    }

    /// When enabled, submissions do not signal their semaphores until [`Self::complete_pending`]
    pub fn set_hold_submissions(&self, hold: bool) {
        self.state().hold_submissions = hold;
    }

    /// Applies every signal of the held submissions
    pub fn complete_pending(&self) {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending_signals);
        for (semaphore, value) in pending {
            state.signal(semaphore, value);
        }
    }

    /// Signals a timeline semaphore from the host
    pub fn signal_semaphore(&self, semaphore: vk::Semaphore, value: u64) {
        self.state().signal(semaphore, value);
    }

    pub fn semaphore_value(&self, semaphore: vk::Semaphore) -> Option<u64> {
        self.state().semaphores.get(&semaphore).map(|state| state.value)
    }

    pub fn is_timeline(&self, semaphore: vk::Semaphore) -> bool {
        matches!(
            self.state().semaphores.get(&semaphore),
            Some(SemaphoreState {
                kind: SemaphoreKind::Timeline { .. },
                ..
            })
        )
    }

    /// Scripts the result of the next [`Device::acquire_next_image`]. Without a scripted
    /// result the acquire returns image 0, not suboptimal.
    pub fn push_acquire_result(&self, result: Result<(u32, bool), vk::Result>) {
        self.state().acquire_results.push_back(result);
    }

    /// Scripts the result of the next [`Device::queue_present`]
    pub fn push_present_result(&self, result: Result<bool, vk::Result>) {
        self.state().present_results.push_back(result);
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state().submissions.clone()
    }

    /// Every CPU wait issued so far, as `(semaphore, value)` pairs per call
    pub fn waits(&self) -> Vec<Vec<(vk::Semaphore, u64)>> {
        self.state().waits.clone()
    }

    pub fn presents(&self) -> Vec<RecordedPresent> {
        self.state().presents.clone()
    }

    /// Commands currently recorded in `command_buffer`
    pub fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state()
            .command_buffers
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state().semaphores.len()
    }

    pub fn live_command_pools(&self) -> usize {
        self.state().command_pools.len()
    }

    pub fn destroyed_semaphores(&self) -> Vec<vk::Semaphore> {
        self.state().destroyed_semaphores.clone()
    }

    pub fn destroyed_command_pools(&self) -> Vec<vk::CommandPool> {
        self.state().destroyed_command_pools.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state().wait_idle_calls
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: RecordedCommand) {
        self.state()
            .command_buffers
            .entry(command_buffer)
            .or_default()
            .push(command);
    }
}

impl Device for TestDevice {
    fn create_command_pool(
        &self,
        queue_family_index: u32,
        _flags: vk::CommandPoolCreateFlags,
    ) -> Result<vk::CommandPool, VkError> {
        let mut state = self.state();
        let handle = vk::CommandPool::from_raw(state.next_raw());
        state.command_pools.insert(handle, queue_family_index);
        Ok(handle)
    }

    fn destroy_command_pool(&self, command_pool: vk::CommandPool) {
        let mut state = self.state();
        if state.command_pools.remove(&command_pool).is_some() {
            state.destroyed_command_pools.push(command_pool);
        }
    }

    fn allocate_command_buffers(
        &self,
        command_pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, VkError> {
        let mut state = self.state();
        if !state.command_pools.contains_key(&command_pool) {
            return Err(VkError::UnknownHandle(command_pool.as_raw()));
        }
        let handles: Vec<vk::CommandBuffer> = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.next_raw()))
            .collect();
        for handle in handles.iter() {
            state.command_buffers.insert(*handle, Vec::new());
        }
        Ok(handles)
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError> {
        let mut state = self.state();
        let commands = state
            .command_buffers
            .get_mut(&command_buffer)
            .ok_or(VkError::UnknownHandle(command_buffer.as_raw()))?;
        commands.clear();
        commands.push(RecordedCommand::Reset);
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), VkError> {
        self.record(command_buffer, RecordedCommand::Begin(flags));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError> {
        self.record(command_buffer, RecordedCommand::End);
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, command_buffer: vk::CommandBuffer, dependency: &DependencyInfo) {
        self.record(
            command_buffer,
            RecordedCommand::PipelineBarrier {
                buffer_barriers: dependency.buffer_barriers.to_vec(),
                image_barriers: dependency.image_barriers.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.record(
            command_buffer,
            RecordedCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.record(
            command_buffer,
            RecordedCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<vk::Semaphore, VkError> {
        let mut state = self.state();
        let handle = vk::Semaphore::from_raw(state.next_raw());
        let value = match kind {
            SemaphoreKind::Binary => 0,
            SemaphoreKind::Timeline { initial_value } => initial_value,
        };
        state.semaphores.insert(handle, SemaphoreState { kind, value });
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state();
        if state.semaphores.remove(&semaphore).is_some() {
            state.destroyed_semaphores.push(semaphore);
        }
    }

    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> Result<u64, VkError> {
        self.semaphore_value(semaphore)
            .ok_or(VkError::UnknownHandle(semaphore.as_raw()))
    }

    fn wait_semaphores(
        &self,
        semaphores: &[vk::Semaphore],
        values: &[u64],
        _timeout: u64,
    ) -> Result<(), VkError> {
        let mut state = self.state();
        state.waits.push(
            semaphores
                .iter()
                .copied()
                .zip(values.iter().copied())
                .collect(),
        );
        for (semaphore, value) in semaphores.iter().zip(values.iter()) {
            let current = state
                .semaphores
                .get(semaphore)
                .ok_or(VkError::UnknownHandle(semaphore.as_raw()))?
                .value;
            if current < *value {
                return Err(VkError::Vk(vk::Result::TIMEOUT));
            }
        }
        Ok(())
    }

    fn queue_submit(&self, queue: vk::Queue, submission: &Submission) -> Result<(), VkError> {
        let mut state = self.state();
        let commands = state
            .command_buffers
            .get(&submission.command_buffer)
            .cloned()
            .ok_or(VkError::UnknownHandle(submission.command_buffer.as_raw()))?;
        state.submissions.push(RecordedSubmission {
            queue,
            command_buffer: submission.command_buffer,
            commands,
            wait_semaphores: submission.wait_semaphores.to_vec(),
            signal_semaphores: submission.signal_semaphores.to_vec(),
        });
        for signal in submission.signal_semaphores.iter() {
            if state.hold_submissions {
                state.pending_signals.push((signal.semaphore, signal.value));
            } else {
                state.signal(signal.semaphore, signal.value);
            }
        }
        Ok(())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), VkError> {
        match self.state().acquire_results.pop_front() {
            Some(result) => Ok(result?),
            None => Ok((0, false)),
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, VkError> {
        let mut state = self.state();
        state.presents.push(RecordedPresent {
            queue,
            swapchain,
            image_index,
            wait_semaphore,
        });
        match state.present_results.pop_front() {
            Some(result) => Ok(result?),
            None => Ok(false),
        }
    }

    fn wait_idle(&self) -> Result<(), VkError> {
        self.complete_pending();
        self.state().wait_idle_calls += 1;
        Ok(())
    }
}
