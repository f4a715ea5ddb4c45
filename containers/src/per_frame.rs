use std::ops::{Index, IndexMut};

use derivative::Derivative;

use crate::error::ContainerError;

/// One `T` per frame in flight, addressed by frame index
///
/// Indices wrap, so the cumulative frame count can be used directly.
#[derive(Derivative, Clone)]
#[derivative(Debug(bound = "T: std::fmt::Debug"))]
pub struct PerFrame<T> {
    frames: Vec<T>,
}

impl<T> PerFrame<T> {
    /// Builds every frame's value with `f`, stopping at the first error
    pub fn try_new<E, F>(frames: usize, f: F) -> Result<Self, E>
    where
        E: From<ContainerError>,
        F: FnMut(usize) -> Result<T, E>,
    {
        if frames == 0 {
            return Err(ContainerError::ZeroSlots.into());
        }
        Ok(Self {
            frames: (0..frames).map(f).collect::<Result<Vec<T>, E>>()?,
        })
    }

    pub fn from_vec(frames: Vec<T>) -> Result<Self, ContainerError> {
        if frames.is_empty() {
            return Err(ContainerError::ZeroSlots);
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: usize) -> &T {
        &self.frames[frame % self.frames.len()]
    }

    pub fn get_mut(&mut self, frame: usize) -> &mut T {
        let len = self.frames.len();
        &mut self.frames[frame % len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.frames.iter_mut()
    }
}

impl<T: Default> PerFrame<T> {
    pub fn new_default(frames: usize) -> Result<Self, ContainerError> {
        Self::try_new(frames, |_| Ok(T::default()))
    }
}

impl<T> Index<usize> for PerFrame<T> {
    type Output = T;

    fn index(&self, frame: usize) -> &Self::Output {
        self.get(frame)
    }
}

impl<T> IndexMut<usize> for PerFrame<T> {
    fn index_mut(&mut self, frame: usize) -> &mut Self::Output {
        self.get_mut(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_frame_index() {
        let mut frames: PerFrame<u32> = PerFrame::new_default(2).unwrap();
        frames[3] = 7;
        assert_eq!(frames[1], 7);
        assert_eq!(*frames.get(0), 0);
    }

    #[test]
    fn try_new_propagates_errors() {
        let frames: Result<PerFrame<u32>, ContainerError> = PerFrame::try_new(3, |frame| {
            if frame == 2 {
                Err(ContainerError::ZeroSlots)
            } else {
                Ok(frame as u32)
            }
        });
        assert!(frames.is_err());
    }

    #[test]
    fn zero_frames_rejected() {
        assert_eq!(
            PerFrame::<u32>::new_default(0).unwrap_err(),
            ContainerError::ZeroSlots
        );
        assert!(PerFrame::<u32>::from_vec(Vec::new()).is_err());
    }
}
