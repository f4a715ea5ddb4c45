use ash::vk;

/// Rounds `current` up to the next multiple of `alignment`. An alignment of 0 leaves the value as is.
pub fn align(current: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return current;
    }
    match current % alignment {
        0 => current,
        remainder => current + alignment - remainder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(align(0, 4), 0);
        assert_eq!(align(1, 4), 4);
        assert_eq!(align(4, 4), 4);
        assert_eq!(align(13, 8), 16);
    }

    #[test]
    fn zero_alignment() {
        assert_eq!(align(13, 0), 13);
    }
}
