use glam::Vec3;

/// Rounds `size` up to the next multiple of `alignment`.
///
/// `alignment` is expected to be zero or a power of two, matching the device's
/// `minUniformBufferOffsetAlignment`. Zero means no alignment requirement.
pub fn pad_uniform_buffer_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    (size + alignment - 1) & !(alignment - 1)
}

/// Number of workgroups needed to cover `extent` texels with `group_size` wide groups
pub fn dispatch_group_count(extent: u32, group_size: u32) -> u32 {
    extent.div_ceil(group_size)
}

pub fn calculate_pitch(direction: Vec3) -> f32 {
    let direction = direction.normalize();
    direction.y.clamp(-1.0, 1.0).asin()
}

pub fn calculate_yaw(direction: Vec3) -> f32 {
    let direction = direction.normalize();
    direction.z.atan2(direction.x)
}

pub fn calculate_direction(pitch: f32, yaw: f32) -> Vec3 {
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_is_smallest_aligned_multiple() {
        for alignment in [1u64, 2, 4, 16, 64, 256] {
            for size in 0..600u64 {
                let padded = pad_uniform_buffer_size(size, alignment);
                assert!(padded >= size);
                assert_eq!(padded % alignment, 0);
                assert!(padded - size < alignment, "{size} padded to {padded} with {alignment}");
            }
        }
    }

    #[test]
    fn padding_is_idempotent() {
        for alignment in [1u64, 8, 32, 256] {
            for size in [0u64, 1, 7, 80, 255, 256, 257, 1000] {
                let once = pad_uniform_buffer_size(size, alignment);
                assert_eq!(pad_uniform_buffer_size(once, alignment), once);
            }
        }
    }

    #[test]
    fn zero_alignment_leaves_size_untouched() {
        assert_eq!(pad_uniform_buffer_size(80, 0), 80);
    }

    #[test]
    fn scene_data_pads_to_device_alignment() {
        // 5 vec4s, a common 64 byte alignment
        assert_eq!(pad_uniform_buffer_size(80, 64), 128);
        assert_eq!(pad_uniform_buffer_size(80, 256), 256);
    }

    #[test]
    fn dispatch_covers_partial_groups() {
        assert_eq!(dispatch_group_count(1700, 16), 107);
        assert_eq!(dispatch_group_count(1600, 16), 100);
        assert_eq!(dispatch_group_count(1, 16), 1);
        assert_eq!(dispatch_group_count(0, 16), 0);
    }

    #[test]
    fn direction_round_trips_through_pitch_and_yaw() {
        let dir = Vec3::new(0.3, 0.5, -0.8).normalize();
        let back = calculate_direction(calculate_pitch(dir), calculate_yaw(dir));
        assert!(back.abs_diff_eq(dir, 1e-5));
    }
}
