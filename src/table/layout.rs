//! Sizing formulas shared by table creation and resize.

/// Returns the number of block-region words a slab-list table needs to hold
/// `capacity` keys.
///
/// The region has room for `capacity` keys at `slab_size - 1` keys per slab,
/// plus one extra slab per bucket because the last slab of every chain may be
/// only partly used, plus one slab of padding at the front because slab 0 is
/// never allocated.
pub fn block_size(capacity: usize, slab_size: usize, bucket_len: usize) -> usize {
    assert!(slab_size >= 2);
    div_ceil(capacity, slab_size - 1) * slab_size + bucket_len * slab_size + slab_size
}

/// Returns the number of slabs in a block region, slab 0 included. This is
/// also the length of the reclaimed-stack link buffer.
pub fn slab_count(block_size: usize, slab_size: usize) -> usize {
    block_size / slab_size
}

/// Scales the bucket array with the capacity so that chains keep roughly the
/// same length after a resize.
pub fn scaled_bucket_len(new_capacity: usize, old_capacity: usize, old_bucket_len: usize) -> usize {
    assert!(old_capacity > 0);
    // Same as `ceil(new_capacity / old_capacity * old_bucket_len)`, without the
    // rounding error of going through a float.
    let scaled = div_ceil(new_capacity as u128 * old_bucket_len as u128, old_capacity as u128);
    (scaled as usize).max(1)
}

fn div_ceil<T>(a: T, b: T) -> T
where
    T: Copy
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Div<Output = T>
        + From<u8>,
{
    (a + b - T::from(1)) / b
}
