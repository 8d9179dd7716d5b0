use crate::table::Key;

/// The splitmix64 finalizer.
///
/// Every hash and every pseudo-random choice in this crate goes through this
/// function, so a run is fully determined by its configuration regardless of
/// how invocations are scheduled.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Returns the hash of a key, used to pick its home slot or bucket.
#[inline]
pub fn hash_key(key: Key) -> u64 {
    mix64(key)
}
