pub(crate) mod constants;
pub(crate) mod error;
pub(crate) mod hash;
pub(crate) mod time;

#[cfg(test)]
pub(crate) mod test_utils;
