//! Table operations and the deterministic generator that assigns one to every
//! invocation of a batch.

use crate::{common::hash::mix64, table::Key};

// Keeps the operation stream independent from the key hash, which uses the
// same mixing function.
const OPERATION_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// The default share of inserts, in percent.
pub const DEFAULT_INSERT_PERCENT: u8 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Insert,
    Delete,
}

/// The operation one invocation performs against the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operation {
    pub opcode: OpCode,
    pub key: Key,
}

/// Derives an [`Operation`](./struct.Operation.html) from `(iteration,
/// invocation)`.
///
/// The derivation is a pure function of its inputs: invocations run in no
/// particular order, and the same batch must produce the same operations on
/// every run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationGenerator {
    key_range: u64,
    insert_percent: u8,
}

impl OperationGenerator {
    /// Creates a generator drawing keys from `[1, key_range)`.
    ///
    /// # Panics
    ///
    /// Panics if `key_range` is less than 2 or `insert_percent` is greater than
    /// 100.
    pub fn new(key_range: u64, insert_percent: u8) -> Self {
        assert!(key_range > 1, "key range must exclude the empty key 0");
        assert!(insert_percent <= 100);
        Self {
            key_range,
            insert_percent,
        }
    }

    pub fn key_range(&self) -> u64 {
        self.key_range
    }

    pub fn operation(&self, iteration: u32, invocation: u32) -> Operation {
        let seed = (u64::from(iteration) << 32) | u64::from(invocation);
        let z = mix64(seed ^ OPERATION_STREAM);

        let opcode = if z % 100 < u64::from(self.insert_percent) {
            OpCode::Insert
        } else {
            OpCode::Delete
        };
        // The low bits already decided the opcode; mix again for the key.
        let key = 1 + mix64(z) % (self.key_range - 1);

        Operation { opcode, key }
    }
}

/// Shorthand for the operation of `invocation` in `iteration` with an even
/// insert/delete mix.
pub fn operation(iteration: u32, invocation: u32, key_range: u64) -> Operation {
    OperationGenerator::new(key_range, DEFAULT_INSERT_PERCENT).operation(iteration, invocation)
}
