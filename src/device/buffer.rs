use std::{
    fmt,
    sync::{atomic::AtomicU64, Arc},
};

/// A buffer of 64-bit atomic words in device memory.
///
/// A `DeviceBuffer` is the only owning handle of its buffer on the host side.
/// It is not `Clone`; give it back to [`Device::destroy_buffer`] when done.
///
/// [`Device::destroy_buffer`]: ../trait.Device.html#tymethod.destroy_buffer
pub struct DeviceBuffer {
    storage: Arc<BufferStorage>,
}

pub(crate) struct BufferStorage {
    id: u64,
    label: &'static str,
    words: Box<[AtomicU64]>,
}

impl BufferStorage {
    pub(crate) fn words(&self) -> &[AtomicU64] {
        &self.words
    }
}

impl DeviceBuffer {
    pub(crate) fn new(id: u64, label: &'static str, words: Box<[AtomicU64]>) -> Self {
        Self {
            storage: Arc::new(BufferStorage { id, label, words }),
        }
    }

    pub fn id(&self) -> u64 {
        self.storage.id
    }

    pub fn label(&self) -> &'static str {
        self.storage.label
    }

    /// Returns the length in words.
    pub fn len(&self) -> usize {
        self.storage.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.words.is_empty()
    }

    pub(crate) fn words(&self) -> &[AtomicU64] {
        &self.storage.words
    }

    /// Returns a reference for a running dispatch to hold on to.
    pub(crate) fn share(&self) -> Arc<BufferStorage> {
        Arc::clone(&self.storage)
    }

    /// Returns `true` if no running dispatch holds a reference to this buffer.
    pub(crate) fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.storage) == 1
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("len", &self.len())
            .finish()
    }
}
