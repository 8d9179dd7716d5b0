//! The device a table lives on.
//!
//! A [`Device`] owns buffers of 64-bit atomic words and runs dispatches: a
//! kernel invoked once per invocation index, in no particular order, against a
//! list of bound buffers. Execution is split-phase. [`Device::submit`] starts a
//! dispatch and returns a [`PendingDispatch`]; [`Device::wait`] blocks until
//! every invocation has finished.
//!
//! A `Dispatch` borrows the buffers it binds, and the `PendingDispatch` it turns
//! into keeps that borrow alive until it is waited on. Destroying a buffer
//! takes it by value, so destroying a buffer that a pending dispatch may still
//! touch does not compile.
//!
//! ```rust
//! use accel_hashbench::{device::Dispatch, kernel::KernelSource, CpuDevice, Device};
//!
//! # fn main() -> Result<(), accel_hashbench::DeviceError> {
//! let device = CpuDevice::new(1)?;
//! let pipeline = device.compile(KernelSource::LinearProbingOps)?;
//! let metadata = device.create_buffer("metadata", 32)?;
//! let counters = device.create_buffer("counters", 32)?;
//! let table = device.create_buffer("table", 8)?;
//!
//! let dispatch = Dispatch::new(&pipeline, 0)
//!     .bind(&metadata)
//!     .bind(&counters)
//!     .bind(&table);
//! let pending = device.submit(dispatch)?;
//! // Destroying `table` here would not compile.
//! device.wait(pending)?;
//! for buffer in [metadata, counters, table] {
//!     device.destroy_buffer(buffer);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ```compile_fail
//! use accel_hashbench::{device::Dispatch, kernel::KernelSource, CpuDevice, Device};
//!
//! let device = CpuDevice::new(1).unwrap();
//! let pipeline = device.compile(KernelSource::LinearProbingOps).unwrap();
//! let metadata = device.create_buffer("metadata", 32).unwrap();
//! let counters = device.create_buffer("counters", 32).unwrap();
//! let table = device.create_buffer("table", 8).unwrap();
//!
//! let dispatch = Dispatch::new(&pipeline, 0)
//!     .bind(&metadata)
//!     .bind(&counters)
//!     .bind(&table);
//! let pending = device.submit(dispatch).unwrap();
//! device.destroy_buffer(table);
//! device.wait(pending).unwrap();
//! ```
//!
//! [`Device`]: ./trait.Device.html
//! [`Device::submit`]: ./trait.Device.html#tymethod.submit
//! [`Device::wait`]: ./trait.Device.html#method.wait
//! [`PendingDispatch`]: ./struct.PendingDispatch.html

pub mod buffer;
pub mod cpu;

pub use buffer::DeviceBuffer;

use std::{
    fmt,
    marker::PhantomData,
    sync::{atomic::AtomicU64, Arc},
};

use crossbeam_channel::Receiver;
use smallvec::SmallVec;

use crate::{common::error::DeviceError, kernel::KernelSource};

use self::buffer::BufferStorage;

/// The device backend.
pub trait Device {
    /// Creates a zeroed buffer of `len` words.
    fn create_buffer(&self, label: &'static str, len: usize) -> Result<DeviceBuffer, DeviceError>;

    /// Creates a buffer holding `contents`.
    fn create_buffer_init(
        &self,
        label: &'static str,
        contents: &[u64],
    ) -> Result<DeviceBuffer, DeviceError>;

    /// Copies the contents of a buffer back to the host.
    fn read_buffer(&self, buffer: &DeviceBuffer) -> Result<Vec<u64>, DeviceError>;

    /// Destroys a buffer.
    ///
    /// # Panics
    ///
    /// Panics if a dispatch that has not been waited on still references the
    /// buffer.
    fn destroy_buffer(&self, buffer: DeviceBuffer);

    /// Compiles a kernel into a pipeline that can be dispatched.
    fn compile(&self, source: KernelSource) -> Result<Pipeline, DeviceError>;

    /// Starts a dispatch. It runs to completion whether or not it is waited on.
    fn submit<'g>(&self, dispatch: Dispatch<'g>) -> Result<PendingDispatch<'g>, DeviceError>;

    /// Blocks until every invocation of the dispatch has finished.
    fn wait(&self, pending: PendingDispatch<'_>) -> Result<(), DeviceError> {
        pending.wait()
    }
}

/// A data-parallel program run once per invocation of a dispatch.
pub trait Kernel: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The number of buffers a dispatch of this kernel must bind.
    fn binding_count(&self) -> usize;

    /// Runs one invocation. Invocations of a dispatch run concurrently and in
    /// no particular order.
    fn invoke(&self, invocation: u32, bindings: &Bindings<'_>);
}

/// A compiled kernel.
#[derive(Clone)]
pub struct Pipeline {
    kernel: Arc<dyn Kernel>,
}

impl Pipeline {
    pub fn new(kernel: impl Kernel) -> Self {
        Self {
            kernel: Arc::new(kernel),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kernel.name()
    }

    pub(crate) fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("kernel", &self.name())
            .finish()
    }
}

/// The buffers bound to a dispatch, as seen by a kernel invocation.
pub struct Bindings<'a> {
    buffers: &'a [Arc<BufferStorage>],
}

impl<'a> Bindings<'a> {
    pub(crate) fn new(buffers: &'a [Arc<BufferStorage>]) -> Self {
        Self { buffers }
    }

    /// Returns the words of the buffer bound at `index`.
    ///
    /// # Panics
    ///
    /// Panics if nothing is bound at `index`.
    pub fn get(&self, index: usize) -> &'a [AtomicU64] {
        self.buffers[index].words()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// A dispatch that has not been submitted yet.
pub struct Dispatch<'g> {
    pipeline: Pipeline,
    bindings: SmallVec<[&'g DeviceBuffer; 8]>,
    invocations: u32,
}

impl<'g> Dispatch<'g> {
    pub fn new(pipeline: &Pipeline, invocations: u32) -> Self {
        Self {
            pipeline: pipeline.clone(),
            bindings: SmallVec::new(),
            invocations,
        }
    }

    /// Binds `buffer` at the next binding index.
    pub fn bind(mut self, buffer: &'g DeviceBuffer) -> Self {
        self.bindings.push(buffer);
        self
    }

    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub(crate) fn bindings(&self) -> &[&'g DeviceBuffer] {
        &self.bindings
    }
}

/// A submitted dispatch.
///
/// Holds the borrow of every buffer the dispatch binds until it is passed to
/// [`Device::wait`](./trait.Device.html#method.wait).
#[must_use = "a dispatch must be waited on before its buffers can be destroyed"]
pub struct PendingDispatch<'g> {
    kernel: &'static str,
    completion: Receiver<Result<(), DeviceError>>,
    _bindings: PhantomData<&'g DeviceBuffer>,
}

impl<'g> PendingDispatch<'g> {
    pub(crate) fn new(kernel: &'static str, completion: Receiver<Result<(), DeviceError>>) -> Self {
        Self {
            kernel,
            completion,
            _bindings: PhantomData,
        }
    }

    pub fn kernel(&self) -> &'static str {
        self.kernel
    }

    fn wait(self) -> Result<(), DeviceError> {
        match self.completion.recv() {
            Ok(status) => status,
            // The device went away without reporting completion.
            Err(_) => Err(DeviceError::DeviceLost {
                kernel: self.kernel,
            }),
        }
    }
}
