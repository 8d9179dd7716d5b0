//! A device that runs dispatches on a pool of host threads.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use rayon::{
    iter::MinLen,
    prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator},
    ThreadPool, ThreadPoolBuilder,
};
use smallvec::SmallVec;

use super::{
    buffer::BufferStorage, Bindings, Device, DeviceBuffer, Dispatch, PendingDispatch, Pipeline,
};
use crate::{
    common::{constants::DISPATCH_CHUNK_SIZE, error::DeviceError},
    kernel::KernelSource,
};

const WORKER_NAME_PREFIX: &str = "hashbench-worker-";

/// A [`Device`](../trait.Device.html) backed by host memory and a fixed pool
/// of worker threads.
///
/// The invocations of a dispatch are split across every worker of the pool,
/// so they run concurrently and interleave freely.
pub struct CpuDevice {
    pool: ThreadPool,
    live_buffers: Mutex<HashMap<u64, LiveBuffer>>,
    next_buffer_id: AtomicU64,
}

#[derive(Clone, Copy, Debug)]
struct LiveBuffer {
    label: &'static str,
    len: usize,
}

/// The invocation indices of a dispatch, split into chunks of at least
/// `DISPATCH_CHUNK_SIZE`.
fn invocation_indices(invocations: u32) -> MinLen<rayon::range::Iter<u32>> {
    (0..invocations)
        .into_par_iter()
        .with_min_len(DISPATCH_CHUNK_SIZE)
}

impl CpuDevice {
    /// Creates a device with `num_workers` threads. `0` uses one thread per
    /// available CPU.
    pub fn new(num_workers: usize) -> Result<Self, DeviceError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("{WORKER_NAME_PREFIX}{i}"))
            .build()
            .map_err(|e| DeviceError::Unavailable(format!("cannot start worker threads: {e}")))?;

        log::debug!(
            "CPU device ready with {} worker thread(s)",
            pool.current_num_threads()
        );

        Ok(Self {
            pool,
            live_buffers: Mutex::new(HashMap::new()),
            next_buffer_id: AtomicU64::new(1),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Returns the number of buffers created and not yet destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.lock().len()
    }

    /// Returns the total length, in words, of all live buffers.
    pub fn live_buffer_words(&self) -> usize {
        self.live_buffers.lock().values().map(|b| b.len).sum()
    }

    fn register(&self, label: &'static str, words: Box<[AtomicU64]>) -> DeviceBuffer {
        let id = self.next_buffer_id.fetch_add(1, Ordering::Relaxed);
        let len = words.len();
        self.live_buffers.lock().insert(id, LiveBuffer { label, len });
        log::trace!("created buffer #{id} `{label}` ({len} words)");
        DeviceBuffer::new(id, label, words)
    }
}

impl Device for CpuDevice {
    fn create_buffer(&self, label: &'static str, len: usize) -> Result<DeviceBuffer, DeviceError> {
        let words = (0..len).map(|_| AtomicU64::new(0)).collect();
        Ok(self.register(label, words))
    }

    fn create_buffer_init(
        &self,
        label: &'static str,
        contents: &[u64],
    ) -> Result<DeviceBuffer, DeviceError> {
        let words = contents.iter().map(|&w| AtomicU64::new(w)).collect();
        Ok(self.register(label, words))
    }

    fn read_buffer(&self, buffer: &DeviceBuffer) -> Result<Vec<u64>, DeviceError> {
        Ok(buffer
            .words()
            .iter()
            .map(|w| w.load(Ordering::Acquire))
            .collect())
    }

    fn destroy_buffer(&self, buffer: DeviceBuffer) {
        assert!(
            buffer.is_exclusive(),
            "buffer #{} `{}` destroyed while a dispatch still references it",
            buffer.id(),
            buffer.label()
        );
        self.live_buffers.lock().remove(&buffer.id());
        log::trace!("destroyed buffer #{} `{}`", buffer.id(), buffer.label());
    }

    fn compile(&self, source: KernelSource) -> Result<Pipeline, DeviceError> {
        let pipeline = source.instantiate();
        log::debug!("compiled kernel `{}`", pipeline.name());
        Ok(pipeline)
    }

    fn submit<'g>(&self, dispatch: Dispatch<'g>) -> Result<PendingDispatch<'g>, DeviceError> {
        let kernel = Arc::clone(dispatch.pipeline().kernel());
        let name = kernel.name();
        let expected = kernel.binding_count();
        let actual = dispatch.bindings().len();
        if expected != actual {
            return Err(DeviceError::BindingMismatch {
                kernel: name,
                expected,
                actual,
            });
        }

        let (done, completion) = crossbeam_channel::bounded(1);
        let invocations = dispatch.invocations();
        if invocations == 0 {
            let _ = done.send(Ok(()));
            return Ok(PendingDispatch::new(name, completion));
        }

        let bindings: SmallVec<[Arc<BufferStorage>; 8]> =
            dispatch.bindings().iter().map(|b| b.share()).collect();

        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let views = Bindings::new(&bindings);
                invocation_indices(invocations).for_each(|i| kernel.invoke(i, &views));
            }));
            // Release the bound buffers before reporting, so that the host may
            // destroy them as soon as the dispatch is complete.
            drop(bindings);
            let status = result.map_err(|_| DeviceError::DispatchPanicked { kernel: name });
            // The receiver may be gone if the pending dispatch was leaked.
            let _ = done.send(status);
        });

        log::trace!("submitted `{name}` with {invocations} invocation(s)");
        Ok(PendingDispatch::new(name, completion))
    }
}

impl Drop for CpuDevice {
    fn drop(&mut self) {
        let live = self.live_buffers.get_mut();
        if !live.is_empty() {
            log::warn!(
                "CPU device dropped with {} buffer(s) never destroyed: {:?}",
                live.len(),
                live.values().map(|b| b.label).collect::<Vec<_>>()
            );
        }
    }
}
