//! Memory strategies for device-resident copies.
//!
//! A DEVICE buffer keeps a host mirror of its elements. A [`MemoryStrategy`]
//! allocates device copies of strided regions of that mirror, copies them
//! back, and frees them. Copies are indexed by [`DeviceKey`], so one logical
//! buffer may have an independent copy per execution context (thread).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ndengine_traits::DataType;
use parking_lot::Mutex;

use crate::buffer::{AllocationMode, DataBuffer};
use crate::{BufferError, Result};

/// Index of one device copy: calling context plus the element region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub context: ThreadId,
    pub offset: usize,
    pub length: usize,
    pub stride: usize,
}

impl DeviceKey {
    /// Key for the calling thread.
    pub fn current(offset: usize, length: usize, stride: usize) -> Self {
        Self {
            context: thread::current().id(),
            offset,
            length,
            stride,
        }
    }
}

/// Opaque handle to a device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePointer {
    pub handle: u64,
    pub offset: usize,
    pub length: usize,
    pub stride: usize,
    pub byte_len: usize,
}

/// Host-resident location of a buffer region after a device-to-host copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPointer {
    pub buffer_id: u64,
    pub byte_offset: usize,
    pub byte_len: usize,
}

/// Backend policy for non-heap storage.
pub trait MemoryStrategy: Send + Sync + fmt::Debug {
    /// Allocates a device copy of elements `offset, offset + stride, ...`
    /// (`length` of them) and uploads the host values.
    fn alloc(
        &self,
        buffer: &DataBuffer,
        stride: usize,
        offset: usize,
        length: usize,
    ) -> Result<DevicePointer>;

    /// Copies the calling context's device copy starting at `offset` back into
    /// the host mirror and returns the host location.
    fn copy_to_host(&self, buffer: &DataBuffer, offset: usize) -> Result<HostPointer>;

    /// Frees the calling context's device copies of `(offset, length)`.
    fn free(&self, buffer: &DataBuffer, offset: usize, length: usize) -> Result<()>;

    /// Releases one allocation regardless of context.
    fn release(&self, pointer: &DevicePointer) -> Result<()>;

    /// Raw device bytes of an allocation.
    fn read_device(&self, pointer: &DevicePointer) -> Result<Vec<u8>>;

    /// Overwrites device bytes starting at `byte_offset`.
    fn write_device(&self, pointer: &DevicePointer, byte_offset: usize, bytes: &[u8])
        -> Result<()>;
}

/// Per-buffer table of device copies.
pub(crate) struct DeviceState {
    pub(crate) strategy: Arc<dyn MemoryStrategy>,
    pointers: Mutex<HashMap<DeviceKey, DevicePointer>>,
}

impl DeviceState {
    pub(crate) fn new(strategy: Arc<dyn MemoryStrategy>) -> Self {
        Self {
            strategy,
            pointers: Mutex::new(HashMap::new()),
        }
    }
}

impl DataBuffer {
    fn device_state(&self, operation: &'static str) -> Result<&DeviceState> {
        self.device.as_ref().ok_or(BufferError::UnsupportedLayout {
            operation,
            mode: self.mode,
        })
    }

    pub fn memory_strategy(&self) -> Option<&Arc<dyn MemoryStrategy>> {
        self.device.as_ref().map(|d| &d.strategy)
    }

    /// Returns the calling context's device copy of the region, allocating it
    /// on first use.
    pub fn alloc_device(&self, stride: usize, offset: usize, length: usize) -> Result<DevicePointer> {
        let state = self.device_state("device allocation")?;
        let key = DeviceKey::current(offset, length, stride);
        if let Some(existing) = state.pointers.lock().get(&key) {
            return Ok(*existing);
        }
        let pointer = state.strategy.alloc(self, stride, offset, length)?;
        state.pointers.lock().insert(key, pointer);
        tracing::debug!(
            buffer = self.id,
            offset,
            length,
            stride,
            bytes = pointer.byte_len,
            "device copy allocated"
        );
        Ok(pointer)
    }

    pub fn copy_to_host(&self, offset: usize) -> Result<HostPointer> {
        let state = self.device_state("copy to host")?;
        state.strategy.copy_to_host(self, offset)
    }

    pub fn free_device(&self, offset: usize, length: usize) -> Result<()> {
        let state = self.device_state("device free")?;
        state.strategy.free(self, offset, length)
    }

    pub fn device_pointer(&self, key: &DeviceKey) -> Option<DevicePointer> {
        self.device
            .as_ref()
            .and_then(|d| d.pointers.lock().get(key).copied())
    }

    /// Number of live device copies across all contexts.
    pub fn device_copies(&self) -> usize {
        self.device.as_ref().map_or(0, |d| d.pointers.lock().len())
    }

    /// Removes the table entries matching the calling context and region.
    pub fn take_device_pointers(&self, offset: usize, length: usize) -> Vec<DevicePointer> {
        let Some(state) = self.device.as_ref() else {
            return Vec::new();
        };
        let context = thread::current().id();
        let mut table = state.pointers.lock();
        let keys: Vec<DeviceKey> = table
            .keys()
            .filter(|k| k.context == context && k.offset == offset && k.length == length)
            .copied()
            .collect();
        keys.iter().filter_map(|k| table.remove(k)).collect()
    }

    /// Writes raw element bytes back into the host mirror at elements
    /// `start, start + stride, ...`.
    pub fn write_host_elements(&self, start: usize, stride: usize, bytes: &[u8]) -> Result<()> {
        let es = self.element_size();
        let count = bytes.len() / es;
        if count > 0 && start + (count - 1) * stride >= self.length {
            return Err(BufferError::IndexOutOfBounds {
                index: start + (count - 1) * stride,
                length: self.length,
            });
        }
        let mut storage = self.live_mut()?;
        for (k, chunk) in bytes.chunks_exact(es).enumerate() {
            let i = start + k * stride;
            let value = match self.dtype {
                DataType::Float => bytemuck::pod_read_unaligned::<f32>(chunk) as f64,
                DataType::Double => bytemuck::pod_read_unaligned::<f64>(chunk),
                DataType::Int => bytemuck::pod_read_unaligned::<i32>(chunk) as f64,
            };
            storage.put(i, self.dtype, value);
        }
        Ok(())
    }

    pub(crate) fn release_device_copies(&self) {
        let Some(state) = self.device.as_ref() else {
            return;
        };
        let drained: Vec<DevicePointer> = state.pointers.lock().drain().map(|(_, p)| p).collect();
        for pointer in drained {
            if let Err(err) = state.strategy.release(&pointer) {
                tracing::warn!(buffer = self.id, handle = pointer.handle, %err, "failed to release device copy");
            }
        }
    }
}

/// Reference strategy whose device memory is host-resident pages.
///
/// Useful for exercising the DEVICE code paths without an accelerator. An
/// optional capacity makes allocations fail with
/// [`BufferError::DeviceOutOfMemory`].
#[derive(Debug, Default)]
pub struct PageableHostStrategy {
    pages: Mutex<HashMap<u64, Vec<u8>>>,
    next_handle: AtomicU64,
    used: AtomicUsize,
    capacity: Option<usize>,
}

impl PageableHostStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy that refuses allocations beyond `bytes` in total.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::default()
        }
    }

    pub fn bytes_in_use(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn allocations(&self) -> usize {
        self.pages.lock().len()
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            if let Some(capacity) = self.capacity {
                let available = capacity.saturating_sub(current);
                if bytes > available {
                    return Err(BufferError::DeviceOutOfMemory {
                        requested: bytes,
                        available,
                    });
                }
            }
            match self.used.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

impl MemoryStrategy for PageableHostStrategy {
    fn alloc(
        &self,
        buffer: &DataBuffer,
        stride: usize,
        offset: usize,
        length: usize,
    ) -> Result<DevicePointer> {
        if buffer.allocation_mode() != AllocationMode::Device {
            return Err(BufferError::UnsupportedLayout {
                operation: "device allocation",
                mode: buffer.allocation_mode(),
            });
        }
        if stride == 0 {
            return Err(BufferError::InvalidArgument("stride must be positive".into()));
        }
        let out_of_range = |index: usize| BufferError::IndexOutOfBounds {
            index,
            length: buffer.len(),
        };
        if length > 0 {
            let last = (length - 1)
                .checked_mul(stride)
                .and_then(|span| span.checked_add(offset))
                .ok_or_else(|| out_of_range(usize::MAX))?;
            if last >= buffer.len() {
                return Err(out_of_range(last));
            }
        }
        let es = buffer.element_size();
        let byte_len = length
            .checked_mul(es)
            .ok_or_else(|| BufferError::InvalidArgument("allocation size overflows".into()))?;

        let mut page = Vec::with_capacity(byte_len);
        if stride == 1 {
            page.extend(buffer.element_range_bytes(offset, length)?);
        } else {
            for k in 0..length {
                page.extend(buffer.element_range_bytes(offset + k * stride, 1)?);
            }
        }
        // Only a completed copy holds capacity.
        self.reserve(byte_len)?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.pages.lock().insert(handle, page);
        Ok(DevicePointer {
            handle,
            offset,
            length,
            stride,
            byte_len,
        })
    }

    fn copy_to_host(&self, buffer: &DataBuffer, offset: usize) -> Result<HostPointer> {
        if offset > buffer.len() {
            return Err(BufferError::IndexOutOfBounds {
                index: offset,
                length: buffer.len(),
            });
        }
        let es = buffer.element_size();
        let length = buffer.len() - offset;
        let key = DeviceKey::current(offset, length, 1);
        if let Some(pointer) = buffer.device_pointer(&key) {
            let bytes = self.read_device(&pointer)?;
            buffer.write_host_elements(pointer.offset, pointer.stride, &bytes)?;
            tracing::trace!(buffer = buffer.id(), offset, bytes = bytes.len(), "device to host copy");
        }
        Ok(HostPointer {
            buffer_id: buffer.id(),
            byte_offset: offset * es,
            byte_len: length * es,
        })
    }

    fn free(&self, buffer: &DataBuffer, offset: usize, length: usize) -> Result<()> {
        let pointers = buffer.take_device_pointers(offset, length);
        if pointers.is_empty() {
            return Err(BufferError::DevicePointerMissing { offset, length });
        }
        for pointer in &pointers {
            self.release(pointer)?;
        }
        tracing::debug!(buffer = buffer.id(), offset, length, freed = pointers.len(), "device copies freed");
        Ok(())
    }

    fn release(&self, pointer: &DevicePointer) -> Result<()> {
        match self.pages.lock().remove(&pointer.handle) {
            Some(page) => {
                self.used.fetch_sub(page.len(), Ordering::AcqRel);
                Ok(())
            }
            None => Err(BufferError::DevicePointerMissing {
                offset: pointer.offset,
                length: pointer.length,
            }),
        }
    }

    fn read_device(&self, pointer: &DevicePointer) -> Result<Vec<u8>> {
        self.pages
            .lock()
            .get(&pointer.handle)
            .cloned()
            .ok_or(BufferError::DevicePointerMissing {
                offset: pointer.offset,
                length: pointer.length,
            })
    }

    fn write_device(&self, pointer: &DevicePointer, byte_offset: usize, bytes: &[u8]) -> Result<()> {
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(&pointer.handle)
            .ok_or(BufferError::DevicePointerMissing {
                offset: pointer.offset,
                length: pointer.length,
            })?;
        let end = byte_offset + bytes.len();
        if end > page.len() {
            return Err(BufferError::InvalidArgument(format!(
                "device write of {} bytes at {} exceeds allocation of {}",
                bytes.len(),
                byte_offset,
                page.len()
            )));
        }
        page[byte_offset..end].copy_from_slice(bytes);
        Ok(())
    }
}
