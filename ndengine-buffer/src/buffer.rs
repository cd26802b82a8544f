//! The `DataBuffer` type.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use ndengine_traits::{DataType, Element};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::{DeviceState, MemoryStrategy, PageableHostStrategy};
use crate::storage::Storage;
use crate::{BufferError, Result, EPS_THRESHOLD};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Where a buffer's elements physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllocationMode {
    /// A typed vector owned by the buffer.
    #[default]
    Heap,
    /// Byte-addressed storage outside the typed heap representation.
    Direct,
    /// Host mirror plus device copies managed by a [`MemoryStrategy`].
    Device,
}

impl AllocationMode {
    pub const fn tag(self) -> u8 {
        match self {
            AllocationMode::Heap => 0,
            AllocationMode::Direct => 1,
            AllocationMode::Device => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AllocationMode::Heap),
            1 => Some(AllocationMode::Direct),
            2 => Some(AllocationMode::Device),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AllocationMode::Heap => "HEAP",
            AllocationMode::Direct => "DIRECT",
            AllocationMode::Device => "DEVICE",
        }
    }
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AllocationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heap" => Ok(AllocationMode::Heap),
            "direct" => Ok(AllocationMode::Direct),
            "device" => Ok(AllocationMode::Device),
            other => Err(format!("unknown allocation mode '{other}'")),
        }
    }
}

/// Fixed-length typed storage shared by every view that aliases it.
///
/// All element access is bounds-checked and converts between the stored
/// dtype and the requested [`Element`] type. Interior locking makes a buffer
/// `Sync`; views wrap it in an `Arc`, so its lifetime is the union of all
/// holders plus [`destroy`](Self::destroy).
pub struct DataBuffer {
    pub(crate) id: u64,
    pub(crate) length: usize,
    pub(crate) dtype: DataType,
    pub(crate) mode: AllocationMode,
    pub(crate) storage: RwLock<Storage>,
    persist: AtomicBool,
    referencing: Mutex<HashSet<u64>>,
    pub(crate) device: Option<DeviceState>,
}

impl DataBuffer {
    pub(crate) fn from_storage(
        length: usize,
        dtype: DataType,
        mode: AllocationMode,
        storage: Storage,
        strategy: Option<Arc<dyn MemoryStrategy>>,
    ) -> Self {
        let device = match mode {
            AllocationMode::Device => Some(DeviceState::new(
                strategy.unwrap_or_else(|| Arc::new(PageableHostStrategy::new())),
            )),
            _ => None,
        };
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, AtomicOrdering::Relaxed),
            length,
            dtype,
            mode,
            storage: RwLock::new(storage),
            persist: AtomicBool::new(false),
            referencing: Mutex::new(HashSet::new()),
            device,
        }
    }

    /// Zero-filled buffer of `length` elements.
    pub fn new(length: usize, dtype: DataType, mode: AllocationMode) -> Self {
        Self::from_storage(length, dtype, mode, Storage::zeroed(length, dtype, mode), None)
    }

    /// Zero-filled DEVICE buffer whose device copies are managed by `strategy`.
    pub fn with_strategy(length: usize, dtype: DataType, strategy: Arc<dyn MemoryStrategy>) -> Self {
        let mode = AllocationMode::Device;
        Self::from_storage(
            length,
            dtype,
            mode,
            Storage::zeroed(length, dtype, mode),
            Some(strategy),
        )
    }

    /// Takes ownership of `data`. HEAP buffers keep the vector without copying.
    pub fn from_vec<T: Element>(data: Vec<T>, mode: AllocationMode) -> Self {
        let length = data.len();
        Self::from_storage(length, T::DTYPE, mode, Storage::from_vec(data, mode), None)
    }

    /// Copies `data` into a new buffer of type `dtype`.
    pub fn from_slice<T: Element>(data: &[T], dtype: DataType, mode: AllocationMode) -> Self {
        Self::from_storage(
            data.len(),
            dtype,
            mode,
            Storage::from_slice(data, dtype, mode),
            None,
        )
    }

    /// Process-unique identifier.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.dtype.element_size()
    }

    #[inline]
    pub fn allocation_mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn is_destroyed(&self) -> bool {
        self.storage.read().is_released()
    }

    /// Exempt this buffer from backend eviction.
    pub fn persist(&self) {
        self.persist.store(true, AtomicOrdering::Release);
    }

    pub fn unpersist(&self) {
        self.persist.store(false, AtomicOrdering::Release);
    }

    pub fn is_persist(&self) -> bool {
        self.persist.load(AtomicOrdering::Acquire)
    }

    /// Records that the owner `id` (usually a view) depends on this buffer.
    pub fn add_referencing(&self, id: u64) {
        self.referencing.lock().insert(id);
    }

    pub fn remove_referencing(&self, id: u64) {
        self.referencing.lock().remove(&id);
    }

    /// Identifiers of the current referencing owners, sorted.
    pub fn references(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.referencing.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn live(&self) -> Result<RwLockReadGuard<'_, Storage>> {
        let guard = self.storage.read_recursive();
        if guard.is_released() {
            return Err(BufferError::Destroyed);
        }
        Ok(guard)
    }

    pub(crate) fn live_mut(&self) -> Result<RwLockWriteGuard<'_, Storage>> {
        let guard = self.storage.write();
        if guard.is_released() {
            return Err(BufferError::Destroyed);
        }
        Ok(guard)
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.length {
            return Err(BufferError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Reads element `index` converted to `T`.
    pub fn get<T: Element>(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        Ok(self.live()?.get(index, self.dtype))
    }

    pub fn get_double(&self, index: usize) -> Result<f64> {
        self.get(index)
    }

    pub fn get_float(&self, index: usize) -> Result<f32> {
        self.get(index)
    }

    pub fn get_int(&self, index: usize) -> Result<i32> {
        self.get(index)
    }

    /// Writes `value` at `index`, narrowing to the stored dtype.
    pub fn put<T: Element>(&self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        self.live_mut()?.put(index, self.dtype, value);
        Ok(())
    }

    /// Reads up to `count` elements starting at `offset` with step `inc`.
    ///
    /// The count is clamped to the elements that exist.
    pub fn get_doubles_at(&self, offset: usize, inc: usize, count: usize) -> Result<Vec<f64>> {
        if inc == 0 {
            return Err(BufferError::InvalidArgument("increment must be positive".into()));
        }
        if offset > self.length {
            return Err(BufferError::IndexOutOfBounds {
                index: offset,
                length: self.length,
            });
        }
        let available = (self.length - offset).div_ceil(inc);
        let count = count.min(available);
        let storage = self.live()?;
        Ok((0..count)
            .map(|i| storage.get::<f64>(offset + i * inc, self.dtype))
            .collect())
    }

    /// Bulk scatter of `values` into `indices`, visiting every `increment`-th pair.
    ///
    /// DEVICE buffers only accept contiguous assignment, written from
    /// `indices[0]` onward. Validation happens before any element is written.
    pub fn assign<T: Element>(
        &self,
        indices: &[usize],
        values: &[T],
        contiguous: bool,
        increment: usize,
    ) -> Result<()> {
        if indices.len() != values.len() {
            return Err(BufferError::LengthMismatch {
                indices: indices.len(),
                values: values.len(),
            });
        }
        if indices.len() > self.length {
            return Err(BufferError::InvalidArgument(format!(
                "more elements than space to assign: buffer length {}, got {}",
                self.length,
                values.len()
            )));
        }
        if increment == 0 {
            return Err(BufferError::InvalidArgument("increment must be positive".into()));
        }
        if values.is_empty() {
            return Ok(());
        }

        if self.mode == AllocationMode::Device {
            if !contiguous {
                return Err(BufferError::UnsupportedLayout {
                    operation: "non-contiguous assign",
                    mode: self.mode,
                });
            }
            let start = indices[0];
            self.check_index(start + values.len() - 1)?;
            let mut storage = self.live_mut()?;
            for i in (0..values.len()).step_by(increment) {
                storage.put(start + i, self.dtype, values[i]);
            }
            return Ok(());
        }

        for i in (0..indices.len()).step_by(increment) {
            self.check_index(indices[i])?;
        }
        let mut storage = self.live_mut()?;
        for i in (0..indices.len()).step_by(increment) {
            storage.put(indices[i], self.dtype, values[i]);
        }
        Ok(())
    }

    /// Sets every element to `value`.
    pub fn assign_scalar<T: Element>(&self, value: T) -> Result<()> {
        let mut storage = self.live_mut()?;
        for i in 0..self.length {
            storage.put(i, self.dtype, value);
        }
        Ok(())
    }

    /// Copies every element of `other`, which must have the same length.
    pub fn assign_buffer(&self, other: &DataBuffer) -> Result<()> {
        if other.length != self.length {
            return Err(BufferError::InvalidArgument(format!(
                "unable to assign buffer of length {} to buffer of length {}",
                other.length, self.length
            )));
        }
        let values: Vec<f64> = other.to_vec()?;
        let mut storage = self.live_mut()?;
        for (i, v) in values.into_iter().enumerate() {
            storage.put(i, self.dtype, v);
        }
        Ok(())
    }

    /// Fills this buffer with the concatenated strided reads of `buffers`.
    ///
    /// Buffer `k` contributes elements `offsets[k], offsets[k] + strides[k], ...`.
    /// The total count must equal this buffer's length.
    pub fn assign_strided(
        &self,
        offsets: &[usize],
        strides: &[usize],
        buffers: &[&DataBuffer],
    ) -> Result<()> {
        if offsets.len() != strides.len() || strides.len() != buffers.len() {
            return Err(BufferError::InvalidArgument(
                "offsets, strides and buffers must have equal lengths".into(),
            ));
        }
        if strides.contains(&0) {
            return Err(BufferError::InvalidArgument("stride must be positive".into()));
        }
        let mut gathered = Vec::with_capacity(self.length);
        for ((&offset, &stride), buffer) in offsets.iter().zip(strides).zip(buffers) {
            let storage = buffer.live()?;
            gathered.extend(
                (offset..buffer.length)
                    .step_by(stride)
                    .map(|j| storage.get::<f64>(j, buffer.dtype)),
            );
        }
        if gathered.len() != self.length {
            return Err(BufferError::InvalidArgument(format!(
                "strides and offsets produced {} elements, expected {}",
                gathered.len(),
                self.length
            )));
        }
        let mut storage = self.live_mut()?;
        for (i, v) in gathered.into_iter().enumerate() {
            storage.put(i, self.dtype, v);
        }
        Ok(())
    }

    /// Typed view of all elements.
    ///
    /// HEAP buffers whose dtype matches `T` are borrowed in place; every other
    /// combination materializes a fresh vector. Callers must not rely on which
    /// one happened. The borrow holds a shared lock until dropped.
    pub fn as_typed_array<T: Element>(&self) -> Result<TypedArray<'_, T>> {
        let guard = self.live()?;
        if self.mode == AllocationMode::Heap {
            match RwLockReadGuard::try_map(guard, |s| s.typed_slice::<T>()) {
                Ok(mapped) => return Ok(TypedArray::Borrowed(mapped)),
                Err(guard) => return Ok(TypedArray::Owned(collect(&guard, self))),
            }
        }
        Ok(TypedArray::Owned(collect(&guard, self)))
    }

    /// All elements converted to `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let guard = self.live()?;
        Ok(collect(&guard, self))
    }

    /// Shared access for batched reads. Nothing is copied; elements convert
    /// to the requested type one at a time.
    pub fn reader(&self) -> Result<BufferReader<'_>> {
        Ok(BufferReader {
            guard: self.live()?,
            length: self.length,
            dtype: self.dtype,
        })
    }

    /// Exclusive access for batched writes.
    pub fn writer(&self) -> Result<BufferWriter<'_>> {
        Ok(BufferWriter {
            guard: self.live_mut()?,
            length: self.length,
            dtype: self.dtype,
        })
    }

    /// Element bytes in native byte order, logical index order.
    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.live()?.element_bytes())
    }

    pub(crate) fn element_range_bytes(&self, start: usize, count: usize) -> Result<Vec<u8>> {
        Ok(self.live()?.byte_range(start, count, self.dtype))
    }

    /// Deep copy preserving dtype and allocation mode. Device copies are not
    /// duplicated; the copy shares the memory strategy.
    pub fn dup(&self) -> Result<DataBuffer> {
        let storage = self.live()?.clone();
        let strategy = self.device.as_ref().map(|d| Arc::clone(&d.strategy));
        Ok(Self::from_storage(self.length, self.dtype, self.mode, storage, strategy))
    }

    /// Element-wise comparison within `eps`. Different lengths are unequal.
    pub fn approx_eq(&self, other: &DataBuffer, eps: f64) -> bool {
        if self.length != other.length {
            return false;
        }
        if self.id == other.id {
            return true;
        }
        let (Ok(a), Ok(b)) = (self.live(), other.live()) else {
            return false;
        };
        (0..self.length).all(|i| {
            let x = a.get::<f64>(i, self.dtype);
            let y = b.get::<f64>(i, other.dtype);
            (x - y).abs() <= eps
        })
    }

    /// Releases storage and every device copy. Later access fails with
    /// [`BufferError::Destroyed`].
    pub fn destroy(&self) -> Result<()> {
        self.release_device_copies();
        let mut storage = self.storage.write();
        if storage.is_released() {
            return Err(BufferError::Destroyed);
        }
        *storage = Storage::Released;
        tracing::debug!(buffer = self.id, length = self.length, "buffer destroyed");
        Ok(())
    }
}

fn collect<T: Element>(storage: &Storage, buffer: &DataBuffer) -> Vec<T> {
    (0..buffer.length)
        .map(|i| storage.get::<T>(i, buffer.dtype))
        .collect()
}

impl Drop for DataBuffer {
    fn drop(&mut self) {
        self.release_device_copies();
    }
}

impl PartialEq for DataBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, EPS_THRESHOLD)
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer")
            .field("id", &self.id)
            .field("length", &self.length)
            .field("dtype", &self.dtype)
            .field("mode", &self.mode)
            .finish()
    }
}

impl fmt::Display for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(storage) = self.live() else {
            return f.write_str("[destroyed]");
        };
        f.write_str("[")?;
        for i in 0..self.length {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", storage.get::<f64>(i, self.dtype))?;
        }
        f.write_str("]")
    }
}

/// Elements of a buffer as `&[T]`, borrowed or materialized.
pub enum TypedArray<'a, T> {
    Borrowed(MappedRwLockReadGuard<'a, [T]>),
    Owned(Vec<T>),
}

impl<T> TypedArray<'_, T> {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, TypedArray::Borrowed(_))
    }
}

impl<T> Deref for TypedArray<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            TypedArray::Borrowed(guard) => guard,
            TypedArray::Owned(v) => v,
        }
    }
}

/// Read access to a buffer held across several loads.
pub struct BufferReader<'a> {
    guard: RwLockReadGuard<'a, Storage>,
    length: usize,
    dtype: DataType,
}

impl BufferReader<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get<T: Element>(&self, index: usize) -> Result<T> {
        if index >= self.length {
            return Err(BufferError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        Ok(self.guard.get(index, self.dtype))
    }

    /// Element `index` converted to `T`, for positions already validated
    /// against the buffer length (e.g. by a view's bounds check).
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn read<T: Element>(&self, index: usize) -> T {
        self.guard.get(index, self.dtype)
    }

    /// Typed slice when `T` is the stored heap type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        self.guard.typed_slice::<T>()
    }
}

/// Write access to a buffer held across several stores.
pub struct BufferWriter<'a> {
    guard: RwLockWriteGuard<'a, Storage>,
    length: usize,
    dtype: DataType,
}

impl BufferWriter<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get<T: Element>(&self, index: usize) -> Result<T> {
        if index >= self.length {
            return Err(BufferError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        Ok(self.guard.get(index, self.dtype))
    }

    pub fn put<T: Element>(&mut self, index: usize, value: T) -> Result<()> {
        if index >= self.length {
            return Err(BufferError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        self.guard.put(index, self.dtype, value);
        Ok(())
    }

    /// Mutable typed slice when `T` is the stored heap type.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        self.guard.typed_slice_mut::<T>()
    }
}
