//! Backing storage variants.

use ndengine_traits::{DataType, Element};

use crate::buffer::AllocationMode;

/// Physical representation of a buffer's elements.
///
/// HEAP buffers hold exactly one typed vector matching their dtype. DIRECT and
/// DEVICE buffers hold raw bytes addressed by `index * element_size`.
#[derive(Debug, Clone)]
pub(crate) enum Storage {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int(Vec<i32>),
    Bytes(Vec<u8>),
    Released,
}

impl Storage {
    pub(crate) fn zeroed(len: usize, dtype: DataType, mode: AllocationMode) -> Self {
        match mode {
            AllocationMode::Heap => match dtype {
                DataType::Float => Storage::Float(vec![0.0; len]),
                DataType::Double => Storage::Double(vec![0.0; len]),
                DataType::Int => Storage::Int(vec![0; len]),
            },
            AllocationMode::Direct | AllocationMode::Device => {
                Storage::Bytes(vec![0u8; len * dtype.element_size()])
            }
        }
    }

    /// Takes ownership of `data`; HEAP storage reuses the allocation.
    pub(crate) fn from_vec<T: Element>(data: Vec<T>, mode: AllocationMode) -> Self {
        match mode {
            AllocationMode::Heap => match T::DTYPE {
                DataType::Float => Storage::Float(recast(data)),
                DataType::Double => Storage::Double(recast(data)),
                DataType::Int => Storage::Int(recast(data)),
            },
            AllocationMode::Direct | AllocationMode::Device => {
                Storage::Bytes(bytemuck::cast_slice(&data).to_vec())
            }
        }
    }

    /// Copies `data`, converting every element to `dtype`.
    pub(crate) fn from_slice<T: Element>(data: &[T], dtype: DataType, mode: AllocationMode) -> Self {
        let mut storage = Storage::zeroed(data.len(), dtype, mode);
        for (i, &v) in data.iter().enumerate() {
            storage.put(i, dtype, v);
        }
        storage
    }

    /// Rebuilds storage for `mode` from native-order element bytes.
    pub(crate) fn from_element_bytes(bytes: Vec<u8>, dtype: DataType, mode: AllocationMode) -> Self {
        match mode {
            AllocationMode::Direct | AllocationMode::Device => Storage::Bytes(bytes),
            AllocationMode::Heap => {
                let es = dtype.element_size();
                match dtype {
                    DataType::Float => Storage::Float(
                        bytes.chunks_exact(es).map(bytemuck::pod_read_unaligned).collect(),
                    ),
                    DataType::Double => Storage::Double(
                        bytes.chunks_exact(es).map(bytemuck::pod_read_unaligned).collect(),
                    ),
                    DataType::Int => Storage::Int(
                        bytes.chunks_exact(es).map(bytemuck::pod_read_unaligned).collect(),
                    ),
                }
            }
        }
    }

    #[inline]
    pub(crate) fn is_released(&self) -> bool {
        matches!(self, Storage::Released)
    }

    /// Reads element `i`. The caller has bounds-checked `i`.
    #[inline]
    pub(crate) fn get<T: Element>(&self, i: usize, dtype: DataType) -> T {
        match self {
            Storage::Float(v) => T::narrow(v[i].widen()),
            Storage::Double(v) => T::narrow(v[i]),
            Storage::Int(v) => T::narrow(v[i].widen()),
            Storage::Bytes(bytes) => {
                let es = dtype.element_size();
                let raw = &bytes[i * es..(i + 1) * es];
                let wide = match dtype {
                    DataType::Float => bytemuck::pod_read_unaligned::<f32>(raw).widen(),
                    DataType::Double => bytemuck::pod_read_unaligned::<f64>(raw),
                    DataType::Int => bytemuck::pod_read_unaligned::<i32>(raw).widen(),
                };
                T::narrow(wide)
            }
            Storage::Released => T::default(),
        }
    }

    /// Writes element `i`. The caller has bounds-checked `i`.
    #[inline]
    pub(crate) fn put<T: Element>(&mut self, i: usize, dtype: DataType, value: T) {
        let wide = value.widen();
        match self {
            Storage::Float(v) => v[i] = f32::narrow(wide),
            Storage::Double(v) => v[i] = wide,
            Storage::Int(v) => v[i] = i32::narrow(wide),
            Storage::Bytes(bytes) => {
                let es = dtype.element_size();
                let raw = &mut bytes[i * es..(i + 1) * es];
                match dtype {
                    DataType::Float => raw.copy_from_slice(bytemuck::bytes_of(&f32::narrow(wide))),
                    DataType::Double => raw.copy_from_slice(bytemuck::bytes_of(&wide)),
                    DataType::Int => raw.copy_from_slice(bytemuck::bytes_of(&i32::narrow(wide))),
                }
            }
            Storage::Released => {}
        }
    }

    /// Borrows the elements as `&[T]` when `T` is the stored heap type.
    pub(crate) fn typed_slice<T: Element>(&self) -> Option<&[T]> {
        match self {
            Storage::Float(v) if T::DTYPE == DataType::Float => bytemuck::try_cast_slice(v).ok(),
            Storage::Double(v) if T::DTYPE == DataType::Double => bytemuck::try_cast_slice(v).ok(),
            Storage::Int(v) if T::DTYPE == DataType::Int => bytemuck::try_cast_slice(v).ok(),
            _ => None,
        }
    }

    pub(crate) fn typed_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        match self {
            Storage::Float(v) if T::DTYPE == DataType::Float => {
                bytemuck::try_cast_slice_mut(v).ok()
            }
            Storage::Double(v) if T::DTYPE == DataType::Double => {
                bytemuck::try_cast_slice_mut(v).ok()
            }
            Storage::Int(v) if T::DTYPE == DataType::Int => bytemuck::try_cast_slice_mut(v).ok(),
            _ => None,
        }
    }

    /// Element bytes in native order.
    pub(crate) fn element_bytes(&self) -> Vec<u8> {
        match self {
            Storage::Float(v) => bytemuck::cast_slice(v).to_vec(),
            Storage::Double(v) => bytemuck::cast_slice(v).to_vec(),
            Storage::Int(v) => bytemuck::cast_slice(v).to_vec(),
            Storage::Bytes(bytes) => bytes.clone(),
            Storage::Released => Vec::new(),
        }
    }

    /// Raw byte window over elements `[start, start + count)`.
    pub(crate) fn byte_range(&self, start: usize, count: usize, dtype: DataType) -> Vec<u8> {
        let es = dtype.element_size();
        let range = start * es..(start + count) * es;
        match self {
            Storage::Float(v) => bytemuck::cast_slice::<f32, u8>(v)[range].to_vec(),
            Storage::Double(v) => bytemuck::cast_slice::<f64, u8>(v)[range].to_vec(),
            Storage::Int(v) => bytemuck::cast_slice::<i32, u8>(v)[range].to_vec(),
            Storage::Bytes(bytes) => bytes[range].to_vec(),
            Storage::Released => Vec::new(),
        }
    }
}

fn recast<A: Element, B: Element>(data: Vec<A>) -> Vec<B> {
    match bytemuck::allocation::try_cast_vec::<A, B>(data) {
        Ok(v) => v,
        Err((_, data)) => data.into_iter().map(|x| B::narrow(x.widen())).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip_per_dtype() {
        let mut s = Storage::zeroed(3, DataType::Int, AllocationMode::Direct);
        s.put(1, DataType::Int, 7.9f64);
        assert_eq!(s.get::<i32>(1, DataType::Int), 7);
        assert_eq!(s.get::<f64>(0, DataType::Int), 0.0);

        let mut s = Storage::zeroed(2, DataType::Float, AllocationMode::Device);
        s.put(0, DataType::Float, 2.5f64);
        assert_eq!(s.get::<f32>(0, DataType::Float), 2.5);
    }

    #[test]
    fn test_heap_from_vec_borrows_typed() {
        let s = Storage::from_vec(vec![1.0f64, 2.0], AllocationMode::Heap);
        assert_eq!(s.typed_slice::<f64>(), Some(&[1.0, 2.0][..]));
        assert!(s.typed_slice::<f32>().is_none());
    }

    #[test]
    fn test_element_bytes_match_layout() {
        let heap = Storage::from_vec(vec![1.0f32, -3.0], AllocationMode::Heap);
        let direct = Storage::from_vec(vec![1.0f32, -3.0], AllocationMode::Direct);
        assert_eq!(heap.element_bytes(), direct.element_bytes());
        let back = Storage::from_element_bytes(heap.element_bytes(), DataType::Float, AllocationMode::Heap);
        assert_eq!(back.typed_slice::<f32>(), Some(&[1.0f32, -3.0][..]));
    }
}
