//! Buffer wire format.
//!
//! ```text
//! [mode tag: u8][length: u64][dtype tag: u8][length * element_size bytes]
//! ```
//!
//! Multi-byte fields use native byte order. Elements are written in logical
//! index order regardless of the source allocation mode.

use std::io::{Read, Write};
use std::sync::Arc;

use ndengine_traits::DataType;

use crate::buffer::{AllocationMode, DataBuffer};
use crate::device::MemoryStrategy;
use crate::storage::Storage;
use crate::{BufferError, Result};

impl DataBuffer {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let elements = self.as_bytes()?;
        writer.write_all(&[self.mode.tag()])?;
        writer.write_all(&(self.length as u64).to_ne_bytes())?;
        writer.write_all(&[self.dtype.tag()])?;
        writer.write_all(&elements)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(10 + self.length * self.element_size());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decodes a buffer, rebuilding storage for the encoded allocation mode.
    /// DEVICE buffers get a fresh [`PageableHostStrategy`](crate::PageableHostStrategy).
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Self::decode(reader, None)
    }

    /// Like [`read_from`](Self::read_from), attaching `strategy` to DEVICE buffers.
    pub fn read_from_with_strategy<R: Read>(
        reader: &mut R,
        strategy: Arc<dyn MemoryStrategy>,
    ) -> Result<Self> {
        Self::decode(reader, Some(strategy))
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        Self::read_from(&mut bytes)
    }

    fn decode<R: Read>(reader: &mut R, strategy: Option<Arc<dyn MemoryStrategy>>) -> Result<Self> {
        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag)?;
        let mode = AllocationMode::from_tag(tag[0]).ok_or(BufferError::InvalidTag {
            kind: "allocation mode",
            tag: tag[0],
        })?;

        let mut len = [0u8; 8];
        reader.read_exact(&mut len)?;
        let length = usize::try_from(u64::from_ne_bytes(len))
            .map_err(|_| BufferError::InvalidArgument("encoded length exceeds usize".into()))?;

        reader.read_exact(&mut tag)?;
        let dtype = DataType::from_tag(tag[0]).ok_or(BufferError::InvalidTag {
            kind: "data type",
            tag: tag[0],
        })?;

        let byte_len = length
            .checked_mul(dtype.element_size())
            .ok_or_else(|| BufferError::InvalidArgument("encoded length overflows".into()))?;
        let mut elements = Vec::new();
        reader.by_ref().take(byte_len as u64).read_to_end(&mut elements)?;
        if elements.len() != byte_len {
            return Err(BufferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {byte_len} element bytes, got {}", elements.len()),
            )));
        }

        let storage = Storage::from_element_bytes(elements, dtype, mode);
        Ok(Self::from_storage(length, dtype, mode, storage, strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let buf = DataBuffer::from_vec(vec![1i32, 2], AllocationMode::Direct);
        let bytes = buf.to_bytes().unwrap();
        assert_eq!(bytes.len(), 1 + 8 + 1 + 8);
        assert_eq!(bytes[0], AllocationMode::Direct.tag());
        assert_eq!(&bytes[1..9], &2u64.to_ne_bytes());
        assert_eq!(bytes[9], DataType::Int.tag());
        assert_eq!(&bytes[10..14], &1i32.to_ne_bytes());
    }

    #[test]
    fn test_invalid_tags() {
        let mut bytes = DataBuffer::from_vec(vec![1.0f32], AllocationMode::Heap)
            .to_bytes()
            .unwrap();
        bytes[0] = 7;
        assert!(matches!(
            DataBuffer::from_bytes(&bytes),
            Err(BufferError::InvalidTag { kind: "allocation mode", tag: 7 })
        ));
        bytes[0] = 0;
        bytes[9] = 5;
        assert!(matches!(
            DataBuffer::from_bytes(&bytes),
            Err(BufferError::InvalidTag { kind: "data type", .. })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = DataBuffer::from_vec(vec![1.0f64, 2.0], AllocationMode::Heap)
            .to_bytes()
            .unwrap();
        assert!(matches!(
            DataBuffer::from_bytes(&bytes[..bytes.len() - 3]),
            Err(BufferError::Io(_))
        ));
    }

    #[test]
    fn test_decoded_mode_is_rederived() {
        let src = DataBuffer::from_vec(vec![1.0f32, 2.0], AllocationMode::Device);
        let back = DataBuffer::from_bytes(&src.to_bytes().unwrap()).unwrap();
        assert_eq!(back.allocation_mode(), AllocationMode::Device);
        assert!(back.memory_strategy().is_some());
        assert!(!back.as_typed_array::<f32>().unwrap().is_borrowed());

        let heap = DataBuffer::from_vec(vec![1.0f32, 2.0], AllocationMode::Heap);
        let back = DataBuffer::from_bytes(&heap.to_bytes().unwrap()).unwrap();
        assert!(back.as_typed_array::<f32>().unwrap().is_borrowed());
    }
}
