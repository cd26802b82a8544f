//! Data-type and ordering tags.

use std::fmt;
use std::str::FromStr;

/// Numeric type held by a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// 32-bit signed integer.
    Int,
}

impl DataType {
    /// Size of one element in bytes.
    #[inline]
    pub const fn element_size(self) -> usize {
        match self {
            DataType::Float => 4,
            DataType::Double => 8,
            DataType::Int => 4,
        }
    }

    /// One-byte tag used by the buffer wire format.
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            DataType::Float => 0,
            DataType::Double => 1,
            DataType::Int => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DataType::Float),
            1 => Some(DataType::Double),
            2 => Some(DataType::Int),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Int => "INT",
        }
    }

    /// Whether computations over this type run in single precision.
    #[inline]
    pub const fn is_single_precision(self) -> bool {
        matches!(self, DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "float32" | "f32" => Ok(DataType::Float),
            "double" | "float64" | "f64" => Ok(DataType::Double),
            "int" | "int32" | "i32" => Ok(DataType::Int),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

/// Linear element ordering of an array.
///
/// Row-major (`'c'`): the last index varies fastest.
/// Column-major (`'f'`): the first index varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ordering {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl Ordering {
    /// The conventional single-character name (`'c'` or `'f'`).
    pub const fn as_char(self) -> char {
        match self {
            Ordering::RowMajor => 'c',
            Ordering::ColumnMajor => 'f',
        }
    }

    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'c' | 'C' => Some(Ordering::RowMajor),
            'f' | 'F' => Some(Ordering::ColumnMajor),
            _ => None,
        }
    }
}

impl FromStr for Ordering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "row" | "row-major" | "row_major" => Ok(Ordering::RowMajor),
            "f" | "col" | "column" | "column-major" | "column_major" => {
                Ok(Ordering::ColumnMajor)
            }
            other => Err(format!("unknown ordering '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(DataType::Float.element_size(), 4);
        assert_eq!(DataType::Double.element_size(), 8);
        assert_eq!(DataType::Int.element_size(), 4);
    }

    #[test]
    fn test_tag_roundtrip() {
        for dt in [DataType::Float, DataType::Double, DataType::Int] {
            assert_eq!(DataType::from_tag(dt.tag()), Some(dt));
        }
        assert_eq!(DataType::from_tag(9), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("float64".parse::<DataType>(), Ok(DataType::Double));
        assert_eq!("F".parse::<Ordering>(), Ok(Ordering::ColumnMajor));
        assert!("complex".parse::<DataType>().is_err());
    }
}
