use std::io::{Read, Write};

use ndarray::{s, Array1};

use crate::errors::{Error, Result};
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};
use crate::measure::ElementType;

/// A typed one dimensional buffer of coordinate values.
///
/// Coordinate variables keep the element type the source file declares, so
/// every operation dispatches on the variant rather than converting the whole
/// buffer up front.
///
#[derive(Debug, Clone, PartialEq)]
pub enum CoordBuffer {
    I32(Array1<i32>),
    I64(Array1<i64>),
    F32(Array1<f32>),
    F64(Array1<f64>),
}

macro_rules! coord_from {
    ($type:ty, $variant:ident) => {
        impl From<Array1<$type>> for CoordBuffer {
            fn from(array: Array1<$type>) -> Self {
                Self::$variant(array)
            }
        }
    };
}

coord_from!(i32, I32);
coord_from!(i64, I64);
coord_from!(f32, F32);
coord_from!(f64, F64);

impl CoordBuffer {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::I32(_) => ElementType::I32,
            Self::I64(_) => ElementType::I64,
            Self::F32(_) => ElementType::F32,
            Self::F64(_) => ElementType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I32(array) => array.len(),
            Self::I64(array) => array.len(),
            Self::F32(array) => array.len(),
            Self::F64(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `index`, widened to f64 for comparisons
    pub fn get_f64(&self, index: usize) -> f64 {
        match self {
            Self::I32(array) => array[index] as f64,
            Self::I64(array) => array[index] as f64,
            Self::F32(array) => array[index] as f64,
            Self::F64(array) => array[index] as f64,
        }
    }

    /// Add `diff`, cast to the buffer's element type, to every value
    pub fn add_scalar(&mut self, diff: f64) {
        match self {
            Self::I32(array) => array.mapv_inplace(|value| value + diff as i32),
            Self::I64(array) => array.mapv_inplace(|value| value + diff as i64),
            Self::F32(array) => array.mapv_inplace(|value| value + diff as f32),
            Self::F64(array) => array.mapv_inplace(|value| value + diff),
        }
    }

    /// Copy out the inclusive index range `[start, end]`
    pub fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            Self::I32(array) => Self::I32(array.slice(s![start..=end]).to_owned()),
            Self::I64(array) => Self::I64(array.slice(s![start..=end]).to_owned()),
            Self::F32(array) => Self::F32(array.slice(s![start..=end]).to_owned()),
            Self::F64(array) => Self::F64(array.slice(s![start..=end]).to_owned()),
        }
    }

    /// Concatenate buffers of one element type into a single buffer
    pub fn concat(buffers: Vec<Self>) -> Result<Self> {
        let mut iter = buffers.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::InvalidParam(String::from("nothing to concatenate")))?;

        let mismatch =
            || Error::InvalidParam(String::from("cannot concatenate mixed element types"));

        match first {
            Self::I32(array) => {
                let mut values = array.to_vec();
                for buffer in iter {
                    match buffer {
                        Self::I32(other) => values.extend(other.iter()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Self::I32(Array1::from_vec(values)))
            }
            Self::I64(array) => {
                let mut values = array.to_vec();
                for buffer in iter {
                    match buffer {
                        Self::I64(other) => values.extend(other.iter()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Self::I64(Array1::from_vec(values)))
            }
            Self::F32(array) => {
                let mut values = array.to_vec();
                for buffer in iter {
                    match buffer {
                        Self::F32(other) => values.extend(other.iter()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Self::F32(Array1::from_vec(values)))
            }
            Self::F64(array) => {
                let mut values = array.to_vec();
                for buffer in iter {
                    match buffer {
                        Self::F64(other) => values.extend(other.iter()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Self::F64(Array1::from_vec(values)))
            }
        }
    }
}

impl Serialize for CoordBuffer {
    fn write_to(&self, stream: &mut impl Write) -> Result<()> {
        stream.write_byte(self.element_type() as u8)?;
        stream.write_u32(self.len() as u32)?;
        match self {
            Self::I32(array) => {
                for value in array {
                    stream.write_i32(*value)?;
                }
            }
            Self::I64(array) => {
                for value in array {
                    stream.write_i64(*value)?;
                }
            }
            Self::F32(array) => {
                for value in array {
                    stream.write_f32(*value)?;
                }
            }
            Self::F64(array) => {
                for value in array {
                    stream.write_f64(*value)?;
                }
            }
        }

        Ok(())
    }

    fn read_from(stream: &mut impl Read) -> Result<Self> {
        let element_type = ElementType::try_from(stream.read_byte()?)?;
        let length = stream.read_u32()? as usize;
        let buffer = match element_type {
            ElementType::I32 => {
                let mut values = Vec::with_capacity(length);
                for _ in 0..length {
                    values.push(stream.read_i32()?);
                }
                Self::I32(Array1::from_vec(values))
            }
            ElementType::I64 => {
                let mut values = Vec::with_capacity(length);
                for _ in 0..length {
                    values.push(stream.read_i64()?);
                }
                Self::I64(Array1::from_vec(values))
            }
            ElementType::F32 => {
                let mut values = Vec::with_capacity(length);
                for _ in 0..length {
                    values.push(stream.read_f32()?);
                }
                Self::F32(Array1::from_vec(values))
            }
            ElementType::F64 => {
                let mut values = Vec::with_capacity(length);
                for _ in 0..length {
                    values.push(stream.read_f64()?);
                }
                Self::F64(Array1::from_vec(values))
            }
        };

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use paste::paste;

    macro_rules! coord_tests {
        ($type:ident, $variant:ident) => {
            paste! {
                #[test]
                fn [<$type _test_round_trip>]() -> Result<()> {
                    let buffer = CoordBuffer::$variant(
                        array![1 as $type, 2 as $type, 3 as $type, 5 as $type],
                    );
                    let restored = CoordBuffer::from_bytes(&buffer.to_bytes()?)?;
                    assert_eq!(restored, buffer);
                    assert_eq!(restored.element_type(), ElementType::$variant);

                    Ok(())
                }

                #[test]
                fn [<$type _test_add_scalar>]() {
                    let mut buffer = CoordBuffer::$variant(array![10 as $type, 20 as $type]);
                    buffer.add_scalar(5.0);
                    assert_eq!(buffer.get_f64(0), 15.0);
                    assert_eq!(buffer.get_f64(1), 25.0);
                }

                #[test]
                fn [<$type _test_slice_and_concat>]() -> Result<()> {
                    let buffer = CoordBuffer::$variant(
                        array![1 as $type, 2 as $type, 3 as $type, 4 as $type],
                    );
                    let left = buffer.slice(0, 1);
                    let right = buffer.slice(2, 3);
                    assert_eq!(left.len(), 2);
                    assert_eq!(CoordBuffer::concat(vec![left, right])?, buffer);

                    Ok(())
                }
            }
        };
    }

    coord_tests!(i32, I32);
    coord_tests!(i64, I64);
    coord_tests!(f32, F32);
    coord_tests!(f64, F64);

    #[test]
    fn test_concat_mixed_types() {
        let left = CoordBuffer::I32(array![1, 2]);
        let right = CoordBuffer::F64(array![3.0]);
        let result = CoordBuffer::concat(vec![left, right]);
        assert!(matches!(result, Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_concat_nothing() {
        let result = CoordBuffer::concat(vec![]);
        assert!(matches!(result, Err(Error::InvalidParam(_))));
    }
}
