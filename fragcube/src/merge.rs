use std::io;

use crate::coord::CoordBuffer;
use crate::errors::{Error, Result};
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};
use crate::measure::DimensionDescriptor;
use crate::source::{SourceArrayReader, SourceHandle, VariableInfo};
use crate::time::to_common_unit;

/// The merged unlimited axis of a multi-file import.
///
/// `order[position]` is the original index of the source file visited at
/// `position` after sorting by start time, and `lengths[position]` is that
/// file's length along the merged axis. `coordinates` holds the per-file
/// coordinate sub-arrays concatenated in sorted order, already shifted onto
/// the reference base time.
///
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAxis {
    pub order: Vec<usize>,
    pub lengths: Vec<usize>,
    pub coordinates: CoordBuffer,
    pub base_time: String,
}

impl MergedAxis {
    pub fn total_len(&self) -> usize {
        self.lengths.iter().sum()
    }

    pub fn element_size(&self) -> usize {
        self.coordinates.element_type().byte_size()
    }

    /// Map an index along the merged axis to `(sorted file position, local
    /// index within that file)`. Returns `None` past the end of the axis.
    ///
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut offset = 0;
        for (position, &length) in self.lengths.iter().enumerate() {
            if index < offset + length {
                return Some((position, index - offset));
            }
            offset += length;
        }

        None
    }
}

impl Serialize for MergedAxis {
    fn write_to(&self, stream: &mut impl io::Write) -> Result<()> {
        stream.write_u32(self.order.len() as u32)?;
        for (&file, &length) in self.order.iter().zip(self.lengths.iter()) {
            stream.write_u64(file as u64)?;
            stream.write_u64(length as u64)?;
        }
        self.coordinates.write_to(stream)?;
        stream.write_str(&self.base_time)?;

        Ok(())
    }

    fn read_from(stream: &mut impl io::Read) -> Result<Self> {
        let count = stream.read_u32()? as usize;
        let mut order = Vec::with_capacity(count);
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            order.push(stream.read_u64()? as usize);
            lengths.push(stream.read_u64()? as usize);
        }
        let coordinates = CoordBuffer::read_from(stream)?;
        let base_time = stream.read_str()?;

        Ok(Self {
            order,
            lengths,
            coordinates,
            base_time,
        })
    }
}

struct FileAxis {
    index: usize,
    key: f64,
    base_time_common: f64,
    base_time: String,
    length: usize,
    coordinates: CoordBuffer,
}

/// Orders the source files of a multi-file import along their shared
/// unlimited dimension and concatenates their coordinate sub-arrays.
///
/// Files are stably sorted by their starting value on the unlimited axis.
/// When the axis is the time dimension, the starting value is shifted by the
/// file's base time, both converted to a common unit, and every later file's
/// positive base-time difference from the first file is added back onto its
/// coordinate values before concatenation.
///
pub struct MultiSourceMerger<'a> {
    reader: &'a dyn SourceArrayReader,
    time_dimension: Option<&'a str>,
}

impl<'a> MultiSourceMerger<'a> {
    pub fn new(reader: &'a dyn SourceArrayReader, time_dimension: Option<&'a str>) -> Self {
        Self {
            reader,
            time_dimension,
        }
    }

    pub fn merge(
        &self,
        handles: &[SourceHandle],
        variable: &str,
        dimension: &DimensionDescriptor,
    ) -> Result<MergedAxis> {
        if handles.len() < 2 {
            return Err(Error::InvalidParam(String::from(
                "merging requires at least two source files",
            )));
        }

        // Type and rank must agree across files before any merge work starts
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(self.reader.describe_variable(handle, variable)?);
        }
        for info in &infos[1..] {
            if info.element_type != infos[0].element_type || info.rank() != infos[0].rank() {
                return Err(Error::InvalidParam(format!(
                    "source files disagree on the type or rank of {}",
                    variable
                )));
            }
        }

        let time_like = self.time_dimension == Some(dimension.name.as_str());

        let mut files = Vec::with_capacity(handles.len());
        for (index, (handle, info)) in handles.iter().zip(infos.iter()).enumerate() {
            let length = self.axis_length(handle, info, &dimension.name, index)?;
            let coordinates =
                self.reader
                    .read_coordinates(handle, &dimension.name, 0, length - 1)?;
            let start = coordinates.get_f64(0);

            let (key, base_time_common, base_time) = if time_like {
                let units = self.time_attribute(handle, &dimension.name, "units", index)?;
                let base_time = self.time_attribute(handle, &dimension.name, "base_time", index)?;
                let base_value: f64 = base_time.trim().parse().map_err(|_| {
                    Error::Utility(format!(
                        "base time {} of source file {} isn't numeric",
                        base_time, index
                    ))
                })?;
                let base_common = to_common_unit(base_value, &units);

                (
                    base_common + to_common_unit(start, &units),
                    base_common,
                    base_time,
                )
            } else {
                (start, 0.0, String::new())
            };

            files.push(FileAxis {
                index,
                key,
                base_time_common,
                base_time,
                length,
                coordinates,
            });
        }

        // Stable, so ties keep their original file order
        files.sort_by(|a, b| a.key.total_cmp(&b.key));

        let reference = files[0].base_time_common;
        let base_time = files[0].base_time.clone();
        let order: Vec<usize> = files.iter().map(|file| file.index).collect();
        let lengths: Vec<usize> = files.iter().map(|file| file.length).collect();

        let mut parts = Vec::with_capacity(files.len());
        for file in files {
            let mut coordinates = file.coordinates;
            let diff = file.base_time_common - reference;
            if diff > 0.0 {
                coordinates.add_scalar(diff);
            }
            parts.push(coordinates);
        }
        let coordinates = CoordBuffer::concat(parts)?;

        Ok(MergedAxis {
            order,
            lengths,
            coordinates,
            base_time,
        })
    }

    /// Length of the named axis in one source file
    fn axis_length(
        &self,
        handle: &SourceHandle,
        info: &VariableInfo,
        name: &str,
        file: usize,
    ) -> Result<usize> {
        for &dim_id in &info.dim_ids {
            let dimension = self.reader.describe_dimension(handle, dim_id)?;
            if dimension.name == name {
                if dimension.length == 0 {
                    return Err(Error::Utility(format!(
                        "dimension {} is empty in source file {}",
                        name, file
                    )));
                }
                return Ok(dimension.length);
            }
        }

        Err(Error::Utility(format!(
            "dimension {} not found in source file {}",
            name, file
        )))
    }

    fn time_attribute(
        &self,
        handle: &SourceHandle,
        dimension: &str,
        attribute: &str,
        file: usize,
    ) -> Result<String> {
        self.reader
            .read_attribute(handle, dimension, attribute)
            .map_err(|error| {
                Error::Utility(format!(
                    "can't read {} of dimension {} in source file {}: {}",
                    attribute, dimension, file, error
                ))
            })
    }
}
