use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::helpers::rearrange;
use crate::measure::{DimensionDescriptor, Measure};
use crate::source::{SourceArrayReader, SourceHandle};
use crate::time::TimeParser;

/// One per-dimension filter expression
///
#[derive(Debug, Clone)]
pub struct SubsetFilter {
    pub dimension: String,
    pub filter: String,
}

/// Filters for an import, with broadcastable modes and offsets.
///
/// `is_index` and `offsets` may be empty (defaults: index mode, zero offset),
/// hold a single value applied to every filter, or hold one value per filter.
///
#[derive(Debug, Clone, Default)]
pub struct SubsetSpec {
    pub filters: Vec<SubsetFilter>,
    pub is_index: Vec<bool>,
    pub offsets: Vec<f64>,
}

/// Turns filter expressions into inclusive `[start, end]` index pairs on the
/// measure's dimensions.
///
/// Index filters are 1-based and inclusive. Coordinate filters select the
/// index span whose values fall inside the requested bounds, for ascending or
/// descending coordinate order. A filter on the time dimension is resolved as
/// a time window when it contains the `_` separator and as an index range
/// otherwise.
///
pub struct SubsetResolver<'a> {
    reader: &'a dyn SourceArrayReader,
    time_parser: &'a dyn TimeParser,
    time_dimension: Option<&'a str>,
}

impl<'a> SubsetResolver<'a> {
    pub fn new(
        reader: &'a dyn SourceArrayReader,
        time_parser: &'a dyn TimeParser,
        time_dimension: Option<&'a str>,
    ) -> Self {
        Self {
            reader,
            time_parser,
            time_dimension,
        }
    }

    pub fn resolve(
        &self,
        handle: &SourceHandle,
        measure: &mut Measure,
        spec: &SubsetSpec,
    ) -> Result<()> {
        let modes = broadcast(&spec.is_index, true, spec.filters.len(), "subset mode")?;
        let offsets = broadcast(&spec.offsets, 0.0, spec.filters.len(), "subset offset")?;

        let mut seen = HashSet::new();
        for (filter, (is_index, offset)) in spec
            .filters
            .iter()
            .zip(modes.into_iter().zip(offsets.into_iter()))
        {
            if !seen.insert(filter.dimension.as_str()) {
                return Err(Error::InvalidParam(format!(
                    "dimension {} filtered more than once",
                    filter.dimension
                )));
            }
            let index = measure.index_of(&filter.dimension).ok_or_else(|| {
                Error::InvalidParam(format!(
                    "filtered dimension {} not found among source dimensions",
                    filter.dimension
                ))
            })?;

            let (start, end) =
                self.resolve_range(handle, &measure.dimensions[index], &filter.filter, is_index, offset)?;
            let dimension = &mut measure.dimensions[index];
            dimension.start_index = start;
            dimension.end_index = end;
        }

        for dimension in &measure.dimensions {
            if dimension.start_index > dimension.end_index || dimension.end_index >= dimension.size
            {
                return Err(Error::InvalidParam(format!(
                    "subset [{}, {}] out of range for dimension {} of length {}",
                    dimension.start_index, dimension.end_index, dimension.name, dimension.size
                )));
            }
        }

        check_explicit_levels(measure)
    }

    /// Resolve one filter against one dimension
    fn resolve_range(
        &self,
        handle: &SourceHandle,
        dimension: &DimensionDescriptor,
        filter: &str,
        is_index: bool,
        offset: f64,
    ) -> Result<(usize, usize)> {
        let time_dimension = self.time_dimension == Some(dimension.name.as_str());

        if time_dimension && filter.contains('_') {
            let units = self.reader.read_attribute(handle, &dimension.name, "units")?;
            let calendar = self
                .reader
                .read_attribute(handle, &dimension.name, "calendar")
                .unwrap_or_else(|_| String::from("standard"));
            let (lower, upper) = self
                .time_parser
                .coordinate_bounds(filter, &units, &calendar)?;

            return self.coordinate_range(handle, dimension, lower, upper, offset);
        }

        if time_dimension || is_index {
            index_range(filter)
        } else {
            let (lower, upper) = parse_bounds(filter)?;
            self.coordinate_range(handle, dimension, lower, upper, offset)
        }
    }

    /// Select the index span whose coordinate values fall in [lower, upper]
    fn coordinate_range(
        &self,
        handle: &SourceHandle,
        dimension: &DimensionDescriptor,
        lower: f64,
        upper: f64,
        offset: f64,
    ) -> Result<(usize, usize)> {
        let (lower, upper) = rearrange(lower, upper);
        let lower = lower - offset;
        let upper = upper + offset;

        let coordinates =
            self.reader
                .read_coordinates(handle, &dimension.name, 0, dimension.size - 1)?;

        let mut start = None;
        let mut end = None;
        for index in 0..coordinates.len() {
            let value = coordinates.get_f64(index);
            if value >= lower && value <= upper {
                if start.is_none() {
                    start = Some(index);
                }
                end = Some(index);
            }
        }

        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(Error::InvalidParam(format!(
                "no values of dimension {} fall within [{}, {}]",
                dimension.name, lower, upper
            ))),
        }
    }
}

/// Parse a 1-based inclusive index filter, "n" or "a:b"
fn index_range(filter: &str) -> Result<(usize, usize)> {
    let (first, last) = split_range(filter)?;
    let first: usize = parse_number(first)?;
    let last: usize = parse_number(last)?;
    if first == 0 || last == 0 {
        return Err(Error::InvalidParam(format!(
            "indexes are 1-based: {}",
            filter
        )));
    }
    let (first, last) = rearrange(first, last);

    Ok((first - 1, last - 1))
}

/// Parse a coordinate filter, "v" or "a:b"
fn parse_bounds(filter: &str) -> Result<(f64, f64)> {
    let (first, last) = split_range(filter)?;
    Ok((parse_number(first)?, parse_number(last)?))
}

fn split_range(filter: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = filter.split(':').collect();
    match parts.as_slice() {
        [single] => Ok((*single, *single)),
        [first, last] => Ok((*first, *last)),
        _ => Err(Error::InvalidParam(format!(
            "strided ranges are not supported: {}",
            filter
        ))),
    }
}

fn parse_number<T>(input: &str) -> Result<T>
where
    T: std::str::FromStr,
{
    input
        .trim()
        .parse()
        .map_err(|_| Error::InvalidParam(format!("malformed subset bound: {}", input)))
}

/// Expand an empty, single or per-filter value list
fn broadcast<T: Copy>(values: &[T], default: T, count: usize, what: &str) -> Result<Vec<T>> {
    match values.len() {
        0 => Ok(vec![default; count]),
        1 => Ok(vec![values[0]; count]),
        length if length == count => Ok(values.to_vec()),
        length => Err(Error::InvalidParam(format!(
            "{} count {} doesn't match filter count {}",
            what, length, count
        ))),
    }
}

/// Every explicit level in [1, nexp] must be held by exactly one dimension
fn check_explicit_levels(measure: &Measure) -> Result<()> {
    let levels: Vec<usize> = measure
        .explicit_by_level()
        .iter()
        .map(|dimension| dimension.level)
        .collect();
    let expected: Vec<usize> = (1..=measure.nexp).collect();
    if levels != expected {
        return Err(Error::InvalidParam(String::from(
            "explicit dimension levels aren't correct",
        )));
    }

    Ok(())
}
