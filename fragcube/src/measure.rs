use std::collections::HashMap;

use crate::errors::{Error, Result};

/// Storage type of measure values and coordinate variables
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementType {
    I32 = 4,
    I64 = 8,
    F32 = 32,
    F64 = 64,
}

impl ElementType {
    /// Width of one element, in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

impl TryFrom<u8> for ElementType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            4 => Ok(ElementType::I32),
            8 => Ok(ElementType::I64),
            32 => Ok(ElementType::F32),
            64 => Ok(ElementType::F64),
            _ => Err(Error::InvalidParam(format!(
                "unknown element type code {}",
                value
            ))),
        }
    }
}

/// One dimension of a measure, as classified for fragmentation.
///
/// Explicit dimensions drive fragmentation and tuple keys; implicit dimensions
/// are stored inline, one full array per tuple. `level` is the 1-based nesting
/// ordinal within the dimension's role group, level 1 being outermost.
/// `start_index`/`end_index` are inclusive and cover the full source range
/// until subsetting narrows them.
///
#[derive(Debug, Clone)]
pub struct DimensionDescriptor {
    pub name: String,
    pub size: usize,
    pub element_type: ElementType,
    pub explicit: bool,
    pub level: usize,
    pub concept_level: char,
    pub unlimited: bool,
    pub start_index: usize,
    pub end_index: usize,
}

impl DimensionDescriptor {
    /// Number of elements selected along this dimension
    pub fn subset_len(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// The array variable being imported or generated, with its classified
/// dimensions in source order.
///
#[derive(Debug, Clone)]
pub struct Measure {
    pub name: String,
    pub element_type: ElementType,
    pub nexp: usize,
    pub nimp: usize,
    pub dimensions: Vec<DimensionDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Measure {
    pub fn new<S>(name: S, element_type: ElementType, dimensions: Vec<DimensionDescriptor>) -> Self
    where
        S: Into<String>,
    {
        let nexp = dimensions.iter().filter(|dim| dim.explicit).count();
        let nimp = dimensions.len() - nexp;
        let by_name = dimensions
            .iter()
            .enumerate()
            .map(|(index, dim)| (dim.name.clone(), index))
            .collect();

        Self {
            name: name.into(),
            element_type,
            nexp,
            nimp,
            dimensions,
            by_name,
        }
    }

    /// Source index of the named dimension, if any.
    ///
    /// Exposed for collaborators that validate dimensions against an external
    /// hierarchy.
    ///
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionDescriptor> {
        self.index_of(name).map(|index| &self.dimensions[index])
    }

    pub fn unlimited(&self) -> Option<&DimensionDescriptor> {
        self.dimensions.iter().find(|dim| dim.unlimited)
    }

    /// Explicit dimensions ordered by level, outermost first
    pub fn explicit_by_level(&self) -> Vec<&DimensionDescriptor> {
        let mut dims: Vec<&DimensionDescriptor> =
            self.dimensions.iter().filter(|dim| dim.explicit).collect();
        dims.sort_by_key(|dim| dim.level);

        dims
    }

    /// Implicit dimensions ordered by level, outermost first
    pub fn implicit_by_level(&self) -> Vec<&DimensionDescriptor> {
        let mut dims: Vec<&DimensionDescriptor> =
            self.dimensions.iter().filter(|dim| !dim.explicit).collect();
        dims.sort_by_key(|dim| dim.level);

        dims
    }

    /// Source index of the dimension that drives fragmentation: the outermost
    /// explicit dimension with more than one selected value. `None` when every
    /// explicit dimension is subset to a single value.
    ///
    pub fn driving_dimension(&self) -> Option<usize> {
        self.explicit_by_level()
            .into_iter()
            .find(|dim| dim.subset_len() > 1)
            .and_then(|dim| self.index_of(&dim.name))
    }

    /// Number of logical outer increments available for fragmentation
    pub fn frag_count(&self) -> usize {
        match self.driving_dimension() {
            Some(index) => self.dimensions[index].subset_len(),
            None => 1,
        }
    }

    /// Tuples contained in one outer increment: the product of the selected
    /// extents of every explicit dimension nested inside the driving one.
    ///
    pub fn inner_dim_product(&self) -> usize {
        let driving_level = match self.driving_dimension() {
            Some(index) => self.dimensions[index].level,
            None => return 1,
        };

        self.explicit_by_level()
            .into_iter()
            .filter(|dim| dim.level > driving_level)
            .map(|dim| dim.subset_len())
            .product()
    }

    /// Elements stored inline in each tuple: the product of the selected
    /// extents of the implicit dimensions.
    ///
    pub fn implicit_array_len(&self) -> usize {
        self.implicit_by_level()
            .into_iter()
            .map(|dim| dim.subset_len())
            .product()
    }

    /// Map from payload position to source dimension index.
    ///
    /// Domain: positions `0..ndims` of the tuple payload layout, which lists
    /// the explicit dimensions in level order followed by the implicit
    /// dimensions in level order. Range: indices into `dimensions` (source
    /// order). Fragment payloads read from a source whose dimension order
    /// differs from the payload layout are rearranged through this map.
    ///
    pub fn payload_map(&self) -> Vec<usize> {
        self.explicit_by_level()
            .into_iter()
            .chain(self.implicit_by_level())
            .filter_map(|dim| self.index_of(&dim.name))
            .collect()
    }
}
