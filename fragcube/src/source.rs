use crate::coord::CoordBuffer;
use crate::errors::Result;
use crate::measure::ElementType;

/// Opaque token for an open source file, issued by a `SourceArrayReader`
///
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub token: usize,
}

/// Shape of one dimension of a source variable
///
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub element_type: ElementType,
    pub is_unlimited: bool,
}

/// Shape of a source variable
///
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub element_type: ElementType,
    pub dim_ids: Vec<usize>,
}

impl VariableInfo {
    pub fn rank(&self) -> usize {
        self.dim_ids.len()
    }
}

/// Access to a multidimensional scientific array format.
///
/// The import pipeline only asks a reader for shapes, attributes and value
/// ranges; how the format stores them is the implementation's business.
///
pub trait SourceArrayReader: Send + Sync {
    /// Open a source file and return a handle for later calls
    fn open(&self, path: &str) -> Result<SourceHandle>;

    /// Describe the named variable
    fn describe_variable(&self, handle: &SourceHandle, name: &str) -> Result<VariableInfo>;

    /// Describe one of a variable's dimensions by id
    fn describe_dimension(&self, handle: &SourceHandle, dim_id: usize) -> Result<DimensionInfo>;

    /// Read a string attribute attached to the named object
    fn read_attribute(
        &self,
        handle: &SourceHandle,
        object: &str,
        attribute: &str,
    ) -> Result<String>;

    /// Read the inclusive index range `[start, end]` of a coordinate variable
    fn read_coordinates(
        &self,
        handle: &SourceHandle,
        dimension: &str,
        start: usize,
        end: usize,
    ) -> Result<CoordBuffer>;

    /// Read a hyperslab of the named variable.
    ///
    /// `starts` and `counts` are indexed in the variable's own dimension
    /// order. Elements come back big endian, in row-major order over `counts`.
    ///
    fn read_subarray(
        &self,
        handle: &SourceHandle,
        variable: &str,
        starts: &[usize],
        counts: &[usize],
    ) -> Result<Vec<u8>>;
}
