//! In-memory doubles of the pipeline's collaborators.
//!
//! `MemReader` serves variables from ndarray buffers, `MemStore` and
//! `MemIoServer` record what the pipeline hands them, and `LockstepGroup`
//! runs the collective protocol over plain threads.
//!
use std::collections::HashMap;
use std::sync::{Arc, Barrier};

use ndarray::{Array1, ArrayD, Axis, Slice};
use parking_lot::Mutex;

use crate::comm::CommGroup;
use crate::coord::CoordBuffer;
use crate::errors::{Error, Result};
use crate::extio::ExtendedWrite;
use crate::ioserver::{IoConnection, IoServer};
use crate::layout::FragmentDescriptor;
use crate::measure::ElementType;
use crate::report::ResultReporter;
use crate::source::{DimensionInfo, SourceArrayReader, SourceHandle, VariableInfo};
use crate::store::{
    DatacubeId, DatacubeSummary, DbInstance, HostPartition, MetadataStore,
};
use crate::time::TimeParser;

pub fn mem_dim(name: &str, length: usize, unlimited: bool) -> DimensionInfo {
    DimensionInfo {
        name: String::from(name),
        length,
        element_type: ElementType::F64,
        is_unlimited: unlimited,
    }
}

/// One source file: a variable, its dimensions, coordinates and attributes.
///
/// Coordinates default to `0.0, 1.0, ...` per dimension; `with_coords` and
/// `with_attr` override and extend them.
///
pub struct MemSource {
    path: String,
    measure: String,
    element_type: ElementType,
    dimensions: Vec<DimensionInfo>,
    data: ArrayD<f64>,
    coordinates: HashMap<String, CoordBuffer>,
    attributes: HashMap<(String, String), String>,
}

impl MemSource {
    pub fn new(
        path: &str,
        measure: &str,
        element_type: ElementType,
        dimensions: Vec<DimensionInfo>,
        data: ArrayD<f64>,
    ) -> Self {
        let coordinates = dimensions
            .iter()
            .map(|dimension| {
                let values = Array1::from_iter((0..dimension.length).map(|index| index as f64));
                (dimension.name.clone(), CoordBuffer::F64(values))
            })
            .collect();

        Self {
            path: String::from(path),
            measure: String::from(measure),
            element_type,
            dimensions,
            data,
            coordinates,
            attributes: HashMap::new(),
        }
    }

    pub fn with_coords(mut self, dimension: &str, coordinates: CoordBuffer) -> Self {
        self.coordinates
            .insert(String::from(dimension), coordinates);
        self
    }

    pub fn with_attr(mut self, object: &str, attribute: &str, value: &str) -> Self {
        self.attributes.insert(
            (String::from(object), String::from(attribute)),
            String::from(value),
        );
        self
    }
}

pub struct MemReader {
    sources: Vec<MemSource>,
}

impl MemReader {
    pub fn new(sources: Vec<MemSource>) -> Self {
        Self { sources }
    }

    fn source(&self, handle: &SourceHandle) -> Result<&MemSource> {
        self.sources
            .get(handle.token)
            .ok_or_else(|| Error::Utility(format!("stale source handle {}", handle.token)))
    }
}

impl SourceArrayReader for MemReader {
    fn open(&self, path: &str) -> Result<SourceHandle> {
        self.sources
            .iter()
            .position(|source| source.path == path)
            .map(|token| SourceHandle { token })
            .ok_or_else(|| Error::Utility(format!("no such source file {}", path)))
    }

    fn describe_variable(&self, handle: &SourceHandle, name: &str) -> Result<VariableInfo> {
        let source = self.source(handle)?;
        if source.measure != name {
            return Err(Error::Utility(format!(
                "no variable {} in {}",
                name, source.path
            )));
        }

        Ok(VariableInfo {
            element_type: source.element_type,
            dim_ids: (0..source.dimensions.len()).collect(),
        })
    }

    fn describe_dimension(&self, handle: &SourceHandle, dim_id: usize) -> Result<DimensionInfo> {
        let source = self.source(handle)?;
        source
            .dimensions
            .get(dim_id)
            .cloned()
            .ok_or_else(|| Error::Utility(format!("no dimension {} in {}", dim_id, source.path)))
    }

    fn read_attribute(
        &self,
        handle: &SourceHandle,
        object: &str,
        attribute: &str,
    ) -> Result<String> {
        let source = self.source(handle)?;
        source
            .attributes
            .get(&(String::from(object), String::from(attribute)))
            .cloned()
            .ok_or_else(|| {
                Error::Utility(format!(
                    "no attribute {}:{} in {}",
                    object, attribute, source.path
                ))
            })
    }

    fn read_coordinates(
        &self,
        handle: &SourceHandle,
        dimension: &str,
        start: usize,
        end: usize,
    ) -> Result<CoordBuffer> {
        let source = self.source(handle)?;
        let coordinates = source.coordinates.get(dimension).ok_or_else(|| {
            Error::Utility(format!(
                "no coordinate variable {} in {}",
                dimension, source.path
            ))
        })?;
        if end >= coordinates.len() {
            return Err(Error::Utility(format!(
                "coordinate range [{}, {}] out of bounds for {}",
                start, end, dimension
            )));
        }

        Ok(coordinates.slice(start, end))
    }

    fn read_subarray(
        &self,
        handle: &SourceHandle,
        variable: &str,
        starts: &[usize],
        counts: &[usize],
    ) -> Result<Vec<u8>> {
        let source = self.source(handle)?;
        if source.measure != variable {
            return Err(Error::Utility(format!(
                "no variable {} in {}",
                variable, source.path
            )));
        }
        if starts.len() != source.data.ndim() || counts.len() != source.data.ndim() {
            return Err(Error::Utility(format!(
                "subarray rank {} doesn't match variable rank {}",
                starts.len(),
                source.data.ndim()
            )));
        }

        let mut view = source.data.view();
        for (axis, (&start, &count)) in starts.iter().zip(counts.iter()).enumerate() {
            if start + count > view.len_of(Axis(axis)) {
                return Err(Error::Utility(format!(
                    "subarray [{}, {}) out of bounds on axis {} of {}",
                    start,
                    start + count,
                    axis,
                    variable
                )));
            }
            view.slice_axis_inplace(Axis(axis), Slice::from(start..start + count));
        }

        let mut bytes = Vec::with_capacity(view.len() * source.element_type.byte_size());
        for &value in view.iter() {
            match source.element_type {
                ElementType::I32 => bytes.write_i32(value as i32)?,
                ElementType::I64 => bytes.write_i64(value as i64)?,
                ElementType::F32 => bytes.write_f32(value as f32)?,
                ElementType::F64 => bytes.write_f64(value)?,
            }
        }

        Ok(bytes)
    }
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    datacubes: HashMap<i64, DatacubeSummary>,
    fragments: HashMap<i64, Vec<FragmentDescriptor>>,
    deleted: Vec<DatacubeId>,
    batches: usize,
}

/// Metadata store double backed by hash maps, with one partition
///
pub struct MemStore {
    available_hosts: usize,
    state: Mutex<StoreState>,
}

impl MemStore {
    pub fn new(available_hosts: usize) -> Self {
        Self {
            available_hosts,
            state: Mutex::new(StoreState {
                next_id: 7,
                ..StoreState::default()
            }),
        }
    }

    pub fn datacube_count(&self) -> usize {
        self.state.lock().datacubes.len()
    }

    pub fn fragments_of(&self, datacube: DatacubeId) -> Vec<FragmentDescriptor> {
        self.state
            .lock()
            .fragments
            .get(&datacube.0)
            .cloned()
            .unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<DatacubeId> {
        self.state.lock().deleted.clone()
    }

    /// Number of `insert_fragments` calls received
    pub fn batch_count(&self) -> usize {
        self.state.lock().batches
    }
}

impl MetadataStore for MemStore {
    fn resolve_host_partition(
        &self,
        _io_server_type: &str,
        _partition: Option<&str>,
        _requested_hosts: Option<usize>,
    ) -> Result<HostPartition> {
        Ok(HostPartition {
            partition_id: 1,
            available_host_count: self.available_hosts,
        })
    }

    fn list_dbms_instances(&self, _partition_id: i64, host_count: usize) -> Result<Vec<DbInstance>> {
        Ok((0..host_count)
            .map(|index| DbInstance {
                id: index as i64 + 1,
                host: format!("host{}", index),
                port: 63300,
            })
            .collect())
    }

    fn insert_datacube(&self, summary: &DatacubeSummary) -> Result<DatacubeId> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.datacubes.insert(id, summary.clone());

        Ok(DatacubeId(id))
    }

    fn insert_fragments(
        &self,
        datacube: DatacubeId,
        fragments: &[FragmentDescriptor],
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.datacubes.contains_key(&datacube.0) {
            return Err(Error::Utility(format!("no datacube {}", datacube.0)));
        }
        state.batches += 1;
        state
            .fragments
            .entry(datacube.0)
            .or_default()
            .extend_from_slice(fragments);

        Ok(())
    }

    fn delete_datacube(&self, datacube: DatacubeId) -> Result<()> {
        let mut state = self.state.lock();
        state.datacubes.remove(&datacube.0);
        state.fragments.remove(&datacube.0);
        state.deleted.push(datacube);

        Ok(())
    }
}

#[derive(Default)]
struct IoState {
    payloads: HashMap<(i64, usize), Vec<u8>>,
    open: usize,
    total: usize,
    inserts: usize,
}

/// Array server double keyed by `(database id, fragment relative index)`.
///
/// `fail_after` makes every insert past the given count fail, for rollback
/// tests.
///
pub struct MemIoServer {
    state: Mutex<IoState>,
    fail_after: Option<usize>,
}

impl MemIoServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IoState::default()),
            fail_after: None,
        }
    }

    pub fn fail_after(mut self, inserts: usize) -> Self {
        self.fail_after = Some(inserts);
        self
    }

    pub fn payload_of(&self, db: i64, fragment: usize) -> Option<Vec<u8>> {
        self.state.lock().payloads.get(&(db, fragment)).cloned()
    }

    pub fn payload_count(&self) -> usize {
        self.state.lock().payloads.len()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    pub fn total_connections(&self) -> usize {
        self.state.lock().total
    }
}

impl IoServer for MemIoServer {
    fn connect(&self) -> Result<Box<dyn IoConnection + '_>> {
        let mut state = self.state.lock();
        state.open += 1;
        state.total += 1;

        Ok(Box::new(MemConnection { server: self }))
    }
}

struct MemConnection<'a> {
    server: &'a MemIoServer,
}

impl IoConnection for MemConnection<'_> {
    fn insert_fragment(
        &mut self,
        db: &DbInstance,
        fragment: &FragmentDescriptor,
        payload: &[u8],
    ) -> Result<()> {
        let mut state = self.server.state.lock();
        state.inserts += 1;
        if let Some(limit) = self.server.fail_after {
            if state.inserts > limit {
                return Err(Error::Utility(String::from("array server write failed")));
            }
        }
        state
            .payloads
            .insert((db.id, fragment.frag_relative_index), payload.to_vec());

        Ok(())
    }
}

impl Drop for MemConnection<'_> {
    fn drop(&mut self) {
        self.server.state.lock().open -= 1;
    }
}

#[derive(Default)]
pub struct MemReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl MemReporter {
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().clone()
    }
}

impl ResultReporter for MemReporter {
    fn report(&self, title: &str, body: &str) -> Result<()> {
        self.reports
            .lock()
            .push((String::from(title), String::from(body)));

        Ok(())
    }
}

/// Time parser double: the window text is "lower_upper" in coordinate units
///
pub struct FixedTimeParser;

impl TimeParser for FixedTimeParser {
    fn coordinate_bounds(&self, filter: &str, _units: &str, _calendar: &str) -> Result<(f64, f64)> {
        let parts: Vec<&str> = filter.split('_').collect();
        match parts.as_slice() {
            [lower, upper] => {
                let lower: f64 = lower.trim().parse().map_err(|_| bad_window(filter))?;
                let upper: f64 = upper.trim().parse().map_err(|_| bad_window(filter))?;

                Ok((lower, upper))
            }
            _ => Err(bad_window(filter)),
        }
    }
}

fn bad_window(filter: &str) -> Error {
    Error::InvalidParam(format!("malformed time window {}", filter))
}

struct LockstepShared {
    slot: Mutex<Vec<u8>>,
    reduce: Mutex<Vec<i64>>,
    barrier: Barrier,
}

/// Thread-backed communicator: `create(n)` returns one group per rank,
/// sharing a broadcast slot and a reduce pool behind barriers.
///
pub struct LockstepGroup {
    rank: usize,
    size: usize,
    shared: Arc<LockstepShared>,
}

impl LockstepGroup {
    pub fn create(size: usize) -> Vec<Self> {
        let shared = Arc::new(LockstepShared {
            slot: Mutex::new(Vec::new()),
            reduce: Mutex::new(Vec::new()),
            barrier: Barrier::new(size),
        });

        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl CommGroup for LockstepGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&self, root: usize, buffer: &mut Vec<u8>) -> Result<()> {
        if self.rank == root {
            *self.shared.slot.lock() = buffer.clone();
        }
        self.shared.barrier.wait();
        if self.rank != root {
            *buffer = self.shared.slot.lock().clone();
        }
        // Nobody starts the next collective until everyone has read the slot
        self.shared.barrier.wait();

        Ok(())
    }

    fn all_reduce_max(&self, value: i64) -> Result<i64> {
        self.shared.reduce.lock().push(value);
        self.shared.barrier.wait();
        let result = self
            .shared
            .reduce
            .lock()
            .iter()
            .copied()
            .max()
            .unwrap_or(value);
        self.shared.barrier.wait();
        if self.rank == 0 {
            self.shared.reduce.lock().clear();
        }
        self.shared.barrier.wait();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn test_lockstep_broadcast() {
        let groups = LockstepGroup::create(3);
        let buffers: Vec<Vec<u8>> = thread::scope(|scope| {
            let mut joins = Vec::new();
            for comm in groups {
                joins.push(scope.spawn(move || {
                    let mut buffer = if comm.rank() == 1 {
                        vec![1, 2, 3]
                    } else {
                        Vec::new()
                    };
                    comm.broadcast(1, &mut buffer).unwrap();

                    buffer
                }));
            }
            joins.into_iter().map(|join| join.join().unwrap()).collect()
        });

        for buffer in buffers {
            assert_eq!(buffer, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_lockstep_reduce_is_reusable() {
        let groups = LockstepGroup::create(3);
        let results: Vec<(i64, i64)> = thread::scope(|scope| {
            let mut joins = Vec::new();
            for comm in groups {
                joins.push(scope.spawn(move || {
                    let first = comm.all_reduce_max(comm.rank() as i64).unwrap();
                    let second = comm.all_reduce_max(-(comm.rank() as i64)).unwrap();

                    (first, second)
                }));
            }
            joins.into_iter().map(|join| join.join().unwrap()).collect()
        });

        for (first, second) in results {
            assert_eq!(first, 2);
            assert_eq!(second, 0);
        }
    }

    #[test]
    fn test_mem_reader_subarray_is_big_endian_row_major() -> Result<()> {
        let dims = vec![mem_dim("a", 2, false), mem_dim("b", 3, false)];
        let data =
            ArrayD::from_shape_vec(vec![2, 3], vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
        let reader = MemReader::new(vec![MemSource::new(
            "x.nc",
            "v",
            ElementType::F64,
            dims,
            data,
        )]);
        let handle = reader.open("x.nc")?;

        let bytes = reader.read_subarray(&handle, "v", &[0, 1], &[2, 2])?;
        let mut expected = Vec::new();
        for value in [1.0f64, 2.0, 11.0, 12.0] {
            expected.write_f64(value)?;
        }
        assert_eq!(bytes, expected);

        assert!(reader.read_subarray(&handle, "v", &[0, 2], &[1, 2]).is_err());
        assert!(reader.read_subarray(&handle, "v", &[0], &[1]).is_err());

        Ok(())
    }
}
