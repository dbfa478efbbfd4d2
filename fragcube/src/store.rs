use std::io;

use crate::errors::Result;
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};
use crate::layout::FragmentDescriptor;
use crate::measure::Measure;
use crate::plan::PartitionPlan;

/// Identifier of a registered datacube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatacubeId(pub i64);

/// A storage partition together with its eligible host count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPartition {
    pub partition_id: i64,
    pub available_host_count: usize,
}

/// One database on one I/O server host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstance {
    pub id: i64,
    pub host: String,
    pub port: u16,
}

impl Serialize for DbInstance {
    fn write_to(&self, stream: &mut impl io::Write) -> Result<()> {
        stream.write_i64(self.id)?;
        stream.write_str(&self.host)?;
        stream.write_u16(self.port)?;

        Ok(())
    }

    fn read_from(stream: &mut impl io::Read) -> Result<Self> {
        Ok(Self {
            id: stream.read_i64()?,
            host: stream.read_str()?,
            port: stream.read_u16()?,
        })
    }
}

/// Everything needed to register a new datacube
#[derive(Debug, Clone)]
pub struct DatacubeSummary {
    pub container: String,
    pub measure: Measure,
    pub plan: PartitionPlan,
}

/// The metadata catalog tracking containers, datacubes and fragments.
///
/// Fragment rows are written in one batched call per process, after the
/// process has joined all of its population threads.
///
pub trait MetadataStore: Send + Sync {
    /// Find the storage partition to deploy on, given the I/O server type
    /// and an optional partition name.
    fn resolve_host_partition(
        &self,
        io_server_type: &str,
        partition: Option<&str>,
        requested_hosts: Option<usize>,
    ) -> Result<HostPartition>;

    /// The databases backing the first `host_count` hosts of a partition
    fn list_dbms_instances(&self, partition_id: i64, host_count: usize) -> Result<Vec<DbInstance>>;

    fn insert_datacube(&self, summary: &DatacubeSummary) -> Result<DatacubeId>;

    fn insert_fragments(
        &self,
        datacube: DatacubeId,
        fragments: &[FragmentDescriptor],
    ) -> Result<()>;

    /// Remove a datacube and its fragment rows, for rollback after a failed
    /// import.
    fn delete_datacube(&self, datacube: DatacubeId) -> Result<()>;
}
