use crate::errors::{Error, Result};
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};

/// Status code meaning every rank may proceed
pub const STATUS_OK: i64 = 0;

/// Status code for a dry run: the plan is valid but nothing was enacted
pub const STATUS_DRY_RUN: i64 = -1;

const MAGIC_NUMBER: u16 = 0xFCBE;
const FORMAT_VERSION: u32 = 0;

/// A group of cooperating SPMD processes.
///
/// Every member must reach every collective call in the same order. The
/// task layer is written against this seam: a single-process run uses
/// [`LocalGroup`], a cluster run plugs in a real message-passing group.
///
pub trait CommGroup: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Replace every member's buffer with the root's buffer
    fn broadcast(&self, root: usize, buffer: &mut Vec<u8>) -> Result<()>;

    /// Every member receives the maximum of all members' values
    fn all_reduce_max(&self, value: i64) -> Result<i64>;
}

/// The trivial group of one process
///
#[derive(Debug, Default)]
pub struct LocalGroup;

impl CommGroup for LocalGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast(&self, _root: usize, _buffer: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn all_reduce_max(&self, value: i64) -> Result<i64> {
        Ok(value)
    }
}

/// Broadcast a bare status code from `root` to every member
///
pub(crate) fn broadcast_status(comm: &dyn CommGroup, root: usize, status: i64) -> Result<i64> {
    let mut buffer = Vec::with_capacity(8);
    if comm.rank() == root {
        buffer.write_i64(status)?;
    }
    comm.broadcast(root, &mut buffer)?;

    let mut stream = buffer.as_slice();
    let status = stream.read_i64()?;

    Ok(status)
}

/// Broadcast one serializable object from `root` to every member.
///
/// The payload travels in a versioned envelope so mismatched builds in one
/// group fail loudly instead of misreading each other's bytes.
///
pub(crate) fn broadcast_object<T>(
    comm: &dyn CommGroup,
    root: usize,
    object: Option<&T>,
) -> Result<T>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    if comm.rank() == root {
        let object = object
            .ok_or_else(|| Error::Utility(String::from("broadcast root has nothing to send")))?;
        buffer.write_u16(MAGIC_NUMBER)?;
        buffer.write_u32(FORMAT_VERSION)?;
        object.write_to(&mut buffer)?;
    }
    comm.broadcast(root, &mut buffer)?;

    let mut stream = buffer.as_slice();
    let magic_number = stream.read_u16()?;
    if magic_number != MAGIC_NUMBER {
        return Err(Error::Utility(format!(
            "buffer is not a fragcube broadcast: magic number {:#06x}",
            magic_number
        )));
    }
    let version = stream.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::Utility(format!(
            "unrecognized broadcast format {}",
            version
        )));
    }

    T::read_from(&mut stream)
}
