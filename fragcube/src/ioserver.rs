use crate::errors::Result;
use crate::layout::FragmentDescriptor;
use crate::store::DbInstance;

/// A live connection to the array I/O server, owned by a single worker
/// thread. Dropping the value releases the connection.
///
pub trait IoConnection {
    /// Create and fill one fragment in the given database. `payload` holds
    /// the fragment's tuples in key order, each tuple being the measure's
    /// implicit array in storage byte order.
    fn insert_fragment(
        &mut self,
        db: &DbInstance,
        fragment: &FragmentDescriptor,
        payload: &[u8],
    ) -> Result<()>;
}

/// Hands out connections to the array storage layer, one per worker thread
///
pub trait IoServer: Send + Sync {
    fn connect(&self) -> Result<Box<dyn IoConnection + '_>>;
}
