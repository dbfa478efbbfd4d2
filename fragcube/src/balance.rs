/// Offset sentinel for workers with nothing to do
pub const IDLE: i64 = -1;

/// One worker's slice of a contiguous run of items.
///
/// `first_id` is the 0-based offset of the worker's first item, or [`IDLE`]
/// when `count` is zero.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkAssignment {
    pub count: usize,
    pub first_id: i64,
}

impl WorkAssignment {
    pub fn is_idle(&self) -> bool {
        self.first_id == IDLE
    }
}

/// Split `total` items over `workers`, front-loading the remainder.
///
/// Worker `i` gets `total / workers + 1` items if `i < total % workers`,
/// `total / workers` otherwise, at the offset left over by the workers
/// before it.
///
pub fn assign_blocks(total: usize, workers: usize) -> Vec<WorkAssignment> {
    (0..workers)
        .map(|index| assignment(total, workers, index))
        .collect()
}

/// The assignment of worker `index` out of `workers`
///
pub fn assignment(total: usize, workers: usize, index: usize) -> WorkAssignment {
    if workers == 0 || index >= workers {
        return WorkAssignment {
            count: 0,
            first_id: IDLE,
        };
    }

    let base = total / workers;
    let remainder = total % workers;
    let count = if index < remainder { base + 1 } else { base };
    if count == 0 {
        return WorkAssignment {
            count: 0,
            first_id: IDLE,
        };
    }

    // Prefix sum over the lower-indexed workers, by the same rule
    let mut first_id = 0;
    for lower in 0..index {
        first_id += if lower < remainder { base + 1 } else { base };
    }

    WorkAssignment {
        count,
        first_id: first_id as i64,
    }
}
