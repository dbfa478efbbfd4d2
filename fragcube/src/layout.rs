use crate::balance::WorkAssignment;
use crate::plan::PartitionPlan;

/// One fragment's place in the datacube.
///
/// `frag_relative_index` is 1-based and global across the whole datacube.
/// `key_start` and `key_end` are 1-based inclusive tuple keys; an empty
/// fragment has `key_end == key_start - 1`.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDescriptor {
    pub frag_relative_index: usize,
    pub db_index: usize,
    pub key_start: usize,
    pub key_end: usize,
    pub name: String,
}

impl FragmentDescriptor {
    pub fn tuple_count(&self) -> usize {
        self.key_end + 1 - self.key_start
    }

    /// The 0-based range of outermost-dimension increments this fragment
    /// covers, given the tuple count of one increment. `None` for an empty
    /// fragment.
    ///
    pub fn increment_span(&self, inner_dim_product: usize) -> Option<(usize, usize)> {
        if self.key_end < self.key_start {
            return None;
        }

        Some((
            (self.key_start - 1) / inner_dim_product,
            (self.key_end - 1) / inner_dim_product,
        ))
    }
}

/// Lays fragments out over the tuple key space of a [`PartitionPlan`].
///
/// The first `uneven_frags` fragments are full, the rest are one
/// `inner_dim_product` shorter, and key ranges tile `1..` in fragment order
/// without gaps. Key positions come from a closed form over the fragment's
/// global index, so a worker can place its own run without walking the
/// fragments before it.
///
pub struct FragmentLayoutBuilder<'a> {
    plan: &'a PartitionPlan,
    label: String,
}

impl<'a> FragmentLayoutBuilder<'a> {
    pub fn new<S>(plan: &'a PartitionPlan, label: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            plan,
            label: label.into(),
        }
    }

    /// Descriptor of the fragment at 0-based global index `global`
    ///
    pub fn descriptor(&self, global: usize) -> FragmentDescriptor {
        let plan = self.plan;
        let relative = global + 1;

        let key_start = if plan.uneven_frags > 0 {
            let full_before = global.min(plan.uneven_frags);
            let short_before = global - full_before;
            full_before * plan.tuples_per_frag
                + short_before * (plan.tuples_per_frag - plan.inner_dim_product)
                + 1
        } else {
            global * plan.tuples_per_frag + 1
        };

        let size = if plan.uneven_frags == 0 || relative <= plan.uneven_frags {
            plan.tuples_per_frag
        } else {
            plan.tuples_per_frag - plan.inner_dim_product
        };

        FragmentDescriptor {
            frag_relative_index: relative,
            db_index: global / plan.frags_per_db,
            key_start,
            key_end: key_start + size - 1,
            name: format!("{}_f{}", self.label, relative),
        }
    }

    /// Descriptors for a worker's contiguous run of fragments
    ///
    pub fn build_run(&self, block: &WorkAssignment) -> Vec<FragmentDescriptor> {
        if block.is_idle() {
            return Vec::new();
        }

        let first = block.first_id as usize;
        (first..first + block.count)
            .map(|global| self.descriptor(global))
            .collect()
    }
}
