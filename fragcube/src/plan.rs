use std::fmt;
use std::io;

use crate::errors::{Error, Result};
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};
use crate::helpers::div_ceil;
use crate::measure::Measure;

/// How a datacube's tuples are split into fragments and spread over hosts.
///
/// `total_frags` is the physical fragment count, `host_number * frags_per_db`.
/// When that product doesn't divide the logical fragment count evenly, the
/// first `uneven_frags` fragments hold `tuples_per_frag` tuples and the rest
/// hold `inner_dim_product` fewer. `uneven_frags == 0` means every fragment
/// is full.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub host_number: usize,
    pub frags_per_db: usize,
    pub tuples_per_frag: usize,
    pub total_frags: usize,
    pub uneven_frags: usize,
    pub inner_dim_product: usize,
}

impl PartitionPlan {
    /// There must be at least `host_number` eligible host/DBMS pairs
    pub fn validate_hosts(&self, available: usize) -> Result<()> {
        if available < self.host_number {
            return Err(Error::ResourceConstraint(format!(
                "plan needs {} hosts but only {} are available",
                self.host_number, available
            )));
        }

        Ok(())
    }
}

impl fmt::Display for PartitionPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} hosts, {} fragments per database, {} fragments in total, \
             {} tuples per full fragment, {} uneven fragments",
            self.host_number,
            self.frags_per_db,
            self.total_frags,
            self.tuples_per_frag,
            self.uneven_frags
        )
    }
}

impl Serialize for PartitionPlan {
    fn write_to(&self, stream: &mut impl io::Write) -> Result<()> {
        stream.write_u64(self.host_number as u64)?;
        stream.write_u64(self.frags_per_db as u64)?;
        stream.write_u64(self.tuples_per_frag as u64)?;
        stream.write_u64(self.total_frags as u64)?;
        stream.write_u64(self.uneven_frags as u64)?;
        stream.write_u64(self.inner_dim_product as u64)?;

        Ok(())
    }

    fn read_from(stream: &mut impl io::Read) -> Result<Self> {
        Ok(Self {
            host_number: stream.read_u64()? as usize,
            frags_per_db: stream.read_u64()? as usize,
            tuples_per_frag: stream.read_u64()? as usize,
            total_frags: stream.read_u64()? as usize,
            uneven_frags: stream.read_u64()? as usize,
            inner_dim_product: stream.read_u64()? as usize,
        })
    }
}

/// Chooses host and fragment counts for a datacube.
///
/// `frag_count` is the logical fragment count, the subset length of the
/// outermost explicit dimension longer than one. `inner_dim_product` is the
/// tuple count of one increment of that dimension, the product of the deeper
/// explicit subset lengths. Host and fragments-per-database requests narrow
/// the choice; whatever the split, the plan conserves
/// `frag_count * inner_dim_product` tuples, padding with empty trailing
/// fragments when the requested split overshoots.
///
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    frag_count: usize,
    inner_dim_product: usize,
    host_request: Option<usize>,
    frags_per_db_request: Option<usize>,
    available_hosts: usize,
}

impl PartitionPlanner {
    pub fn new(
        frag_count: usize,
        inner_dim_product: usize,
        host_request: Option<usize>,
        frags_per_db_request: Option<usize>,
        available_hosts: usize,
    ) -> Self {
        Self {
            frag_count,
            inner_dim_product,
            host_request,
            frags_per_db_request,
            available_hosts,
        }
    }

    pub fn from_measure(
        measure: &Measure,
        host_request: Option<usize>,
        frags_per_db_request: Option<usize>,
        available_hosts: usize,
    ) -> Self {
        Self::new(
            measure.frag_count(),
            measure.inner_dim_product(),
            host_request,
            frags_per_db_request,
            available_hosts,
        )
    }

    pub fn plan(&self) -> Result<PartitionPlan> {
        if self.host_request == Some(0) || self.frags_per_db_request == Some(0) {
            return Err(Error::InvalidParam(String::from(
                "host and fragment counts must be positive",
            )));
        }
        if self.frag_count == 0 || self.inner_dim_product == 0 {
            return Err(Error::InvalidParam(String::from(
                "no tuples to distribute",
            )));
        }
        if self.available_hosts == 0 {
            return Err(Error::ResourceConstraint(String::from(
                "no eligible host/DBMS pairs",
            )));
        }

        let (host_number, frags_per_db) = match (self.host_request, self.frags_per_db_request) {
            (None, None) => {
                if self.frag_count <= self.available_hosts {
                    (self.frag_count, 1)
                } else {
                    (
                        self.available_hosts,
                        div_ceil(self.frag_count, self.available_hosts),
                    )
                }
            }
            // Overshooting the fragment count here is allowed and yields
            // empty trailing fragments.
            (None, Some(frags_per_db)) => (self.available_hosts, frags_per_db),
            (Some(hosts), None) => {
                if self.frag_count < hosts {
                    return Err(Error::InvalidParam(format!(
                        "can't spread {} fragments over {} hosts",
                        self.frag_count, hosts
                    )));
                }
                (hosts, div_ceil(self.frag_count, hosts))
            }
            (Some(hosts), Some(frags_per_db)) => {
                if self.frag_count < hosts * frags_per_db {
                    return Err(Error::InvalidParam(format!(
                        "can't spread {} fragments over {} hosts with {} fragments per database",
                        self.frag_count, hosts, frags_per_db
                    )));
                }
                (hosts, frags_per_db)
            }
        };

        let total_frags = host_number * frags_per_db;
        let multiplier = div_ceil(self.frag_count, total_frags);

        Ok(PartitionPlan {
            host_number,
            frags_per_db,
            tuples_per_frag: self.inner_dim_product * multiplier,
            total_frags,
            uneven_frags: self.frag_count % total_frags,
            inner_dim_product: self.inner_dim_product,
        })
    }
}
