use std::io;
use std::thread;

use log::{debug, info, warn};

use crate::balance::{assign_blocks, assignment, WorkAssignment};
use crate::classify::{DimensionClassifier, RoleSpec};
use crate::comm::{broadcast_object, broadcast_status, CommGroup, STATUS_DRY_RUN, STATUS_OK};
use crate::errors::{Error, Result};
use crate::extio::{ExtendedRead, ExtendedWrite, Serialize};
use crate::ioserver::IoServer;
use crate::layout::{FragmentDescriptor, FragmentLayoutBuilder};
use crate::measure::Measure;
use crate::merge::{MergedAxis, MultiSourceMerger};
use crate::plan::{PartitionPlan, PartitionPlanner};
use crate::report::ResultReporter;
use crate::source::{SourceArrayReader, SourceHandle};
use crate::store::{DatacubeId, DatacubeSummary, DbInstance, MetadataStore};
use crate::subset::{SubsetResolver, SubsetSpec};
use crate::time::TimeParser;

const ROOT: usize = 0;

/// The collaborators one task runs against
///
#[derive(Clone, Copy)]
pub struct TaskEnv<'a> {
    pub reader: &'a dyn SourceArrayReader,
    pub time_parser: &'a dyn TimeParser,
    pub store: &'a dyn MetadataStore,
    pub io: &'a dyn IoServer,
    pub reporter: &'a dyn ResultReporter,
    pub comm: &'a dyn CommGroup,
}

/// An import of one measure variable from one or more source files.
///
/// `paths` lists the source files; more than one requires the measure to
/// have an unlimited outermost dimension and `import_metadata` to be on,
/// because merging needs per-file time metadata. `roles` and `subset`
/// drive classification and subsetting, `host_request` and
/// `frags_per_db_request` narrow the partitioning, and `nthreads` sets the
/// fragment population thread count per process.
///
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub container: String,
    pub measure: String,
    pub paths: Vec<String>,
    pub roles: RoleSpec,
    pub subset: SubsetSpec,
    pub time_dimension: Option<String>,
    pub host_request: Option<usize>,
    pub frags_per_db_request: Option<usize>,
    pub io_server_type: String,
    pub partition: Option<String>,
    pub nthreads: usize,
    pub import_metadata: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The plan was computed and reported, nothing was enacted
    DryRun,
    Imported {
        datacube: DatacubeId,
        plan: PartitionPlan,
    },
}

/// Everything a worker needs to enact the coordinator's plan
///
pub(crate) struct PlanEnvelope {
    pub plan: PartitionPlan,
    pub datacube: DatacubeId,
    pub instances: Vec<DbInstance>,
}

impl Serialize for PlanEnvelope {
    fn write_to(&self, stream: &mut impl io::Write) -> Result<()> {
        self.plan.write_to(stream)?;
        stream.write_i64(self.datacube.0)?;
        stream.write_u32(self.instances.len() as u32)?;
        for instance in &self.instances {
            instance.write_to(stream)?;
        }

        Ok(())
    }

    fn read_from(stream: &mut impl io::Read) -> Result<Self> {
        let plan = PartitionPlan::read_from(stream)?;
        let datacube = DatacubeId(stream.read_i64()?);
        let count = stream.read_u32()? as usize;
        let mut instances = Vec::with_capacity(count);
        for _ in 0..count {
            instances.push(DbInstance::read_from(stream)?);
        }

        Ok(Self {
            plan,
            datacube,
            instances,
        })
    }
}

/// The parts of a request the coordination and population steps share
/// between import and generation.
///
pub(crate) struct PlanSettings<'a> {
    pub operation: &'a str,
    pub container: &'a str,
    pub io_server_type: &'a str,
    pub partition: Option<&'a str>,
    pub host_request: Option<usize>,
    pub frags_per_db_request: Option<usize>,
    pub nthreads: usize,
    pub dry_run: bool,
}

/// Coordinator-only planning and registration.
///
/// Returns the status to broadcast and, on a real run, the plan envelope.
/// A dry run reports the plan (or why there is none) as text and enacts
/// nothing.
///
pub(crate) fn coordinate_plan(
    env: &TaskEnv,
    settings: &PlanSettings,
    measure: &Measure,
) -> Result<(i64, Option<PlanEnvelope>)> {
    let partition = env.store.resolve_host_partition(
        settings.io_server_type,
        settings.partition,
        settings.host_request,
    )?;
    let planner = PartitionPlanner::from_measure(
        measure,
        settings.host_request,
        settings.frags_per_db_request,
        partition.available_host_count,
    );

    if settings.dry_run {
        let body = match planner.plan().and_then(|plan| {
            plan.validate_hosts(partition.available_host_count)?;
            Ok(plan)
        }) {
            Ok(plan) => plan.to_string(),
            Err(error) => format!("not feasible: {}", error),
        };
        env.reporter
            .report(&format!("{} plan", settings.operation), &body)?;

        return Ok((STATUS_DRY_RUN, None));
    }

    let plan = planner.plan()?;
    if settings.nthreads * env.comm.size() > plan.total_frags {
        warn!(
            "{} workers for {} fragments, some will be idle",
            settings.nthreads * env.comm.size(),
            plan.total_frags
        );
    }
    plan.validate_hosts(partition.available_host_count)?;

    let instances = env
        .store
        .list_dbms_instances(partition.partition_id, plan.host_number)?;
    if instances.len() < plan.host_number {
        return Err(Error::ResourceConstraint(format!(
            "partition {} backs {} databases, the plan needs {}",
            partition.partition_id,
            instances.len(),
            plan.host_number
        )));
    }

    let summary = DatacubeSummary {
        container: String::from(settings.container),
        measure: measure.clone(),
        plan: plan.clone(),
    };
    let datacube = env.store.insert_datacube(&summary)?;
    info!("datacube {} registered: {}", datacube.0, plan);

    Ok((
        STATUS_OK,
        Some(PlanEnvelope {
            plan,
            datacube,
            instances,
        }),
    ))
}

/// Write this process's run of fragments through a pool of `nthreads`
/// population threads.
///
/// Fragments are split over threads by the same block law that split them
/// over processes. Each thread holds one io-server connection for its whole
/// run and drops it on any exit path. Returns the descriptors this process
/// wrote, for the caller's batched metadata insert.
///
pub(crate) fn execute_plan(
    env: &TaskEnv,
    nthreads: usize,
    label: &str,
    plan: &PartitionPlan,
    instances: &[DbInstance],
    payload: &(dyn Fn(&FragmentDescriptor) -> Result<Vec<u8>> + Sync),
) -> Result<Vec<FragmentDescriptor>> {
    let comm = env.comm;
    let process = assignment(plan.total_frags, comm.size(), comm.rank());
    if process.is_idle() {
        debug!("rank {} owns no fragments", comm.rank());
        return Ok(Vec::new());
    }

    let builder = FragmentLayoutBuilder::new(plan, label);
    let blocks = assign_blocks(process.count, nthreads);

    let results: Vec<Result<Vec<FragmentDescriptor>>> = thread::scope(|scope| {
        let mut joins = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let builder = &builder;
            joins.push(scope.spawn(move || {
                if block.is_idle() {
                    return Ok(Vec::new());
                }

                let run = WorkAssignment {
                    count: block.count,
                    first_id: process.first_id + block.first_id,
                };
                let fragments = builder.build_run(&run);
                let mut connection = env.io.connect()?;
                for fragment in &fragments {
                    let bytes = payload(fragment)?;
                    connection.insert_fragment(&instances[fragment.db_index], fragment, &bytes)?;
                    debug!("fragment {} written, {} bytes", fragment.name, bytes.len());
                }

                Ok(fragments)
            }));
        }

        joins
            .into_iter()
            .map(|join| match join.join() {
                Ok(result) => result,
                Err(_) => Err(Error::Utility(String::from(
                    "fragment population thread panicked",
                ))),
            })
            .collect()
    });

    let mut written = Vec::with_capacity(process.count);
    for result in results {
        written.extend(result?);
    }

    Ok(written)
}

fn populate(
    env: &TaskEnv,
    nthreads: usize,
    label: &str,
    envelope: &PlanEnvelope,
    payload: &(dyn Fn(&FragmentDescriptor) -> Result<Vec<u8>> + Sync),
) -> Result<()> {
    let fragments = execute_plan(env, nthreads, label, &envelope.plan, &envelope.instances, payload)?;
    if !fragments.is_empty() {
        env.store.insert_fragments(envelope.datacube, &fragments)?;
    }

    Ok(())
}

/// The tail every rank runs once the plan envelope has arrived: populate,
/// agree on a verdict, roll back on failure.
///
pub(crate) fn finish(
    env: &TaskEnv,
    settings: &PlanSettings,
    envelope: PlanEnvelope,
    mut local_error: Option<Error>,
    payload: &(dyn Fn(&FragmentDescriptor) -> Result<Vec<u8>> + Sync),
) -> Result<ImportOutcome> {
    let comm = env.comm;
    let label = format!("{}_{}", settings.container, envelope.datacube.0);

    let local_code = match local_error {
        Some(ref error) => error.code(),
        None => match populate(env, settings.nthreads, &label, &envelope, payload) {
            Ok(()) => STATUS_OK,
            Err(error) => {
                warn!(
                    "rank {}: fragment population failed: {}",
                    comm.rank(),
                    error
                );
                let code = error.code();
                local_error = Some(error);
                code
            }
        },
    };

    let reduced = comm.all_reduce_max(local_code)?;
    let verdict = broadcast_status(comm, ROOT, reduced)?;

    if verdict != STATUS_OK {
        // Cleanup runs on the coordinator only, after every rank has been
        // signalled to stop.
        if comm.rank() == ROOT {
            info!("rolling back datacube {}", envelope.datacube.0);
            if let Err(error) = env.store.delete_datacube(envelope.datacube) {
                warn!("rollback of datacube {} failed: {}", envelope.datacube.0, error);
            }
        }

        return Err(local_error.unwrap_or_else(|| Error::from_code(verdict)));
    }

    if comm.rank() == ROOT {
        let body = format!("datacube {}: {}", envelope.datacube.0, envelope.plan);
        if let Err(error) = env.reporter.report(settings.operation, &body) {
            warn!("result report failed: {}", error);
        }
    }

    Ok(ImportOutcome::Imported {
        datacube: envelope.datacube,
        plan: envelope.plan,
    })
}

/// Per-rank state of one import task, owned by the `run_import` call stack
///
struct ImportTask<'a> {
    request: &'a ImportRequest,
    env: TaskEnv<'a>,
    handles: Vec<SourceHandle>,
    measure: Option<Measure>,
    merged: Option<MergedAxis>,
    envelope: Option<PlanEnvelope>,
}

fn task_state(what: &str) -> Error {
    Error::Utility(format!("import task lost its {}", what))
}

impl<'a> ImportTask<'a> {
    fn new(request: &'a ImportRequest, env: TaskEnv<'a>) -> Self {
        Self {
            request,
            env,
            handles: Vec::new(),
            measure: None,
            merged: None,
            envelope: None,
        }
    }

    /// Deterministic per-rank preparation: open sources, classify, subset
    fn prepare(&mut self) -> Result<()> {
        let request = self.request;
        if request.paths.is_empty() {
            return Err(Error::InvalidParam(String::from(
                "at least one source file is required",
            )));
        }
        if request.nthreads == 0 {
            return Err(Error::InvalidParam(String::from(
                "nthreads must be positive",
            )));
        }
        if request.paths.len() > 1 && !request.import_metadata {
            return Err(Error::InvalidParam(String::from(
                "multi-file imports require metadata import",
            )));
        }

        for path in &request.paths {
            self.handles.push(self.env.reader.open(path)?);
        }

        let handle = &self.handles[0];
        let variable = self.env.reader.describe_variable(handle, &request.measure)?;
        let mut dimensions = Vec::with_capacity(variable.dim_ids.len());
        for &dim_id in &variable.dim_ids {
            dimensions.push(self.env.reader.describe_dimension(handle, dim_id)?);
        }

        let classifier = DimensionClassifier::new(&request.roles);
        let mut measure =
            classifier.classify(&request.measure, variable.element_type, &dimensions)?;

        if request.paths.len() > 1 {
            let unlimited = measure.unlimited().ok_or_else(|| {
                Error::InvalidParam(String::from(
                    "multi-file imports require an unlimited dimension",
                ))
            })?;
            if !unlimited.explicit || unlimited.level != 1 || !measure.dimensions[0].unlimited {
                return Err(Error::InvalidParam(String::from(
                    "the merged dimension must be the first source dimension \
                     and the outermost explicit dimension",
                )));
            }
            if request
                .subset
                .filters
                .iter()
                .any(|filter| filter.dimension == unlimited.name)
            {
                return Err(Error::InvalidParam(String::from(
                    "the merged dimension can't be filtered",
                )));
            }
        }

        let resolver = SubsetResolver::new(
            self.env.reader,
            self.env.time_parser,
            request.time_dimension.as_deref(),
        );
        resolver.resolve(&self.handles[0], &mut measure, &request.subset)?;

        self.measure = Some(measure);

        Ok(())
    }

    /// Coordinator-only merging, planning and registration
    fn coordinate(&mut self, settings: &PlanSettings) -> Result<i64> {
        if self.request.paths.len() > 1 {
            let measure = self.measure.as_ref().ok_or_else(|| task_state("measure"))?;
            let dimension = measure.unlimited().ok_or_else(|| task_state("axis"))?;
            let merger = MultiSourceMerger::new(
                self.env.reader,
                self.request.time_dimension.as_deref(),
            );
            let merged = merger.merge(&self.handles, &self.request.measure, dimension)?;
            self.merged = Some(merged);
            self.apply_merge()?;
        }

        let measure = self.measure.as_ref().ok_or_else(|| task_state("measure"))?;
        let (status, envelope) = coordinate_plan(&self.env, settings, measure)?;
        self.envelope = envelope;

        Ok(status)
    }

    /// Stretch the unlimited dimension over the whole merged axis
    fn apply_merge(&mut self) -> Result<()> {
        let total = self
            .merged
            .as_ref()
            .ok_or_else(|| task_state("merged axis"))?
            .total_len();
        let measure = self.measure.as_mut().ok_or_else(|| task_state("measure"))?;
        let index = measure
            .dimensions
            .iter()
            .position(|dimension| dimension.unlimited)
            .ok_or_else(|| task_state("unlimited dimension"))?;

        let dimension = &mut measure.dimensions[index];
        dimension.size = total;
        dimension.start_index = 0;
        dimension.end_index = total - 1;

        Ok(())
    }

    /// Read one fragment's tuples from the source files
    fn read_payload(&self, fragment: &FragmentDescriptor) -> Result<Vec<u8>> {
        let measure = self.measure.as_ref().ok_or_else(|| task_state("measure"))?;
        let element_size = measure.element_type.byte_size();
        fragment
            .tuple_count()
            .checked_mul(measure.implicit_array_len())
            .and_then(|elements| elements.checked_mul(element_size))
            .ok_or_else(|| Error::Memory(format!("fragment {} payload overflows", fragment.name)))?;

        let (first, last) = match fragment.increment_span(measure.inner_dim_product()) {
            Some(span) => span,
            None => return Ok(Vec::new()),
        };

        if self.request.paths.len() > 1 {
            return self.read_merged_payload(measure, first, last);
        }

        match measure.driving_dimension() {
            Some(index) => {
                let start = measure.dimensions[index].start_index + first;
                self.read_slab(&self.handles[0], measure, Some((index, start, last - first + 1)))
            }
            None => self.read_slab(&self.handles[0], measure, None),
        }
    }

    /// A fragment of a merged axis may span source files; read it one
    /// per-file run at a time.
    fn read_merged_payload(&self, measure: &Measure, first: usize, last: usize) -> Result<Vec<u8>> {
        let merged = self.merged.as_ref().ok_or_else(|| task_state("merged axis"))?;
        let axis = measure
            .dimensions
            .iter()
            .position(|dimension| dimension.unlimited)
            .ok_or_else(|| task_state("unlimited dimension"))?;

        let mut bytes = Vec::new();
        let mut increment = first;
        while increment <= last {
            let (position, local) = merged.locate(increment).ok_or_else(|| {
                Error::Utility(format!("increment {} is beyond the merged axis", increment))
            })?;
            let run = (last - increment + 1).min(merged.lengths[position] - local);
            let handle = &self.handles[merged.order[position]];
            let slab = self.read_slab(handle, measure, Some((axis, local, run)))?;
            bytes.extend_from_slice(&slab);
            increment += run;
        }

        Ok(bytes)
    }

    /// Read a subarray covering the measure's subset ranges, with one
    /// dimension's range overridden, and lay it out in payload order.
    fn read_slab(
        &self,
        handle: &SourceHandle,
        measure: &Measure,
        override_dim: Option<(usize, usize, usize)>,
    ) -> Result<Vec<u8>> {
        let mut starts = Vec::with_capacity(measure.dimensions.len());
        let mut counts = Vec::with_capacity(measure.dimensions.len());
        for (index, dimension) in measure.dimensions.iter().enumerate() {
            match override_dim {
                Some((overridden, start, count)) if overridden == index => {
                    starts.push(start);
                    counts.push(count);
                }
                _ => {
                    starts.push(dimension.start_index);
                    counts.push(dimension.subset_len());
                }
            }
        }

        let element_size = measure.element_type.byte_size();
        let bytes = self
            .env
            .reader
            .read_subarray(handle, &measure.name, &starts, &counts)?;
        let expected = counts.iter().product::<usize>() * element_size;
        if bytes.len() != expected {
            return Err(Error::Utility(format!(
                "short read of {}: {} bytes instead of {}",
                measure.name,
                bytes.len(),
                expected
            )));
        }

        Ok(rearrange_slab(bytes, &counts, &measure.payload_map(), element_size))
    }
}

/// Transpose a slab from source dimension order into payload order.
///
/// `shape` is the slab's shape in source order and `map` takes a payload
/// axis to its source dimension index. An identity map returns the slab
/// unchanged.
///
fn rearrange_slab(bytes: Vec<u8>, shape: &[usize], map: &[usize], element_size: usize) -> Vec<u8> {
    if map.iter().enumerate().all(|(axis, &source)| axis == source) {
        return bytes;
    }

    let mut source_strides = vec![0; shape.len()];
    let mut stride = 1;
    for axis in (0..shape.len()).rev() {
        source_strides[axis] = stride;
        stride *= shape[axis];
    }

    let payload_shape: Vec<usize> = map.iter().map(|&source| shape[source]).collect();
    let mut out = vec![0; bytes.len()];
    let mut index = vec![0; payload_shape.len()];
    for element in 0..stride {
        let mut offset = 0;
        for (axis, &position) in index.iter().enumerate() {
            offset += position * source_strides[map[axis]];
        }
        let src = offset * element_size;
        let dst = element * element_size;
        out[dst..dst + element_size].copy_from_slice(&bytes[src..src + element_size]);

        for axis in (0..index.len()).rev() {
            index[axis] += 1;
            if index[axis] < payload_shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }

    out
}

/// Import a measure into the fragment store.
///
/// Every rank of `env.comm` must call this with the same request. Rank 0
/// coordinates: it merges multi-file axes, computes the partition plan,
/// registers the datacube and distributes the results; all ranks then
/// populate their share of fragments. Any failure anywhere rolls the
/// datacube back and surfaces on every rank.
///
pub fn run_import(request: &ImportRequest, env: &TaskEnv) -> Result<ImportOutcome> {
    let comm = env.comm;
    let settings = PlanSettings {
        operation: "import",
        container: &request.container,
        io_server_type: &request.io_server_type,
        partition: request.partition.as_deref(),
        host_request: request.host_request,
        frags_per_db_request: request.frags_per_db_request,
        nthreads: request.nthreads,
        dry_run: request.dry_run,
    };

    let mut task = ImportTask::new(request, *env);
    let mut local_error = match task.prepare() {
        Ok(()) => None,
        Err(error) => {
            warn!("rank {}: import preparation failed: {}", comm.rank(), error);
            Some(error)
        }
    };

    // Collective 1: the coordinator's verdict on planning. Nothing may
    // return before this point without broadcasting, or the other ranks
    // would hang.
    let status = if comm.rank() == ROOT {
        match local_error {
            Some(ref error) => error.code(),
            None => match task.coordinate(&settings) {
                Ok(status) => status,
                Err(error) => {
                    warn!("import coordination failed: {}", error);
                    let code = error.code();
                    local_error = Some(error);
                    code
                }
            },
        }
    } else {
        STATUS_OK
    };
    let status = broadcast_status(comm, ROOT, status)?;

    if status == STATUS_DRY_RUN {
        return Ok(ImportOutcome::DryRun);
    }
    if status != STATUS_OK {
        return Err(local_error.unwrap_or_else(|| Error::from_code(status)));
    }

    // Collective 2, multi-file runs only: the merged axis. A rank whose own
    // preparation failed still joins every collective; its error surfaces
    // in the verdict.
    if request.paths.len() > 1 {
        let merged = broadcast_object(comm, ROOT, task.merged.as_ref())?;
        if comm.rank() != ROOT && local_error.is_none() {
            task.merged = Some(merged);
            if let Err(error) = task.apply_merge() {
                local_error = Some(error);
            }
        }
    }

    // Collective 3: the plan envelope
    let envelope = broadcast_object(comm, ROOT, task.envelope.as_ref())?;

    let payload = |fragment: &FragmentDescriptor| task.read_payload(fragment);

    finish(env, &settings, envelope, local_error, &payload)
}
