use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use log::warn;

use crate::classify::{DimensionClassifier, RoleSpec};
use crate::comm::{broadcast_object, broadcast_status, CommGroup, STATUS_DRY_RUN, STATUS_OK};
use crate::errors::{Error, Result};
use crate::extio::ExtendedWrite;
use crate::import::{coordinate_plan, finish, ImportOutcome, PlanEnvelope, PlanSettings, TaskEnv};
use crate::layout::FragmentDescriptor;
use crate::measure::{ElementType, Measure};
use crate::source::DimensionInfo;

const ROOT: usize = 0;

/// Shape of one dimension of a synthetic datacube
///
#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub name: String,
    pub size: usize,
}

/// A request to generate a datacube of random values.
///
/// The dimensions are fragmented exactly as an imported measure's would be;
/// only the payloads differ, coming from a seeded generator instead of source
/// files. With `seed` unset the values still come out deterministic, so two
/// runs of the same request produce the same datacube.
///
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub container: String,
    pub measure: String,
    pub element_type: ElementType,
    pub dimensions: Vec<DimensionSpec>,
    pub roles: RoleSpec,
    pub host_request: Option<usize>,
    pub frags_per_db_request: Option<usize>,
    pub io_server_type: String,
    pub partition: Option<String>,
    pub nthreads: usize,
    pub dry_run: bool,
    pub seed: Option<u64>,
}

fn build_measure(request: &GenerateRequest) -> Result<Measure> {
    if request.nthreads == 0 {
        return Err(Error::InvalidParam(String::from(
            "nthreads must be positive",
        )));
    }

    let dimensions: Vec<DimensionInfo> = request
        .dimensions
        .iter()
        .map(|spec| DimensionInfo {
            name: spec.name.clone(),
            length: spec.size,
            element_type: request.element_type,
            is_unlimited: false,
        })
        .collect();

    let classifier = DimensionClassifier::new(&request.roles);
    classifier.classify(&request.measure, request.element_type, &dimensions)
}

/// Fill one fragment with seeded random values.
///
/// The generator is reseeded per fragment from the request seed and the
/// fragment's relative index, so payloads don't depend on which rank or
/// thread writes them.
///
fn synthesize_payload(
    measure: &Measure,
    fragment: &FragmentDescriptor,
    seed: Option<u64>,
) -> Result<Vec<u8>> {
    let elements = fragment
        .tuple_count()
        .checked_mul(measure.implicit_array_len())
        .ok_or_else(|| Error::Memory(format!("fragment {} payload overflows", fragment.name)))?;
    let size = elements
        .checked_mul(measure.element_type.byte_size())
        .ok_or_else(|| Error::Memory(format!("fragment {} payload overflows", fragment.name)))?;

    let mut rng = StdRng::seed_from_u64(
        seed.unwrap_or(0)
            .wrapping_add(fragment.frag_relative_index as u64),
    );
    let mut bytes = Vec::with_capacity(size);
    for _ in 0..elements {
        match measure.element_type {
            ElementType::I32 => bytes.write_i32(rng.gen())?,
            ElementType::I64 => bytes.write_i64(rng.gen())?,
            ElementType::F32 => bytes.write_f32(rng.gen())?,
            ElementType::F64 => bytes.write_f64(rng.gen())?,
        }
    }

    Ok(bytes)
}

/// Generate a datacube of random values in the fragment store.
///
/// Every rank of `env.comm` must call this with the same request. The
/// coordination, fragment layout and rollback behavior are the same as an
/// import's; only the payloads are synthesized locally.
///
pub fn run_generate(request: &GenerateRequest, env: &TaskEnv) -> Result<ImportOutcome> {
    let comm = env.comm;
    let settings = PlanSettings {
        operation: "generate",
        container: &request.container,
        io_server_type: &request.io_server_type,
        partition: request.partition.as_deref(),
        host_request: request.host_request,
        frags_per_db_request: request.frags_per_db_request,
        nthreads: request.nthreads,
        dry_run: request.dry_run,
    };

    let mut local_error = None;
    let measure = match build_measure(request) {
        Ok(measure) => Some(measure),
        Err(error) => {
            warn!(
                "rank {}: generation preparation failed: {}",
                comm.rank(),
                error
            );
            local_error = Some(error);
            None
        }
    };

    // Collective 1: the coordinator's verdict on planning
    let mut envelope = None;
    let status = if comm.rank() == ROOT {
        match local_error {
            Some(ref error) => error.code(),
            None => {
                let coordinated = measure
                    .as_ref()
                    .ok_or_else(|| {
                        Error::Utility(String::from("generation task lost its measure"))
                    })
                    .and_then(|measure| coordinate_plan(env, &settings, measure));
                match coordinated {
                    Ok((status, coordinated)) => {
                        envelope = coordinated;
                        status
                    }
                    Err(error) => {
                        warn!("generation coordination failed: {}", error);
                        let code = error.code();
                        local_error = Some(error);
                        code
                    }
                }
            }
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

    // Collective 2: the plan envelope
    let envelope = broadcast_object::<PlanEnvelope>(comm, ROOT, envelope.as_ref())?;

    let payload = |fragment: &FragmentDescriptor| match measure {
        Some(ref measure) => synthesize_payload(measure, fragment, request.seed),
        None => Err(Error::Utility(String::from(
            "generation task lost its measure",
        ))),
    };

    finish(env, &settings, envelope, local_error, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use crate::comm::LocalGroup;
    use crate::testing::{
        FixedTimeParser, LockstepGroup, MemIoServer, MemReader, MemReporter, MemStore,
    };

    fn request() -> GenerateRequest {
        GenerateRequest {
            container: String::from("rand"),
            measure: String::from("tos"),
            element_type: ElementType::F64,
            dimensions: vec![
                DimensionSpec {
                    name: String::from("time"),
                    size: 6,
                },
                DimensionSpec {
                    name: String::from("lat"),
                    size: 4,
                },
                DimensionSpec {
                    name: String::from("lon"),
                    size: 4,
                },
            ],
            roles: RoleSpec {
                explicit_names: Some(vec![String::from("time"), String::from("lat")]),
                ..RoleSpec::default()
            },
            host_request: Some(2),
            frags_per_db_request: Some(3),
            io_server_type: String::from("mem"),
            partition: None,
            nthreads: 2,
            dry_run: false,
            seed: Some(42),
        }
    }

    struct Rig {
        reader: MemReader,
        store: MemStore,
        io: MemIoServer,
        reporter: MemReporter,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                reader: MemReader::new(Vec::new()),
                store: MemStore::new(8),
                io: MemIoServer::new(),
                reporter: MemReporter::default(),
            }
        }

        fn run(&self, request: &GenerateRequest) -> Result<ImportOutcome> {
            let comm = LocalGroup;
            let parser = FixedTimeParser;
            let env = TaskEnv {
                reader: &self.reader,
                time_parser: &parser,
                store: &self.store,
                io: &self.io,
                reporter: &self.reporter,
                comm: &comm,
            };

            run_generate(request, &env)
        }
    }

    #[test]
    fn test_generate() -> Result<()> {
        let rig = Rig::new();
        let outcome = rig.run(&request())?;

        let (datacube, plan) = match outcome {
            ImportOutcome::Imported { datacube, plan } => (datacube, plan),
            ImportOutcome::DryRun => panic!("expected a real run"),
        };
        assert_eq!(plan.total_frags, 6);
        assert_eq!(plan.tuples_per_frag, 4);

        assert_eq!(rig.store.fragments_of(datacube).len(), 6);
        assert_eq!(rig.io.payload_count(), 6);
        // 4 tuples of 4 f64 values each
        assert_eq!(rig.io.payload_of(1, 1).unwrap().len(), 128);

        Ok(())
    }

    #[test]
    fn test_same_seed_same_payloads() -> Result<()> {
        let first = Rig::new();
        first.run(&request())?;
        let second = Rig::new();
        second.run(&request())?;

        assert_eq!(first.io.payload_of(1, 1), second.io.payload_of(1, 1));
        assert_eq!(first.io.payload_of(2, 6), second.io.payload_of(2, 6));

        Ok(())
    }

    #[test]
    fn test_seeds_differ_per_fragment() -> Result<()> {
        let rig = Rig::new();
        rig.run(&request())?;

        assert_ne!(rig.io.payload_of(1, 1), rig.io.payload_of(1, 2));

        Ok(())
    }

    #[test]
    fn test_dry_run_enacts_nothing() -> Result<()> {
        let rig = Rig::new();
        let mut request = request();
        request.dry_run = true;

        let outcome = rig.run(&request)?;
        assert_eq!(outcome, ImportOutcome::DryRun);
        assert_eq!(rig.store.datacube_count(), 0);
        assert_eq!(rig.io.payload_count(), 0);
        assert_eq!(rig.reporter.reports().len(), 1);

        Ok(())
    }

    #[test]
    fn test_zero_threads_rejected() {
        let rig = Rig::new();
        let mut request = request();
        request.nthreads = 0;
        assert!(matches!(rig.run(&request), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_multi_rank_payloads_are_rank_independent() -> Result<()> {
        let baseline = Rig::new();
        baseline.run(&request())?;

        let store = MemStore::new(8);
        let io = MemIoServer::new();
        let reporter = MemReporter::default();
        let reader = MemReader::new(Vec::new());
        let parser = FixedTimeParser;
        let request = request();

        let outcomes: Vec<Result<ImportOutcome>> = thread::scope(|scope| {
            let mut joins = Vec::new();
            for comm in LockstepGroup::create(3) {
                let (reader, store, io, reporter, parser, request) =
                    (&reader, &store, &io, &reporter, &parser, &request);
                joins.push(scope.spawn(move || {
                    let env = TaskEnv {
                        reader,
                        time_parser: parser,
                        store,
                        io,
                        reporter,
                        comm: &comm,
                    };

                    run_generate(request, &env)
                }));
            }
            joins
                .into_iter()
                .map(|join| join.join().expect("rank thread panicked"))
                .collect()
        });

        for outcome in outcomes {
            assert!(outcome.is_ok());
        }
        assert_eq!(io.payload_count(), 6);
        for fragment in 1..=6 {
            let db = if fragment <= 3 { 1 } else { 2 };
            assert_eq!(io.payload_of(db, fragment), baseline.io.payload_of(db, fragment));
        }

        Ok(())
    }
}
