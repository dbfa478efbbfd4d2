mod balance;
mod classify;
mod comm;
mod coord;
mod errors;
mod extio;
mod helpers;
mod import;
mod ioserver;
mod layout;
mod measure;
mod merge;
mod plan;
mod report;
mod source;
mod store;
mod subset;
mod synth;
#[cfg(test)]
mod testing;
mod time;

pub use balance::assign_blocks;
pub use balance::assignment;
pub use balance::WorkAssignment;
pub use balance::IDLE;

pub use classify::DimensionClassifier;
pub use classify::RoleSpec;

pub use comm::CommGroup;
pub use comm::LocalGroup;
pub use comm::STATUS_DRY_RUN;
pub use comm::STATUS_OK;

pub use coord::CoordBuffer;

pub use errors::Error;
pub use errors::Result;

pub use import::run_import;
pub use import::ImportOutcome;
pub use import::ImportRequest;
pub use import::TaskEnv;

pub use ioserver::IoConnection;
pub use ioserver::IoServer;

pub use layout::FragmentDescriptor;
pub use layout::FragmentLayoutBuilder;

pub use measure::DimensionDescriptor;
pub use measure::ElementType;
pub use measure::Measure;

pub use merge::MergedAxis;
pub use merge::MultiSourceMerger;

pub use plan::PartitionPlan;
pub use plan::PartitionPlanner;

pub use report::ResultReporter;

pub use source::DimensionInfo;
pub use source::SourceArrayReader;
pub use source::SourceHandle;
pub use source::VariableInfo;

pub use store::DatacubeId;
pub use store::DatacubeSummary;
pub use store::DbInstance;
pub use store::HostPartition;
pub use store::MetadataStore;

pub use subset::SubsetFilter;
pub use subset::SubsetResolver;
pub use subset::SubsetSpec;

pub use synth::run_generate;
pub use synth::DimensionSpec;
pub use synth::GenerateRequest;

pub use time::to_common_unit;
pub use time::TimeParser;
