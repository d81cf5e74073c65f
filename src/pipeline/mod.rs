pub mod channel;
pub mod job;

pub use channel::{results_channel, ResultsReceiver, ResultsSender};
pub use job::{
    classify, HarvestJob, JobError, JobOptions, JobReport, JobState, JobStatus, Plan, SkipReason,
    WorkItem, ERROR_BUDGET,
};
