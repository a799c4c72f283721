pub mod model;
pub mod status;

pub use model::{Job, JobEvent, StagePaths};
pub use status::{JobStatus, Stage, UnknownStatus};
