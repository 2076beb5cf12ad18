pub mod dedup;
pub mod orchestrator;
pub mod policy;
pub mod ranker;
pub mod scheduler;
pub mod writer;

pub use orchestrator::{Pipeline, RefillReport, RunOutcome};
pub use ranker::rank;
pub use scheduler::{cooldown_elapsed, current_slot};
pub use writer::TemplateWriter;

pub mod prelude {
    pub use super::{Pipeline, RefillReport, RunOutcome, TemplateWriter};
}
