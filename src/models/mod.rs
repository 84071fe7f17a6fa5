pub mod loaders;
pub mod retry;
pub mod run_summary;
pub mod stage;
pub mod stage_result;
pub mod work_item;

pub use loaders::{collect_documents, RunMode};
pub use retry::{Backoff, RetryPolicies, RetryPolicy};
pub use run_summary::{ItemOutcome, RunHalt, RunSummary, RunSummaryBuilder, SummaryEntry};
pub use stage::Stage;
pub use stage_result::StageResult;
pub use work_item::{SourceDocument, WorkItem};
