pub mod item_ctx;
pub mod stage_executor;
pub mod state_machine;

pub use item_ctx::ItemCtx;
pub use stage_executor::{NotebookStages, StageExecutor};
pub use state_machine::{advance, Transition};
