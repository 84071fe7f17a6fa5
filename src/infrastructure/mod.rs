//! 基础设施层：持有稀缺资源（浏览器页面），只向上暴露能力

pub mod chromium_surface;
pub mod js_executor;
pub mod polling;
pub mod surface;

pub use chromium_surface::{ChromiumSurface, PageDiagnostics, SelectorHit};
pub use js_executor::JsExecutor;
pub use polling::{
    await_condition, dismiss_transient_obstruction, ObstructionOutcome, WaitOutcome, WaitSpec,
};
pub use surface::{
    ArtifactKind, ArtifactRequest, ArtifactStatus, Panel, ProbeResult, Retrieval, Surface,
};
