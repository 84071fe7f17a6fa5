//! 业务能力层：每个服务负责一个阶段要做的事，只处理单个条目

pub mod artifact_verifier;
pub mod audio_service;
pub mod export_service;
pub mod interaction;
pub mod report_service;
pub mod source_upload;
pub mod transcoder;

pub use artifact_verifier::{detect_audio_format, verify_audio, verify_non_empty, AudioFormat};
pub use audio_service::AudioService;
pub use export_service::ExportService;
pub use interaction::{conclude, Interaction, StepError, StepResult};
pub use report_service::ReportService;
pub use source_upload::{source_trigger, SourceUploadService, WORKSPACE_TRIGGER};
pub use transcoder::{FfmpegTranscoder, Transcoder};
