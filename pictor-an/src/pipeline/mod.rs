//! The annotation pipeline
//!
//! A submission becomes a chain of stages executed sequentially by broker
//! workers: store → persist → fetch-and-annotate → update, with an optional
//! trailing notify stage for valid email addresses. Everything in this
//! module is driven by the correlation identifier minted at submission.

pub mod chain;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod stages;

pub use chain::{ChainBuilder, ChainSpec, StageKind};
pub use envelope::StageEnvelope;
pub use error::StageError;
pub use orchestrator::{Orchestrator, DEFAULT_PROMPT};
pub use retry::RetryPolicy;
pub use stages::{validate_upload, StageContext, ALLOWED_EXTENSIONS};
