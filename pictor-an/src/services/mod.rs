//! External collaborator clients
//!
//! Each collaborator is a trait at the boundary with a reqwest-backed
//! production implementation. Stages receive them by injection through the
//! StageContext; tests substitute mock implementations.

pub mod fetch;
pub mod mailer;
pub mod model;
pub mod storage;

pub use fetch::{AssetFetcher, HttpAssetFetcher};
pub use mailer::{is_valid_email, HttpMailer, Mailer};
pub use model::{OllamaClient, VisionModel};
pub use storage::{HttpObjectStorage, ObjectStorage};
