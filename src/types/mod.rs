//! Core domain types shared by the classifier, the actions and the worker.

pub mod deployment;
pub mod event;
pub mod ids;

pub use deployment::{DeployKind, DeploymentRequest, DeploymentResult, ExecutionStatus};
pub use event::{ActionType, EventInfo, PRODUCTION_BRANCH, UnknownActionType};
pub use ids::{ExecutionId, JobId};
