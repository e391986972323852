//! Runbook capability layer.
//!
//! This crate defines the external capabilities the runbook engine and its
//! operator surfaces consume:
//!
//! - **TaskCatalog**: worker-task definitions with typed parameter specs
//! - **TaskMatcher / TaskGenerator**: AI assist for binding and drafting tasks
//! - **ProcedureGenerator / DocumentParser**: raw text to procedure drafts
//! - **IncidentResolver**: instantiate a procedure against a live incident
//! - **TaskExecutor**: run a bound task with resolved parameter values
//! - **ProcedureStore**: persist assembled procedures
//!
//! Every capability is an [`async_trait`] trait over plain request/response
//! types. [`remote::RemoteService`] implements the HTTP-backed capabilities;
//! [`shell::ShellExecutor`] executes tasks locally.

pub mod config;
pub mod error;
pub mod remote;
pub mod shell;
pub mod traits;
pub mod types;

pub use config::ServiceConfig;
pub use error::CapabilityError;
pub use remote::RemoteService;
pub use shell::ShellExecutor;
pub use traits::{
    DocumentParser, IncidentResolver, ProcedureGenerator, ProcedureStore, TaskCatalog,
    TaskExecutor, TaskGenerator, TaskMatcher,
};
