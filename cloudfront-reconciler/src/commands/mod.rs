//! Commands module - the operations exposed to resource handlers

mod certificate;
mod delete;
mod deploy;
pub(crate) mod service;

pub use service::Reconciler;
