//! Declarative resource types shared by the agentrun stores and reconcilers.
//!
//! Every persisted object is a [`Resource`]: an [`ObjectMeta`] header plus a kind-specific body.
//! All types serialize as camelCase JSON and skip absent optional fields.

pub mod domain;
pub use domain::*;

pub mod kind;
pub use kind::*;
