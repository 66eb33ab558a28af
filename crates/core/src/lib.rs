//! `gatehouse-core`: identity and validation building blocks.
//!
//! This crate contains **pure** primitives shared by every layer (no I/O).

pub mod entity;
pub mod error;
pub mod id;
pub mod validate;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{RoleId, UserId};
