//! # Domain Layer
//!
//! Core business entities and lifecycle events for the identity core.
//! This layer is framework-agnostic and holds the data model the rest
//! of the crate (repository, service, api) depends on.
//!
//! ## Module Structure
//!
//! | Module     | Purpose                                               |
//! |------------|--------------------------------------------------------|
//! | `entities` | Credential/session/reset/approval/apikey/role entities |
//! | `events`   | Generic lifecycle event enum (C12)                    |
//!
//! ## Design Decisions
//!
//! 1. **Opaque string IDs, not UUIDs**: `userid`/`session_id`/`keyid`
//!    are generated via [`shared::crypto::random_opaque_id`], and some
//!    embed their owner's id as a prefix.
//! 2. **`FromRow` Derive**: entities use sqlx's `FromRow` for mapping
//!    from database rows.
//! 3. **Projection structs for responses**: [`entities::PublicUserProfile`]
//!    and [`entities::SelfUserProfile`] strip sensitive fields out of
//!    [`entities::User`] rather than relying on field-level `skip_serializing`
//!    alone.

pub mod entities;
pub mod events;

pub use entities::*;
