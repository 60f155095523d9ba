//! # Repository Layer
//!
//! Data access abstractions, one repository per entity, each holding a
//! `PgPool` clone (cheap: pool is `Arc`-backed internally).
//!
//! | Repository | Table | Component |
//! |------------|-------|-----------|
//! | [`UserRepository`] | `users` | Credential store (C1) |
//! | [`SessionRepository`] | `sessions` | Session store (C2) |
//! | [`ResetRepository`] | `userresets` | Reset-code store (C3) |
//! | [`ApprovalRepository`] | `userapprovals` | Approval store (C4) |
//! | [`ApiKeyRepository`] | `apikeys` | API-key store (C5) |
//! | [`RoleRepository`] | `userroles`, `userroleinvitations` | Role grants/invitations |
//!
//! Database errors are mapped to [`shared::errors::ApiError`] for
//! consistent HTTP responses; unique-violation mapping happens per
//! repository since the resource name differs by table.

pub mod apikey_repository;
pub mod approval_repository;
pub mod reset_repository;
pub mod role_repository;
pub mod session_repository;
pub mod user_repository;

pub use apikey_repository::ApiKeyRepository;
pub use approval_repository::ApprovalRepository;
pub use reset_repository::ResetRepository;
pub use role_repository::RoleRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
