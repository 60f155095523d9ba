//! # Service Layer
//!
//! Four independently testable components, split along clean ownership
//! boundaries:
//!
//! | Component           | Owns                                                          |
//! |----------------------|---------------------------------------------------------------|
//! | [`AuthService`]      | Login, refresh/exchange, logout: the session lifecycle        |
//! | [`LifecycleService`] | Registration/approval, profile/email/password, OTP, API keys, deletion |
//! | [`RankService`]      | Role tag grant/revoke policy and invitation acceptance         |
//! | [`EventDispatcher`]  | In-process fan-out of [`crate::domain::events::LifecycleEvent`], plus the delete-cascade and GC background tasks |
//!
//! The API layer calls into whichever of these a route needs; none of
//! them call each other directly except through the event dispatcher.

pub mod auth_service;
pub mod events;
pub mod lifecycle_service;
pub mod rank_service;

pub use auth_service::{AuthResponse, AuthService, LoginRequest, TokenPair};
pub use events::{spawn_delete_cascade_worker, spawn_gc_sweepers, EventDispatcher};
pub use lifecycle_service::LifecycleService;
pub use rank_service::RankService;
