//! # API Layer
//!
//! Bridges HTTP and the service layer: [`routes`] wires URL patterns to
//! [`handlers`], handlers validate [`dto`] request bodies and call into
//! `crate::service`, mapping results back onto `HttpResponse` (or letting
//! `ApiError`'s `ResponseError` impl render the failure envelope).
//!
//! ## Endpoint Summary
//!
//! | Method | Path                         | Auth         |
//! |--------|------------------------------|--------------|
//! | POST   | `/auth/login`                | none         |
//! | POST   | `/auth/id/{id}/exchange`     | refresh      |
//! | POST   | `/auth/id/{id}/refresh`      | refresh      |
//! | POST   | `/auth/id/{id}/logout`       | refresh      |
//! | POST   | `/u`                         | none         |
//! | POST   | `/u/confirm`                 | none         |
//! | GET    | `/u/approvals`               | admin        |
//! | POST   | `/u/approvals/id/{id}`       | admin        |
//! | DELETE | `/u/approvals/id/{id}`       | admin        |
//! | GET    | `/u/id/{id}`                 | none         |
//! | GET    | `/u`                         | user         |
//! | PUT    | `/u`                         | user         |
//! | DELETE | `/u`                         | user         |
//! | PUT    | `/u/email`                   | user         |
//! | PUT    | `/u/email/verify`            | none         |
//! | PUT    | `/u/password`                | user         |
//! | PUT    | `/u/password/forgot`         | none         |
//! | PUT    | `/u/password/forgot/reset`   | none         |
//! | PUT    | `/u/otp`                     | user         |
//! | PUT    | `/u/otp/verify`              | user         |
//! | DELETE | `/u/otp`                     | user         |
//! | PATCH  | `/u/id/{id}/rank`            | user         |
//! | POST   | `/u/rank/accept`             | user         |
//! | GET    | `/u/sessions`                | user         |
//! | DELETE | `/u/sessions`                | user         |
//! | POST   | `/apikey`                    | user         |
//! | GET    | `/apikey`                    | user         |
//! | PUT    | `/apikey/id/{id}`            | user         |
//! | DELETE | `/apikey/id/{id}`            | user         |
//! | POST   | `/apikey/id/{id}/rotate`     | user         |
//! | GET    | `/apikey/check`              | basic auth   |
//! | GET    | `/health`                    | none         |
//!
//! ## Related Documentation
//!
//! - Service layer: [`crate::service`]
//! - Error responses: [`shared::errors::ApiError`]
//! - Authentication gate: [`shared::auth::middleware::Gate`]

pub mod dto;
pub mod handlers;
pub mod routes;
