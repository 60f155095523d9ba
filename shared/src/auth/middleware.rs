//! # Gate (C13)
//!
//! A stateless bearer-token + scope check. The gate only verifies a
//! token's signature, expiry, and scope; it never touches the
//! database. Role lookups and other DB-backed authorization decisions
//! belong to auth-service's own handlers/services, which layer on top
//! of the [`Principal`] this module extracts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let gate = Gate::new(jwt_service, "gov.user");
//!
//! App::new()
//!     .service(web::scope("/u").wrap(gate).route("/profile", web::get().to(handler)))
//! ```
//!
//! ```rust,ignore
//! async fn handler(principal: Principal) -> impl Responder {
//!     format!("hello, {}", principal.userid)
//! }
//! ```

use crate::auth::jwt::JwtService;
use crate::errors::ApiError;
use actix_web::dev::{forward_ready, Service, ServiceResponse, Transform};
use actix_web::{dev::ServiceRequest, Error, HttpMessage};
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// The authenticated subject of a request, extracted from a verified
/// access token. Carries the session it rides on and the scope the
/// token was granted, so handlers can make their own finer-grained
/// decisions without re-parsing the token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub userid: String,
    pub session_id: String,
    pub scope: String,
}

impl Principal {
    pub fn has_scope(&self, required: &str) -> bool {
        crate::auth::jwt::scope_satisfies(&self.scope, required)
    }
}

/// Verifies bearer tokens against a required scope and stashes a
/// [`Principal`] in request extensions for the `Principal` extractor.
#[derive(Clone)]
pub struct Gate {
    jwt_service: Arc<JwtService>,
    required_scope: String,
}

impl Gate {
    pub fn new(jwt_service: Arc<JwtService>, required_scope: impl Into<String>) -> Self {
        Self {
            jwt_service,
            required_scope: required_scope.into(),
        }
    }

    /// Extracts and verifies the bearer token carried by `req`: an
    /// `Authorization: Bearer <t>` header takes precedence, falling back
    /// to the `access_token` cookie for a browser client that never sets
    /// the header by hand.
    pub fn extract_principal(&self, req: &ServiceRequest) -> Result<Principal, ApiError> {
        let header_token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(JwtService::extract_from_header)
            .map(|s| s.to_string());

        let token = match header_token {
            Some(t) => t,
            None => req
                .cookie("access_token")
                .map(|c| c.value().to_string())
                .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?,
        };

        let claims = self
            .jwt_service
            .verify(&token, &self.required_scope, false)
            .map_err(|_| ApiError::unauthenticated("invalid or expired token"))?;

        Ok(Principal {
            userid: claims.sub,
            session_id: claims.id,
            scope: claims.scope,
        })
    }

    /// Verifies the request and inserts the resulting [`Principal`] into
    /// its extensions.
    pub fn authenticate(&self, req: &ServiceRequest) -> Result<(), ApiError> {
        let principal = self.extract_principal(req)?;
        req.extensions_mut().insert(principal);
        Ok(())
    }
}

/// Extracts the [`Principal`] stashed by [`Gate::authenticate`].
///
/// Returns `ApiError::Unauthenticated` if no gate ran for this request.
impl actix_web::FromRequest for Principal {
    type Error = Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let result = req
            .extensions()
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::unauthenticated("not authenticated").into());

        std::future::ready(result)
    }
}

impl<S, B> Transform<S, ServiceRequest> for Gate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = GateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GateMiddleware {
            service: Rc::new(service),
            gate: self.clone(),
        }))
    }
}

/// The actual per-request service `Gate::wrap` installs. Holds the
/// inner service behind an `Rc` since actix clones middleware per
/// worker, not per request.
pub struct GateMiddleware<S> {
    service: Rc<S>,
    gate: Gate,
}

impl<S, B> Service<ServiceRequest> for GateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let gate = self.gate.clone();
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            gate.authenticate(&req)?;
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_scope_check_is_subset() {
        let p = Principal {
            userid: "u1".to_string(),
            session_id: "u1.abc".to_string(),
            scope: "gov.user gov.user:read".to_string(),
        };
        assert!(p.has_scope("gov.user"));
        assert!(!p.has_scope("gov.user:write"));
    }
}
