//! # Request Handlers
//!
//! One function per route in [`super::routes`]. Each follows the same
//! shape: extract → validate → call a service → map the result to an
//! `HttpResponse`, returning `ApiError` directly on failure so
//! [`shared::errors::ApiError`]'s `ResponseError` impl renders the
//! envelope.
//!
//! Cookie handling (`login`/`exchange`/`refresh`/`logout`) sits
//! alongside the bearer tokens returned in the response body, so a
//! browser client can rely on cookies while a programmatic client uses
//! the body directly. `BASE_COOKIE_PATH`/`AUTH_COOKIE_PATH` resolve an
//! open question left by the configuration surface (no `baseurl`/
//! `authurl` keys are defined): the service root and the `/auth` scope
//! that houses exchange/refresh/logout are used directly, since nothing
//! else in the configuration names a narrower scope for them.

use actix_web::cookie::{time::OffsetDateTime, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{errors::ApiError, validation};

use crate::AppState;

use super::dto::{
    AcceptInvitationRequest, ApiKeySecretResponse, ApprovalListQuery, ConfirmRequest,
    CreateApiKeyRequest, DeleteUserRequest, ForgotPasswordRequest, LoginRequestDto,
    OtpAddRequest, OtpRemoveRequest, OtpVerifyRequest, RefreshTokenBody, RegisterRequest,
    ResetPasswordRequest, RevokeSessionsRequest, UpdateApiKeyRequest, UpdateEmailRequest,
    UpdatePasswordRequest, UpdateProfileRequest, UpdateRankRequest, VerifyEmailRequest,
};

use shared::auth::middleware::Principal;

const ACCESS_TOKEN_COOKIE: &str = "access_token";
const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
const USERID_COOKIE: &str = "userid";
const BASE_COOKIE_PATH: &str = "/";
const AUTH_COOKIE_PATH: &str = "/auth";

fn session_token_cookie_name(userid: &str) -> String {
    format!("session_token_{userid}")
}

fn build_cookie(name: String, value: String, path: &'static str, expires_at: i64) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(expires_at).unwrap_or_else(|_| OffsetDateTime::now_utc());
    Cookie::build(name, value)
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .expires(expires)
        .finish()
}

fn clear_cookie(name: String, path: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path(path);
    cookie.set_max_age(actix_web::cookie::time::Duration::ZERO);
    cookie
}

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().realip_remote_addr().map(|s| s.to_string())
}

fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

fn set_session_cookies(builder: &mut actix_web::HttpResponseBuilder, userid: &str, tokens: &crate::service::TokenPair) {
    builder.cookie(build_cookie(
        ACCESS_TOKEN_COOKIE.to_string(),
        tokens.access_token.clone(),
        BASE_COOKIE_PATH,
        tokens.access_expires_at,
    ));
    builder.cookie(build_cookie(
        REFRESH_TOKEN_COOKIE.to_string(),
        tokens.refresh_token.clone(),
        AUTH_COOKIE_PATH,
        tokens.refresh_expires_at,
    ));
    builder.cookie(build_cookie(
        USERID_COOKIE.to_string(),
        userid.to_string(),
        BASE_COOKIE_PATH,
        tokens.refresh_expires_at,
    ));
    builder.cookie(build_cookie(
        session_token_cookie_name(userid),
        tokens.refresh_token.clone(),
        AUTH_COOKIE_PATH,
        tokens.refresh_expires_at,
    ));
}

async fn require_admin(state: &AppState, userid: &str) -> Result<(), ApiError> {
    if state.role_repo.has_role(userid, "admin").await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin privileges required"))
    }
}

/// Basic-auth `keyid:secret` pair carried in an `Authorization: Basic`
/// header, used only by `/apikey/check`.
fn parse_basic_auth(req: &HttpRequest) -> Result<(String, String), ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?;
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| ApiError::unauthenticated("expected basic auth"))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::unauthenticated("malformed basic auth"))?;
    let text = String::from_utf8(decoded).map_err(|_| ApiError::unauthenticated("malformed basic auth"))?;
    text.split_once(':')
        .map(|(keyid, secret)| (keyid.to_string(), secret.to_string()))
        .ok_or_else(|| ApiError::unauthenticated("malformed basic auth"))
}

// =============================================================================
// Health
// =============================================================================

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "identity-core",
    }))
}

// =============================================================================
// Login / session
// =============================================================================

pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LoginRequestDto>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let existing_refresh_token = req.cookie(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());
    let login_req = crate::service::LoginRequest {
        identifier: body.identifier,
        password: body.password,
        otp_code: body.otp_code,
        otp_backup: body.otp_backup,
        existing_refresh_token,
        ip_address: client_ip(&req),
        user_agent: user_agent(&req),
    };

    let response = state.auth_service.login(login_req).await?;

    let mut builder = HttpResponse::Ok();
    set_session_cookies(&mut builder, &response.user.userid, &response.tokens);
    Ok(builder.json(response))
}

pub async fn exchange(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshTokenBody>>,
) -> Result<HttpResponse, ApiError> {
    let refresh_token = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or_else(|| ApiError::unauthenticated("missing refresh token"))?;

    let tokens = state.auth_service.exchange(&refresh_token).await?;
    let mut builder = HttpResponse::Ok();
    builder.cookie(build_cookie(
        ACCESS_TOKEN_COOKIE.to_string(),
        tokens.access_token.clone(),
        BASE_COOKIE_PATH,
        tokens.access_expires_at,
    ));
    Ok(builder.json(tokens))
}

pub async fn refresh(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshTokenBody>>,
) -> Result<HttpResponse, ApiError> {
    let old_refresh_token = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or_else(|| ApiError::unauthenticated("missing refresh token"))?;

    let tokens = state.auth_service.refresh(&old_refresh_token).await?;
    let userid = state
        .jwt_service
        .verify(&tokens.refresh_token, "all", false)
        .map_err(|_| ApiError::internal("freshly minted refresh token failed to verify"))?
        .sub;

    let mut builder = HttpResponse::Ok();
    set_session_cookies(&mut builder, &userid, &tokens);
    Ok(builder.json(tokens))
}

pub async fn logout(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshTokenBody>>,
) -> Result<HttpResponse, ApiError> {
    let refresh_token = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token));

    if let Some(token) = refresh_token {
        state.auth_service.logout(&token).await?;
    }

    let userid = req.cookie(USERID_COOKIE).map(|c| c.value().to_string());
    let mut builder = HttpResponse::Ok();
    builder.cookie(clear_cookie(ACCESS_TOKEN_COOKIE.to_string(), BASE_COOKIE_PATH));
    builder.cookie(clear_cookie(REFRESH_TOKEN_COOKIE.to_string(), AUTH_COOKIE_PATH));
    builder.cookie(clear_cookie(USERID_COOKIE.to_string(), BASE_COOKIE_PATH));
    if let Some(userid) = userid {
        builder.cookie(clear_cookie(session_token_cookie_name(&userid), AUTH_COOKIE_PATH));
    }
    Ok(builder.json(serde_json::json!({"message": "logged out"})))
}

// =============================================================================
// Registration / approval
// =============================================================================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let userid = state
        .lifecycle
        .register(body.username, body.password, body.email, body.first_name, body.last_name)
        .await?;

    if !state.auth_config.user_approval_required {
        state.lifecycle.approve(&userid).await?;
    }

    Ok(HttpResponse::Created().json(serde_json::json!({"userid": userid})))
}

pub async fn commit(
    state: web::Data<AppState>,
    body: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.commit(&body.userid, &body.key).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "account confirmed"})))
}

pub async fn list_approvals(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<ApprovalListQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &principal.userid).await?;
    let approvals = state.lifecycle.list_approvals(query.amount, query.offset).await?;
    Ok(HttpResponse::Ok().json(approvals))
}

pub async fn approve(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &principal.userid).await?;
    state.lifecycle.approve(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "approved"})))
}

pub async fn deny(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &principal.userid).await?;
    state.lifecycle.deny(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "denied"})))
}

// =============================================================================
// Profiles
// =============================================================================

pub async fn get_public_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let profile = state.lifecycle.get_public(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn get_self_profile(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    let profile = state.lifecycle.get_self(&principal.userid).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn update_profile(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.update_profile(&principal.userid, &body.first_name, &body.last_name).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "profile updated"})))
}

// =============================================================================
// Email
// =============================================================================

pub async fn update_email(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<UpdateEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.update_email(&principal.userid, &body.password, &body.new_email).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "verification email sent"})))
}

pub async fn commit_email(
    state: web::Data<AppState>,
    body: web::Json<VerifyEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.commit_email(&body.userid, &body.password, &body.key).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "email updated"})))
}

// =============================================================================
// Password
// =============================================================================

pub async fn update_password(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state
        .lifecycle
        .update_password(&principal.userid, &body.old_password, &body.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "password updated"})))
}

pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.forgot_password(&body.identifier).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "if the account exists, a reset email was sent"})))
}

pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.reset_password(&body.userid, &body.key, &body.new_password).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "password reset"})))
}

// =============================================================================
// OTP
// =============================================================================

pub async fn otp_add(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<OtpAddRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    let (uri, backup) = state.lifecycle.otp_add(&principal.userid, &body.password).await?;
    Ok(HttpResponse::Ok().json(super::dto::OtpAddResponse { uri, backup }))
}

pub async fn otp_commit(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<OtpVerifyRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.otp_commit(&principal.userid, &body.code).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "otp enabled"})))
}

pub async fn otp_remove(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<OtpRemoveRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state
        .lifecycle
        .otp_remove(&principal.userid, &body.password, body.otp_code.as_deref(), body.otp_backup.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "otp disabled"})))
}

// =============================================================================
// Rank
// =============================================================================

pub async fn update_rank(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<UpdateRankRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state
        .rank
        .update_rank(&principal.userid, &path.into_inner(), body.add, body.remove)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "rank updated"})))
}

pub async fn accept_invitation(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<AcceptInvitationRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.rank.accept_invitation(&principal.userid, &body.role).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "invitation accepted"})))
}

// =============================================================================
// API keys
// =============================================================================

pub async fn create_apikey(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<CreateApiKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    let (key, secret) = state
        .lifecycle
        .create_apikey(&principal.userid, body.scope, body.name, body.desc)
        .await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "key": key,
        "secret": secret,
    })))
}

pub async fn list_apikeys(state: web::Data<AppState>, principal: Principal) -> Result<HttpResponse, ApiError> {
    let keys = state.lifecycle.list_apikeys(&principal.userid).await?;
    Ok(HttpResponse::Ok().json(keys))
}

pub async fn update_apikey(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<UpdateApiKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state
        .lifecycle
        .update_apikey(&principal.userid, &path.into_inner(), &body.name, &body.desc)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "api key updated"})))
}

pub async fn rotate_apikey(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let keyid = path.into_inner();
    let secret = state.lifecycle.rotate_apikey(&principal.userid, &keyid).await?;
    Ok(HttpResponse::Ok().json(ApiKeySecretResponse { keyid, secret }))
}

pub async fn delete_apikey(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.lifecycle.delete_apikey(&principal.userid, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Basic-auth `/apikey/check`: validates `keyid:secret`, then intersects
/// the requested role set (`?roles=a,b,c`) against the key owner's
/// actual grants.
pub async fn check_apikey(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<std::collections::HashMap<String, String>>,
) -> Result<HttpResponse, ApiError> {
    let (keyid, secret) = parse_basic_auth(&req)?;
    let requested: Vec<String> = query
        .get("roles")
        .map(|s| s.split(',').filter(|t| !t.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    let granted = state.lifecycle.check_apikey(&keyid, &secret, &requested).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"roles": granted})))
}

// =============================================================================
// Sessions
// =============================================================================

pub async fn list_sessions(state: web::Data<AppState>, principal: Principal) -> Result<HttpResponse, ApiError> {
    let sessions = state.lifecycle.list_sessions(&principal.userid).await?;
    Ok(HttpResponse::Ok().json(sessions))
}

pub async fn revoke_sessions(
    state: web::Data<AppState>,
    principal: Principal,
    body: Option<web::Json<RevokeSessionsRequest>>,
) -> Result<HttpResponse, ApiError> {
    match body {
        Some(body) => {
            state.lifecycle.revoke_sessions(&principal.userid, &body.into_inner().session_ids).await?;
        }
        None => {
            state.lifecycle.revoke_all_sessions(&principal.userid).await?;
        }
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "sessions revoked"})))
}

// =============================================================================
// Account deletion
// =============================================================================

pub async fn delete_user(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DeleteUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;
    state.lifecycle.delete_user(&principal.userid, &body.username, &body.password).await?;
    Ok(HttpResponse::NoContent().finish())
}
