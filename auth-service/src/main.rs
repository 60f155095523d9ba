//! # Identity Core - Auth Service
//!
//! The **auth-service** is the HTTP front door of the identity core:
//! authentication (C9), lifecycle management (C10), rank authorization
//! (C11), the event dispatcher (C12), and the gate (C13) all come
//! together here, backed by the repository layer (C1-C5) and the
//! cross-cutting `shared` crate (tokens, OTP, crypto, config, mail).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐ │
//! │  │   routes    │  │  handlers   │  │    DTOs (Request/Res)   │ │
//! │  └──────┬──────┘  └──────┬──────┘  └────────────┬────────────┘ │
//! └─────────┼────────────────┼─────────────────────┼───────────────┘
//!           │                │                      │
//!           ▼                ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Service Layer (service/)                     │
//! │  AuthService (C9) · LifecycleService (C10) · RankService (C11)  │
//! │  EventDispatcher (C12) + delete-cascade / GC background tasks   │
//! └─────────────────────────┼───────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Repository Layer (repository/)                 │
//! │  User · Session · Reset · Approval · ApiKey · Role repositories │
//! └─────────────────────────┼───────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (domain/)                       │
//! │  Entities (C3)  ·  Events (C12)                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## API Endpoints
//!
//! See [`api`] for the full route table.
//!
//! ## Initialization Order
//!
//! Config → tracing → DB pool → Redis → secret refresher (C8) → JWT
//! service (C7) → repositories → services → bootstrap admin (recognized
//! exception, see [`service::LifecycleService::bootstrap_admin`]) →
//! background tasks (C12 consumers) → HTTP server.
//!
//! ## Security Features
//!
//! - **Password Hashing**: Argon2id, 19 MiB/t=2/p=1, 32-byte output
//! - **JWT Tokens**: short-lived access tokens, long-lived refresh
//!   tokens bound to a persisted, revocable session
//! - **OTP**: TOTP second factor with encrypted-at-rest secrets and a
//!   rotating cipher ring (C8)
//! - **Rate limiting**: quadratic login-failure cliff capped at 24h
//!
//! ## Configuration
//!
//! Environment variables are loaded via [`shared::config::AppConfig`].
//! `BOOTSTRAP_ADMIN_USERNAME`/`_PASSWORD`/`_EMAIL` (with `_FIRST_NAME`/
//! `_LAST_NAME` optional) seed the very first admin account; unset,
//! the bootstrap step is skipped entirely.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use shared::{
    auth::{jwt::JwtService, middleware::Gate, password::PasswordHasher},
    config::AppConfig,
    database,
    mail::{LoggingMailer, Mailer},
    otp::{SecretRefresher, TotpManager},
    redis_client::RedisClient,
    tracing_config,
};

mod api;
mod domain;
mod repository;
mod service;

use api::routes;
use repository::{ApiKeyRepository, ApprovalRepository, ResetRepository, RoleRepository, SessionRepository, UserRepository};
use service::{spawn_delete_cascade_worker, spawn_gc_sweepers, AuthService, EventDispatcher, LifecycleService, RankService};

/// Shared application state injected into every request handler via
/// [`actix_web::web::Data`].
pub struct AppState {
    pub auth_service: AuthService,
    pub lifecycle: LifecycleService,
    pub rank: RankService,
    pub role_repo: RoleRepository,
    pub jwt_service: Arc<JwtService>,
    pub auth_config: shared::config::AuthConfig,
}

/// Reads `BOOTSTRAP_ADMIN_*` environment variables and, if the
/// username/password/email triple is present, calls
/// [`LifecycleService::bootstrap_admin`]. A no-op both when the
/// variables are unset and when the `users` table is already
/// non-empty, so it is safe to leave set across restarts.
async fn bootstrap_admin_from_env(lifecycle: &LifecycleService) {
    let username = match std::env::var("BOOTSTRAP_ADMIN_USERNAME") {
        Ok(v) if !v.is_empty() => v,
        _ => return,
    };
    let password = match std::env::var("BOOTSTRAP_ADMIN_PASSWORD") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            warn!("BOOTSTRAP_ADMIN_USERNAME set without BOOTSTRAP_ADMIN_PASSWORD, skipping bootstrap");
            return;
        }
    };
    let email = match std::env::var("BOOTSTRAP_ADMIN_EMAIL") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            warn!("BOOTSTRAP_ADMIN_USERNAME set without BOOTSTRAP_ADMIN_EMAIL, skipping bootstrap");
            return;
        }
    };
    let first_name = std::env::var("BOOTSTRAP_ADMIN_FIRST_NAME").unwrap_or_else(|_| "Admin".to_string());
    let last_name = std::env::var("BOOTSTRAP_ADMIN_LAST_NAME").unwrap_or_else(|_| "Bootstrap".to_string());

    match lifecycle
        .bootstrap_admin(username, password, email, first_name, last_name)
        .await
    {
        Ok(Some(userid)) => info!(userid = %userid, "bootstrap admin account created"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "bootstrap admin creation failed"),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────
    // Step 1: Load configuration from environment
    // ─────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────
    // Step 2: Initialize structured logging
    // ─────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "starting auth-service"
    );

    // ─────────────────────────────────────────────────────────────────
    // Step 3: Create PostgreSQL connection pool
    // ─────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    // ─────────────────────────────────────────────────────────────────
    // Step 4: Create Redis client (C6)
    // ─────────────────────────────────────────────────────────────────
    let redis_client = RedisClient::new(&config.redis)
        .await
        .expect("Failed to connect to Redis");

    // ─────────────────────────────────────────────────────────────────
    // Step 5: Start the secret refresher (C8)
    // ─────────────────────────────────────────────────────────────────
    // `reload` re-reads the otp key bundle from config at every tick;
    // since `AppConfig` is loaded once at startup, this effectively
    // keeps serving the same bundle until the process restarts unless
    // the deployment mounts a config reloader in front of it; the
    // refresher's job is the rotation *protocol* (decrypter ring,
    // health tracking), not the source of truth for the bundle itself.
    let otp_keys = config.otp.keys.clone();
    let (_refresher_task, secret_refresher) = SecretRefresher::spawn(
        move || otp_keys.clone(),
        Duration::from_secs(config.otp.refresh_seconds),
        config.otp.hb_max_fail,
    );

    // ─────────────────────────────────────────────────────────────────
    // Step 6: Build stateless collaborators (C7, password hasher, TOTP)
    // ─────────────────────────────────────────────────────────────────
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()).expect("invalid JWT signing keyset"));
    let password_hasher = Arc::new(PasswordHasher::new());
    let totp_manager = TotpManager::new(config.otp.issuer.clone());
    let mailer: Arc<dyn Mailer> = Arc::new(LoggingMailer);

    // ─────────────────────────────────────────────────────────────────
    // Step 7: Build repositories (C1-C5, plus role grants)
    // ─────────────────────────────────────────────────────────────────
    let user_repo = UserRepository::new(db_pool.clone());
    let session_repo = SessionRepository::new(db_pool.clone());
    let reset_repo = ResetRepository::new(db_pool.clone());
    let approval_repo = ApprovalRepository::new(db_pool.clone());
    let apikey_repo = ApiKeyRepository::new(db_pool.clone());
    let role_repo = RoleRepository::new(db_pool.clone());

    // ─────────────────────────────────────────────────────────────────
    // Step 8: Event dispatcher (C12) and its background consumers
    // ─────────────────────────────────────────────────────────────────
    let events = EventDispatcher::new();
    let _delete_cascade_task = spawn_delete_cascade_worker(&events, role_repo.clone(), apikey_repo.clone());
    let _gc_task = spawn_gc_sweepers(
        approval_repo.clone(),
        reset_repo.clone(),
        role_repo.clone(),
        config.auth.gc_age_seconds,
        Duration::from_secs(config.otp.hb_interval_seconds.max(60)),
    );

    // ─────────────────────────────────────────────────────────────────
    // Step 9: Instantiate the service layer (C9-C11)
    // ─────────────────────────────────────────────────────────────────
    let auth_service = AuthService::new(
        user_repo.clone(),
        session_repo.clone(),
        jwt_service.clone(),
        password_hasher.clone(),
        totp_manager.clone(),
        secret_refresher.clone(),
        redis_client.clone(),
        mailer.clone(),
        config.auth.clone(),
    );

    let lifecycle = LifecycleService::new(
        user_repo,
        approval_repo,
        reset_repo,
        role_repo.clone(),
        apikey_repo,
        session_repo,
        password_hasher,
        totp_manager,
        secret_refresher,
        mailer,
        events,
        config.auth.clone(),
        config.email.clone(),
    );

    let rank = RankService::new(role_repo.clone(), config.auth.invitation_time_seconds);

    // ─────────────────────────────────────────────────────────────────
    // Step 10: Bootstrap path (Open Question (b)'s recognized exception)
    // ─────────────────────────────────────────────────────────────────
    bootstrap_admin_from_env(&lifecycle).await;

    let gate = Gate::new(jwt_service.clone(), "all");

    let app_state = web::Data::new(AppState {
        auth_service,
        lifecycle,
        rank,
        role_repo,
        jwt_service,
        auth_config: config.auth.clone(),
    });

    let db_pool = web::Data::new(db_pool);

    // ─────────────────────────────────────────────────────────────────
    // Step 11: Configure and start the HTTP server
    // ─────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    info!("server listening on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin() // TODO: Configure specific origins for production
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(app_state.clone())
            .app_data(db_pool.clone())
            .configure(routes::configure(gate.clone()))
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
