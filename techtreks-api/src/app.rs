/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use techtreks_api::{app::{build_router, AppState}, config::Config};
/// use techtreks_shared::email::LogDispatcher;
/// use techtreks_shared::rate_limit::MemoryRateLimiter;
/// use techtreks_shared::store::MemoryStore;
///
/// let state = AppState::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(LogDispatcher),
///     Arc::new(MemoryRateLimiter::new()),
///     Config::for_tests(),
/// );
/// let app = build_router(state);
/// ```

use crate::{
    config::Config,
    middleware::{rate_limit::rate_limit_layer, security::SecurityHeadersLayer},
    routes,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use techtreks_shared::{
    auth::{registration::RegistrationService, session::SessionAuthenticator, validation::RegistrationPolicy},
    email::EmailDispatcher,
    messaging::MessageService,
    products::ProductService,
    rate_limit::RateLimiter,
    store::Store,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// User, pending-verification, session, message and product storage
    pub store: Arc<dyn Store>,

    pub registration: Arc<RegistrationService>,

    pub authenticator: Arc<SessionAuthenticator>,

    pub messaging: Arc<MessageService>,

    pub products: Arc<ProductService>,

    /// Per-client request limits
    pub limiter: Arc<dyn RateLimiter>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services on top of a store, a mailer and a limiter
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailDispatcher>,
        limiter: Arc<dyn RateLimiter>,
        config: Config,
    ) -> Self {
        let session_ttl = chrono::Duration::seconds(config.auth.session_ttl_secs as i64);
        // An empty domain list accepts any email
        let policy = RegistrationPolicy::new(config.auth.allowed_email_domains.iter());

        Self {
            registration: Arc::new(RegistrationService::new(
                store.clone(),
                mailer,
                policy,
                session_ttl,
            )),
            authenticator: Arc::new(SessionAuthenticator::new(store.clone(), session_ttl)),
            messaging: Arc::new(MessageService::new(store.clone())),
            products: Arc::new(ProductService::new(store.clone())),
            store,
            limiter,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health              # Health check (not rate limited)
/// ├── /auth/
/// │   ├── POST /register
/// │   ├── POST /verify-email
/// │   ├── POST /resend-code
/// │   ├── POST /login
/// │   ├── POST /logout
/// │   ├── GET  /me
/// │   └── POST /check
/// ├── /messages                 # Session required
/// │   ├── GET  ?with=<id|username>
/// │   └── POST
/// └── /products
///     ├── POST                  # Session required
///     ├── GET    /:id
///     ├── PUT    /:id           # Seller only
///     ├── DELETE /:id           # Seller only
///     └── GET    /user/:user_id
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Security headers
/// 2. CORS (credentials allowed, so origins are explicit unless `*`)
/// 3. Logging (tower-http TraceLayer)
/// 4. Rate limiting (per route group, after routing so the matched path is known)
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify-email", post(routes::auth::verify_email))
        .route("/resend-code", post(routes::auth::resend_code))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .route("/check", post(routes::auth::check));

    let message_routes = Router::new().route(
        "/messages",
        get(routes::messages::conversation).post(routes::messages::send_message),
    );

    let product_routes = Router::new()
        .route("/", post(routes::products::create_product))
        .route(
            "/:id",
            get(routes::products::get_product)
                .put(routes::products::update_product)
                .delete(routes::products::delete_product),
        )
        .route("/user/:user_id", get(routes::products::seller_products));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/auth", auth_routes)
        .merge(message_routes)
        .nest("/products", product_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// CORS for the browser frontend; the session cookie needs credentials
fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
