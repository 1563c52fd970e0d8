pub mod auth;
pub mod client;
pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use chrono::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use auth::AuthService;
pub use config::Config;
pub use dal::Services;
pub use error::AppError;
pub use utils::{ApiResponse, PaginatedResponse, PaginationParams};

use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Config, services: Services) -> Self {
        let auth = AuthService::new(
            &config.jwt_secret,
            Duration::hours(config.token_ttl_hours),
            config.bcrypt_cost,
        );

        Self {
            config: Arc::new(config),
            auth,
            services,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Auth routes
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(get_current_user))

        // Profile routes
        .route("/api/profile", get(get_own_profile).put(update_own_profile))
        .route("/api/profiles/:user_id", get(get_profile))
        .route("/api/usernames/:username", get(get_profile_by_username))

        // Post routes
        .route("/api/feed", get(feed))
        .route("/api/posts", post(create_post))
        .route("/api/posts/:post_id", get(get_post).put(update_post).delete(delete_post))
        .route("/api/posts/:post_id/like", post(like_post).delete(unlike_post))
        .route("/api/posts/:post_id/comments", get(list_comments).post(create_comment))
        .route("/api/comments/:comment_id", put(update_comment).delete(delete_comment))

        // User graph routes
        .route("/api/users/:user_id/posts", get(list_user_posts))
        .route("/api/users/:user_id/follow", post(follow_user).delete(unfollow_user))
        .route("/api/users/:user_id/followers", get(list_followers))
        .route("/api/users/:user_id/following", get(list_following))

        // Auction routes
        .route("/api/auctions", get(list_auctions).post(create_auction))
        .route("/api/auctions/:auction_id", get(get_auction).delete(cancel_auction))
        .route("/api/auctions/:auction_id/bids", get(list_bids).post(place_bid))

        // Notification routes
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/:notification_id/read", put(mark_read))

        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
