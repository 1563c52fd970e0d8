//! Data access layer.
//!
//! Each service trait wraps persistence for one resource. Mutating calls are
//! scoped by `(resource_id, user_id)` and report "no match" as `None`/`false`,
//! so callers cannot tell a missing resource from one owned by someone else.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::*;
use crate::utils::PaginationParams;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Page<T> = (Vec<T>, i64);

#[async_trait]
pub trait UserService: Send + Sync {
    /// Creates the user together with its profile. Duplicate email or
    /// username is a [`AppError::Conflict`].
    async fn create_user(&self, new_user: NewUser) -> Result<(User, Profile), AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, AppError>;
    async fn update_profile(
        &self,
        user_id: Uuid,
        update: UpdateProfileRequest,
    ) -> Result<Option<Profile>, AppError>;
}

#[async_trait]
pub trait PostService: Send + Sync {
    async fn create_post(&self, user_id: Uuid, request: CreatePostRequest) -> Result<Post, AppError>;
    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, AppError>;
    async fn list_by_user(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError>;
    /// Posts by `user_id` and everyone they follow, newest first.
    async fn feed(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError>;
    async fn update_post(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        update: UpdatePostRequest,
    ) -> Result<Option<Post>, AppError>;
    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait CommentService: Send + Sync {
    async fn create_comment(&self, post_id: Uuid, user_id: Uuid, content: String) -> Result<Comment, AppError>;
    async fn list_for_post(&self, post_id: Uuid, page: PaginationParams) -> Result<Page<Comment>, AppError>;
    async fn update_comment(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, AppError>;
    async fn delete_comment(&self, comment_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait LikeService: Send + Sync {
    /// Returns `true` when the like did not exist before.
    async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
    async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait FollowService: Send + Sync {
    /// Returns `true` when the follow did not exist before.
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError>;
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError>;
    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError>;
    async fn counts(&self, user_id: Uuid) -> Result<FollowCounts, AppError>;
    async fn followers(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError>;
    async fn following(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError>;
}

#[async_trait]
pub trait AuctionService: Send + Sync {
    async fn create_auction(&self, seller_id: Uuid, request: CreateAuctionRequest) -> Result<Auction, AppError>;
    async fn get_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, AppError>;
    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        now: DateTime<Utc>,
        page: PaginationParams,
    ) -> Result<Page<Auction>, AppError>;
    /// Checks and records a bid atomically. `None` when the auction does not exist.
    async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PlacedBid>, AppError>;
    async fn list_bids(&self, auction_id: Uuid) -> Result<Vec<Bid>, AppError>;
    /// Deletes an auction owned by `seller_id`; [`AppError::Conflict`] once it has bids.
    async fn cancel_auction(&self, auction_id: Uuid, seller_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<Notification, AppError>;
    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: PaginationParams,
    ) -> Result<Page<Notification>, AppError>;
    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError>;
    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Option<Notification>, AppError>;
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError>;
}

/// The full set of services handed to the HTTP layer.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserService>,
    pub profiles: Arc<dyn ProfileService>,
    pub posts: Arc<dyn PostService>,
    pub comments: Arc<dyn CommentService>,
    pub likes: Arc<dyn LikeService>,
    pub follows: Arc<dyn FollowService>,
    pub auctions: Arc<dyn AuctionService>,
    pub notifications: Arc<dyn NotificationService>,
}

impl Services {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_store(PgStore::new(pool))
    }

    pub fn in_memory() -> Self {
        Self::from_store(MemoryStore::new())
    }

    fn from_store<S>(store: S) -> Self
    where
        S: UserService
            + ProfileService
            + PostService
            + CommentService
            + LikeService
            + FollowService
            + AuctionService
            + NotificationService
            + 'static,
    {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            profiles: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            likes: store.clone(),
            follows: store.clone(),
            auctions: store.clone(),
            notifications: store,
        }
    }
}
