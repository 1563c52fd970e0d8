use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::validation::{
    is_strong_password, trimmed, trimmed_opt, validate_email, validate_username, Validate,
    ValidationErrors,
};

pub const MAX_POST_LENGTH: usize = 2000;
pub const MAX_COMMENT_LENGTH: usize = 500;
pub const MAX_AUCTION_DAYS: i64 = 30;
/// Upper bound for prices and bids, in minor currency units.
pub const MAX_PRICE: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_key: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Auction {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub post_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub starting_price: i64,
    pub current_bid: Option<i64>,
    pub highest_bidder_id: Option<Uuid>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Open,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidRejection {
    #[error("You cannot bid on your own auction")]
    OwnAuction,
    #[error("Auction has ended")]
    Ended,
    #[error("Bid must be at least {minimum}")]
    TooLow { minimum: i64 },
}

impl From<BidRejection> for AppError {
    fn from(rejection: BidRejection) -> Self {
        match rejection {
            BidRejection::Ended => AppError::Conflict(rejection.to_string()),
            BidRejection::OwnAuction | BidRejection::TooLow { .. } => {
                AppError::BadRequest(rejection.to_string())
            }
        }
    }
}

impl Auction {
    pub fn status(&self, now: DateTime<Utc>) -> AuctionStatus {
        if self.ends_at > now {
            AuctionStatus::Open
        } else {
            AuctionStatus::Ended
        }
    }

    /// Smallest amount the next bid may carry.
    pub fn minimum_bid(&self) -> i64 {
        match self.current_bid {
            Some(current) => current.saturating_add(1),
            None => self.starting_price,
        }
    }

    pub fn check_bid(&self, bidder_id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<(), BidRejection> {
        if bidder_id == self.seller_id {
            return Err(BidRejection::OwnAuction);
        }
        if self.status(now) == AuctionStatus::Ended {
            return Err(BidRejection::Ended);
        }
        let beats_current = match self.current_bid {
            Some(current) => amount > current,
            None => amount >= self.starting_price,
        };
        if !beats_current {
            return Err(BidRejection::TooLow {
                minimum: self.minimum_bid(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of an accepted bid.
#[derive(Debug, Clone)]
pub struct PlacedBid {
    pub auction: Auction,
    pub bid: Bid,
    pub previous_bidder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
    Bid,
    Outbid,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Bid => "bid",
            NotificationKind::Outbid => "outbid",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown notification kind: {0}")]
pub struct UnknownNotificationKind(String);

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(NotificationKind::Follow),
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            "bid" => Ok(NotificationKind::Bid),
            "outbid" => Ok(NotificationKind::Outbid),
            other => Err(UnknownNotificationKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub kind: NotificationKind,
    pub entity_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Notification {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let kind = kind.parse::<NotificationKind>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "kind".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            actor_id: row.try_get("actor_id")?,
            kind,
            entity_id: row.try_get("entity_id")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub kind: NotificationKind,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(deserialize_with = "trimmed")]
    pub email: String,
    pub password: String,
    #[serde(deserialize_with = "trimmed")]
    pub username: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub display_name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !validate_email(&self.email) {
            errors.add("email", "Invalid email format");
        }
        if !is_strong_password(&self.password) {
            errors.add(
                "password",
                "Password must be at least 8 characters and contain an uppercase letter, a lowercase letter, a number and a special character",
            );
        }
        if !validate_username(&self.username) {
            errors.add("username", "Username must be 3-30 letters, digits or underscores");
        }
        errors.check_optional_text("display_name", self.display_name.as_deref(), 1, 50);
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(deserialize_with = "trimmed")]
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !validate_email(&self.email) {
            errors.add("email", "Invalid email format");
        }
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub avatar_key: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.display_name.is_none() && self.bio.is_none() && self.avatar_key.is_none() {
            errors.add("body", "At least one field must be provided");
        }
        errors.check_optional_text("display_name", self.display_name.as_deref(), 1, 50);
        errors.check_optional_text("bio", self.bio.as_deref(), 0, 160);
        check_media_key(&mut errors, "avatar_key", self.avatar_key.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(deserialize_with = "trimmed")]
    pub content: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub image_key: Option<String>,
}

impl Validate for CreatePostRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_text("content", &self.content, 1, MAX_POST_LENGTH);
        check_media_key(&mut errors, "image_key", self.image_key.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub image_key: Option<String>,
}

impl Validate for UpdatePostRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.content.is_none() && self.image_key.is_none() {
            errors.add("body", "At least one field must be provided");
        }
        errors.check_optional_text("content", self.content.as_deref(), 1, MAX_POST_LENGTH);
        check_media_key(&mut errors, "image_key", self.image_key.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(deserialize_with = "trimmed")]
    pub content: String,
}

impl Validate for CommentRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_text("content", &self.content, 1, MAX_COMMENT_LENGTH);
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    #[serde(deserialize_with = "trimmed")]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub description: Option<String>,
    pub starting_price: i64,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub post_id: Option<Uuid>,
}

impl CreateAuctionRequest {
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_text("title", &self.title, 1, 100);
        errors.check_optional_text("description", self.description.as_deref(), 0, MAX_POST_LENGTH);
        if self.starting_price <= 0 {
            errors.add("starting_price", "Starting price must be greater than zero");
        } else if self.starting_price > MAX_PRICE {
            errors.add("starting_price", format!("Starting price cannot exceed {}", MAX_PRICE));
        }
        if self.ends_at <= now {
            errors.add("ends_at", "Auction must end in the future");
        } else if self.ends_at > now + Duration::days(MAX_AUCTION_DAYS) {
            errors.add(
                "ends_at",
                format!("Auction cannot run longer than {} days", MAX_AUCTION_DAYS),
            );
        }
        errors.into_result()
    }
}

impl Validate for CreateAuctionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Utc::now())
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: i64,
}

impl Validate for PlaceBidRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.amount <= 0 {
            errors.add("amount", "Bid amount must be greater than zero");
        } else if self.amount > MAX_PRICE {
            errors.add("amount", format!("Bid amount cannot exceed {}", MAX_PRICE));
        }
        errors.into_result()
    }
}

fn check_media_key(errors: &mut ValidationErrors, field: &str, key: Option<&str>) {
    if let Some(key) = key {
        if key.is_empty() || key.len() > 512 {
            errors.add(field, format!("{} must be 1-512 characters", field));
        } else if key.chars().any(char::is_whitespace) || key.contains("..") {
            errors.add(field, format!("{} is not a valid object key", field));
        }
    }
}

// Response DTOs

#[derive(Debug, Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub avatar_url: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub followed_by_me: bool,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub post_id: Uuid,
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub user_id: Uuid,
    pub following: bool,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    #[serde(flatten)]
    pub auction: Auction,
    pub status: AuctionStatus,
    pub minimum_bid: i64,
}

impl AuctionResponse {
    pub fn new(auction: Auction, now: DateTime<Utc>) -> Self {
        Self {
            status: auction.status(now),
            minimum_bid: auction.minimum_bid(),
            auction,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    pub bid: Bid,
    pub auction: AuctionResponse,
}
