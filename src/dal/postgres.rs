use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::*;

const POST_COLUMNS: &str = r#"
    p.id, p.user_id, p.content, p.image_key,
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
    p.created_at, p.updated_at
"#;

const FEED_FILTER: &str =
    "p.user_id = $1 OR p.user_id IN (SELECT followee_id FROM follows WHERE follower_id = $1)";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn page_of_posts(&self, filter: &str, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError> {
        let sql = format!(
            "SELECT {} FROM posts p WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3",
            POST_COLUMNS, filter
        );
        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM posts p WHERE {}", filter);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((posts, total))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> Option<Option<String>> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().map(str::to_string))
        }
        _ => None,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Maps a missing parent row (post, user) to a 404.
fn missing_parent(err: sqlx::Error) -> AppError {
    if is_foreign_key_violation(&err) {
        AppError::NotFound
    } else {
        AppError::Database(err)
    }
}

#[async_trait]
impl UserService for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<(User, Profile), AppError> {
        let mut tx = self.pool.begin().await?;

        let conflict = |err: sqlx::Error| match is_unique_violation(&err) {
            Some(Some(constraint)) if constraint == "idx_users_email" => {
                AppError::Conflict("User with this email already exists".to_string())
            }
            Some(_) => AppError::Conflict("Username is already taken".to_string()),
            None => AppError::Database(err),
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_user.email.to_lowercase())
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict)?;

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, username, display_name)
            VALUES ($1, $2, $3)
            RETURNING user_id, username, display_name, bio, avatar_key, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&new_user.username)
        .bind(&new_user.display_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict)?;

        tx.commit().await?;
        Ok((user, profile))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl ProfileService for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE LOWER(username) = LOWER($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: UpdateProfileRequest,
    ) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET display_name = COALESCE($1, display_name),
                bio = COALESCE($2, bio),
                avatar_key = COALESCE($3, avatar_key),
                updated_at = NOW()
            WHERE user_id = $4
            RETURNING *
            "#,
        )
        .bind(update.display_name)
        .bind(update.bio)
        .bind(update.avatar_key)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[async_trait]
impl PostService for PgStore {
    async fn create_post(&self, user_id: Uuid, request: CreatePostRequest) -> Result<Post, AppError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, user_id, content, image_key)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, content, image_key,
                      0::BIGINT AS like_count, 0::BIGINT AS comment_count,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.content)
        .bind(request.image_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(post)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, AppError> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = $1", POST_COLUMNS);
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn list_by_user(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError> {
        self.page_of_posts("p.user_id = $1", user_id, page).await
    }

    async fn feed(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError> {
        self.page_of_posts(FEED_FILTER, user_id, page).await
    }

    async fn update_post(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        update: UpdatePostRequest,
    ) -> Result<Option<Post>, AppError> {
        let sql = format!(
            r#"
            WITH p AS (
                UPDATE posts
                SET content = COALESCE($1, content),
                    image_key = COALESCE($2, image_key),
                    updated_at = NOW()
                WHERE id = $3 AND user_id = $4
                RETURNING *
            )
            SELECT {} FROM p
            "#,
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(update.content)
            .bind(update.image_key)
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CommentService for PgStore {
    async fn create_comment(&self, post_id: Uuid, user_id: Uuid, content: String) -> Result<Comment, AppError> {
        sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, post_id, user_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_parent)
    }

    async fn list_for_post(&self, post_id: Uuid, page: PaginationParams) -> Result<Page<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE post_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(post_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((comments, total))
    }

    async fn update_comment(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            UPDATE comments SET content = $1, updated_at = NOW()
            WHERE id = $2 AND user_id = $3
            RETURNING *
            "#,
        )
        .bind(content)
        .bind(comment_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND user_id = $2")
            .bind(comment_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LikeService for PgStore {
    async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(missing_parent)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FollowService for PgStore {
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await
        .map_err(missing_parent)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn counts(&self, user_id: Uuid) -> Result<FollowCounts, AppError> {
        let (followers, following): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(FollowCounts { followers, following })
    }

    async fn followers(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError> {
        let profiles = sqlx::query_as::<_, Profile>(
            r#"
            SELECT pr.* FROM profiles pr
            JOIN follows f ON f.follower_id = pr.user_id
            WHERE f.followee_id = $1
            ORDER BY pr.username
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followee_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((profiles, total))
    }

    async fn following(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError> {
        let profiles = sqlx::query_as::<_, Profile>(
            r#"
            SELECT pr.* FROM profiles pr
            JOIN follows f ON f.followee_id = pr.user_id
            WHERE f.follower_id = $1
            ORDER BY pr.username
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((profiles, total))
    }
}

#[async_trait]
impl AuctionService for PgStore {
    async fn create_auction(&self, seller_id: Uuid, request: CreateAuctionRequest) -> Result<Auction, AppError> {
        if let Some(post_id) = request.post_id {
            let owns_post: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1 AND user_id = $2)",
            )
            .bind(post_id)
            .bind(seller_id)
            .fetch_one(&self.pool)
            .await?;

            if !owns_post {
                return Err(AppError::NotFound);
            }
        }

        let auction = sqlx::query_as::<_, Auction>(
            r#"
            INSERT INTO auctions (id, seller_id, post_id, title, description, starting_price, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(seller_id)
        .bind(request.post_id)
        .bind(request.title)
        .bind(request.description)
        .bind(request.starting_price)
        .bind(request.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, AppError> {
        let auction = sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(auction)
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        now: DateTime<Utc>,
        page: PaginationParams,
    ) -> Result<Page<Auction>, AppError> {
        // $1 is always bound so both queries share one parameter layout.
        let filter = match status {
            Some(AuctionStatus::Open) => "ends_at > $1",
            Some(AuctionStatus::Ended) => "ends_at <= $1",
            None => "$1::timestamptz IS NOT NULL",
        };

        let sql = format!(
            "SELECT * FROM auctions WHERE {} ORDER BY ends_at ASC, id ASC LIMIT $2 OFFSET $3",
            filter
        );
        let auctions = sqlx::query_as::<_, Auction>(&sql)
            .bind(now)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM auctions WHERE {}", filter);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok((auctions, total))
    }

    async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PlacedBid>, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(auction) = sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE id = $1 FOR UPDATE")
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        auction.check_bid(bidder_id, amount, now)?;

        let updated = sqlx::query_as::<_, Auction>(
            r#"
            UPDATE auctions SET current_bid = $1, highest_bidder_id = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(bidder_id)
        .bind(auction_id)
        .fetch_one(&mut *tx)
        .await?;

        let bid = sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (id, auction_id, bidder_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(PlacedBid {
            auction: updated,
            bid,
            previous_bidder_id: auction.highest_bidder_id,
        }))
    }

    async fn list_bids(&self, auction_id: Uuid) -> Result<Vec<Bid>, AppError> {
        let bids = sqlx::query_as::<_, Bid>(
            "SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC, created_at ASC",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bids)
    }

    async fn cancel_auction(&self, auction_id: Uuid, seller_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM auctions a
            WHERE a.id = $1 AND a.seller_id = $2
              AND NOT EXISTS (SELECT 1 FROM bids b WHERE b.auction_id = a.id)
            "#,
        )
        .bind(auction_id)
        .bind(seller_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM auctions WHERE id = $1 AND seller_id = $2)",
        )
        .bind(auction_id)
        .bind(seller_id)
        .fetch_one(&self.pool)
        .await?;

        if owned {
            Err(AppError::Conflict("Auction already has bids".to_string()))
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl NotificationService for PgStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, actor_id, kind, entity_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.actor_id)
        .bind(notification.kind.as_str())
        .bind(notification.entity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: PaginationParams,
    ) -> Result<Page<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        Ok((notifications, total))
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Option<Notification>, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
