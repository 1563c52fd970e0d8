//! In-process store used when no `DATABASE_URL` is configured, and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::*;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
    likes: HashSet<(Uuid, Uuid)>,
    follows: HashSet<(Uuid, Uuid)>,
    auctions: HashMap<Uuid, Auction>,
    bids: Vec<Bid>,
    notifications: HashMap<Uuid, Notification>,
}

impl State {
    /// Fills in the derived counters of a stored post.
    fn hydrate(&self, post: &Post) -> Post {
        let mut post = post.clone();
        post.like_count = self.likes.iter().filter(|(p, _)| *p == post.id).count() as i64;
        post.comment_count = self.comments.values().filter(|c| c.post_id == post.id).count() as i64;
        post
    }

    fn page_of_posts<F>(&self, page: PaginationParams, filter: F) -> Page<Post>
    where
        F: Fn(&Post) -> bool,
    {
        let mut posts: Vec<&Post> = self.posts.values().filter(|&p| filter(p)).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = posts.len() as i64;
        let items = page.apply(posts).into_iter().map(|p| self.hydrate(p)).collect();
        (items, total)
    }

    fn page_of_profiles(&self, ids: Vec<Uuid>, page: PaginationParams) -> Page<Profile> {
        let mut profiles: Vec<Profile> = ids
            .iter()
            .filter_map(|id| self.profiles.get(id).cloned())
            .collect();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        let total = profiles.len() as i64;
        (page.apply(profiles), total)
    }

    fn delete_post_cascade(&mut self, post_id: Uuid) {
        self.posts.remove(&post_id);
        self.comments.retain(|_, c| c.post_id != post_id);
        self.likes.retain(|(p, _)| *p != post_id);
        let auctions: Vec<Uuid> = self
            .auctions
            .values()
            .filter(|a| a.post_id == Some(post_id))
            .map(|a| a.id)
            .collect();
        for auction_id in auctions {
            self.auctions.remove(&auction_id);
            self.bids.retain(|b| b.auction_id != auction_id);
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserService for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<(User, Profile), AppError> {
        let mut state = self.state.write().await;

        let email_taken = state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email));
        if email_taken {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }
        let username_taken = state
            .profiles
            .values()
            .any(|p| p.username.eq_ignore_ascii_case(&new_user.username));
        if username_taken {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.to_lowercase(),
            password_hash: new_user.password_hash,
            created_at: now,
        };
        let profile = Profile {
            user_id: user.id,
            username: new_user.username,
            display_name: new_user.display_name,
            bio: None,
            avatar_key: None,
            created_at: now,
            updated_at: now,
        };

        state.users.insert(user.id, user.clone());
        state.profiles.insert(user.id, profile.clone());
        Ok((user, profile))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl ProfileService for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .profiles
            .values()
            .find(|p| p.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: UpdateProfileRequest,
    ) -> Result<Option<Profile>, AppError> {
        let mut state = self.state.write().await;
        let Some(profile) = state.profiles.get_mut(&user_id) else {
            return Ok(None);
        };

        if let Some(display_name) = update.display_name {
            profile.display_name = Some(display_name);
        }
        if let Some(bio) = update.bio {
            profile.bio = Some(bio);
        }
        if let Some(avatar_key) = update.avatar_key {
            profile.avatar_key = Some(avatar_key);
        }
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }
}

#[async_trait]
impl PostService for MemoryStore {
    async fn create_post(&self, user_id: Uuid, request: CreatePostRequest) -> Result<Post, AppError> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            user_id,
            content: request.content,
            image_key: request.image_key,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, AppError> {
        let state = self.state.read().await;
        Ok(state.posts.get(&post_id).map(|p| state.hydrate(p)))
    }

    async fn list_by_user(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError> {
        let state = self.state.read().await;
        Ok(state.page_of_posts(page, |p| p.user_id == user_id))
    }

    async fn feed(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Post>, AppError> {
        let state = self.state.read().await;
        let mut authors: HashSet<Uuid> = state
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect();
        authors.insert(user_id);
        Ok(state.page_of_posts(page, |p| authors.contains(&p.user_id)))
    }

    async fn update_post(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        update: UpdatePostRequest,
    ) -> Result<Option<Post>, AppError> {
        let mut state = self.state.write().await;
        let Some(post) = state.posts.get_mut(&post_id).filter(|p| p.user_id == user_id) else {
            return Ok(None);
        };

        if let Some(content) = update.content {
            post.content = content;
        }
        if let Some(image_key) = update.image_key {
            post.image_key = Some(image_key);
        }
        post.updated_at = Utc::now();

        let post = post.clone();
        Ok(Some(state.hydrate(&post)))
    }

    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state.posts.get(&post_id).is_some_and(|p| p.user_id == user_id);
        if owned {
            state.delete_post_cascade(post_id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl CommentService for MemoryStore {
    async fn create_comment(&self, post_id: Uuid, user_id: Uuid, content: String) -> Result<Comment, AppError> {
        let mut state = self.state.write().await;
        if !state.posts.contains_key(&post_id) {
            return Err(AppError::NotFound);
        }

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            content,
            created_at: now,
            updated_at: now,
        };
        state.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn list_for_post(&self, post_id: Uuid, page: PaginationParams) -> Result<Page<Comment>, AppError> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let total = comments.len() as i64;
        Ok((page.apply(comments), total))
    }

    async fn update_comment(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, AppError> {
        let mut state = self.state.write().await;
        Ok(state
            .comments
            .get_mut(&comment_id)
            .filter(|c| c.user_id == user_id)
            .map(|comment| {
                comment.content = content;
                comment.updated_at = Utc::now();
                comment.clone()
            }))
    }

    async fn delete_comment(&self, comment_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state.comments.get(&comment_id).is_some_and(|c| c.user_id == user_id);
        if owned {
            state.comments.remove(&comment_id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl LikeService for MemoryStore {
    async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.posts.contains_key(&post_id) {
            return Err(AppError::NotFound);
        }
        Ok(state.likes.insert((post_id, user_id)))
    }

    async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.likes.remove(&(post_id, user_id)))
    }
}

#[async_trait]
impl FollowService for MemoryStore {
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&followee_id) {
            return Err(AppError::NotFound);
        }
        Ok(state.follows.insert((follower_id, followee_id)))
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.follows.remove(&(follower_id, followee_id)))
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.read().await.follows.contains(&(follower_id, followee_id)))
    }

    async fn counts(&self, user_id: Uuid) -> Result<FollowCounts, AppError> {
        let state = self.state.read().await;
        Ok(FollowCounts {
            followers: state.follows.iter().filter(|(_, f)| *f == user_id).count() as i64,
            following: state.follows.iter().filter(|(f, _)| *f == user_id).count() as i64,
        })
    }

    async fn followers(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError> {
        let state = self.state.read().await;
        let ids = state
            .follows
            .iter()
            .filter(|(_, followee)| *followee == user_id)
            .map(|(follower, _)| *follower)
            .collect();
        Ok(state.page_of_profiles(ids, page))
    }

    async fn following(&self, user_id: Uuid, page: PaginationParams) -> Result<Page<Profile>, AppError> {
        let state = self.state.read().await;
        let ids = state
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect();
        Ok(state.page_of_profiles(ids, page))
    }
}

#[async_trait]
impl AuctionService for MemoryStore {
    async fn create_auction(&self, seller_id: Uuid, request: CreateAuctionRequest) -> Result<Auction, AppError> {
        let mut state = self.state.write().await;
        if let Some(post_id) = request.post_id {
            let owns_post = state.posts.get(&post_id).is_some_and(|p| p.user_id == seller_id);
            if !owns_post {
                return Err(AppError::NotFound);
            }
        }

        let auction = Auction {
            id: Uuid::new_v4(),
            seller_id,
            post_id: request.post_id,
            title: request.title,
            description: request.description,
            starting_price: request.starting_price,
            current_bid: None,
            highest_bidder_id: None,
            ends_at: request.ends_at,
            created_at: Utc::now(),
        };
        state.auctions.insert(auction.id, auction.clone());
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, AppError> {
        Ok(self.state.read().await.auctions.get(&auction_id).cloned())
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        now: DateTime<Utc>,
        page: PaginationParams,
    ) -> Result<Page<Auction>, AppError> {
        let state = self.state.read().await;
        let mut auctions: Vec<Auction> = state
            .auctions
            .values()
            .filter(|a| status.map_or(true, |s| a.status(now) == s))
            .cloned()
            .collect();
        auctions.sort_by(|a, b| a.ends_at.cmp(&b.ends_at).then(a.id.cmp(&b.id)));
        let total = auctions.len() as i64;
        Ok((page.apply(auctions), total))
    }

    async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PlacedBid>, AppError> {
        let mut state = self.state.write().await;
        let Some(auction) = state.auctions.get_mut(&auction_id) else {
            return Ok(None);
        };

        auction.check_bid(bidder_id, amount, now)?;

        let previous_bidder_id = auction.highest_bidder_id;
        auction.current_bid = Some(amount);
        auction.highest_bidder_id = Some(bidder_id);
        let auction = auction.clone();

        let bid = Bid {
            id: Uuid::new_v4(),
            auction_id,
            bidder_id,
            amount,
            created_at: now,
        };
        state.bids.push(bid.clone());

        Ok(Some(PlacedBid {
            auction,
            bid,
            previous_bidder_id,
        }))
    }

    async fn list_bids(&self, auction_id: Uuid) -> Result<Vec<Bid>, AppError> {
        let state = self.state.read().await;
        let mut bids: Vec<Bid> = state
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.amount.cmp(&a.amount));
        Ok(bids)
    }

    async fn cancel_auction(&self, auction_id: Uuid, seller_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .auctions
            .get(&auction_id)
            .is_some_and(|a| a.seller_id == seller_id);
        if !owned {
            return Ok(false);
        }
        if state.bids.iter().any(|b| b.auction_id == auction_id) {
            return Err(AppError::Conflict("Auction already has bids".to_string()));
        }
        state.auctions.remove(&auction_id);
        Ok(true)
    }
}

#[async_trait]
impl NotificationService for MemoryStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, AppError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            actor_id: notification.actor_id,
            kind: notification.kind,
            entity_id: notification.entity_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: PaginationParams,
    ) -> Result<Page<Notification>, AppError> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = notifications.len() as i64;
        Ok((page.apply(notifications), total))
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Option<Notification>, AppError> {
        let mut state = self.state.write().await;
        Ok(state
            .notifications
            .get_mut(&notification_id)
            .filter(|n| n.user_id == user_id)
            .map(|notification| {
                notification.is_read = true;
                notification.clone()
            }))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for notification in state.notifications.values_mut() {
            if notification.user_id == user_id && !notification.is_read {
                notification.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seed_user(store: &MemoryStore, username: &str) -> User {
        let (user, _) = store
            .create_user(NewUser {
                email: format!("{}@example.com", username),
                password_hash: "hash".to_string(),
                username: username.to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        user
    }

    async fn seed_post(store: &MemoryStore, user_id: Uuid, content: &str) -> Post {
        store
            .create_post(
                user_id,
                CreatePostRequest {
                    content: content.to_string(),
                    image_key: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() {
        let store = MemoryStore::new();
        seed_user(&store, "jane").await;

        let err = store
            .create_user(NewUser {
                email: "JANE@example.com".to_string(),
                password_hash: "hash".to_string(),
                username: "someone_else".to_string(),
                display_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = store
            .create_user(NewUser {
                email: "other@example.com".to_string(),
                password_hash: "hash".to_string(),
                username: "Jane".to_string(),
                display_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn updates_are_scoped_to_the_owner() {
        let store = MemoryStore::new();
        let owner = seed_user(&store, "owner").await;
        let intruder = seed_user(&store, "intruder").await;
        let post = seed_post(&store, owner.id, "original").await;

        let update = || UpdatePostRequest {
            content: Some("edited".to_string()),
            image_key: None,
        };

        assert!(store.update_post(post.id, intruder.id, update()).await.unwrap().is_none());
        assert!(!store.delete_post(post.id, intruder.id).await.unwrap());

        let updated = store.update_post(post.id, owner.id, update()).await.unwrap().unwrap();
        assert_eq!(updated.content, "edited");
        assert!(updated.updated_at >= post.updated_at);
    }

    #[tokio::test]
    async fn feed_contains_own_and_followed_posts() {
        let store = MemoryStore::new();
        let reader = seed_user(&store, "reader").await;
        let followed = seed_user(&store, "followed").await;
        let stranger = seed_user(&store, "stranger").await;

        seed_post(&store, reader.id, "mine").await;
        seed_post(&store, followed.id, "theirs").await;
        seed_post(&store, stranger.id, "unseen").await;
        store.follow(reader.id, followed.id).await.unwrap();

        let (posts, total) = store.feed(reader.id, PaginationParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert!(posts.iter().all(|p| p.content != "unseen"));
    }

    #[tokio::test]
    async fn likes_are_idempotent_and_counted() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "liker").await;
        let post = seed_post(&store, user.id, "hello").await;

        assert!(store.like(post.id, user.id).await.unwrap());
        assert!(!store.like(post.id, user.id).await.unwrap());
        assert_eq!(store.get_post(post.id).await.unwrap().unwrap().like_count, 1);

        assert!(store.unlike(post.id, user.id).await.unwrap());
        assert!(!store.unlike(post.id, user.id).await.unwrap());
        assert!(matches!(store.like(Uuid::new_v4(), user.id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_comments_and_likes() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "author").await;
        let post = seed_post(&store, user.id, "bye").await;
        store.like(post.id, user.id).await.unwrap();
        store.create_comment(post.id, user.id, "first".to_string()).await.unwrap();

        assert!(store.delete_post(post.id, user.id).await.unwrap());
        let (comments, total) = store.list_for_post(post.id, PaginationParams::default()).await.unwrap();
        assert!(comments.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn bids_track_the_previous_leader() {
        let store = MemoryStore::new();
        let seller = seed_user(&store, "seller").await;
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let now = Utc::now();

        let auction = store
            .create_auction(
                seller.id,
                CreateAuctionRequest {
                    title: "Lamp".to_string(),
                    description: None,
                    starting_price: 500,
                    ends_at: now + Duration::hours(2),
                    post_id: None,
                },
            )
            .await
            .unwrap();

        let first = store.place_bid(auction.id, alice.id, 500, now).await.unwrap().unwrap();
        assert_eq!(first.previous_bidder_id, None);

        let err = store.place_bid(auction.id, bob.id, 500, now).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let second = store.place_bid(auction.id, bob.id, 650, now).await.unwrap().unwrap();
        assert_eq!(second.previous_bidder_id, Some(alice.id));
        assert_eq!(second.auction.current_bid, Some(650));

        let bids = store.list_bids(auction.id).await.unwrap();
        assert_eq!(bids.iter().map(|b| b.amount).collect::<Vec<_>>(), vec![650, 500]);

        let err = store.cancel_auction(auction.id, seller.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.place_bid(Uuid::new_v4(), bob.id, 10, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notifications_can_be_marked_read() {
        let store = MemoryStore::new();
        let recipient = Uuid::new_v4();
        let actor = Uuid::new_v4();

        for kind in [NotificationKind::Follow, NotificationKind::Like] {
            store
                .create(NewNotification {
                    user_id: recipient,
                    actor_id: actor,
                    kind,
                    entity_id: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.unread_count(recipient).await.unwrap(), 2);

        let (items, _) = store.list(recipient, true, PaginationParams::default()).await.unwrap();
        assert!(store.mark_read(items[0].id, actor).await.unwrap().is_none());
        assert!(store.mark_read(items[0].id, recipient).await.unwrap().unwrap().is_read);

        assert_eq!(store.mark_all_read(recipient).await.unwrap(), 1);
        assert_eq!(store.unread_count(recipient).await.unwrap(), 0);
    }
}
