//! Runs the Postgres store against a live database.
//!
//! `DATABASE_URL=postgres://... cargo test --test postgres_tests -- --ignored`

use chrono::{Duration, Utc};
use uuid::Uuid;

use social_backend::database::{create_connection_pool, run_migrations};
use social_backend::models::*;
use social_backend::{AppError, Config, PaginationParams, Services};

async fn services() -> Option<Services> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let config = Config::from_lookup(|name| match name {
        "JWT_SECRET" => Some("postgres-test-secret".to_string()),
        _ => None,
    })
    .unwrap();

    let pool = create_connection_pool(&database_url, &config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Some(Services::postgres(pool))
}

async fn user(services: &Services, prefix: &str) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    let (user, _) = services
        .users
        .create_user(NewUser {
            email: format!("{}_{}@example.com", prefix, &tag[..8]),
            password_hash: "not-a-real-hash".to_string(),
            username: format!("{}_{}", prefix, &tag[..8]),
            display_name: None,
        })
        .await
        .unwrap();
    user
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_posts_feed_and_likes() {
    let Some(services) = services().await else {
        return;
    };
    let alice = user(&services, "alice").await;
    let bob = user(&services, "bob").await;

    let duplicate = services
        .users
        .create_user(NewUser {
            email: alice.email.to_uppercase(),
            password_hash: "x".to_string(),
            username: format!("other_{}", &Uuid::new_v4().simple().to_string()[..8]),
            display_name: None,
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let post = services
        .posts
        .create_post(
            bob.id,
            CreatePostRequest {
                content: "hello".to_string(),
                image_key: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(post.like_count, 0);

    assert!(services.follows.follow(alice.id, bob.id).await.unwrap());
    assert!(!services.follows.follow(alice.id, bob.id).await.unwrap());
    let (feed, total) = services.posts.feed(alice.id, PaginationParams::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(feed[0].id, post.id);

    assert!(services.likes.like(post.id, alice.id).await.unwrap());
    assert!(!services.likes.like(post.id, alice.id).await.unwrap());
    services
        .comments
        .create_comment(post.id, alice.id, "nice".to_string())
        .await
        .unwrap();
    let stored = services.posts.get_post(post.id).await.unwrap().unwrap();
    assert_eq!((stored.like_count, stored.comment_count), (1, 1));

    let update = || UpdatePostRequest {
        content: Some("edited".to_string()),
        image_key: None,
    };
    assert!(services.posts.update_post(post.id, alice.id, update()).await.unwrap().is_none());
    let updated = services.posts.update_post(post.id, bob.id, update()).await.unwrap().unwrap();
    assert_eq!(updated.content, "edited");
    assert_eq!(updated.like_count, 1);

    assert!(matches!(
        services.likes.like(Uuid::new_v4(), alice.id).await,
        Err(AppError::NotFound)
    ));

    assert!(services.posts.delete_post(post.id, bob.id).await.unwrap());
    assert!(services.posts.get_post(post.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_bidding_and_notifications() {
    let Some(services) = services().await else {
        return;
    };
    let seller = user(&services, "seller").await;
    let first = user(&services, "first").await;
    let second = user(&services, "second").await;
    let now = Utc::now();

    let auction = services
        .auctions
        .create_auction(
            seller.id,
            CreateAuctionRequest {
                title: "Camera".to_string(),
                description: None,
                starting_price: 100,
                ends_at: now + Duration::days(1),
                post_id: None,
            },
        )
        .await
        .unwrap();

    let placed = services
        .auctions
        .place_bid(auction.id, first.id, 100, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placed.previous_bidder_id, None);

    let rejected = services.auctions.place_bid(auction.id, second.id, 100, now).await;
    assert!(matches!(rejected, Err(AppError::BadRequest(_))));

    let placed = services
        .auctions
        .place_bid(auction.id, second.id, 150, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placed.previous_bidder_id, Some(first.id));
    assert_eq!(placed.auction.current_bid, Some(150));

    let bids = services.auctions.list_bids(auction.id).await.unwrap();
    assert_eq!(bids.iter().map(|b| b.amount).collect::<Vec<_>>(), vec![150, 100]);
    assert!(matches!(
        services.auctions.cancel_auction(auction.id, seller.id).await,
        Err(AppError::Conflict(_))
    ));
    assert!(!services.auctions.cancel_auction(auction.id, first.id).await.unwrap());

    let notification = services
        .notifications
        .create(NewNotification {
            user_id: first.id,
            actor_id: second.id,
            kind: NotificationKind::Outbid,
            entity_id: Some(auction.id),
        })
        .await
        .unwrap();
    assert_eq!(notification.kind, NotificationKind::Outbid);
    assert_eq!(services.notifications.unread_count(first.id).await.unwrap(), 1);
    assert!(services
        .notifications
        .mark_read(notification.id, second.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(services.notifications.mark_all_read(first.id).await.unwrap(), 1);
    assert_eq!(services.notifications.unread_count(first.id).await.unwrap(), 0);
}
