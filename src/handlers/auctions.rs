use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{AuthUser, BearerToken};
use crate::error::AppError;
use crate::handlers::{notify, parse_id};
use crate::models::*;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams, PaginationQuery};
use crate::validation::{parse_body, QueryParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AuctionFilterQuery {
    pub status: Option<AuctionStatus>,
}

pub async fn create_auction(
    State(state): State<AppState>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: CreateAuctionRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let auction = state.services.auctions.create_auction(user.id, request).await?;
    tracing::info!(auction_id = %auction.id, seller_id = %user.id, "auction created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AuctionResponse::new(auction, Utc::now()))),
    ))
}

pub async fn get_auction(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(auction_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let auction_id = parse_id(&auction_id, "auction id")?;

    let auction = state
        .services
        .auctions
        .get_auction(auction_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(AuctionResponse::new(auction, Utc::now()))))
}

pub async fn list_auctions(
    State(state): State<AppState>,
    _user: AuthUser,
    QueryParams(filters): QueryParams<AuctionFilterQuery>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = PaginationParams::from(pagination);
    let now = Utc::now();

    let (auctions, total) = state
        .services
        .auctions
        .list_auctions(filters.status, now, pagination)
        .await?;
    let response = PaginatedResponse::new(auctions, pagination, total)
        .map(|auction| AuctionResponse::new(auction, now));

    Ok(Json(ApiResponse::success(response)))
}

pub async fn cancel_auction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(auction_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let auction_id = parse_id(&auction_id, "auction id")?;

    if !state.services.auctions.cancel_auction(auction_id, user.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(%auction_id, seller_id = %user.id, "auction cancelled");
    Ok(Json(ApiResponse::success(serde_json::json!({ "deleted": true }))))
}

pub async fn place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<String>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let auction_id = parse_id(&auction_id, "auction id")?;
    let request: PlaceBidRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;
    let now = Utc::now();

    let placed = state
        .services
        .auctions
        .place_bid(auction_id, user.id, request.amount, now)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(
        %auction_id,
        bidder_id = %user.id,
        amount = placed.bid.amount,
        "bid placed"
    );

    notify(
        &state,
        NewNotification {
            user_id: placed.auction.seller_id,
            actor_id: user.id,
            kind: NotificationKind::Bid,
            entity_id: Some(auction_id),
        },
    )
    .await;

    if let Some(previous) = placed.previous_bidder_id {
        notify(
            &state,
            NewNotification {
                user_id: previous,
                actor_id: user.id,
                kind: NotificationKind::Outbid,
                entity_id: Some(auction_id),
            },
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(BidResponse {
            bid: placed.bid,
            auction: AuctionResponse::new(placed.auction, now),
        })),
    ))
}

pub async fn list_bids(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(auction_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let auction_id = parse_id(&auction_id, "auction id")?;

    if state.services.auctions.get_auction(auction_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let bids = state.services.auctions.list_bids(auction_id).await?;
    Ok(Json(ApiResponse::success(bids)))
}
