use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError};
use crate::tree;
use crate::vote::VoteValue;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/communities")
                    .route(web::get().to(list_communities))
                    .route(web::post().to(create_community)),
            )
            .service(web::resource("/communities/{id}").route(web::get().to(get_community)))
            .service(
                web::resource("/communities/{id}/posts").route(web::get().to(list_community_posts)),
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(web::resource("/posts/{id}").route(web::get().to(get_post)))
            .service(web::resource("/posts/{id}/comments").route(web::get().to(list_post_comments)))
            .service(web::resource("/posts/{id}/votes").route(web::get().to(get_post_votes)))
            .service(web::resource("/posts/{id}/vote").route(web::post().to(vote_post)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(web::resource("/comments/{id}/vote").route(web::post().to(vote_comment))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
}

const CLIENT_COOKIE: &str = "client_id";

/// The opaque voter token: an unauthenticated cookie value. Same string,
/// same voter; nothing more is assumed. Returns the id and whether it was
/// freshly minted (and so still needs to be set on the response).
fn client_identity(req: &HttpRequest) -> (String, bool) {
    match req.cookie(CLIENT_COOKIE) {
        Some(c) if !c.value().is_empty() => (c.value().to_string(), false),
        _ => (Uuid::new_v4().simple().to_string(), true),
    }
}

fn with_client_cookie(mut builder: HttpResponseBuilder, client_id: &str, fresh: bool) -> HttpResponseBuilder {
    if fresh {
        builder.cookie(Cookie::build(CLIENT_COOKIE, client_id.to_string()).path("/").finish());
    }
    builder
}

#[utoipa::path(
    get,
    path = "/api/v1/communities",
    responses(
        (status = 200, description = "List communities", body = [Community])
    )
)]
pub async fn list_communities(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let communities = data.repo.list_communities().await?;
    Ok(HttpResponse::Ok().json(communities))
}

#[utoipa::path(
    post,
    path = "/api/v1/communities",
    request_body = NewCommunity,
    responses(
        (status = 201, description = "Community created", body = Community),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_community(
    data: web::Data<AppState>,
    payload: web::Json<NewCommunity>,
) -> Result<HttpResponse, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::InvalidArgument);
    }
    let community = data.repo.create_community(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(community))
}

#[utoipa::path(
    get,
    path = "/api/v1/communities/{id}",
    params(("id" = Id, Path, description = "Community id")),
    responses(
        (status = 200, description = "Community", body = Community),
        (status = 404, description = "Community not found")
    )
)]
pub async fn get_community(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let community = data.repo.get_community(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(community))
}

#[utoipa::path(
    get,
    path = "/api/v1/communities/{id}/posts",
    params(("id" = Id, Path, description = "Community id")),
    responses(
        (status = 200, description = "Posts in the community, score descending", body = [Post]),
        (status = 404, description = "Community not found")
    )
)]
pub async fn list_community_posts(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let community_id = path.into_inner();
    data.repo.get_community(community_id).await?;
    let posts = data.repo.list_posts(Some(community_id)).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    responses(
        (status = 200, description = "Front page: all posts, score descending", body = [Post])
    )
)]
pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(None).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 404, description = "Community not found")
    )
)]
pub async fn create_post(
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::InvalidArgument);
    }
    let post = data.repo.create_post(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Nested reply tree", body = [tree::CommentNode]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_post_comments(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.get_post(post_id).await.map_err(|_| ApiError::NotFound)?;
    // The repo returns the flat list pre-sorted (score desc, creation asc);
    // the assembler only nests, it never reorders.
    let comments = data.repo.list_comments(post_id).await?;
    let forest = tree::build_tree(comments);
    Ok(HttpResponse::Ok().json(forest))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Parent belongs to a different post"),
        (status = 404, description = "Post or parent comment not found")
    )
)]
pub async fn create_comment(
    data: web::Data<AppState>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    if payload.content.trim().is_empty() {
        return Err(ApiError::InvalidArgument);
    }
    let comment = data.repo.create_comment(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VoteRequest {
    /// 1 for upvote, -1 for downvote; anything else is rejected.
    #[schema(value_type = i64)]
    pub value: VoteValue,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VoteResponse {
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
    /// The caller's stance after this vote; absent when it toggled off.
    #[schema(value_type = Option<i64>)]
    pub user_vote: Option<VoteValue>,
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/vote",
    request_body = VoteRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Updated tally", body = VoteResponse),
        (status = 400, description = "Vote value outside {1, -1}"),
        (status = 404, description = "Post not found"),
        (status = 503, description = "Vote transaction failed; safe to retry")
    )
)]
pub async fn vote_post(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<VoteRequest>,
) -> Result<HttpResponse, ApiError> {
    vote_on(ItemKind::Post, path.into_inner(), &req, &data, payload.value).await
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/vote",
    request_body = VoteRequest,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Updated tally", body = VoteResponse),
        (status = 400, description = "Vote value outside {1, -1}"),
        (status = 404, description = "Comment not found"),
        (status = 503, description = "Vote transaction failed; safe to retry")
    )
)]
pub async fn vote_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<VoteRequest>,
) -> Result<HttpResponse, ApiError> {
    vote_on(ItemKind::Comment, path.into_inner(), &req, &data, payload.value).await
}

async fn vote_on(
    kind: ItemKind,
    item_id: Id,
    req: &HttpRequest,
    data: &web::Data<AppState>,
    value: VoteValue,
) -> Result<HttpResponse, ApiError> {
    let (client_id, fresh) = client_identity(req);
    let tally = data
        .repo
        .apply_vote(kind, item_id, &client_id, value)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound,
            // Exhausted retries and store failures are both retry-safe: the
            // transaction rolled back whole.
            e => {
                tracing::error!(%kind, item_id, error = %e, "vote application failed");
                ApiError::VoteFailed
            }
        })?;
    // Decoration only; a read failure here must not fail a committed vote.
    let user_vote = data.repo.get_vote(kind, item_id, &client_id).await.ok().flatten();
    let mut builder = with_client_cookie(HttpResponse::Ok(), &client_id, fresh);
    Ok(builder.json(VoteResponse {
        upvotes: tally.upvotes,
        downvotes: tally.downvotes,
        score: tally.score(),
        user_vote,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/votes",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Caller's votes on the post and its comments", body = crate::vote::ClientVotes),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post_votes(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.get_post(post_id).await.map_err(|_| ApiError::NotFound)?;
    let (client_id, fresh) = client_identity(&req);
    let votes = data.repo.client_votes(post_id, &client_id).await?;
    let mut builder = with_client_cookie(HttpResponse::Ok(), &client_id, fresh);
    Ok(builder.json(votes))
}
