use crate::models::{Comment, Community, NewComment, NewCommunity, NewPost, Post};
use crate::tree::CommentNode;
use crate::vote::{ClientVotes, VoteTally};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_communities,
        crate::routes::create_community,
        crate::routes::get_community,
        crate::routes::list_community_posts,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::list_post_comments,
        crate::routes::create_comment,
        crate::routes::vote_post,
        crate::routes::vote_comment,
        crate::routes::get_post_votes,
    ),
    components(schemas(
        Community, NewCommunity, Post, NewPost, Comment, NewComment,
        CommentNode, VoteTally, ClientVotes,
        crate::routes::VoteRequest, crate::routes::VoteResponse
    )),
    tags(
        (name = "communities", description = "Community operations"),
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Comment thread operations"),
        (name = "votes", description = "Vote ledger operations"),
    )
)]
pub struct ApiDoc;
