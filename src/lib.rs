pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod tree;
pub mod vote;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use tree::{build_tree, CommentNode};
pub use vote::{VoteTally, VoteValue};
