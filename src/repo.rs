use std::collections::HashMap;
use std::sync::Arc;

use crate::models::*;
use crate::vote::{self, ClientVotes, LedgerOp, VoteTally, VoteValue};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid reference")] Invalid,
    #[error("internal error")] Internal(#[from] anyhow::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait CommunityRepo: Send + Sync {
    async fn list_communities(&self) -> RepoResult<Vec<Community>>;
    async fn create_community(&self, new: NewCommunity) -> RepoResult<Community>;
    async fn get_community(&self, id: Id) -> RepoResult<Community>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Posts, score descending then newest first; optionally scoped to one
    /// community.
    async fn list_posts(&self, community_id: Option<Id>) -> RepoResult<Vec<Post>>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Flat comment list for a post, pre-sorted for thread assembly
    /// (score descending, then creation order).
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
}

#[async_trait]
pub trait VoteRepo: Send + Sync {
    /// Apply one vote atomically: ledger insert/remove/flip plus the matching
    /// counter update commit together or not at all. Returns the item's
    /// post-update tally. `RepoError::Conflict` after internal retries means
    /// the caller may safely resubmit.
    async fn apply_vote(
        &self,
        kind: ItemKind,
        item_id: Id,
        client_id: &str,
        value: VoteValue,
    ) -> RepoResult<VoteTally>;

    /// The client's current stance on one item, if any.
    async fn get_vote(&self, kind: ItemKind, item_id: Id, client_id: &str)
        -> RepoResult<Option<VoteValue>>;

    /// The client's vote on a post plus their votes on that post's comments.
    async fn client_votes(&self, post_id: Id, client_id: &str) -> RepoResult<ClientVotes>;
}

pub trait Repo: CommunityRepo + PostRepo + CommentRepo + VoteRepo {}

impl<T> Repo for T where T: CommunityRepo + PostRepo + CommentRepo + VoteRepo {}

/// SQLite when DATABASE_URL is set, in-memory otherwise.
pub async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            tracing::info!(%url, "using sqlite repository backend");
            Ok(Arc::new(sqlite::SqliteRepo::connect(&url).await?))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory repository backend");
            Ok(Arc::new(inmem::InMemRepo::new()))
        }
    }
}

pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::sync::RwLock;

    #[derive(Default)]
    struct State {
        communities: HashMap<Id, Community>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        // Ledger: at most one live entry per (kind, item, client).
        votes: HashMap<(ItemKind, Id, String), VoteValue>,
        next_id: Id,
    }

    /// Non-durable backend for development and tests. A single write lock
    /// spans every read-modify-write, so vote application is trivially
    /// serializable per the whole store.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        // Derived fields are recomputed on the way out so stored rows never
        // carry stale score/count caches.
        fn community_view(state: &State, c: &Community) -> Community {
            let mut c = c.clone();
            c.post_count = state.posts.values().filter(|p| p.community_id == c.id).count() as i64;
            c
        }

        fn post_view(state: &State, p: &Post) -> Post {
            let mut p = p.clone();
            p.score = p.upvotes - p.downvotes;
            p.comment_count = state.comments.values().filter(|c| c.post_id == p.id).count() as i64;
            p
        }

        fn comment_view(c: &Comment) -> Comment {
            let mut c = c.clone();
            c.score = c.upvotes - c.downvotes;
            c
        }
    }

    #[async_trait]
    impl CommunityRepo for InMemRepo {
        async fn list_communities(&self) -> RepoResult<Vec<Community>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.communities.values().map(|c| Self::community_view(&s, c)).collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }

        async fn create_community(&self, new: NewCommunity) -> RepoResult<Community> {
            let mut s = self.state.write().unwrap();
            if s.communities.values().any(|c| c.name == new.name) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let community = Community {
                id,
                name: new.name,
                description: new.description,
                created_at: Utc::now(),
                post_count: 0,
            };
            s.communities.insert(id, community.clone());
            Ok(community)
        }

        async fn get_community(&self, id: Id) -> RepoResult<Community> {
            let s = self.state.read().unwrap();
            s.communities
                .get(&id)
                .map(|c| Self::community_view(&s, c))
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self, community_id: Option<Id>) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| community_id.map(|id| p.community_id == id).unwrap_or(true))
                .map(|p| Self::post_view(&s, p))
                .collect();
            v.sort_by(|a, b| b.score.cmp(&a.score).then(b.created_at.cmp(&a.created_at)));
            Ok(v)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let community_name = s
                .communities
                .get(&new.community_id)
                .map(|c| c.name.clone())
                .ok_or(RepoError::NotFound)?;
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                content: new.content,
                community_id: new.community_id,
                community_name,
                created_at: Utc::now(),
                upvotes: 0,
                downvotes: 0,
                score: 0,
                comment_count: 0,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts
                .get(&id)
                .map(|p| Self::post_view(&s, p))
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .map(Self::comment_view)
                .collect();
            v.sort_by(|a, b| b.score.cmp(&a.score).then(a.created_at.cmp(&b.created_at)));
            Ok(v)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::NotFound);
            }
            if let Some(parent_id) = new.parent_id {
                let parent = s.comments.get(&parent_id).ok_or(RepoError::NotFound)?;
                // Cross-post parenting is rejected up front; the assembler
                // would only demote it to a root later.
                if parent.post_id != new.post_id {
                    return Err(RepoError::Invalid);
                }
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                post_id: new.post_id,
                parent_id: new.parent_id,
                content: new.content,
                created_at: Utc::now(),
                upvotes: 0,
                downvotes: 0,
                score: 0,
            };
            s.comments.insert(id, comment.clone());
            Ok(comment)
        }
    }

    #[async_trait]
    impl VoteRepo for InMemRepo {
        async fn apply_vote(
            &self,
            kind: ItemKind,
            item_id: Id,
            client_id: &str,
            value: VoteValue,
        ) -> RepoResult<VoteTally> {
            let mut guard = self.state.write().unwrap();
            let s = &mut *guard;
            let key = (kind, item_id, client_id.to_string());
            let existing = s.votes.get(&key).copied();
            let (op, delta) = vote::transition(existing, value);
            // Counters first: a missing item returns before the ledger is
            // touched, so no orphan entry can appear.
            let tally = match kind {
                ItemKind::Post => {
                    let p = s.posts.get_mut(&item_id).ok_or(RepoError::NotFound)?;
                    p.upvotes += delta.up;
                    p.downvotes += delta.down;
                    VoteTally { upvotes: p.upvotes, downvotes: p.downvotes }
                }
                ItemKind::Comment => {
                    let c = s.comments.get_mut(&item_id).ok_or(RepoError::NotFound)?;
                    c.upvotes += delta.up;
                    c.downvotes += delta.down;
                    VoteTally { upvotes: c.upvotes, downvotes: c.downvotes }
                }
            };
            match op {
                LedgerOp::Insert | LedgerOp::Flip => {
                    s.votes.insert(key, value);
                }
                LedgerOp::Remove => {
                    s.votes.remove(&key);
                }
            }
            Ok(tally)
        }

        async fn get_vote(
            &self,
            kind: ItemKind,
            item_id: Id,
            client_id: &str,
        ) -> RepoResult<Option<VoteValue>> {
            let s = self.state.read().unwrap();
            Ok(s.votes.get(&(kind, item_id, client_id.to_string())).copied())
        }

        async fn client_votes(&self, post_id: Id, client_id: &str) -> RepoResult<ClientVotes> {
            let s = self.state.read().unwrap();
            let post_vote = s
                .votes
                .get(&(ItemKind::Post, post_id, client_id.to_string()))
                .copied();
            let comment_votes = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .filter_map(|c| {
                    s.votes
                        .get(&(ItemKind::Comment, c.id, client_id.to_string()))
                        .map(|v| (c.id, *v))
                })
                .collect();
            Ok(ClientVotes { post_vote, comment_votes })
        }
    }
}

pub mod sqlite {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
    use std::str::FromStr;
    use std::time::Duration;

    /// Bounded retries for vote transactions that lose a write race. A
    /// retried attempt re-reads the ledger row and resolves as toggle/flip,
    /// never as a duplicate-insert error surfaced to the user.
    const VOTE_MAX_ATTEMPTS: u32 = 3;

    const POST_COLUMNS: &str = r#"
        p.id, p.title, p.content, p.community_id, c.name AS community_name,
        p.created_at, p.upvotes, p.downvotes,
        (p.upvotes - p.downvotes) AS score,
        (SELECT COUNT(*) FROM comments WHERE post_id = p.id) AS comment_count
    "#;

    #[derive(Clone)]
    pub struct SqliteRepo {
        pool: SqlitePool,
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            e => {
                if is_conflict(&e) {
                    RepoError::Conflict
                } else {
                    RepoError::Internal(e.into())
                }
            }
        }
    }

    // Unique-constraint races and SQLITE_BUSY/LOCKED aborts both mean the
    // transaction should be rerun from the top.
    fn is_conflict(e: &sqlx::Error) -> bool {
        match e.as_database_error() {
            Some(db) => db.is_unique_violation() || db.message().contains("locked"),
            None => false,
        }
    }

    impl SqliteRepo {
        pub async fn connect(url: &str) -> anyhow::Result<Self> {
            let opts = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(5));
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(opts)
                .await?;
            let repo = Self { pool };
            repo.init_schema().await?;
            Ok(repo)
        }

        /// Single-connection pool; used by tests so `sqlite::memory:` is one
        /// shared database instead of one per pooled connection.
        #[allow(dead_code)] // unused in the binary target, which compiles this module too
        pub async fn connect_single(url: &str) -> anyhow::Result<Self> {
            let opts = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(5));
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(opts)
                .await?;
            let repo = Self { pool };
            repo.init_schema().await?;
            Ok(repo)
        }

        async fn init_schema(&self) -> anyhow::Result<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS communities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TIMESTAMP NOT NULL
                )"#,
            )
            .execute(&self.pool)
            .await?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL DEFAULT '',
                    community_id INTEGER NOT NULL REFERENCES communities(id),
                    created_at TIMESTAMP NOT NULL,
                    upvotes INTEGER NOT NULL DEFAULT 0,
                    downvotes INTEGER NOT NULL DEFAULT 0
                )"#,
            )
            .execute(&self.pool)
            .await?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    post_id INTEGER NOT NULL REFERENCES posts(id),
                    parent_id INTEGER DEFAULT NULL REFERENCES comments(id),
                    created_at TIMESTAMP NOT NULL,
                    upvotes INTEGER NOT NULL DEFAULT 0,
                    downvotes INTEGER NOT NULL DEFAULT 0
                )"#,
            )
            .execute(&self.pool)
            .await?;
            // The unique key is the last-resort backstop against a
            // duplicate-insert race; the transaction retry is the primary
            // correctness mechanism.
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS votes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    item_kind TEXT NOT NULL,
                    item_id INTEGER NOT NULL,
                    client_id TEXT NOT NULL,
                    value INTEGER NOT NULL,
                    created_at TIMESTAMP NOT NULL,
                    UNIQUE(item_kind, item_id, client_id)
                )"#,
            )
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        fn counter_table(kind: ItemKind) -> &'static str {
            // Table name comes from the enum, never from user input.
            match kind {
                ItemKind::Post => "posts",
                ItemKind::Comment => "comments",
            }
        }

        async fn vote_once(
            &self,
            kind: ItemKind,
            item_id: Id,
            client_id: &str,
            value: VoteValue,
        ) -> RepoResult<VoteTally> {
            let table = Self::counter_table(kind);
            let mut tx = self.pool.begin().await.map_err(map_err)?;

            let counters: Option<(i64, i64)> =
                sqlx::query_as(&format!("SELECT upvotes, downvotes FROM {table} WHERE id = ?"))
                    .bind(item_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_err)?;
            let tally = match counters {
                Some((upvotes, downvotes)) => VoteTally { upvotes, downvotes },
                None => return Err(RepoError::NotFound),
            };

            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT value FROM votes WHERE item_kind = ? AND item_id = ? AND client_id = ?",
            )
            .bind(kind.as_str())
            .bind(item_id)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;
            let existing = existing
                .map(VoteValue::try_from)
                .transpose()
                .map_err(|e| RepoError::Internal(anyhow::anyhow!("corrupt ledger row: {e}")))?;

            let (op, delta) = vote::transition(existing, value);
            match op {
                LedgerOp::Insert => {
                    sqlx::query(
                        "INSERT INTO votes (item_kind, item_id, client_id, value, created_at) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(client_id)
                    .bind(value.as_int())
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                }
                LedgerOp::Remove => {
                    sqlx::query(
                        "DELETE FROM votes WHERE item_kind = ? AND item_id = ? AND client_id = ?",
                    )
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(client_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                }
                LedgerOp::Flip => {
                    sqlx::query(
                        "UPDATE votes SET value = ? \
                         WHERE item_kind = ? AND item_id = ? AND client_id = ?",
                    )
                    .bind(value.as_int())
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(client_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                }
            }

            sqlx::query(&format!(
                "UPDATE {table} SET upvotes = upvotes + ?, downvotes = downvotes + ? WHERE id = ?"
            ))
            .bind(delta.up)
            .bind(delta.down)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            // Commit is the only success exit; every other path drops the
            // transaction and rolls back.
            tx.commit().await.map_err(map_err)?;
            Ok(tally.apply(delta))
        }
    }

    #[async_trait]
    impl CommunityRepo for SqliteRepo {
        async fn list_communities(&self) -> RepoResult<Vec<Community>> {
            sqlx::query_as::<_, Community>(
                r#"
                SELECT id, name, description, created_at,
                       (SELECT COUNT(*) FROM posts WHERE community_id = communities.id) AS post_count
                FROM communities
                ORDER BY name ASC
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn create_community(&self, new: NewCommunity) -> RepoResult<Community> {
            sqlx::query_as::<_, Community>(
                r#"
                INSERT INTO communities (name, description, created_at) VALUES (?, ?, ?)
                RETURNING id, name, description, created_at, 0 AS post_count
                "#,
            )
            .bind(&new.name)
            .bind(&new.description)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_community(&self, id: Id) -> RepoResult<Community> {
            sqlx::query_as::<_, Community>(
                r#"
                SELECT id, name, description, created_at,
                       (SELECT COUNT(*) FROM posts WHERE community_id = communities.id) AS post_count
                FROM communities
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl PostRepo for SqliteRepo {
        async fn list_posts(&self, community_id: Option<Id>) -> RepoResult<Vec<Post>> {
            let order = "ORDER BY (p.upvotes - p.downvotes) DESC, p.created_at DESC";
            let recs = match community_id {
                Some(cid) => {
                    sqlx::query_as::<_, Post>(&format!(
                        "SELECT {POST_COLUMNS} FROM posts p \
                         JOIN communities c ON p.community_id = c.id \
                         WHERE p.community_id = ? {order}"
                    ))
                    .bind(cid)
                    .fetch_all(&self.pool)
                    .await
                }
                None => {
                    sqlx::query_as::<_, Post>(&format!(
                        "SELECT {POST_COLUMNS} FROM posts p \
                         JOIN communities c ON p.community_id = c.id {order}"
                    ))
                    .fetch_all(&self.pool)
                    .await
                }
            };
            recs.map_err(map_err)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            // Community lookup doubles as the NotFound check.
            let _ = self.get_community(new.community_id).await?;
            let id: Id = sqlx::query_scalar(
                "INSERT INTO posts (title, content, community_id, created_at) \
                 VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.community_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            self.get_post(id).await
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts p \
                 JOIN communities c ON p.community_id = c.id \
                 WHERE p.id = ?"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentRepo for SqliteRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(
                r#"
                SELECT id, post_id, parent_id, content, created_at, upvotes, downvotes,
                       (upvotes - downvotes) AS score
                FROM comments
                WHERE post_id = ?
                ORDER BY (upvotes - downvotes) DESC, created_at ASC
                "#,
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let post: Option<Id> = sqlx::query_scalar("SELECT id FROM posts WHERE id = ?")
                .bind(new.post_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
            if post.is_none() {
                return Err(RepoError::NotFound);
            }
            if let Some(parent_id) = new.parent_id {
                let parent_post: Option<Id> =
                    sqlx::query_scalar("SELECT post_id FROM comments WHERE id = ?")
                        .bind(parent_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(map_err)?;
                match parent_post {
                    None => return Err(RepoError::NotFound),
                    Some(pid) if pid != new.post_id => return Err(RepoError::Invalid),
                    Some(_) => {}
                }
            }
            sqlx::query_as::<_, Comment>(
                r#"
                INSERT INTO comments (content, post_id, parent_id, created_at) VALUES (?, ?, ?, ?)
                RETURNING id, post_id, parent_id, content, created_at, upvotes, downvotes,
                          (upvotes - downvotes) AS score
                "#,
            )
            .bind(&new.content)
            .bind(new.post_id)
            .bind(new.parent_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl VoteRepo for SqliteRepo {
        async fn apply_vote(
            &self,
            kind: ItemKind,
            item_id: Id,
            client_id: &str,
            value: VoteValue,
        ) -> RepoResult<VoteTally> {
            let mut attempt = 1;
            loop {
                match self.vote_once(kind, item_id, client_id, value).await {
                    Err(RepoError::Conflict) if attempt < VOTE_MAX_ATTEMPTS => {
                        tracing::debug!(attempt, %kind, item_id, "vote transaction conflict, retrying");
                        attempt += 1;
                    }
                    other => return other,
                }
            }
        }

        async fn get_vote(
            &self,
            kind: ItemKind,
            item_id: Id,
            client_id: &str,
        ) -> RepoResult<Option<VoteValue>> {
            let value: Option<i64> = sqlx::query_scalar(
                "SELECT value FROM votes WHERE item_kind = ? AND item_id = ? AND client_id = ?",
            )
            .bind(kind.as_str())
            .bind(item_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            value
                .map(VoteValue::try_from)
                .transpose()
                .map_err(|e| RepoError::Internal(anyhow::anyhow!("corrupt ledger row: {e}")))
        }

        async fn client_votes(&self, post_id: Id, client_id: &str) -> RepoResult<ClientVotes> {
            let post_vote = self.get_vote(ItemKind::Post, post_id, client_id).await?;
            let rows: Vec<(Id, i64)> = sqlx::query_as(
                r#"
                SELECT item_id, value FROM votes
                WHERE item_kind = 'comment' AND client_id = ?
                  AND item_id IN (SELECT id FROM comments WHERE post_id = ?)
                "#,
            )
            .bind(client_id)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            let mut comment_votes = HashMap::new();
            for (id, raw) in rows {
                let value = VoteValue::try_from(raw)
                    .map_err(|e| RepoError::Internal(anyhow::anyhow!("corrupt ledger row: {e}")))?;
                comment_votes.insert(id, value);
            }
            Ok(ClientVotes { post_vote, comment_votes })
        }
    }
}
