use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewPost, NewTag, NewUser, PageParams, Post, PostChanges, PostDetail, PostFilter, Role, Tag,
    TagChanges, User, UserChanges, UserSummary,
};

/// StoreError
///
/// What the persistence layer can report. Uniqueness violations are singled out so
/// callers can answer 409; everything else is an opaque backend failure, which the
/// core never retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("uniqueness violated: {0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(
                    db.constraint().unwrap_or("unique constraint").to_string(),
                );
            }
        }
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers and services only
/// see this trait, so the Postgres store and the in-memory store are interchangeable.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn count_users_by_role(&self, role: Role) -> StoreResult<i64>;
    async fn list_users(&self, page: PageParams) -> StoreResult<(Vec<User>, i64)>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    // Sparse update; `None` when the user does not exist.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>>;
    // Cascades to the user's posts and their tag associations.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    // --- Tags ---
    // Unknown ids are skipped; the result holds each tag once.
    async fn find_tags(&self, ids: &[Uuid]) -> StoreResult<Vec<Tag>>;
    async fn list_tags(&self) -> StoreResult<Vec<Tag>>;
    async fn create_tag(&self, tag: NewTag) -> StoreResult<Tag>;
    async fn update_tag(&self, id: Uuid, changes: TagChanges) -> StoreResult<Option<Tag>>;
    // Removes the tag from every post, never the posts themselves.
    async fn delete_tag(&self, id: Uuid) -> StoreResult<bool>;

    // --- Posts ---
    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>>;
    async fn find_post_detail(&self, id: Uuid) -> StoreResult<Option<PostDetail>>;
    // Newest first, with the total count before paging.
    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: PageParams,
    ) -> StoreResult<(Vec<PostDetail>, i64)>;
    async fn delete_post(&self, id: Uuid) -> StoreResult<bool>;
    // Single-statement `view_count = view_count + 1`.
    async fn increment_view_count(&self, id: Uuid) -> StoreResult<()>;

    // --- Units of Work ---
    /// Opens an atomic unit of work. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

/// UnitOfWork
///
/// The post and association writes that must land together. Everything done through
/// one unit of work becomes visible on `commit`, or not at all.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_post(&mut self, post: &NewPost) -> StoreResult<Post>;
    // `false` when the post does not exist.
    async fn update_post(&mut self, id: Uuid, changes: &PostChanges) -> StoreResult<bool>;
    async fn find_tags(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Tag>>;
    async fn clear_post_tags(&mut self, post_id: Uuid) -> StoreResult<()>;
    async fn attach_post_tags(&mut self, post_id: Uuid, tag_ids: &[Uuid]) -> StoreResult<()>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- SQL fragments ---

macro_rules! user_columns {
    () => {
        "id, username, email, password_hash, role, status, avatar, created_at, updated_at"
    };
}

macro_rules! tag_columns {
    () => {
        "id, name, color, created_at"
    };
}

macro_rules! post_columns {
    () => {
        "id, title, content, summary, status, author_id, view_count, created_at, updated_at"
    };
}

const FIND_TAGS_SQL: &str = concat!(
    "SELECT ",
    tag_columns!(),
    " FROM tags WHERE id = ANY($1) ORDER BY name"
);

/// A post row joined with its author's username.
#[derive(FromRow)]
struct PostWithAuthor {
    #[sqlx(flatten)]
    post: Post,
    author_username: String,
}

/// A tag row keyed by the post it is attached to.
#[derive(FromRow)]
struct PostTagRow {
    post_id: Uuid,
    #[sqlx(flatten)]
    tag: Tag,
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the tag sets for a page of posts in one query and assembles the details.
    async fn with_tags(&self, rows: Vec<PostWithAuthor>) -> StoreResult<Vec<PostDetail>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.post.id).collect();
        let tag_rows = sqlx::query_as::<_, PostTagRow>(
            r#"
            SELECT pt.post_id, t.id, t.name, t.color, t.created_at
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ANY($1)
            ORDER BY t.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut tags_by_post: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        for row in tag_rows {
            tags_by_post.entry(row.post_id).or_default().push(row.tag);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let author = UserSummary {
                    id: row.post.author_id,
                    username: row.author_username,
                };
                let tags = tags_by_post.remove(&row.post.id).unwrap_or_default();
                PostDetail::assemble(row.post, author, tags)
            })
            .collect())
    }
}

/// Appends the WHERE clause for a post filter. Expects the posts table aliased `p`.
fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    builder.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        builder.push(" AND p.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ");
        builder.push_bind(author_id);
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = contains_pattern(keyword);
        builder.push(" AND (p.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(r" ESCAPE '\' OR p.content ILIKE ");
        builder.push_bind(pattern);
        builder.push(r" ESCAPE '\')");
    }
}

/// Wraps `keyword` for a literal substring `ILIKE`, escaping its wildcards.
fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn count_users_by_role(&self, role: Role) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_users(&self, page: PageParams) -> StoreResult<(Vec<User>, i64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let users = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users ORDER BY created_at ASC, username ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((users, total))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(concat!(
            "INSERT INTO users (id, username, email, password_hash, role, status) ",
            "VALUES ($1, $2, $3, $4, $5, $6) RETURNING ",
            user_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the `Some` fields of `changes` overwrite stored values.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(concat!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                status = COALESCE($6, status),
                avatar = COALESCE($7, avatar),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            user_columns!()
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.role.map(|r| r.as_str()))
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.avatar)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_tags(&self, ids: &[Uuid]) -> StoreResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(FIND_TAGS_SQL)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(concat!(
            "SELECT ",
            tag_columns!(),
            " FROM tags ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn create_tag(&self, tag: NewTag) -> StoreResult<Tag> {
        let created = sqlx::query_as::<_, Tag>(concat!(
            "INSERT INTO tags (id, name, color) VALUES ($1, $2, $3) RETURNING ",
            tag_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&tag.name)
        .bind(&tag.color)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_tag(&self, id: Uuid, changes: TagChanges) -> StoreResult<Option<Tag>> {
        let updated = sqlx::query_as::<_, Tag>(concat!(
            "UPDATE tags SET name = COALESCE($2, name), color = COALESCE($3, color) ",
            "WHERE id = $1 RETURNING ",
            tag_columns!()
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.color)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_tag(&self, id: Uuid) -> StoreResult<bool> {
        // post_tags rows go with it (ON DELETE CASCADE).
        let res = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(concat!(
            "SELECT ",
            post_columns!(),
            " FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn find_post_detail(&self, id: Uuid) -> StoreResult<Option<PostDetail>> {
        let row = sqlx::query_as::<_, PostWithAuthor>(
            r#"
            SELECT p.id, p.title, p.content, p.summary, p.status, p.author_id,
                   p.view_count, p.created_at, p.updated_at, u.username AS author_username
            FROM posts p
            JOIN users u ON u.id = p.author_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// list_posts
    ///
    /// Builds the filter with `QueryBuilder` so every value is bound, never interpolated.
    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: PageParams,
    ) -> StoreResult<(Vec<PostDetail>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM posts p");
        push_post_filter(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT p.id, p.title, p.content, p.summary, p.status, p.author_id,
                   p.view_count, p.created_at, p.updated_at, u.username AS author_username
            FROM posts p
            JOIN users u ON u.id = p.author_id
            "#,
        );
        push_post_filter(&mut builder, filter);
        builder.push(" ORDER BY p.created_at DESC, p.id LIMIT ");
        builder.push_bind(page.limit());
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());

        let rows = builder
            .build_query_as::<PostWithAuthor>()
            .fetch_all(&self.pool)
            .await?;
        Ok((self.with_tags(rows).await?, total))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment_view_count(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// PgUnitOfWork
///
/// A Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_post(&mut self, post: &NewPost) -> StoreResult<Post> {
        let created = sqlx::query_as::<_, Post>(concat!(
            "INSERT INTO posts (id, title, content, summary, status, author_id) ",
            "VALUES ($1, $2, $3, $4, $5, $6) RETURNING ",
            post_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.summary)
        .bind(post.status.as_str())
        .bind(post.author_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn update_post(&mut self, id: Uuid, changes: &PostChanges) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                summary = COALESCE($4, summary),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref())
        .bind(changes.content.as_deref())
        .bind(changes.summary.as_deref())
        .bind(changes.status.map(|s| s.as_str()))
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_tags(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(FIND_TAGS_SQL)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(tags)
    }

    async fn clear_post_tags(&mut self, post_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn attach_post_tags(&mut self, post_id: Uuid, tag_ids: &[Uuid]) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO post_tags (post_id, tag_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(tag_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_wildcards_are_matched_literally() {
        assert_eq!(contains_pattern("rust"), "%rust%");
        assert_eq!(contains_pattern("50%"), r"%50\%%");
        assert_eq!(contains_pattern("snake_case"), r"%snake\_case%");
        assert_eq!(contains_pattern(r"C:\dir"), r"%C:\\dir%");
    }
}
