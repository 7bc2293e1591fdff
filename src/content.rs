//! Post + tag mutations as single units of work, plus post reads.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{AppError, AppResult},
    models::{
        NewPost, PageParams, Post, PostChanges, PostDetail, PostFilter, PostPage, PostStatus, Role,
    },
    policy::Check,
    repository::{RepositoryState, UnitOfWork},
    views::ViewCounter,
};

/// ContentService
///
/// Owns every write that touches both a post and its tag associations. Callers get
/// either the fully committed result or an error with nothing written.
#[derive(Clone)]
pub struct ContentService {
    repo: RepositoryState,
    views: ViewCounter,
}

impl ContentService {
    pub fn new(repo: RepositoryState, views: ViewCounter) -> Self {
        Self { repo, views }
    }

    /// create_with_tags
    ///
    /// Inserts the post and attaches the resolved tag set in one unit of work, then
    /// re-reads it with author and tags.
    pub async fn create_with_tags(&self, post: NewPost, tag_ids: &[Uuid]) -> AppResult<PostDetail> {
        let mut uow = self.repo.begin().await?;
        let outcome = insert_with_tags(uow.as_mut(), &post, tag_ids).await;
        let id = settle(uow, outcome).await?;

        tracing::info!(post_id = %id, author_id = %post.author_id, "post created");
        self.get(id).await
    }

    /// update_with_tags
    ///
    /// `tag_ids` is a full replacement when `Some` (an empty list clears the tags) and
    /// leaves the associations alone when `None`.
    pub async fn update_with_tags(
        &self,
        id: Uuid,
        changes: PostChanges,
        tag_ids: Option<Vec<Uuid>>,
    ) -> AppResult<PostDetail> {
        self.find(id).await?;

        let mut uow = self.repo.begin().await?;
        let outcome = apply_update(uow.as_mut(), id, &changes, tag_ids.as_deref()).await;
        settle(uow, outcome).await?;

        tracing::info!(post_id = %id, retagged = tag_ids.is_some(), "post updated");
        self.get(id).await
    }

    /// Queues a best-effort view increment. Never blocks and never fails the caller.
    pub fn increment_view_count(&self, id: Uuid) -> bool {
        self.views.record(id)
    }

    pub async fn find(&self, id: Uuid) -> AppResult<Post> {
        self.repo
            .find_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound("post not found".into()))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PostDetail> {
        self.repo
            .find_post_detail(id)
            .await?
            .ok_or_else(|| AppError::NotFound("post not found".into()))
    }

    /// A read that counts as a view.
    pub async fn view(&self, id: Uuid) -> AppResult<PostDetail> {
        let detail = self.get(id).await?;
        self.increment_view_count(id);
        Ok(detail)
    }

    pub async fn list(&self, filter: &PostFilter, page: PageParams) -> AppResult<PostPage> {
        let (data, total) = self.repo.list_posts(filter, page).await?;
        Ok(PostPage {
            data,
            meta: page.meta(total),
        })
    }

    /// Case-insensitive keyword match over published titles and bodies.
    pub async fn search(&self, keyword: Option<&str>, page: PageParams) -> AppResult<PostPage> {
        let keyword = keyword
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Validation("keyword is required".into()))?;

        let filter = PostFilter {
            status: Some(PostStatus::Published),
            author_id: None,
            keyword: Some(keyword.to_string()),
        };
        self.list(&filter, page).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.repo.delete_post(id).await? {
            return Err(AppError::NotFound("post not found".into()));
        }
        tracing::info!(post_id = %id, "post deleted");
        Ok(())
    }

    /// Loads the post and checks that `principal` may modify it (author or admin).
    pub async fn authorize_edit(&self, principal: &Principal, id: Uuid) -> AppResult<Post> {
        let post = self.find(id).await?;
        principal.require(Check::OwnerOrRole {
            owner: post.author_id,
            role: Role::Admin,
        })?;
        Ok(post)
    }
}

/// Commits on success. On failure rolls back and returns the original error.
async fn settle<T>(uow: Box<dyn UnitOfWork>, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = uow.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed after {e}");
            }
            Err(e)
        }
    }
}

async fn insert_with_tags(
    uow: &mut dyn UnitOfWork,
    post: &NewPost,
    tag_ids: &[Uuid],
) -> AppResult<Uuid> {
    let created = uow.insert_post(post).await?;
    if !tag_ids.is_empty() {
        let resolved = resolve_tags(uow, tag_ids).await?;
        if !resolved.is_empty() {
            uow.attach_post_tags(created.id, &resolved).await?;
        }
    }
    Ok(created.id)
}

async fn apply_update(
    uow: &mut dyn UnitOfWork,
    id: Uuid,
    changes: &PostChanges,
    tag_ids: Option<&[Uuid]>,
) -> AppResult<()> {
    if !uow.update_post(id, changes).await? {
        return Err(AppError::NotFound("post not found".into()));
    }
    if let Some(tag_ids) = tag_ids {
        uow.clear_post_tags(id).await?;
        let resolved = resolve_tags(uow, tag_ids).await?;
        if !resolved.is_empty() {
            uow.attach_post_tags(id, &resolved).await?;
        }
    }
    Ok(())
}

/// Existing tag ids among `requested`, each once. Unknown ids are dropped.
async fn resolve_tags(uow: &mut dyn UnitOfWork, requested: &[Uuid]) -> AppResult<Vec<Uuid>> {
    if requested.is_empty() {
        return Ok(Vec::new());
    }
    let found: Vec<Uuid> = uow.find_tags(requested).await?.into_iter().map(|t| t.id).collect();

    let known: HashSet<Uuid> = found.iter().copied().collect();
    for unknown in requested.iter().filter(|id| !known.contains(id)) {
        tracing::debug!(tag_id = %unknown, "ignoring unknown tag id");
    }
    Ok(found)
}
