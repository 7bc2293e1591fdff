//! In-process `Repository` used by the test suites and by `DATABASE_URL=memory`.
//!
//! A unit of work holds the table lock for its whole life and mutates a staged copy;
//! `commit` swaps the copy in, anything else throws it away.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    models::{
        NewPost, NewTag, NewUser, PageParams, Post, PostChanges, PostDetail, PostFilter, Role, Tag,
        TagChanges, User, UserChanges, UserSummary,
    },
    repository::{Repository, StoreError, StoreResult, UnitOfWork},
};

/// Where an injected storage failure fires. Each injection fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertPost,
    UpdatePost,
    ClearTags,
    AttachTags,
    Commit,
    IncrementViews,
}

type Faults = Arc<Mutex<HashSet<FaultPoint>>>;

async fn trip(faults: &Faults, point: FaultPoint) -> StoreResult<()> {
    if faults.lock().await.remove(&point) {
        return Err(StoreError::Backend(format!("injected fault at {point:?}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tags: HashMap<Uuid, Tag>,
    posts: HashMap<Uuid, Post>,
    // (post_id, tag_id)
    post_tags: BTreeSet<(Uuid, Uuid)>,
}

impl Tables {
    fn ensure_user_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<Uuid>,
    ) -> StoreResult<()> {
        for user in self.users.values().filter(|u| Some(u.id) != except) {
            if username.is_some_and(|name| name == user.username) {
                return Err(StoreError::Conflict("users_username_key".into()));
            }
            if email.is_some_and(|email| email == user.email) {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
        }
        Ok(())
    }

    fn ensure_tag_unique(&self, name: &str, except: Option<Uuid>) -> StoreResult<()> {
        if self
            .tags
            .values()
            .any(|t| Some(t.id) != except && t.name == name)
        {
            return Err(StoreError::Conflict("tags_name_key".into()));
        }
        Ok(())
    }

    fn find_tags(&self, ids: &[Uuid]) -> Vec<Tag> {
        let mut seen = HashSet::new();
        let mut tags: Vec<Tag> = ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.tags.get(id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    fn detail(&self, post: &Post) -> PostDetail {
        let author = UserSummary {
            id: post.author_id,
            username: self
                .users
                .get(&post.author_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
        };
        let tag_ids: Vec<Uuid> = self
            .post_tags
            .range((post.id, Uuid::nil())..=(post.id, Uuid::from_u128(u128::MAX)))
            .map(|(_, tag_id)| *tag_id)
            .collect();
        PostDetail::assemble(post.clone(), author, self.find_tags(&tag_ids))
    }
}

/// InMemoryRepository
///
/// Same contract as `PostgresRepository`, including uniqueness conflicts, cascades
/// and all-or-nothing units of work. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
    faults: Faults,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next operation at `point` fail with a backend error.
    pub async fn inject_fault(&self, point: FaultPoint) {
        self.faults.lock().await.insert(point);
    }

    /// Total number of stored posts, whatever their status.
    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn count_users_by_role(&self, role: Role) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().filter(|u| u.role == role).count() as i64)
    }

    async fn list_users(&self, page: PageParams) -> StoreResult<(Vec<User>, i64)> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        let total = users.len() as i64;
        let users = users
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok((users, total))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        tables.ensure_user_unique(Some(&user.username), Some(&user.email), None)?;
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            avatar: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&id) {
            return Ok(None);
        }
        tables.ensure_user_unique(changes.username.as_deref(), changes.email.as_deref(), Some(id))?;

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = avatar;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: HashSet<Uuid> = tables
            .posts
            .values()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        tables.posts.retain(|post_id, _| !owned.contains(post_id));
        tables.post_tags.retain(|(post_id, _)| !owned.contains(post_id));
        Ok(true)
    }

    async fn find_tags(&self, ids: &[Uuid]) -> StoreResult<Vec<Tag>> {
        Ok(self.tables.lock().await.find_tags(ids))
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let tables = self.tables.lock().await;
        let mut tags: Vec<Tag> = tables.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create_tag(&self, tag: NewTag) -> StoreResult<Tag> {
        let mut tables = self.tables.lock().await;
        tables.ensure_tag_unique(&tag.name, None)?;
        let created = Tag {
            id: Uuid::new_v4(),
            name: tag.name,
            color: tag.color,
            created_at: Utc::now(),
        };
        tables.tags.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_tag(&self, id: Uuid, changes: TagChanges) -> StoreResult<Option<Tag>> {
        let mut tables = self.tables.lock().await;
        if let Some(name) = &changes.name {
            tables.ensure_tag_unique(name, Some(id))?;
        }
        let Some(tag) = tables.tags.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            tag.name = name;
        }
        if let Some(color) = changes.color {
            tag.color = color;
        }
        Ok(Some(tag.clone()))
    }

    async fn delete_tag(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.tags.remove(&id).is_none() {
            return Ok(false);
        }
        tables.post_tags.retain(|(_, tag_id)| *tag_id != id);
        Ok(true)
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        Ok(self.tables.lock().await.posts.get(&id).cloned())
    }

    async fn find_post_detail(&self, id: Uuid) -> StoreResult<Option<PostDetail>> {
        let tables = self.tables.lock().await;
        Ok(tables.posts.get(&id).map(|post| tables.detail(post)))
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: PageParams,
    ) -> StoreResult<(Vec<PostDetail>, i64)> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&Post> = tables.posts.values().filter(|p| filter.matches(p)).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let total = posts.len() as i64;
        let details = posts
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|post| tables.detail(post))
            .collect();
        Ok((details, total))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.posts.remove(&id).is_none() {
            return Ok(false);
        }
        tables.post_tags.retain(|(post_id, _)| *post_id != id);
        Ok(true)
    }

    async fn increment_view_count(&self, id: Uuid) -> StoreResult<()> {
        trip(&self.faults, FaultPoint::IncrementViews).await?;
        if let Some(post) = self.tables.lock().await.posts.get_mut(&id) {
            post.view_count += 1;
        }
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = Tables::clone(&guard);
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }
}

/// Staged writes over a locked snapshot of the tables.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    faults: Faults,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_post(&mut self, post: &NewPost) -> StoreResult<Post> {
        trip(&self.faults, FaultPoint::InsertPost).await?;
        if !self.staged.users.contains_key(&post.author_id) {
            return Err(StoreError::Backend("posts_author_id_fkey violated".into()));
        }
        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            title: post.title.clone(),
            content: post.content.clone(),
            summary: post.summary.clone(),
            status: post.status,
            author_id: post.author_id,
            view_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.staged.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_post(&mut self, id: Uuid, changes: &PostChanges) -> StoreResult<bool> {
        trip(&self.faults, FaultPoint::UpdatePost).await?;
        let Some(post) = self.staged.posts.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(title) = &changes.title {
            post.title = title.clone();
        }
        if let Some(content) = &changes.content {
            post.content = content.clone();
        }
        if let Some(summary) = &changes.summary {
            post.summary = summary.clone();
        }
        if let Some(status) = changes.status {
            post.status = status;
        }
        post.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_tags(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Tag>> {
        Ok(self.staged.find_tags(ids))
    }

    async fn clear_post_tags(&mut self, post_id: Uuid) -> StoreResult<()> {
        trip(&self.faults, FaultPoint::ClearTags).await?;
        self.staged.post_tags.retain(|(id, _)| *id != post_id);
        Ok(())
    }

    async fn attach_post_tags(&mut self, post_id: Uuid, tag_ids: &[Uuid]) -> StoreResult<()> {
        trip(&self.faults, FaultPoint::AttachTags).await?;
        if let Some(missing) = tag_ids.iter().find(|id| !self.staged.tags.contains_key(id)) {
            return Err(StoreError::Backend(format!(
                "post_tags_tag_id_fkey violated by {missing}"
            )));
        }
        for tag_id in tag_ids {
            self.staged.post_tags.insert((post_id, *tag_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            mut guard,
            staged,
            faults,
        } = *self;
        trip(&faults, FaultPoint::Commit).await?;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
