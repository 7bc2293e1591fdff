use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::AppError;

// --- Enumerated Columns ---

/// Raised when a text column holds a value outside the known variants.
#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Role
///
/// The RBAC field stored on every user and embedded in session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// AccountStatus
///
/// Only `Active` accounts can hold a session; disabling takes effect on the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Disabled => "disabled",
        }
    }
}

/// PostStatus
///
/// Publication state of a post. New posts default to `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

// Text <-> enum conversions shared by sqlx row decoding (`try_from = "String"`),
// query-string parsing and Display.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                $(
                    if value == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant { kind: $kind, value: value.to_string() })
            }
        }

        impl TryFrom<String> for $ty {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role, "role", [User, Admin]);
text_enum!(AccountStatus, "account status", [Active, Disabled]);
text_enum!(PostStatus, "post status", [Draft, Published, Archived]);

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical account record from the `users` table. Carries the password hash,
/// so it is never serialized; responses use `UserProfile` instead.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[sqlx(try_from = "String")]
    pub status: AccountStatus,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// UserProfile
///
/// Public view of a user (GET /user/profile, admin listings, auth responses).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub avatar: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            status: user.status,
            avatar: user.avatar,
            created_at: user.created_at,
        }
    }
}

/// UserSummary
///
/// The author block embedded in every post response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

/// Insert payload for the `users` table. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
}

/// Sparse update for a user row; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub avatar: Option<String>,
}

/// Tag
///
/// A label row from the `tags` table. `name` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Default)]
pub struct TagChanges {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Post
///
/// A bare row from the `posts` table, without author or tags.
#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: String,
    #[sqlx(try_from = "String")]
    pub status: PostStatus,
    pub author_id: Uuid,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PostDetail
///
/// A post with its author and resolved tag set populated. This is the shape every
/// post endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetail {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub status: PostStatus,
    pub author_id: Uuid,
    pub author: UserSummary,
    pub tags: Vec<Tag>,
    pub view_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl PostDetail {
    pub fn assemble(post: Post, author: UserSummary, tags: Vec<Tag>) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            summary: post.summary,
            status: post.status,
            author_id: post.author_id,
            author,
            tags,
            view_count: post.view_count,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Insert payload for the `posts` table, already validated and defaulted.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub summary: String,
    pub status: PostStatus,
    pub author_id: Uuid,
}

/// PostChanges
///
/// Sparse field update for a post. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub status: Option<PostStatus>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.summary.is_none()
            && self.status.is_none()
    }
}

/// Listing filter shared by the public, "my posts", search and admin listings.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub author_id: Option<Uuid>,
    pub keyword: Option<String>,
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        if self.status.is_some_and(|s| s != post.status) {
            return false;
        }
        if self.author_id.is_some_and(|a| a != post.author_id) {
            return false;
        }
        match &self.keyword {
            Some(keyword) => {
                let keyword = keyword.to_lowercase();
                post.title.to_lowercase().contains(&keyword)
                    || post.content.to_lowercase().contains(&keyword)
            }
            None => true,
        }
    }
}

// --- Pagination ---

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
// Highest page whose offset still fits in an i64 at the largest page size.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// PageParams
///
/// `?page=&limit=` query parameters. Out-of-range values fall back to the defaults
/// instead of failing the request.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1).min(MAX_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .filter(|l| *l > 0 && *l <= MAX_PAGE_SIZE)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let per_page = self.limit();
        PageMeta {
            current_page: self.page(),
            per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageMeta {
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostPage {
    pub data: Vec<PostDetail>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserPage {
    pub data: Vec<UserProfile>,
    pub meta: PageMeta,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for the public registration endpoint (POST /auth/register).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// AuthResponse
///
/// Returned by login and registration: the public profile plus a fresh session token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// CreateUserRequest
///
/// Admin-side account creation. Role and status default to `user` / `active`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// CreatePostRequest
///
/// Input payload for POST /posts. The author is always the authenticated principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

impl CreatePostRequest {
    /// Validates the payload and applies the status/summary defaults.
    pub fn into_new_post(self, author_id: Uuid) -> Result<(NewPost, Vec<Uuid>), AppError> {
        validate_title(&self.title)?;
        if self.content.trim().is_empty() {
            return Err(AppError::Validation("content is required".into()));
        }
        let summary = match self.summary.filter(|s| !s.is_empty()) {
            Some(summary) => {
                validate_summary(&summary)?;
                summary
            }
            None => derive_summary(&self.content),
        };
        let post = NewPost {
            title: self.title,
            content: self.content,
            summary,
            status: self.status.unwrap_or_default(),
            author_id,
        };
        Ok((post, self.tag_ids))
    }
}

/// UpdatePostRequest
///
/// Sparse update for PUT /posts/{id}. `tag_ids` is tri-state: absent (or null) keeps
/// the current tags, `[]` clears them, and a list replaces the whole set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<Uuid>>,
}

impl UpdatePostRequest {
    pub fn into_changes(self) -> Result<(PostChanges, Option<Vec<Uuid>>), AppError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            if content.trim().is_empty() {
                return Err(AppError::Validation("content must not be empty".into()));
            }
        }
        if let Some(summary) = &self.summary {
            validate_summary(summary)?;
        }
        let changes = PostChanges {
            title: self.title,
            content: self.content,
            summary: self.summary,
            status: self.status,
        };
        Ok((changes, self.tag_ids))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateTagRequest {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl CreateTagRequest {
    pub fn into_new_tag(self) -> Result<NewTag, AppError> {
        validate_tag_name(&self.name)?;
        let color = self.color.unwrap_or_default();
        validate_color(&color)?;
        Ok(NewTag { name: self.name, color })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateTagRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UpdateTagRequest {
    pub fn into_changes(self) -> Result<TagChanges, AppError> {
        if let Some(name) = &self.name {
            validate_tag_name(name)?;
        }
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        Ok(TagChanges { name: self.name, color: self.color })
    }
}

/// Query parameters for post listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PostQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<PostStatus>,
    pub author_id: Option<Uuid>,
}

impl PostQuery {
    pub fn split(self) -> (PostFilter, PageParams) {
        (
            PostFilter { status: self.status, author_id: self.author_id, keyword: None },
            PageParams { page: self.page, limit: self.limit },
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// --- Field Validation ---

const SUMMARY_PREVIEW_CHARS: usize = 200;

/// First 200 characters of the content plus an ellipsis, or empty when the content
/// is short enough to stand on its own.
pub fn derive_summary(content: &str) -> String {
    if content.chars().count() <= SUMMARY_PREVIEW_CHARS {
        return String::new();
    }
    let mut summary: String = content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    summary.push_str("...");
    summary
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    check_len("username", username, 3, 50)
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    check_len("email", email, 3, 100)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::Validation("email is not a valid address".into())),
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    check_len("title", title, 1, 200)
}

fn validate_summary(summary: &str) -> Result<(), AppError> {
    check_len("summary", summary, 0, 500)
}

fn validate_tag_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("tag name is required".into()));
    }
    check_len("tag name", name, 1, 50)
}

fn validate_color(color: &str) -> Result<(), AppError> {
    if color.is_empty() {
        return Ok(());
    }
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::Validation("color must look like #RRGGBB".into()));
    }
    Ok(())
}
