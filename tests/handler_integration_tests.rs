use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use press_portal::{
    AppConfig, AppError, AppState, BcryptVerifier, InMemoryRepository, Principal, handlers,
    error::ErrorResponse,
    models::{
        AccountStatus, ChangePasswordRequest, CreatePostRequest, CreateTagRequest, LoginRequest,
        PostDetail, PostPage, PostQuery, PostStatus, RegisterRequest, Role, UpdatePostRequest,
        UpdateProfileRequest, UpdateUserRequest,
    },
};
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- TEST UTILITIES ---

struct Harness {
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let config = AppConfig {
            jwt_secret: "handler-test-secret".into(),
            ..AppConfig::default()
        };
        // Lowest bcrypt cost keeps the suite fast.
        let (state, _worker) = AppState::build(
            config,
            Arc::new(InMemoryRepository::new()),
            Arc::new(BcryptVerifier::new(4)),
        )
        .unwrap();
        Self { state }
    }

    fn state(&self) -> State<AppState> {
        State(self.state.clone())
    }

    /// Registers through the handler and returns the caller as the resolver would.
    async fn register(&self, name: &str) -> Principal {
        let (_, Json(session)) = handlers::auth::register(
            self.state(),
            Json(RegisterRequest {
                username: name.into(),
                email: format!("{name}@example.com"),
                password: "secret-pass".into(),
            }),
        )
        .await
        .unwrap();

        Principal {
            id: session.user.id,
            username: session.user.username,
            role: session.user.role,
            status: session.user.status,
        }
    }

    async fn admin(&self, name: &str) -> Principal {
        let mut principal = self.register(name).await;
        self.state
            .accounts
            .update_user(
                principal.id,
                UpdateUserRequest {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        principal.role = Role::Admin;
        principal
    }

    async fn post_by(&self, author: &Principal, title: &str) -> PostDetail {
        let (_, Json(post)) = handlers::posts::create_post(
            author.clone(),
            self.state(),
            Json(CreatePostRequest {
                title: title.into(),
                content: "Body text".into(),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        post
    }
}

fn login(email: &str, password: &str) -> Json<LoginRequest> {
    Json(LoginRequest {
        email: email.into(),
        password: password.into(),
    })
}

async fn error_body(err: AppError) -> (StatusCode, ErrorResponse) {
    let response = err.into_response();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (parts.status, serde_json::from_slice(&bytes).unwrap())
}

// --- AUTH ---

#[test]
async fn test_register_returns_created_session() {
    let harness = Harness::new();

    let (status, Json(session)) = handlers::auth::register(
        harness.state(),
        Json(RegisterRequest {
            username: "newbie".into(),
            email: "newbie@example.com".into(),
            password: "secret-pass".into(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session.user.role, Role::User);
    assert_eq!(session.user.status, AccountStatus::Active);
    assert!(!session.token.is_empty());
}

#[test]
async fn test_duplicate_registration_conflicts() {
    let harness = Harness::new();
    harness.register("taken").await;

    let err = handlers::auth::register(
        harness.state(),
        Json(RegisterRequest {
            username: "someone".into(),
            email: "taken@example.com".into(),
            password: "secret-pass".into(),
        }),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.message, "username or email already in use");
}

#[test]
async fn test_login_failures_are_indistinguishable() {
    let harness = Harness::new();
    harness.register("ivan").await;

    let unknown = handlers::auth::login(harness.state(), login("nobody@example.com", "x"))
        .await
        .unwrap_err();
    let wrong = handlers::auth::login(harness.state(), login("ivan@example.com", "wrong-pass"))
        .await
        .unwrap_err();

    let (unknown_status, unknown_body) = error_body(unknown).await;
    let (wrong_status, wrong_body) = error_body(wrong).await;
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_body.message, wrong_body.message);
}

#[test]
async fn test_disabled_account_cannot_log_in() {
    let harness = Harness::new();
    let judy = harness.register("judy").await;
    harness
        .state
        .accounts
        .update_user(
            judy.id,
            UpdateUserRequest {
                status: Some(AccountStatus::Disabled),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Wrong password still looks like any other bad login.
    let err = handlers::auth::login(harness.state(), login("judy@example.com", "wrong-pass"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    let err = handlers::auth::login(harness.state(), login("judy@example.com", "secret-pass"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountDisabled));
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

// --- PROFILE ---

#[test]
async fn test_change_password_requires_current_password() {
    let harness = Harness::new();
    let kim = harness.register("kim").await;

    let err = handlers::users::change_password(
        kim.clone(),
        harness.state(),
        Json(ChangePasswordRequest {
            old_password: "not-it".into(),
            new_password: "brand-new-pass".into(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let status = handlers::users::change_password(
        kim,
        harness.state(),
        Json(ChangePasswordRequest {
            old_password: "secret-pass".into(),
            new_password: "brand-new-pass".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(
        handlers::auth::login(harness.state(), login("kim@example.com", "secret-pass"))
            .await
            .is_err()
    );
    assert!(
        handlers::auth::login(harness.state(), login("kim@example.com", "brand-new-pass"))
            .await
            .is_ok()
    );
}

#[test]
async fn test_profile_rename_rejects_taken_username() {
    let harness = Harness::new();
    let lee = harness.register("lee").await;
    harness.register("max").await;

    let err = handlers::users::update_profile(
        lee.clone(),
        harness.state(),
        Json(UpdateProfileRequest {
            username: Some("max".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);

    let Json(profile) = handlers::users::update_profile(
        lee,
        harness.state(),
        Json(UpdateProfileRequest {
            avatar: Some("https://example.com/lee.png".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(profile.username, "lee");
    assert_eq!(profile.avatar, "https://example.com/lee.png");
}

#[test]
async fn test_seed_admin_runs_once() {
    let harness = Harness::new();
    let accounts = &harness.state.accounts;

    let first = accounts
        .seed_admin("root", "root@example.com", "root-pass")
        .await
        .unwrap();
    assert_eq!(first.map(|admin| admin.role), Some(Role::Admin));

    let second = accounts
        .seed_admin("root2", "root2@example.com", "root-pass")
        .await
        .unwrap();
    assert!(second.is_none());
}

// --- POSTS ---

#[test]
async fn test_create_post_is_owned_by_caller() {
    let harness = Harness::new();
    let author = harness.register("writer").await;

    let (status, Json(post)) = handlers::posts::create_post(
        author.clone(),
        harness.state(),
        Json(CreatePostRequest {
            title: "First".into(),
            content: "Hello there".into(),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post.author_id, author.id);
    assert_eq!(post.status, PostStatus::Draft);
}

#[test]
async fn test_create_post_rejects_blank_title() {
    let harness = Harness::new();
    let author = harness.register("writer").await;

    let err = handlers::posts::create_post(
        author,
        harness.state(),
        Json(CreatePostRequest {
            title: "   ".into(),
            content: "Body".into(),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
async fn test_only_author_or_admin_may_edit() {
    let harness = Harness::new();
    let author = harness.register("owner").await;
    let stranger = harness.register("stranger").await;
    let admin = harness.admin("boss").await;
    let post = harness.post_by(&author, "Mine").await;

    let edit = || {
        Json(UpdatePostRequest {
            title: Some("Edited".into()),
            ..Default::default()
        })
    };

    let err = handlers::posts::update_post(stranger, harness.state(), Path(post.id), edit())
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let Json(updated) = handlers::posts::update_post(admin, harness.state(), Path(post.id), edit())
        .await
        .unwrap();
    assert_eq!(updated.title, "Edited");
    assert_eq!(updated.author_id, author.id);
}

#[test]
async fn test_delete_post_as_stranger_is_forbidden_and_keeps_post() {
    let harness = Harness::new();
    let author = harness.register("owner").await;
    let stranger = harness.register("stranger").await;
    let post = harness.post_by(&author, "Keep me").await;

    let err = handlers::posts::delete_post(stranger, harness.state(), Path(post.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let status = handlers::posts::delete_post(author, harness.state(), Path(post.id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let err = handlers::posts::get_post(harness.state(), Path(post.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_edit_of_unknown_post_is_not_found() {
    let harness = Harness::new();
    let admin = harness.admin("boss").await;

    let err = handlers::posts::update_post(
        admin,
        harness.state(),
        Path(Uuid::new_v4()),
        Json(UpdatePostRequest::default()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_my_posts_only_lists_callers_posts() {
    let harness = Harness::new();
    let alice = harness.register("alice").await;
    let bob = harness.register("bob").await;
    harness.post_by(&alice, "A1").await;
    harness.post_by(&alice, "A2").await;
    harness.post_by(&bob, "B1").await;

    let Json(PostPage { data, meta }) = handlers::posts::my_posts(
        alice.clone(),
        harness.state(),
        Query(PostQuery::default()),
    )
    .await
    .unwrap();

    assert_eq!(meta.total, 2);
    assert!(data.iter().all(|p| p.author_id == alice.id));
}

#[test]
async fn test_search_without_keyword_is_bad_request() {
    let harness = Harness::new();

    let err = handlers::posts::search_posts(harness.state(), Query(Default::default()))
        .await
        .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "validation_failure");
}

// --- USERS ---

#[test]
async fn test_admin_cannot_delete_self() {
    let harness = Harness::new();
    let admin = harness.admin("boss").await;

    let err = handlers::users::delete_user(admin.clone(), harness.state(), Path(admin.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    // Still there.
    let Json(profile) = handlers::users::get_user(harness.state(), Path(admin.id))
        .await
        .unwrap();
    assert_eq!(profile.id, admin.id);
}

#[test]
async fn test_deleting_user_removes_their_posts() {
    let harness = Harness::new();
    let admin = harness.admin("boss").await;
    let author = harness.register("leaver").await;
    let post = harness.post_by(&author, "Orphan").await;

    let status = handlers::users::delete_user(admin, harness.state(), Path(author.id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let err = handlers::posts::get_post(harness.state(), Path(post.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

// --- TAGS ---

#[test]
async fn test_duplicate_tag_name_conflicts() {
    let harness = Harness::new();
    let create = || {
        Json(CreateTagRequest {
            name: "rust".into(),
            color: Some("#dea584".into()),
        })
    };

    let (status, Json(tag)) = handlers::tags::create_tag(harness.state(), create())
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag.name, "rust");

    let err = handlers::tags::create_tag(harness.state(), create())
        .await
        .unwrap_err();
    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.message, "a tag with this name already exists");
}

#[test]
async fn test_deleting_tag_detaches_it_from_posts() {
    let harness = Harness::new();
    let author = harness.register("tagger").await;
    let (_, Json(tag)) = handlers::tags::create_tag(
        harness.state(),
        Json(CreateTagRequest {
            name: "ephemeral".into(),
            color: None,
        }),
    )
    .await
    .unwrap();
    let (_, Json(post)) = handlers::posts::create_post(
        author,
        harness.state(),
        Json(CreatePostRequest {
            title: "Tagged".into(),
            content: "Body".into(),
            tag_ids: vec![tag.id],
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(post.tags.len(), 1);

    handlers::tags::delete_tag(harness.state(), Path(tag.id))
        .await
        .unwrap();

    let Json(post) = handlers::posts::get_post(harness.state(), Path(post.id))
        .await
        .unwrap();
    assert!(post.tags.is_empty());
}
