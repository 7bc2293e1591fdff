use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::{Principal, Rejection},
    error::{AppError, AppResult},
    models::{
        AccountStatus, AuthResponse, ChangePasswordRequest, CreateUserRequest, LoginRequest,
        NewUser, PageParams, RegisterRequest, Role, UpdateProfileRequest, UpdateUserRequest, User,
        UserChanges, UserPage, UserProfile, validate_email, validate_password, validate_username,
    },
    password::CredentialState,
    policy::Check,
    repository::{RepositoryState, StoreError},
    token::TokenCodec,
};

// Collisions never say which field was taken.
const IDENTITY_TAKEN: &str = "username or email already in use";

fn identity_conflict(e: StoreError) -> AppError {
    match e {
        StoreError::Conflict(_) => AppError::Conflict(IDENTITY_TAKEN.into()),
        other => other.into(),
    }
}

fn user_not_found() -> AppError {
    AppError::NotFound("user not found".into())
}

/// AccountService
///
/// Registration, login, self-service profile edits and admin account management.
#[derive(Clone)]
pub struct AccountService {
    repo: RepositoryState,
    credentials: CredentialState,
    codec: Arc<TokenCodec>,
}

impl AccountService {
    pub fn new(repo: RepositoryState, credentials: CredentialState, codec: Arc<TokenCodec>) -> Self {
        Self {
            repo,
            credentials,
            codec,
        }
    }

    fn session_for(&self, user: User) -> AppResult<AuthResponse> {
        let token = self.codec.issue(user.id, &user.username, user.role)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    async fn ensure_identity_free(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<Uuid>,
    ) -> AppResult<()> {
        let taken = |user: Option<User>| user.is_some_and(|u| Some(u.id) != except);

        if let Some(username) = username {
            if taken(self.repo.find_user_by_username(username).await?) {
                return Err(AppError::Conflict(IDENTITY_TAKEN.into()));
            }
        }
        if let Some(email) = email {
            if taken(self.repo.find_user_by_email(email).await?) {
                return Err(AppError::Conflict(IDENTITY_TAKEN.into()));
            }
        }
        Ok(())
    }

    async fn insert(
        &self,
        username: String,
        email: String,
        password: &str,
        role: Role,
        status: AccountStatus,
    ) -> AppResult<User> {
        self.ensure_identity_free(Some(&username), Some(&email), None)
            .await?;
        let password_hash = self.credentials.hash(password)?;
        let user = self
            .repo
            .create_user(NewUser {
                username,
                email,
                password_hash,
                role,
                status,
            })
            .await
            .map_err(identity_conflict)?;
        tracing::info!(user_id = %user.id, role = %user.role, "account created");
        Ok(user)
    }

    // --- Public ---

    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        req.validate()?;
        let user = self
            .insert(
                req.username,
                req.email,
                &req.password,
                Role::User,
                AccountStatus::Active,
            )
            .await?;
        self.session_for(user)
    }

    /// login
    ///
    /// Unknown email and wrong password answer the same. A disabled account is only
    /// reported once the password has verified.
    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        let user = self
            .repo
            .find_user_by_email(&req.email)
            .await?
            .ok_or(Rejection::InvalidCredentials)?;

        if !self.credentials.verify(&req.password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "login rejected: password mismatch");
            return Err(Rejection::InvalidCredentials.into());
        }
        if user.status != AccountStatus::Active {
            return Err(AppError::AccountDisabled);
        }

        tracing::info!(user_id = %user.id, "login succeeded");
        self.session_for(user)
    }

    // --- Self-service ---

    pub async fn profile(&self, principal: &Principal) -> AppResult<UserProfile> {
        self.get_user(principal.id).await
    }

    pub async fn update_profile(
        &self,
        principal: &Principal,
        req: UpdateProfileRequest,
    ) -> AppResult<UserProfile> {
        if let Some(username) = &req.username {
            validate_username(username)?;
        }
        self.ensure_identity_free(req.username.as_deref(), None, Some(principal.id))
            .await?;

        let changes = UserChanges {
            username: req.username,
            avatar: req.avatar,
            ..Default::default()
        };
        let user = self
            .repo
            .update_user(principal.id, changes)
            .await
            .map_err(identity_conflict)?
            .ok_or_else(user_not_found)?;
        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        principal: &Principal,
        req: ChangePasswordRequest,
    ) -> AppResult<()> {
        let user = self
            .repo
            .find_user(principal.id)
            .await?
            .ok_or_else(user_not_found)?;

        if !self.credentials.verify(&req.old_password, &user.password_hash) {
            return Err(AppError::Validation("current password is incorrect".into()));
        }
        validate_password(&req.new_password)?;

        let changes = UserChanges {
            password_hash: Some(self.credentials.hash(&req.new_password)?),
            ..Default::default()
        };
        self.repo
            .update_user(user.id, changes)
            .await?
            .ok_or_else(user_not_found)?;
        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    // --- Administration ---

    pub async fn list_users(&self, page: PageParams) -> AppResult<UserPage> {
        let (users, total) = self.repo.list_users(page).await?;
        Ok(UserPage {
            data: users.into_iter().map(UserProfile::from).collect(),
            meta: page.meta(total),
        })
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<UserProfile> {
        self.repo
            .find_user(id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(user_not_found)
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> AppResult<UserProfile> {
        req.validate()?;
        let user = self
            .insert(
                req.username,
                req.email,
                &req.password,
                req.role.unwrap_or_default(),
                req.status.unwrap_or_default(),
            )
            .await?;
        Ok(user.into())
    }

    /// Sparse admin edit. A new password is rehashed; role and status changes apply
    /// to the user's very next request.
    pub async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> AppResult<UserProfile> {
        if let Some(username) = &req.username {
            validate_username(username)?;
        }
        if let Some(email) = &req.email {
            validate_email(email)?;
        }
        let password_hash = match &req.password {
            Some(password) => {
                validate_password(password)?;
                Some(self.credentials.hash(password)?)
            }
            None => None,
        };
        self.ensure_identity_free(req.username.as_deref(), req.email.as_deref(), Some(id))
            .await?;

        let changes = UserChanges {
            username: req.username,
            email: req.email,
            password_hash,
            role: req.role,
            status: req.status,
            avatar: req.avatar,
        };
        let user = self
            .repo
            .update_user(id, changes)
            .await
            .map_err(identity_conflict)?
            .ok_or_else(user_not_found)?;
        tracing::info!(user_id = %id, role = %user.role, status = %user.status, "account updated");
        Ok(user.into())
    }

    pub async fn delete_user(&self, principal: &Principal, id: Uuid) -> AppResult<()> {
        principal.require(Check::NotSelf(id))?;
        if !self.repo.delete_user(id).await? {
            return Err(user_not_found());
        }
        tracing::info!(user_id = %id, deleted_by = %principal.id, "account deleted");
        Ok(())
    }

    /// seed_admin
    ///
    /// Creates the bootstrap administrator unless an admin already exists. Returns the
    /// new account, or `None` when nothing was done.
    pub async fn seed_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AppResult<Option<UserProfile>> {
        if self.repo.count_users_by_role(Role::Admin).await? > 0 {
            return Ok(None);
        }
        let user = self
            .insert(
                username.to_string(),
                email.to_string(),
                password,
                Role::Admin,
                AccountStatus::Active,
            )
            .await?;
        tracing::info!(user_id = %user.id, email = %user.email, "default admin seeded");
        Ok(Some(user.into()))
    }
}
