//! Access policy: pure predicates over a resolved principal.

use uuid::Uuid;

use crate::{auth::Principal, models::Role};

/// Check
///
/// A named authorization rule. Evaluated by `authorize` with no I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Any resolved principal.
    Authenticated,
    /// The principal holds exactly this role.
    Role(Role),
    /// The principal owns the resource, or holds the role (authors edit their own
    /// posts, admins edit any).
    OwnerOrRole { owner: Uuid, role: Role },
    /// The principal is not the target account (no deleting yourself).
    NotSelf(Uuid),
}

/// Whether a denial means "log in" or "you may not".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    pub reason: String,
}

impl Denial {
    fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::Forbidden,
            reason: reason.into(),
        }
    }
}

/// authorize
///
/// `None` is an unauthenticated caller: every check denies it as `Unauthenticated`.
pub fn authorize(principal: Option<&Principal>, check: &Check) -> Result<(), Denial> {
    let Some(principal) = principal else {
        return Err(Denial {
            kind: DenialKind::Unauthenticated,
            reason: "authentication required".to_string(),
        });
    };

    match check {
        Check::Authenticated => Ok(()),
        Check::Role(role) if principal.role == *role => Ok(()),
        Check::Role(role) => Err(Denial::forbidden(format!("requires {role} role"))),
        Check::OwnerOrRole { owner, role } if principal.id == *owner || principal.role == *role => {
            Ok(())
        }
        Check::OwnerOrRole { role, .. } => Err(Denial::forbidden(format!(
            "only the owner or the {role} role may modify this resource"
        ))),
        Check::NotSelf(target) if principal.id != *target => Ok(()),
        Check::NotSelf(_) => Err(Denial::forbidden("this action cannot target your own account")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountStatus;

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "u1".into(),
            role,
            status: AccountStatus::Active,
        }
    }

    #[test]
    fn anonymous_callers_are_unauthenticated_not_forbidden() {
        let denial = authorize(None, &Check::Authenticated).unwrap_err();
        assert_eq!(denial.kind, DenialKind::Unauthenticated);
        let denial = authorize(None, &Check::Role(Role::User)).unwrap_err();
        assert_eq!(denial.kind, DenialKind::Unauthenticated);
    }

    #[test]
    fn role_check_is_exact() {
        let user = principal(Role::User);
        let admin = principal(Role::Admin);
        assert!(authorize(Some(&admin), &Check::Role(Role::Admin)).is_ok());
        let denial = authorize(Some(&user), &Check::Role(Role::Admin)).unwrap_err();
        assert_eq!(denial.kind, DenialKind::Forbidden);
    }

    #[test]
    fn owner_passes_owner_or_role() {
        let user = principal(Role::User);
        let check = Check::OwnerOrRole { owner: user.id, role: Role::Admin };
        assert!(authorize(Some(&user), &check).is_ok());
    }

    #[test]
    fn not_self_blocks_only_the_principal() {
        let admin = principal(Role::Admin);
        assert!(authorize(Some(&admin), &Check::NotSelf(Uuid::new_v4())).is_ok());
        let denial = authorize(Some(&admin), &Check::NotSelf(admin.id)).unwrap_err();
        assert_eq!(denial.kind, DenialKind::Forbidden);
    }
}
