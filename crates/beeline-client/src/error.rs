use thiserror::Error;

use beeline_shared::invite::InviteTokenError;
use beeline_shared::validate::ValidationError;
use beeline_store::StoreError;

/// Errors surfaced by the application logic layer.
///
/// Every variant maps onto one bucket of the app's error taxonomy:
/// not-found, permission, validation, already-exists, expiry, or a
/// pass-through store failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Registration is closed on this instance")]
    RegistrationClosed,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("This username is already taken")]
    UsernameTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("You cannot add yourself")]
    SelfRequest,

    #[error("A request already exists between you and this user")]
    RequestExists,

    #[error("You are already connected with this user")]
    AlreadyContacts,

    #[error("You can only message your contacts")]
    NotContacts,

    #[error("This request has already been answered")]
    InvalidState,

    #[error("Permission denied")]
    Forbidden,

    #[error("Record not found")]
    NotFound,

    #[error("This invitation link has expired")]
    InviteExpired,

    #[error("This invitation has already been used")]
    InviteRedeemed,

    #[error("You cannot redeem your own invite")]
    SelfInvite,

    #[error(transparent)]
    InviteToken(#[from] InviteTokenError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Password hashing failed")]
    PasswordHash,

    #[error("State lock poisoned")]
    LockPoisoned,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
