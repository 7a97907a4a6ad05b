//! Persistence for users, trainings, athlete profiles and duo invites.
//!
//! Two backends implement [`Store`]: [`PgStore`] for PostgreSQL and
//! [`MemoryStore`] for local development and tests. Operations that touch
//! several records (onboarding, invite acceptance) are single trait methods
//! so each backend can make them atomic.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::athlete::{Athlete, NewAthlete};
use crate::models::invite::{Invite, NewInvite};
use crate::models::training::{NewTraining, Training};
use crate::models::user::User;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(e)) => e.code().as_deref() == Some(UNIQUE_VIOLATION),
            Self::ConstraintViolation(_) => true,
            _ => false,
        }
    }
}

/// Everything the acceptance transaction needs.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub token: String,
    pub owner_id: Uuid,
    pub partner_id: Uuid,
    pub training_id: Uuid,
    pub athlete: NewAthlete,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { athlete_id: Uuid },
    /// The invite was no longer pending and unexpired when the claim ran.
    InviteUnavailable,
    /// The training's second slot was taken; nothing was written.
    TrainingFull,
    /// Owner or candidate is already paired with someone else; nothing was
    /// written.
    AlreadyPaired,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert a training, upsert its athletes into slots 1 and 2 in order,
    /// and make it the owner's active training.
    async fn create_training(
        &self,
        training: &NewTraining,
        athletes: &[NewAthlete],
    ) -> Result<(Training, Vec<Athlete>)>;

    async fn find_training(&self, id: Uuid) -> Result<Option<Training>>;

    async fn list_trainings_for_user(&self, user_id: Uuid) -> Result<Vec<Training>>;

    async fn list_athletes_for_training(&self, training_id: Uuid) -> Result<Vec<Athlete>>;

    async fn find_invite(&self, token: &str) -> Result<Option<Invite>>;

    async fn find_pending_invite(&self, training_id: Uuid) -> Result<Option<Invite>>;

    /// Fails with a unique violation if the training already has a pending invite.
    async fn create_invite(&self, invite: &NewInvite) -> Result<Invite>;

    /// Flip a pending invite to expired. No-op for any other status.
    async fn expire_invite(&self, token: &str) -> Result<()>;

    /// Claim the invite (pending and unexpired at `now`), upsert the partner's
    /// athlete profile, link the training and pair both users. All or nothing.
    async fn accept_invite(&self, acceptance: &Acceptance) -> Result<AcceptOutcome>;
}

/// Open the store named by `database_url`. `memory` selects the in-memory
/// backend; anything else is treated as a PostgreSQL connection string and
/// migrated on connect.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Store>> {
    if database_url == "memory" {
        tracing::warn!("using in-memory store, data will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(database_url).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}
