//! Duo invite lifecycle: issue a token for a two-person training, resolve it
//! for display, and accept it to bring the partner into the training.
//!
//! Expiry is evaluated lazily against the `now` passed in by the caller. A
//! pending invite found past its expiry is persisted as expired on the spot.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::models::athlete::{AthleteInput, NewAthlete};
use crate::models::invite::{
    AcceptInviteResponse, CreateInviteResponse, Invite, InviteDetailsResponse, InviteStatus,
    NewInvite,
};
use crate::models::training::{Division, TrainingMode};
use crate::store::{AcceptOutcome, Acceptance, Store, StoreError};

pub const INVITE_VALIDITY_HOURS: i64 = 24;
const TOKEN_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Invite not found")]
    NotFound,

    #[error("Invite has expired")]
    Expired,

    #[error("Invite has already been used")]
    AlreadyUsed,

    #[error("Training not found")]
    TrainingNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error(
        "Training is not set up for partner invites (expected division 'doubles' and mode 'invite_partner', found division '{division}' and mode '{mode}')"
    )]
    NotEligible {
        division: Division,
        mode: TrainingMode,
    },

    #[error("Training already has a partner")]
    TrainingFull,

    #[error("Only the training owner can invite a partner")]
    NotOwner,

    #[error("You cannot accept your own invite")]
    OwnInvite,

    #[error("User is already paired with another partner")]
    AlreadyPaired,

    #[error("{0}")]
    InvalidAthlete(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, InviteError>;

fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn invite_url(public_base_url: &str, token: &str) -> String {
    format!("{}/invite/{token}", public_base_url.trim_end_matches('/'))
}

fn issued(invite: Invite, public_base_url: &str) -> CreateInviteResponse {
    CreateInviteResponse {
        invite_url: invite_url(public_base_url, &invite.token),
        expires_at: invite.expires_at,
        token: invite.token,
    }
}

/// Issue an invite for `training_id`, or hand back the one still pending.
pub async fn issue(
    store: &dyn Store,
    public_base_url: &str,
    training_id: Uuid,
    caller: Uuid,
    now: DateTime<Utc>,
) -> Result<CreateInviteResponse> {
    let training = store
        .find_training(training_id)
        .await?
        .ok_or(InviteError::TrainingNotFound)?;

    if training.owner_id != caller {
        return Err(InviteError::NotOwner);
    }
    if !training.accepts_invites() {
        return Err(InviteError::NotEligible {
            division: training.division,
            mode: training.mode,
        });
    }
    if !training.has_free_slot() {
        return Err(InviteError::TrainingFull);
    }

    if let Some(existing) = store.find_pending_invite(training_id).await? {
        if !existing.is_expired_at(now) {
            tracing::debug!(%training_id, "returning existing pending invite");
            return Ok(issued(existing, public_base_url));
        }
        store.expire_invite(&existing.token).await?;
        tracing::info!(%training_id, "expired stale invite before re-issuing");
    }

    let new = NewInvite {
        token: generate_token(),
        owner_id: training.owner_id,
        training_id,
        expires_at: now + Duration::hours(INVITE_VALIDITY_HOURS),
    };

    match store.create_invite(&new).await {
        Ok(invite) => {
            tracing::info!(%training_id, expires_at = %invite.expires_at, "invite issued");
            Ok(issued(invite, public_base_url))
        }
        Err(e) if e.is_unique_violation() => {
            // Another request issued one in between; that one wins.
            let winner = store.find_pending_invite(training_id).await?;
            winner
                .map(|invite| issued(invite, public_base_url))
                .ok_or(InviteError::Store(e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Load an invite that can still be accepted, persisting expiry if due.
async fn load_pending(store: &dyn Store, token: &str, now: DateTime<Utc>) -> Result<Invite> {
    let invite = store
        .find_invite(token)
        .await?
        .ok_or(InviteError::NotFound)?;

    match invite.status {
        InviteStatus::Accepted => Err(InviteError::AlreadyUsed),
        InviteStatus::Expired => Err(InviteError::Expired),
        InviteStatus::Pending if invite.is_expired_at(now) => {
            store.expire_invite(token).await?;
            tracing::info!(training_id = %invite.training_id, "invite expired");
            Err(InviteError::Expired)
        }
        InviteStatus::Pending => Ok(invite),
    }
}

pub async fn resolve(
    store: &dyn Store,
    token: &str,
    now: DateTime<Utc>,
) -> Result<InviteDetailsResponse> {
    let invite = load_pending(store, token, now).await?;

    let owner = store
        .find_user(invite.owner_id)
        .await?
        .ok_or(InviteError::UserNotFound)?;
    let training = store
        .find_training(invite.training_id)
        .await?
        .ok_or(InviteError::TrainingNotFound)?;

    Ok(InviteDetailsResponse {
        owner_username: owner.username,
        doubles_type: training.doubles_type,
        status: invite.status,
    })
}

pub async fn accept(
    store: &dyn Store,
    token: &str,
    user_id: Uuid,
    athlete: &AthleteInput,
    now: DateTime<Utc>,
) -> Result<AcceptInviteResponse> {
    let invite = load_pending(store, token, now).await?;

    let user = store
        .find_user(user_id)
        .await?
        .ok_or(InviteError::UserNotFound)?;
    if user.id == invite.owner_id {
        return Err(InviteError::OwnInvite);
    }
    if user.partner_id.is_some_and(|p| p != invite.owner_id) {
        return Err(InviteError::AlreadyPaired);
    }
    let owner = store
        .find_user(invite.owner_id)
        .await?
        .ok_or(InviteError::UserNotFound)?;
    if owner.partner_id.is_some_and(|p| p != user.id) {
        return Err(InviteError::AlreadyPaired);
    }

    let profile = athlete.validate().map_err(InviteError::InvalidAthlete)?;

    let acceptance = Acceptance {
        token: token.to_string(),
        owner_id: invite.owner_id,
        partner_id: user.id,
        training_id: invite.training_id,
        athlete: NewAthlete {
            user_id: user.id,
            username: user.username.clone(),
            training_id: invite.training_id,
            profile,
        },
        now,
    };

    match store.accept_invite(&acceptance).await? {
        AcceptOutcome::Accepted { athlete_id } => {
            tracing::info!(
                training_id = %invite.training_id,
                partner_id = %user.id,
                "invite accepted"
            );
            Ok(AcceptInviteResponse {
                success: true,
                athlete_id,
                owner_user_id: invite.owner_id,
                invited_user_id: user.id,
                training_id: invite.training_id,
            })
        }
        AcceptOutcome::TrainingFull => Err(InviteError::TrainingFull),
        AcceptOutcome::AlreadyPaired => Err(InviteError::AlreadyPaired),
        AcceptOutcome::InviteUnavailable => {
            // Lost the claim to a concurrent acceptance or to the clock.
            load_pending(store, token, now).await?;
            Err(InviteError::AlreadyUsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::athlete::{Experience, Gender};
    use crate::models::training::{DoublesType, NewTraining, TrainingStatus};
    use crate::store::MemoryStore;

    const BASE_URL: &str = "https://duo.example";

    struct Fixture {
        store: Arc<MemoryStore>,
        owner: Uuid,
        partner: Uuid,
        training: Uuid,
    }

    fn athlete(name: &str) -> AthleteInput {
        AthleteInput {
            name: Some(name.into()),
            age: Some(29),
            weight: Some(74.0),
            height: Some(178.0),
            experience: Some(Experience::Advanced),
            goal: Some("sub 1:10".into()),
            target_time: Some("1:09:59".into()),
            strengths: vec!["wall balls".into()],
            weaknesses: vec!["burpees".into()],
            gender: Some(Gender::Male),
        }
    }

    async fn training(
        store: &MemoryStore,
        owner: Uuid,
        division: Division,
        mode: TrainingMode,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let new = NewTraining {
            id,
            owner_id: owner,
            division,
            mode,
            doubles_type: Some(DoublesType::Mixed),
            status: TrainingStatus::AwaitingPartner,
        };
        let owner_athlete = NewAthlete {
            user_id: owner,
            username: "owner".into(),
            training_id: id,
            profile: athlete("Owner").validate().unwrap(),
        };
        store.create_training(&new, &[owner_athlete]).await.unwrap();
        id
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = store.create_user("owner", "hash").await.unwrap().id;
        let partner = store.create_user("partner", "hash").await.unwrap().id;
        let training = training(
            &store,
            owner,
            Division::Doubles,
            TrainingMode::InvitePartner,
        )
        .await;
        Fixture {
            store,
            owner,
            partner,
            training,
        }
    }

    #[tokio::test]
    async fn issue_rejects_trainings_without_invite_mode() {
        let store = MemoryStore::new();
        let owner = store.create_user("solo", "hash").await.unwrap().id;

        for (division, mode) in [
            (Division::Individual, TrainingMode::Solo),
            (Division::Doubles, TrainingMode::SharedAccount),
            (Division::Individual, TrainingMode::InvitePartner),
        ] {
            let id = training(&store, owner, division, mode).await;
            let err = issue(&store, BASE_URL, id, owner, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, InviteError::NotEligible { .. }));
            let message = err.to_string();
            assert!(message.contains(&division.to_string()), "{message}");
            assert!(message.contains(&mode.to_string()), "{message}");
        }
    }

    #[tokio::test]
    async fn issue_requires_the_owner() {
        let fx = fixture().await;
        let err = issue(&*fx.store, BASE_URL, fx.training, fx.partner, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::NotOwner));
    }

    #[tokio::test]
    async fn reissue_returns_the_pending_invite() {
        let fx = fixture().await;
        let now = Utc::now();

        let first = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();
        let second = issue(
            &*fx.store,
            BASE_URL,
            fx.training,
            fx.owner,
            now + Duration::hours(3),
        )
        .await
        .unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(first.expires_at, second.expires_at);
        assert_eq!(first.expires_at, now + Duration::hours(INVITE_VALIDITY_HOURS));
        assert_eq!(first.invite_url, format!("{BASE_URL}/invite/{}", first.token));
        assert_eq!(first.token.len(), TOKEN_LEN);
    }

    #[tokio::test]
    async fn reissue_after_expiry_replaces_the_stale_invite() {
        let fx = fixture().await;
        let now = Utc::now();

        let first = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();
        let later = now + Duration::hours(INVITE_VALIDITY_HOURS + 1);
        let second = issue(&*fx.store, BASE_URL, fx.training, fx.owner, later)
            .await
            .unwrap();

        assert_ne!(first.token, second.token);
        let stale = fx.store.find_invite(&first.token).await.unwrap().unwrap();
        assert_eq!(stale.status, InviteStatus::Expired);
    }

    #[tokio::test]
    async fn resolve_reports_owner_and_doubles_type() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let details = resolve(&*fx.store, &issued.token, now).await.unwrap();
        assert_eq!(details.owner_username, "owner");
        assert_eq!(details.doubles_type, Some(DoublesType::Mixed));
        assert_eq!(details.status, InviteStatus::Pending);
    }

    #[tokio::test]
    async fn resolve_unknown_token_is_not_found() {
        let fx = fixture().await;
        let err = resolve(&*fx.store, "missing", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::NotFound));
    }

    #[tokio::test]
    async fn resolve_after_expiry_persists_expired_status() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let later = now + Duration::hours(INVITE_VALIDITY_HOURS) + Duration::seconds(1);
        let err = resolve(&*fx.store, &issued.token, later).await.unwrap_err();
        assert!(matches!(err, InviteError::Expired));

        let stored = fx.store.find_invite(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.status, InviteStatus::Expired);

        // Even at the original time it stays expired.
        let err = resolve(&*fx.store, &issued.token, now).await.unwrap_err();
        assert!(matches!(err, InviteError::Expired));
    }

    #[tokio::test]
    async fn overdue_invite_cannot_be_accepted() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let later = now + Duration::hours(INVITE_VALIDITY_HOURS);
        let err = accept(&*fx.store, &issued.token, fx.partner, &athlete("P"), later)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::Expired));

        let training = fx.store.find_training(fx.training).await.unwrap().unwrap();
        assert_eq!(training.partner_id, None);
        assert_eq!(training.athlete2_id, None);
    }

    #[tokio::test]
    async fn accept_links_partner_and_second_athlete() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let accepted = accept(&*fx.store, &issued.token, fx.partner, &athlete("Pia"), now)
            .await
            .unwrap();
        assert!(accepted.success);
        assert_eq!(accepted.owner_user_id, fx.owner);
        assert_eq!(accepted.invited_user_id, fx.partner);
        assert_eq!(accepted.training_id, fx.training);

        let training = fx.store.find_training(fx.training).await.unwrap().unwrap();
        assert_eq!(training.partner_id, Some(fx.partner));
        assert_eq!(training.athlete2_id, Some(accepted.athlete_id));
        assert_eq!(training.status, TrainingStatus::Active);

        let invite = fx.store.find_invite(&issued.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Accepted);
        assert_eq!(invite.partner_id, Some(fx.partner));

        let owner = fx.store.find_user(fx.owner).await.unwrap().unwrap();
        let partner = fx.store.find_user(fx.partner).await.unwrap().unwrap();
        assert_eq!(owner.partner_id, Some(fx.partner));
        assert_eq!(partner.partner_id, Some(fx.owner));
        assert_eq!(partner.training_id, Some(fx.training));
    }

    #[tokio::test]
    async fn second_accept_fails_as_already_used() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        accept(&*fx.store, &issued.token, fx.partner, &athlete("Pia"), now)
            .await
            .unwrap();
        let err = accept(&*fx.store, &issued.token, fx.partner, &athlete("Pia"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::AlreadyUsed));

        let err = resolve(&*fx.store, &issued.token, now).await.unwrap_err();
        assert!(matches!(err, InviteError::AlreadyUsed));
    }

    #[tokio::test]
    async fn concurrent_accepts_succeed_exactly_once() {
        let fx = fixture().await;
        let third = fx.store.create_user("third", "hash").await.unwrap().id;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let a = {
            let store = fx.store.clone();
            let token = issued.token.clone();
            let user = fx.partner;
            tokio::spawn(async move { accept(&*store, &token, user, &athlete("A"), now).await })
        };
        let b = {
            let store = fx.store.clone();
            let token = issued.token.clone();
            tokio::spawn(async move { accept(&*store, &token, third, &athlete("B"), now).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(InviteError::AlreadyUsed))));
    }

    #[tokio::test]
    async fn accept_validates_athlete_and_owner() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        let err = accept(&*fx.store, &issued.token, fx.owner, &athlete("Me"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::OwnInvite));

        let mut incomplete = athlete("Pia");
        incomplete.gender = None;
        let err = accept(&*fx.store, &issued.token, fx.partner, &incomplete, now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::InvalidAthlete(ref m) if m.contains("gender")));

        let err = accept(&*fx.store, &issued.token, Uuid::new_v4(), &athlete("X"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::UserNotFound));

        // Nothing above consumed the invite.
        let invite = fx.store.find_invite(&issued.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Pending);
    }

    #[tokio::test]
    async fn owner_paired_elsewhere_cannot_be_joined() {
        let fx = fixture().await;
        let now = Utc::now();
        let other_owner = fx.store.create_user("quinn", "hash").await.unwrap().id;
        let other_training = training(
            &fx.store,
            other_owner,
            Division::Doubles,
            TrainingMode::InvitePartner,
        )
        .await;

        // Our owner joins someone else's training first.
        let elsewhere = issue(&*fx.store, BASE_URL, other_training, other_owner, now)
            .await
            .unwrap();
        accept(&*fx.store, &elsewhere.token, fx.owner, &athlete("Owner"), now)
            .await
            .unwrap();

        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();
        let err = accept(&*fx.store, &issued.token, fx.partner, &athlete("Pia"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::AlreadyPaired));

        let owner = fx.store.find_user(fx.owner).await.unwrap().unwrap();
        assert_eq!(owner.partner_id, Some(other_owner));
        let partner = fx.store.find_user(fx.partner).await.unwrap().unwrap();
        assert_eq!(partner.partner_id, None);
        let invite = fx.store.find_invite(&issued.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Pending);
    }

    #[tokio::test]
    async fn store_keeps_an_owner_paired_elsewhere() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();

        // The owner gets paired elsewhere after the service checks would
        // have passed.
        let other_owner = fx.store.create_user("quinn", "hash").await.unwrap().id;
        let other_training = training(
            &fx.store,
            other_owner,
            Division::Doubles,
            TrainingMode::InvitePartner,
        )
        .await;
        let elsewhere = issue(&*fx.store, BASE_URL, other_training, other_owner, now)
            .await
            .unwrap();
        accept(&*fx.store, &elsewhere.token, fx.owner, &athlete("Owner"), now)
            .await
            .unwrap();

        let acceptance = Acceptance {
            token: issued.token.clone(),
            owner_id: fx.owner,
            partner_id: fx.partner,
            training_id: fx.training,
            athlete: NewAthlete {
                user_id: fx.partner,
                username: "partner".into(),
                training_id: fx.training,
                profile: athlete("Pia").validate().unwrap(),
            },
            now,
        };
        let outcome = fx.store.accept_invite(&acceptance).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::AlreadyPaired);

        let invite = fx.store.find_invite(&issued.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Pending);
        let training = fx.store.find_training(fx.training).await.unwrap().unwrap();
        assert_eq!(training.partner_id, None);
        let owner = fx.store.find_user(fx.owner).await.unwrap().unwrap();
        assert_eq!(owner.partner_id, Some(other_owner));
    }

    #[tokio::test]
    async fn filled_training_cannot_issue_again() {
        let fx = fixture().await;
        let now = Utc::now();
        let issued = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap();
        accept(&*fx.store, &issued.token, fx.partner, &athlete("Pia"), now)
            .await
            .unwrap();

        let err = issue(&*fx.store, BASE_URL, fx.training, fx.owner, now)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::TrainingFull));
    }
}
