use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AcceptOutcome, Acceptance, Result, Store, StoreError};
use crate::models::athlete::{Athlete, NewAthlete};
use crate::models::invite::{Invite, InviteStatus, NewInvite};
use crate::models::training::{NewTraining, Training, TrainingStatus};
use crate::models::user::User;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    trainings: HashMap<Uuid, Training>,
    athletes: HashMap<Uuid, Athlete>,
    invites: HashMap<String, Invite>,
}

impl State {
    fn upsert_athlete(&mut self, new: &NewAthlete) -> Athlete {
        let now = Utc::now();
        let p = &new.profile;
        let existing = self
            .athletes
            .values()
            .find(|a| a.user_id == new.user_id && a.username == new.username)
            .map(|a| (a.id, a.created_at));
        let (id, created_at) = existing.unwrap_or_else(|| (Uuid::new_v4(), now));

        let athlete = Athlete {
            id,
            user_id: new.user_id,
            username: new.username.clone(),
            training_id: Some(new.training_id),
            name: p.name.clone(),
            age: p.age,
            weight_kg: p.weight_kg,
            height_cm: p.height_cm,
            experience: p.experience,
            goal: p.goal.clone(),
            target_time: p.target_time.clone(),
            strengths: p.strengths.clone(),
            weaknesses: p.weaknesses.clone(),
            gender: p.gender,
            created_at,
            updated_at: now,
        };
        self.athletes.insert(id, athlete.clone());
        athlete
    }

    fn user_mut(&mut self, id: Uuid) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StoreError::ConstraintViolation(format!("unknown user {id}")))
    }
}

/// Process-local store. Every operation holds the single lock for its whole
/// duration, which makes multi-record writes atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == username) {
            return Err(StoreError::ConstraintViolation(format!(
                "username {username} already exists"
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            training_id: None,
            partner_id: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_training(
        &self,
        training: &NewTraining,
        athletes: &[NewAthlete],
    ) -> Result<(Training, Vec<Athlete>)> {
        let mut state = self.state.write().await;
        if state.trainings.contains_key(&training.id) {
            return Err(StoreError::ConstraintViolation(format!(
                "training {} already exists",
                training.id
            )));
        }
        state.user_mut(training.owner_id)?;

        let stored: Vec<Athlete> = athletes.iter().map(|a| state.upsert_athlete(a)).collect();

        let now = Utc::now();
        let saved = Training {
            id: training.id,
            owner_id: training.owner_id,
            partner_id: None,
            athlete1_id: stored.first().map(|a| a.id),
            athlete2_id: stored.get(1).map(|a| a.id),
            division: training.division,
            mode: training.mode,
            doubles_type: training.doubles_type,
            status: training.status,
            created_at: now,
            updated_at: now,
        };
        state.trainings.insert(saved.id, saved.clone());

        let owner = state.user_mut(training.owner_id)?;
        owner.training_id = Some(training.id);
        owner.updated_at = now;

        Ok((saved, stored))
    }

    async fn find_training(&self, id: Uuid) -> Result<Option<Training>> {
        Ok(self.state.read().await.trainings.get(&id).cloned())
    }

    async fn list_trainings_for_user(&self, user_id: Uuid) -> Result<Vec<Training>> {
        let state = self.state.read().await;
        let mut trainings: Vec<Training> = state
            .trainings
            .values()
            .filter(|t| t.is_member(user_id))
            .cloned()
            .collect();
        trainings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trainings)
    }

    async fn list_athletes_for_training(&self, training_id: Uuid) -> Result<Vec<Athlete>> {
        let state = self.state.read().await;
        let mut athletes: Vec<Athlete> = state
            .athletes
            .values()
            .filter(|a| a.training_id == Some(training_id))
            .cloned()
            .collect();
        athletes.sort_by_key(|a| a.created_at);
        Ok(athletes)
    }

    async fn find_invite(&self, token: &str) -> Result<Option<Invite>> {
        Ok(self.state.read().await.invites.get(token).cloned())
    }

    async fn find_pending_invite(&self, training_id: Uuid) -> Result<Option<Invite>> {
        let state = self.state.read().await;
        Ok(state
            .invites
            .values()
            .find(|i| i.training_id == training_id && i.status == InviteStatus::Pending)
            .cloned())
    }

    async fn create_invite(&self, invite: &NewInvite) -> Result<Invite> {
        let mut state = self.state.write().await;
        let clash = state.invites.values().any(|i| {
            i.token == invite.token
                || (i.training_id == invite.training_id && i.status == InviteStatus::Pending)
        });
        if clash {
            return Err(StoreError::ConstraintViolation(format!(
                "training {} already has a pending invite",
                invite.training_id
            )));
        }

        let row = Invite {
            token: invite.token.clone(),
            owner_id: invite.owner_id,
            training_id: invite.training_id,
            partner_id: None,
            status: InviteStatus::Pending,
            expires_at: invite.expires_at,
            created_at: Utc::now(),
            accepted_at: None,
        };
        state.invites.insert(row.token.clone(), row.clone());
        Ok(row)
    }

    async fn expire_invite(&self, token: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(invite) = state.invites.get_mut(token) {
            if invite.status == InviteStatus::Pending {
                invite.status = InviteStatus::Expired;
            }
        }
        Ok(())
    }

    async fn accept_invite(&self, acceptance: &Acceptance) -> Result<AcceptOutcome> {
        let mut state = self.state.write().await;

        let claimable = state.invites.get(&acceptance.token).is_some_and(|i| {
            i.status == InviteStatus::Pending && !i.is_expired_at(acceptance.now)
        });
        if !claimable {
            return Ok(AcceptOutcome::InviteUnavailable);
        }

        let slot_free = state
            .trainings
            .get(&acceptance.training_id)
            .is_some_and(Training::has_free_slot);
        if !slot_free {
            return Ok(AcceptOutcome::TrainingFull);
        }
        let owner_free = state
            .user_mut(acceptance.owner_id)?
            .partner_id
            .is_none_or(|p| p == acceptance.partner_id);
        let partner_free = state
            .user_mut(acceptance.partner_id)?
            .partner_id
            .is_none_or(|p| p == acceptance.owner_id);
        if !owner_free || !partner_free {
            return Ok(AcceptOutcome::AlreadyPaired);
        }

        // Nothing below can fail, so the writes land together.
        if let Some(invite) = state.invites.get_mut(&acceptance.token) {
            invite.status = InviteStatus::Accepted;
            invite.partner_id = Some(acceptance.partner_id);
            invite.accepted_at = Some(acceptance.now);
        }

        let athlete = state.upsert_athlete(&acceptance.athlete);
        let now = Utc::now();

        if let Some(training) = state.trainings.get_mut(&acceptance.training_id) {
            training.partner_id = Some(acceptance.partner_id);
            training.athlete2_id = Some(athlete.id);
            training.status = TrainingStatus::Active;
            training.updated_at = now;
        }

        let owner = state.user_mut(acceptance.owner_id)?;
        owner.partner_id = Some(acceptance.partner_id);
        owner.updated_at = now;

        let partner = state.user_mut(acceptance.partner_id)?;
        partner.partner_id = Some(acceptance.owner_id);
        partner.training_id = Some(acceptance.training_id);
        partner.updated_at = now;

        Ok(AcceptOutcome::Accepted {
            athlete_id: athlete.id,
        })
    }
}
