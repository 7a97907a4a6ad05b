use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::athlete::{AthleteInput, AthleteResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "training_division", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Division {
    Individual,
    Doubles,
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual => write!(f, "individual"),
            Self::Doubles => write!(f, "doubles"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "training_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    Solo,
    SharedAccount,
    InvitePartner,
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solo => write!(f, "solo"),
            Self::SharedAccount => write!(f, "shared_account"),
            Self::InvitePartner => write!(f, "invite_partner"),
        }
    }
}

/// Gender category of a doubles plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "doubles_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DoublesType {
    Men,
    Women,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "training_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    AwaitingPartner,
    Active,
}

#[derive(Debug, Clone, FromRow)]
pub struct Training {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub athlete1_id: Option<Uuid>,
    pub athlete2_id: Option<Uuid>,
    pub division: Division,
    pub mode: TrainingMode,
    pub doubles_type: Option<DoublesType>,
    pub status: TrainingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Training {
    pub fn accepts_invites(&self) -> bool {
        self.division == Division::Doubles && self.mode == TrainingMode::InvitePartner
    }

    pub fn has_free_slot(&self) -> bool {
        self.athlete2_id.is_none() && self.partner_id.is_none()
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.partner_id == Some(user_id)
    }
}

/// A training about to be inserted. The id is assigned up front so athlete
/// rows can reference it inside the same transaction.
#[derive(Debug, Clone)]
pub struct NewTraining {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub division: Division,
    pub mode: TrainingMode,
    pub doubles_type: Option<DoublesType>,
    pub status: TrainingStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrainingRequest {
    pub division: Division,
    pub mode: TrainingMode,
    pub doubles_type: Option<DoublesType>,
    #[serde(default)]
    pub athletes: Vec<AthleteInput>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub athlete1_id: Option<Uuid>,
    pub athlete2_id: Option<Uuid>,
    pub division: Division,
    pub mode: TrainingMode,
    pub doubles_type: Option<DoublesType>,
    pub status: TrainingStatus,
    pub created_at: DateTime<Utc>,
    pub athletes: Vec<AthleteResponse>,
}

impl Training {
    pub fn into_response(self, athletes: Vec<AthleteResponse>) -> TrainingResponse {
        TrainingResponse {
            id: self.id,
            owner_id: self.owner_id,
            partner_id: self.partner_id,
            athlete1_id: self.athlete1_id,
            athlete2_id: self.athlete2_id,
            division: self.division,
            mode: self.mode,
            doubles_type: self.doubles_type,
            status: self.status,
            created_at: self.created_at,
            athletes,
        }
    }
}
