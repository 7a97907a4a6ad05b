use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::training::DoublesType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invite_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Expired,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invite {
    pub token: String,
    pub owner_id: Uuid,
    pub training_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invite {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub token: String,
    pub owner_id: Uuid,
    pub training_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub training_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteResponse {
    pub invite_url: String,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteDetailsResponse {
    pub owner_username: String,
    pub doubles_type: Option<DoublesType>,
    pub status: InviteStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub athlete: super::athlete::AthleteInput,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteResponse {
    pub success: bool,
    pub athlete_id: Uuid,
    pub owner_user_id: Uuid,
    pub invited_user_id: Uuid,
    pub training_id: Uuid,
}
