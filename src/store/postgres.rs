use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{AcceptOutcome, Acceptance, Result, Store};
use crate::models::athlete::{Athlete, NewAthlete};
use crate::models::invite::{Invite, NewInvite};
use crate::models::training::{NewTraining, Training};
use crate::models::user::User;

const USER_COLUMNS: &str =
    "id, username, password_hash, training_id, partner_id, created_at, updated_at";

const TRAINING_COLUMNS: &str = "id, owner_id, partner_id, athlete1_id, athlete2_id, division, mode, \
     doubles_type, status, created_at, updated_at";

const ATHLETE_COLUMNS: &str = "id, user_id, username, training_id, name, age, weight_kg, height_cm, \
     experience, goal, target_time, strengths, weaknesses, gender, created_at, updated_at";

const INVITE_COLUMNS: &str =
    "token, owner_id, training_id, partner_id, status, expires_at, created_at, accepted_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

async fn upsert_athlete(conn: &mut PgConnection, athlete: &NewAthlete) -> Result<Athlete> {
    let p = &athlete.profile;
    let row = sqlx::query_as::<_, Athlete>(&format!(
        "INSERT INTO athletes (user_id, username, training_id, name, age, weight_kg, height_cm,
                               experience, goal, target_time, strengths, weaknesses, gender)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (user_id, username) DO UPDATE SET
             training_id = EXCLUDED.training_id,
             name = EXCLUDED.name,
             age = EXCLUDED.age,
             weight_kg = EXCLUDED.weight_kg,
             height_cm = EXCLUDED.height_cm,
             experience = EXCLUDED.experience,
             goal = EXCLUDED.goal,
             target_time = EXCLUDED.target_time,
             strengths = EXCLUDED.strengths,
             weaknesses = EXCLUDED.weaknesses,
             gender = EXCLUDED.gender,
             updated_at = now()
         RETURNING {ATHLETE_COLUMNS}"
    ))
    .bind(athlete.user_id)
    .bind(&athlete.username)
    .bind(athlete.training_id)
    .bind(&p.name)
    .bind(p.age)
    .bind(p.weight_kg)
    .bind(p.height_cm)
    .bind(p.experience)
    .bind(&p.goal)
    .bind(&p.target_time)
    .bind(&p.strengths)
    .bind(&p.weaknesses)
    .bind(p.gender)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_training(
        &self,
        training: &NewTraining,
        athletes: &[NewAthlete],
    ) -> Result<(Training, Vec<Athlete>)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO trainings (id, owner_id, division, mode, doubles_type, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(training.id)
        .bind(training.owner_id)
        .bind(training.division)
        .bind(training.mode)
        .bind(training.doubles_type)
        .bind(training.status)
        .execute(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(athletes.len());
        for athlete in athletes {
            stored.push(upsert_athlete(&mut tx, athlete).await?);
        }

        let saved = sqlx::query_as::<_, Training>(&format!(
            "UPDATE trainings SET athlete1_id = $2, athlete2_id = $3, updated_at = now()
             WHERE id = $1
             RETURNING {TRAINING_COLUMNS}"
        ))
        .bind(training.id)
        .bind(stored.first().map(|a| a.id))
        .bind(stored.get(1).map(|a| a.id))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET training_id = $2, updated_at = now() WHERE id = $1")
            .bind(training.owner_id)
            .bind(training.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((saved, stored))
    }

    async fn find_training(&self, id: Uuid) -> Result<Option<Training>> {
        let training = sqlx::query_as::<_, Training>(&format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(training)
    }

    async fn list_trainings_for_user(&self, user_id: Uuid) -> Result<Vec<Training>> {
        let trainings = sqlx::query_as::<_, Training>(&format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings
             WHERE owner_id = $1 OR partner_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(trainings)
    }

    async fn list_athletes_for_training(&self, training_id: Uuid) -> Result<Vec<Athlete>> {
        let athletes = sqlx::query_as::<_, Athlete>(&format!(
            "SELECT {ATHLETE_COLUMNS} FROM athletes
             WHERE training_id = $1
             ORDER BY created_at"
        ))
        .bind(training_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(athletes)
    }

    async fn find_invite(&self, token: &str) -> Result<Option<Invite>> {
        let invite = sqlx::query_as::<_, Invite>(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    async fn find_pending_invite(&self, training_id: Uuid) -> Result<Option<Invite>> {
        let invite = sqlx::query_as::<_, Invite>(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites
             WHERE training_id = $1 AND status = 'pending'"
        ))
        .bind(training_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    async fn create_invite(&self, invite: &NewInvite) -> Result<Invite> {
        let row = sqlx::query_as::<_, Invite>(&format!(
            "INSERT INTO invites (token, owner_id, training_id, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {INVITE_COLUMNS}"
        ))
        .bind(&invite.token)
        .bind(invite.owner_id)
        .bind(invite.training_id)
        .bind(invite.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn expire_invite(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE invites SET status = 'expired' WHERE token = $1 AND status = 'pending'")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn accept_invite(&self, acceptance: &Acceptance) -> Result<AcceptOutcome> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap on status: of two concurrent acceptances only one
        // gets a row back.
        let claimed = sqlx::query(
            "UPDATE invites SET status = 'accepted', partner_id = $2, accepted_at = $3
             WHERE token = $1 AND status = 'pending' AND expires_at > $3",
        )
        .bind(&acceptance.token)
        .bind(acceptance.partner_id)
        .bind(acceptance.now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(AcceptOutcome::InviteUnavailable);
        }

        let athlete = upsert_athlete(&mut tx, &acceptance.athlete).await?;

        let linked = sqlx::query(
            "UPDATE trainings
             SET partner_id = $2, athlete2_id = $3, status = 'active', updated_at = now()
             WHERE id = $1 AND partner_id IS NULL AND athlete2_id IS NULL",
        )
        .bind(acceptance.training_id)
        .bind(acceptance.partner_id)
        .bind(athlete.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if linked == 0 {
            tx.rollback().await?;
            return Ok(AcceptOutcome::TrainingFull);
        }

        // Neither side may already be paired with someone else.
        let owner_paired = sqlx::query(
            "UPDATE users SET partner_id = $2, updated_at = now()
             WHERE id = $1 AND (partner_id IS NULL OR partner_id = $2)",
        )
        .bind(acceptance.owner_id)
        .bind(acceptance.partner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let partner_paired = sqlx::query(
            "UPDATE users SET partner_id = $2, training_id = $3, updated_at = now()
             WHERE id = $1 AND (partner_id IS NULL OR partner_id = $2)",
        )
        .bind(acceptance.partner_id)
        .bind(acceptance.owner_id)
        .bind(acceptance.training_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if owner_paired == 0 || partner_paired == 0 {
            tx.rollback().await?;
            return Ok(AcceptOutcome::AlreadyPaired);
        }

        tx.commit().await?;
        Ok(AcceptOutcome::Accepted {
            athlete_id: athlete.id,
        })
    }
}
