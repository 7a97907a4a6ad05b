use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "experience_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
}

const MAX_LIST_ITEMS: usize = 10;
const MAX_TEXT_LEN: usize = 200;

#[derive(Debug, Clone, FromRow)]
pub struct Athlete {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub training_id: Option<Uuid>,
    pub name: String,
    pub age: i32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub experience: Experience,
    pub goal: String,
    pub target_time: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub gender: Gender,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Athlete fields as submitted by a client. Everything is optional here so
/// that a missing field produces a message naming it instead of a generic
/// deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteInput {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub experience: Option<Experience>,
    pub goal: Option<String>,
    pub target_time: Option<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub gender: Option<Gender>,
}

/// A validated athlete profile, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AthleteProfile {
    pub name: String,
    pub age: i32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub experience: Experience,
    pub goal: String,
    pub target_time: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub gender: Gender,
}

fn required_text(value: Option<&str>, field: &str) -> Result<String, String> {
    let text = value.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(format!("Athlete field '{field}' is required"));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(format!(
            "Athlete field '{field}' must be at most {MAX_TEXT_LEN} characters"
        ));
    }
    Ok(text.to_string())
}

fn clean_list(items: &[String], field: &str) -> Result<Vec<String>, String> {
    let cleaned: Vec<String> = items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.len() > MAX_LIST_ITEMS {
        return Err(format!(
            "Athlete field '{field}' accepts at most {MAX_LIST_ITEMS} entries"
        ));
    }
    Ok(cleaned)
}

impl AthleteInput {
    pub fn validate(&self) -> Result<AthleteProfile, String> {
        let name = required_text(self.name.as_deref(), "name")?;
        let goal = required_text(self.goal.as_deref(), "goal")?;

        let age = self.age.ok_or("Athlete field 'age' is required")?;
        if !(12..=100).contains(&age) {
            return Err("Athlete age must be between 12 and 100".into());
        }

        let weight_kg = self.weight.ok_or("Athlete field 'weight' is required")?;
        if !(weight_kg.is_finite() && weight_kg > 20.0 && weight_kg < 300.0) {
            return Err("Athlete weight must be between 20 and 300 kg".into());
        }

        let height_cm = self.height.ok_or("Athlete field 'height' is required")?;
        if !(height_cm.is_finite() && height_cm > 100.0 && height_cm < 250.0) {
            return Err("Athlete height must be between 100 and 250 cm".into());
        }

        let experience = self
            .experience
            .ok_or("Athlete field 'experience' is required")?;
        let gender = self.gender.ok_or("Athlete field 'gender' is required")?;

        let target_time = self
            .target_time
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(AthleteProfile {
            name,
            age,
            weight_kg,
            height_cm,
            experience,
            goal,
            target_time,
            strengths: clean_list(&self.strengths, "strengths")?,
            weaknesses: clean_list(&self.weaknesses, "weaknesses")?,
            gender,
        })
    }
}

/// Upsert payload, keyed by `(user_id, username)`.
#[derive(Debug, Clone)]
pub struct NewAthlete {
    pub user_id: Uuid,
    pub username: String,
    pub training_id: Uuid,
    pub profile: AthleteProfile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub training_id: Option<Uuid>,
    pub name: String,
    pub age: i32,
    pub weight: f64,
    pub height: f64,
    pub experience: Experience,
    pub goal: String,
    pub target_time: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub gender: Gender,
}

impl From<Athlete> for AthleteResponse {
    fn from(a: Athlete) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            training_id: a.training_id,
            name: a.name,
            age: a.age,
            weight: a.weight_kg,
            height: a.height_cm,
            experience: a.experience,
            goal: a.goal,
            target_time: a.target_time,
            strengths: a.strengths,
            weaknesses: a.weaknesses,
            gender: a.gender,
        }
    }
}
