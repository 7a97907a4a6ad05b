use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::models::athlete::{AthleteResponse, NewAthlete};
use crate::models::training::{
    CreateTrainingRequest, Division, NewTraining, Training, TrainingMode, TrainingResponse,
    TrainingStatus,
};
use crate::store::Store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/trainings", get(list_trainings).post(create_training))
        .route("/api/trainings/{id}", get(get_training))
}

/// Check the division/mode/athlete-count combination and pick the initial
/// status. Invite-based doubles start without their second athlete.
fn initial_status(req: &CreateTrainingRequest) -> Result<TrainingStatus, AppError> {
    let (expected_athletes, needs_doubles_type, status) = match (req.division, req.mode) {
        (Division::Individual, TrainingMode::Solo) => (1, false, TrainingStatus::Active),
        (Division::Doubles, TrainingMode::SharedAccount) => (2, true, TrainingStatus::Active),
        (Division::Doubles, TrainingMode::InvitePartner) => {
            (1, true, TrainingStatus::AwaitingPartner)
        }
        (division, mode) => {
            return Err(AppError::BadRequest(format!(
                "Unsupported combination of division '{division}' and mode '{mode}'"
            )));
        }
    };

    if req.athletes.len() != expected_athletes {
        return Err(AppError::BadRequest(format!(
            "A {} / {} training needs exactly {expected_athletes} athlete profile(s), got {}",
            req.division,
            req.mode,
            req.athletes.len()
        )));
    }
    match (needs_doubles_type, req.doubles_type.is_some()) {
        (true, false) => Err(AppError::BadRequest(
            "Doubles trainings need a doubles type".into(),
        )),
        (false, true) => Err(AppError::BadRequest(
            "Only doubles trainings take a doubles type".into(),
        )),
        _ => Ok(status),
    }
}

/// Username slot for the n-th athlete the owner enters. The second
/// shared-account athlete gets a suffix that a real username can't contain.
fn athlete_username(owner_username: &str, index: usize) -> String {
    if index == 0 {
        owner_username.to_string()
    } else {
        format!("{owner_username}#{}", index + 1)
    }
}

async fn with_athletes(store: &dyn Store, training: Training) -> Result<TrainingResponse, AppError> {
    let athletes = store.list_athletes_for_training(training.id).await?;
    Ok(training.into_response(athletes.into_iter().map(AthleteResponse::from).collect()))
}

async fn create_training(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(body): AppJson<CreateTrainingRequest>,
) -> Result<Json<TrainingResponse>, AppError> {
    let status = initial_status(&body)?;

    let owner = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let training = NewTraining {
        id: Uuid::new_v4(),
        owner_id: owner.id,
        division: body.division,
        mode: body.mode,
        doubles_type: body.doubles_type,
        status,
    };

    let athletes = body
        .athletes
        .iter()
        .enumerate()
        .map(|(i, input)| -> Result<NewAthlete, AppError> {
            let profile = input
                .validate()
                .map_err(|msg| AppError::BadRequest(format!("athletes[{i}]: {msg}")))?;
            Ok(NewAthlete {
                user_id: owner.id,
                username: athlete_username(&owner.username, i),
                training_id: training.id,
                profile,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (saved, stored) = state.store.create_training(&training, &athletes).await?;
    tracing::info!(
        training_id = %saved.id,
        division = %saved.division,
        mode = %saved.mode,
        "training created"
    );

    Ok(Json(saved.into_response(
        stored.into_iter().map(AthleteResponse::from).collect(),
    )))
}

async fn list_trainings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<TrainingResponse>>, AppError> {
    let trainings = state.store.list_trainings_for_user(auth.user_id).await?;

    let mut response = Vec::with_capacity(trainings.len());
    for training in trainings {
        response.push(with_athletes(state.store.as_ref(), training).await?);
    }
    Ok(Json(response))
}

async fn get_training(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TrainingResponse>, AppError> {
    let training = state
        .store
        .find_training(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Training not found".into()))?;

    if !training.is_member(auth.user_id) {
        return Err(AppError::Forbidden);
    }

    Ok(Json(with_athletes(state.store.as_ref(), training).await?))
}
