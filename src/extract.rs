use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json` body extractor whose rejection renders as an `AppError`, so a
/// malformed body gets the same 400 `{"error"}` shape as any other
/// validation failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
