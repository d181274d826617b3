use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::pipeline::{render, Outcome, PhotoMessage};
use crate::state::AppState;
use crate::users::normalize_address;
use crate::vision::Photo;

use super::dto::{DevMeal, DevMessage, Health, TwilioInbound};

// --- routers ---

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/whatsapp", post(whatsapp_webhook))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn dev_routes() -> Router<AppState> {
    Router::new()
        .route("/dev/messages", post(dev_message))
        .route("/dev/meals/:id", get(dev_meal))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// --- handlers ---

/// Always 200: Twilio retries anything else, and every failure has already
/// been reported to the user.
#[instrument(skip(state, form), fields(from = %form.from))]
pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    Form(form): Form<TwilioInbound>,
) -> StatusCode {
    let outcome = handle_inbound(state, form).await;
    debug!(?outcome, "webhook handled");
    StatusCode::OK
}

/// Routes one inbound message to the pipeline. Returns `None` when nothing
/// reached it.
pub(crate) async fn handle_inbound(state: AppState, form: TwilioInbound) -> Option<Outcome> {
    let address = form.from.trim();
    if address.is_empty() {
        warn!("inbound message without sender");
        return None;
    }
    let pipeline = &state.pipeline;

    let res = if form.has_media() {
        let url = form.media_url.as_deref().unwrap_or_default();
        let photo = match state
            .media
            .fetch(url, form.media_content_type.as_deref())
            .await
        {
            Ok(photo) => photo,
            Err(e) => {
                warn!(error = %e, "media download failed");
                pipeline
                    .messenger()
                    .send(&normalize_address(address), render::NO_PHOTO)
                    .await;
                return None;
            }
        };
        info!(bytes = photo.body.len(), content_type = %photo.content_type, "photo received");
        pipeline
            .handle_photo(
                address,
                PhotoMessage {
                    photo,
                    source_url: Some(url.to_string()),
                    note: Some(form.body.clone()),
                },
            )
            .await
    } else if !form.body.trim().is_empty() {
        pipeline.handle_text(address, &form.body).await
    } else {
        warn!("received empty message");
        return None;
    };

    match res {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "inbound message failed");
            None
        }
    }
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "running",
        app: "GlassBite",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /dev/messages. Runs a message through the pipeline synchronously and
/// returns what happened.
#[instrument(skip(state, req), fields(address = %req.address))]
pub async fn dev_message(
    State(state): State<AppState>,
    Json(req): Json<DevMessage>,
) -> Result<Json<Outcome>, (StatusCode, String)> {
    let outcome = match (req.image, req.text) {
        (Some(image), note) => {
            if image.is_empty() {
                return Err((StatusCode::BAD_REQUEST, "image is empty".into()));
            }
            let photo = Photo {
                body: Bytes::from(image.into_vec()),
                content_type: req.content_type.unwrap_or_else(|| "image/jpeg".into()),
            };
            state
                .pipeline
                .handle_photo(
                    &req.address,
                    PhotoMessage {
                        photo,
                        source_url: None,
                        note,
                    },
                )
                .await
        }
        (None, Some(text)) => state.pipeline.handle_text(&req.address, &text).await,
        (None, None) => {
            return Err((StatusCode::BAD_REQUEST, "text or image is required".into()));
        }
    }
    .map_err(internal)?;
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn dev_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DevMeal>, (StatusCode, String)> {
    let meal = state
        .store
        .meal(id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Meal not found".to_string()))?;
    let foods = state.store.meal_foods(id).await.map_err(internal)?;
    Ok(Json(DevMeal { meal, foods }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
