use axum::{response::IntoResponse, Json};

#[utoipa::path(
    get,
    path = "/health",
    responses(
    (status = 200, description = "Health check")
    )
)]
pub async fn health_checker_handler() -> impl IntoResponse {
    const MESSAGE: &str = "postgate is running!";

    let json_response = serde_json::json!({
        "status": "success",
        "message": MESSAGE,
        "version": env!("CARGO_PKG_VERSION"),
    });

    Json(json_response)
}
