//! Service index listing the available resource collections.

use axum::{Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Conecta API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "users": "/api/users",
            "ideas": "/api/ideas",
            "projects": "/api/projects",
            "courses": "/api/courses",
            "proposals": "/api/proposals",
            "notifications": "/api/notifications",
            "feedbacks": "/api/feedbacks",
            "projectStudents": "/api/project-students",
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::root;
    use axum::{body::to_bytes, response::IntoResponse};

    #[tokio::test]
    async fn index_lists_collections() -> anyhow::Result<()> {
        let response = root().await.into_response();
        let bytes = to_bytes(response.into_body(), 4096).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value["message"], "Conecta API");
        assert_eq!(value["endpoints"]["ideas"], "/api/ideas");
        Ok(())
    }
}
