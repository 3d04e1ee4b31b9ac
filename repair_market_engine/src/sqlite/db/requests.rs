use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRequest, Request, RequestStatus},
    traits::MarketplaceError,
};

pub async fn insert_request(request: NewRequest, conn: &mut SqliteConnection) -> Result<Request, MarketplaceError> {
    let request: Request = sqlx::query_as(
        r#"
            INSERT INTO requests (customer_id, service_type_id, title, details)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(request.customer_id)
    .bind(request.service_type_id)
    .bind(request.title)
    .bind(request.details)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Request [{}] inserted for customer {}", request.id, request.customer_id);
    Ok(request)
}

pub async fn fetch_request(id: i64, conn: &mut SqliteConnection) -> Result<Option<Request>, MarketplaceError> {
    let request = sqlx::query_as("SELECT * FROM requests WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(request)
}

pub(crate) async fn update_request_status(
    id: i64,
    status: RequestStatus,
    conn: &mut SqliteConnection,
) -> Result<Request, MarketplaceError> {
    let status = status.to_string();
    let result: Option<Request> =
        sqlx::query_as("UPDATE requests SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(MarketplaceError::RequestNotFound(id))
}
