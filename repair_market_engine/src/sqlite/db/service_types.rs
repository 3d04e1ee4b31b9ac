use sqlx::SqliteConnection;

use crate::{
    db_types::{NewServiceType, ServiceType},
    traits::MarketplaceError,
};

pub async fn insert_service_type(
    service_type: NewServiceType,
    conn: &mut SqliteConnection,
) -> Result<ServiceType, MarketplaceError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO service_types (name, commission_percent) VALUES ($1, $2)
            RETURNING *;
        "#,
    )
    .bind(service_type.name)
    .bind(service_type.commission_percent)
    .fetch_one(conn)
    .await?;
    Ok(result)
}

pub async fn fetch_service_type(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ServiceType>, MarketplaceError> {
    let result = sqlx::query_as("SELECT * FROM service_types WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(result)
}
