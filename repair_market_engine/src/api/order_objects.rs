use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{db_types::OrderStatus, traits::MarketplaceError};

/// Filter for order fetches: foreign keys, status and a creation-time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<i64>,
    pub expert_id: Option<i64>,
    pub request_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatus>>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_expert_id(mut self, expert_id: i64) -> Self {
        self.expert_id = Some(expert_id);
        self
    }

    pub fn with_request_id(mut self, request_id: i64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn since<T>(mut self, since: T) -> Result<Self, MarketplaceError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| MarketplaceError::ValidationError(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, MarketplaceError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| MarketplaceError::ValidationError(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.expert_id.is_none() &&
            self.request_id.is_none() &&
            self.status.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(customer_id) = &self.customer_id {
            write!(f, "customer_id: {customer_id}. ")?;
        }
        if let Some(expert_id) = &self.expert_id {
            write!(f, "expert_id: {expert_id}. ")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "request_id: {request_id}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}
