//! Spend permissions: stored authorizations letting the agent spend up to a
//! daily USDC limit on a user's behalf.

use crate::constants::{BASE_CHAIN_ID, DEFAULT_PERIOD_DAYS};
use crate::db::DbPool;
use crate::types::*;
use crate::AppState;
use crate::ingress::json_body;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    response::Response,
    Json,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct SpendPermission {
    pub id: String,
    pub user_address: String,
    pub spender_address: String,
    pub token_address: String,
    pub chain_id: i64,
    pub allowance_usdc: f64,
    pub period_days: i64,
    /// Signed permission payload, kept as opaque JSON text.
    pub permission_data: Option<String>,
    pub expires_at: String,
    pub is_active: bool,
    pub created_at: String,
}

impl SpendPermission {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    /// A permission with an unreadable expiry is treated as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => expires_at < now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorePermissionRequest {
    pub user_address: Option<String>,
    pub spender_address: Option<String>,
    pub token_address: Option<String>,
    pub allowance_usdc: Option<f64>,
    pub period_days: Option<i64>,
    pub permission_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionRequest {
    pub user_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub has_permission: bool,
    #[serde(default)]
    pub permission: Option<SpendPermission>,
    pub message: String,
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn format_usdc(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{}", amount)
    }
}

/// Replaces the user's active permission with a new one.
pub async fn store_permission(
    pool: &DbPool,
    req: &StorePermissionRequest,
    now: DateTime<Utc>,
) -> Result<SpendPermission> {
    let (Some(user), Some(spender), Some(token), Some(allowance)) = (
        required(&req.user_address),
        required(&req.spender_address),
        required(&req.token_address),
        req.allowance_usdc,
    ) else {
        return Err(AgentError::InvalidIngress("Missing required fields".into()).into());
    };
    if allowance <= 0.0 || !allowance.is_finite() {
        return Err(AgentError::InvalidIngress("allowanceUsdc must be positive".into()).into());
    }

    let period_days = match req.period_days {
        Some(d) if d > 0 => d,
        _ => DEFAULT_PERIOD_DAYS,
    };
    let permission_data = match &req.permission_data {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };

    let permission = SpendPermission {
        id: uuid::Uuid::new_v4().to_string(),
        user_address: user.to_lowercase(),
        spender_address: spender.to_lowercase(),
        token_address: token.to_lowercase(),
        chain_id: BASE_CHAIN_ID,
        allowance_usdc: allowance,
        period_days,
        permission_data,
        expires_at: (now + Duration::days(period_days)).to_rfc3339_opts(SecondsFormat::Millis, true),
        is_active: true,
        created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE spend_permissions SET is_active = 0 WHERE user_address = ? AND is_active = 1")
        .bind(&permission.user_address)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO spend_permissions (id, user_address, spender_address, token_address, chain_id, allowance_usdc, period_days, permission_data, expires_at, is_active, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&permission.id)
    .bind(&permission.user_address)
    .bind(&permission.spender_address)
    .bind(&permission.token_address)
    .bind(permission.chain_id)
    .bind(permission.allowance_usdc)
    .bind(permission.period_days)
    .bind(&permission.permission_data)
    .bind(&permission.expires_at)
    .bind(permission.is_active)
    .bind(&permission.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Stored spend permission for {}: ${} USDC over {} day(s)",
        crate::str_utils::prefix_chars(&permission.user_address, 10),
        format_usdc(allowance),
        period_days
    );
    Ok(permission)
}

pub async fn active_permission(pool: &DbPool, user_address: &str) -> Result<Option<SpendPermission>> {
    let row = sqlx::query_as::<_, SpendPermission>(
        "SELECT * FROM spend_permissions WHERE user_address = ? AND is_active = 1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_address.to_lowercase())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn deactivate(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE spend_permissions SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Looks up the user's current permission, retiring it if it has expired.
pub async fn check_permission(
    pool: &DbPool,
    req: &CheckPermissionRequest,
    now: DateTime<Utc>,
) -> Result<PermissionStatus> {
    let Some(user) = required(&req.user_address) else {
        return Err(AgentError::InvalidIngress("Missing user address".into()).into());
    };

    let permission = active_permission(pool, user).await?;

    if let Some(p) = &permission {
        if p.is_expired(now) {
            deactivate(pool, &p.id).await?;
            tracing::info!("Spend permission {} expired at {}", p.id, p.expires_at);
            return Ok(PermissionStatus {
                has_permission: false,
                permission: None,
                message: "Spend permission has expired".to_string(),
            });
        }
    }

    let message = match &permission {
        Some(p) => format!("Active: ${} USDC daily limit", format_usdc(p.allowance_usdc)),
        None => "No active spend permission".to_string(),
    };
    Ok(PermissionStatus {
        has_permission: permission.is_some(),
        permission,
        message,
    })
}

pub async fn store_permission_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<StorePermissionRequest>, JsonRejection>,
) -> Response {
    let stored = match json_body(payload) {
        Ok(req) => store_permission(&state.db, &req, Utc::now()).await,
        Err(e) => Err(e),
    };
    match stored {
        Ok(permission) => {
            let message = format!(
                "Spend permission granted: ${} USDC daily limit",
                format_usdc(permission.allowance_usdc)
            );
            Json(serde_json::json!({
                "success": true,
                "permission": permission,
                "message": message,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!("Store permission error: {}", e.inner);
            e.into_response()
        }
    }
}

pub async fn check_permission_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CheckPermissionRequest>, JsonRejection>,
) -> Response {
    let checked = match json_body(payload) {
        Ok(req) => check_permission(&state.db, &req, Utc::now()).await,
        Err(e) => Err(e),
    };
    match checked {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!("Check permission error: {}", e.inner);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission_expiring(expires_at: &str) -> SpendPermission {
        SpendPermission {
            id: "p1".into(),
            user_address: "0xabc".into(),
            spender_address: "0xdef".into(),
            token_address: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".into(),
            chain_id: BASE_CHAIN_ID,
            allowance_usdc: 1.0,
            period_days: 1,
            permission_data: None,
            expires_at: expires_at.into(),
            is_active: true,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_expiry_check() {
        let now = DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(permission_expiring("2026-01-01T23:59:59.000Z").is_expired(now));
        assert!(!permission_expiring("2026-01-02T00:00:00.000Z").is_expired(now));
        assert!(!permission_expiring("2026-01-03T00:00:00.000Z").is_expired(now));
        assert!(permission_expiring("not a date").is_expired(now));
    }

    #[test]
    fn test_format_usdc() {
        assert_eq!(format_usdc(1.0), "1");
        assert_eq!(format_usdc(2.5), "2.5");
    }

    #[test]
    fn test_status_wire_format() {
        let status = PermissionStatus {
            has_permission: false,
            permission: None,
            message: "No active spend permission".into(),
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["hasPermission"], false);
        assert!(v["permission"].is_null());
    }
}
