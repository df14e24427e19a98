//! The agent's own smart-account wallet. One row, created on first use.

use crate::db::DbPool;
use crate::types::*;
use crate::AppState;
use axum::{extract::State, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentWallet {
    pub wallet_id: String,
    pub smart_account_address: String,
}

/// Random 20-byte hex address. Stands in for the address a wallet provider
/// would assign.
pub fn random_address() -> String {
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for _ in 0..20 {
        out.push_str(&format!("{:02x}", fastrand::u8(..)));
    }
    out
}

pub async fn existing_wallet(pool: &DbPool) -> Result<Option<AgentWallet>> {
    let row = sqlx::query_as::<_, AgentWallet>(
        "SELECT wallet_id, smart_account_address FROM agent_wallets ORDER BY created_at LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns the stored wallet, creating it if none exists. The bool is true
/// when this call created it. Every row shares the unique `slot` 1, so
/// concurrent callers race on the insert and all read back the same row.
pub async fn get_or_create_wallet(pool: &DbPool) -> Result<(AgentWallet, bool)> {
    if let Some(wallet) = existing_wallet(pool).await? {
        tracing::info!(
            "Returning existing agent wallet: {}",
            wallet.smart_account_address
        );
        return Ok((wallet, false));
    }

    let candidate = AgentWallet {
        wallet_id: format!("wallet_{}", uuid::Uuid::new_v4()),
        smart_account_address: random_address(),
    };

    let inserted = sqlx::query(
        "INSERT INTO agent_wallets (wallet_id, smart_account_address) VALUES (?, ?) ON CONFLICT(slot) DO NOTHING",
    )
    .bind(&candidate.wallet_id)
    .bind(&candidate.smart_account_address)
    .execute(pool)
    .await?
    .rows_affected();

    let wallet = existing_wallet(pool)
        .await?
        .ok_or_else(|| AgentError::Internal("Agent wallet missing after insert".to_string()))?;
    let created = inserted == 1;
    if created {
        tracing::info!("Created new agent wallet: {}", wallet.smart_account_address);
    } else {
        tracing::info!("Lost wallet creation race, using {}", wallet.smart_account_address);
    }
    Ok((wallet, created))
}

async fn provision(state: &AppState) -> Result<(AgentWallet, bool)> {
    let cdp = state.credentials.cdp()?;
    tracing::debug!("Provisioning agent wallet with key {}", cdp.key_name);
    get_or_create_wallet(&state.db).await
}

pub async fn create_agent_wallet_handler(State(state): State<Arc<AppState>>) -> Response {
    match provision(&state).await {
        Ok((wallet, created)) => {
            let mut body = serde_json::json!({
                "walletId": wallet.wallet_id,
                "smartAccountAddress": wallet.smart_account_address,
            });
            if created {
                body["message"] = serde_json::json!(
                    "Agent wallet created. The smart-account address is a local placeholder until a wallet provider is wired in."
                );
            }
            Json(body).into_response()
        }
        Err(e) => {
            tracing::error!("Create wallet error: {}", e.inner);
            e.into_response()
        }
    }
}
