use chrono::{DateTime, Utc};
use log::debug;
use p2p_common::TokenAmount;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewUser, ReferralStats, ReferralTransactions, User},
    traits::ExchangeError,
};

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i64,
    wallet_address: String,
    referral_code: String,
    parent_ref: Option<String>,
    referral_earnings: TokenAmount,
    buy_referral_count: i64,
    buy_referral_volume: TokenAmount,
    buy_referral_earnings: TokenAmount,
    sell_referral_count: i64,
    sell_referral_volume: TokenAmount,
    sell_referral_earnings: TokenAmount,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            wallet_address: row.wallet_address,
            referral_code: row.referral_code,
            parent_ref: row.parent_ref,
            referral_earnings: row.referral_earnings,
            referral_transactions: ReferralTransactions {
                buy: ReferralStats {
                    count: row.buy_referral_count,
                    volume: row.buy_referral_volume,
                    earnings: row.buy_referral_earnings,
                },
                sell: ReferralStats {
                    count: row.sell_referral_count,
                    volume: row.sell_referral_volume,
                    earnings: row.sell_referral_earnings,
                },
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Inserts a new user. The referral link, if any, must already have been checked by the caller.
pub async fn insert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, ExchangeError> {
    let wallet = user.wallet_address.clone();
    let now = Utc::now();
    let row: UserRow = sqlx::query_as(
        r#"
            INSERT INTO users (wallet_address, referral_code, parent_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(user.wallet_address)
    .bind(user.referral_code)
    .bind(user.parent_ref)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ExchangeError::UserAlreadyExists(format!("wallet address or referral code ({wallet})"))
        },
        e => ExchangeError::from(e),
    })?;
    debug!("🗃️ User {} registered with id {}", row.wallet_address, row.id);
    Ok(row.into())
}

pub async fn fetch_user_by_wallet(wallet_address: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE wallet_address = $1")
        .bind(wallet_address)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(User::from))
}

pub async fn fetch_user_by_referral_code(
    referral_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE referral_code = $1")
        .bind(referral_code)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(User::from))
}
