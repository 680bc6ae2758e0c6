use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CommissionCredit, Role},
    traits::ExchangeError,
};

/// Writes the ledger row for a commission credit. Returns `false` if this (transaction, side) pair already has one.
pub async fn record_credit(credit: &CommissionCredit, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT OR IGNORE INTO commission_credits (transaction_id, side, referrer_code, volume, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(credit.transaction_id.as_str())
    .bind(credit.side.to_string())
    .bind(&credit.referrer_code)
    .bind(credit.volume.value())
    .bind(credit.amount.value())
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Adds the credit to the referrer's earnings and to the statistics for the side it was earned on.
pub async fn add_referral_earnings(credit: &CommissionCredit, conn: &mut SqliteConnection) -> Result<(), ExchangeError> {
    let sql = match credit.side {
        Role::Buyer => {
            r#"UPDATE users SET
                referral_earnings = referral_earnings + $1,
                buy_referral_count = buy_referral_count + 1,
                buy_referral_volume = buy_referral_volume + $2,
                buy_referral_earnings = buy_referral_earnings + $1,
                updated_at = $3
            WHERE referral_code = $4"#
        },
        Role::Seller => {
            r#"UPDATE users SET
                referral_earnings = referral_earnings + $1,
                sell_referral_count = sell_referral_count + 1,
                sell_referral_volume = sell_referral_volume + $2,
                sell_referral_earnings = sell_referral_earnings + $1,
                updated_at = $3
            WHERE referral_code = $4"#
        },
    };
    let result = sqlx::query(sql)
        .bind(credit.amount.value())
        .bind(credit.volume.value())
        .bind(Utc::now())
        .bind(&credit.referrer_code)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ExchangeError::UserNotFound(credit.referrer_code.clone()));
    }
    trace!("🗃️🤝️ {} credited to referrer {} for {}", credit.amount, credit.referrer_code, credit.transaction_id);
    Ok(())
}
