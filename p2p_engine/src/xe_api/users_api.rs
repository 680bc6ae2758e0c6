//! Registration and lookup of exchange users and their referral statistics.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewUser, User},
    traits::{ExchangeError, UserManagement},
};

pub struct UsersApi<B> {
    db: B,
}

impl<B: Debug> Debug for UsersApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UsersApi ({:?})", self.db)
    }
}

impl<B> UsersApi<B>
where B: UserManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Registers a new user. If `parent_ref` is given, the user is linked to that referrer for good.
    pub async fn register(&self, user: NewUser) -> Result<User, ExchangeError> {
        if user.wallet_address.trim().is_empty() || user.referral_code.trim().is_empty() {
            return Err(ExchangeError::InvalidOrder("A wallet address and a referral code are required".into()));
        }
        let user = self.db.register_user(user).await?;
        match &user.parent_ref {
            Some(parent) => info!("🤝️ User {} registered, referred by {parent}", user.wallet_address),
            None => info!("🤝️ User {} registered", user.wallet_address),
        }
        Ok(user)
    }

    pub async fn user_by_wallet(&self, wallet_address: &str) -> Result<User, ExchangeError> {
        trace!("🤝️ Fetching user {wallet_address}");
        self.db
            .fetch_user_by_wallet(wallet_address)
            .await?
            .ok_or_else(|| ExchangeError::UserNotFound(wallet_address.to_string()))
    }

    pub async fn user_by_referral_code(&self, referral_code: &str) -> Result<User, ExchangeError> {
        self.db
            .fetch_user_by_referral_code(referral_code)
            .await?
            .ok_or_else(|| ExchangeError::UserNotFound(format!("referral code {referral_code}")))
    }
}
