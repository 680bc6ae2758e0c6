use crate::{
    db_types::{NewUser, User},
    traits::ExchangeError,
};

/// Registration and lookup of users, and the referral tree that links them.
#[allow(async_fn_in_trait)]
pub trait UserManagement {
    /// Creates a new user.
    ///
    /// If `parent_ref` is given, it must be the referral code of another, existing user. The link is made once, here,
    /// and never changes afterwards.
    ///
    /// Fails with [`ExchangeError::UserAlreadyExists`] if the wallet address or the referral code is taken.
    async fn register_user(&self, user: NewUser) -> Result<User, ExchangeError>;

    async fn fetch_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, ExchangeError>;

    async fn fetch_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, ExchangeError>;
}
