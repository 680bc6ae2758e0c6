mod amounts;

pub mod helpers;
pub mod op;

pub use amounts::{AmountConversionError, FiatAmount, TokenAmount, FIAT_DECIMALS, TOKEN_DECIMALS};
