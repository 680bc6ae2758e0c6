use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use p2p_engine::{ExchangeError, PaymentRailError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Could not read request query: {0}")]
    InvalidQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    ExchangeError(#[from] ExchangeError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExchangeError(e) => exchange_error_status(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn exchange_error_status(e: &ExchangeError) -> StatusCode {
    use ExchangeError::*;
    match e {
        OrderNotFound(_) | TransactionNotFound(_) | UserNotFound(_) => StatusCode::NOT_FOUND,
        InvalidOrder(_) | InvalidRateMapping(_) | InvalidReferral(_) => StatusCode::BAD_REQUEST,
        ForbiddenUpdate(_) => StatusCode::FORBIDDEN,
        CapacityExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OutOfOrder(_) | ExpiryWindowElapsed(_) | ConcurrentModification(_) | OrderInUse(_) | UserAlreadyExists(_) => {
            StatusCode::CONFLICT
        },
        PaymentRailFailure(PaymentRailError::NetworkTimeout) => StatusCode::GATEWAY_TIMEOUT,
        PaymentRailFailure(_) => StatusCode::BAD_GATEWAY,
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod test {
    use p2p_engine::db_types::{OrderId, TransactionId};

    use super::*;

    #[test]
    fn exchange_errors_map_to_status_codes() {
        let status = |e: ExchangeError| ServerError::from(e).status_code();
        assert_eq!(status(ExchangeError::OrderNotFound(OrderId::from("SELL_1"))), StatusCode::NOT_FOUND);
        assert_eq!(status(ExchangeError::CapacityExceeded("full".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(ExchangeError::ExpiryWindowElapsed(TransactionId::from("TX_1"))), StatusCode::CONFLICT);
        assert_eq!(status(ExchangeError::InvalidRateMapping("TH".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(PaymentRailError::NetworkTimeout.into()), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status(PaymentRailError::Rejected("no".into()).into()), StatusCode::BAD_GATEWAY);
        assert_eq!(status(ExchangeError::DatabaseError("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
