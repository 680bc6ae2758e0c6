use actix_web::{http::StatusCode, test::TestRequest, web};
use p2p_engine::{traits::ExchangeError, UsersApi};
use serde_json::{json, Value};

use super::{
    helpers::{send_request, user},
    mocks::MockExchange,
};
use crate::routes::{RegisterUserRoute, UserByReferralCodeRoute, UserByWalletRoute};

fn configure(db: MockExchange) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.service(RegisterUserRoute::<MockExchange>::new())
            .service(UserByWalletRoute::<MockExchange>::new())
            .service(UserByReferralCodeRoute::<MockExchange>::new())
            .app_data(web::Data::new(UsersApi::new(db)));
    }
}

#[actix_web::test]
async fn register_a_referred_user() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_register_user().withf(|u| u.parent_ref.as_deref() == Some("ALICE01")).times(1).returning(|u| {
        let mut result = user(&u.wallet_address, &u.referral_code);
        result.parent_ref = u.parent_ref;
        Ok(result)
    });
    let body = json!({"wallet_address": "TBob", "referral_code": "BOB01", "parent_ref": "ALICE01"});
    let (status, body) = send_request(TestRequest::post().uri("/users").set_json(body), configure(db)).await;
    assert_eq!(status, StatusCode::CREATED);
    let user: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(user["parent_ref"], "ALICE01");
    assert_eq!(user["referral_transactions"]["buy"]["count"], 0);
}

#[actix_web::test]
async fn duplicate_registration() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_register_user().returning(|_| Err(ExchangeError::UserAlreadyExists("wallet address".into())));
    let body = json!({"wallet_address": "TBob", "referral_code": "BOB01"});
    let (status, body) = send_request(TestRequest::post().uri("/users").set_json(body), configure(db)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, r#"{"error":"A user with this wallet address already exists"}"#);
}

#[actix_web::test]
async fn registration_needs_a_referral_code() {
    let _ = env_logger::try_init().ok();
    let body = json!({"wallet_address": "TBob", "referral_code": " "});
    let (status, _) = send_request(TestRequest::post().uri("/users").set_json(body), configure(MockExchange::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn fetch_users() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_user_by_wallet().returning(|w| Ok((w == "TAlice").then(|| user("TAlice", "ALICE01"))));
    db.expect_fetch_user_by_referral_code().returning(|c| Ok((c == "ALICE01").then(|| user("TAlice", "ALICE01"))));
    let (status, body) = send_request(TestRequest::get().uri("/users/TAlice"), configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let found: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(found["referral_code"], "ALICE01");

    let mut db = MockExchange::new();
    db.expect_fetch_user_by_wallet().returning(|_| Ok(None));
    let (status, _) = send_request(TestRequest::get().uri("/users/TNobody"), configure(db)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut db = MockExchange::new();
    db.expect_fetch_user_by_referral_code().returning(|c| Ok((c == "ALICE01").then(|| user("TAlice", "ALICE01"))));
    let (status, body) = send_request(TestRequest::get().uri("/users?referral_code=ALICE01"), configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let found: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(found["wallet_address"], "TAlice");
}
