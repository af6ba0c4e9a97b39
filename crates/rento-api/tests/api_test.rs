//! HTTP-level tests against the in-memory store
//!
//! The clock is fixed at 08:00 local (UTC+5) on 2026-05-04.

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rento_api::{configure_routes, AppState};
use rento_auth::{JwtService, WebhookVerifier, SIGNATURE_HEADER};
use rento_core::{
    config::{BookingConfig, GatewayConfig},
    models::{Apartment, ApartmentStatus, UserRole},
    traits::{ApartmentRepository, PaymentGateway, PaymentStatus},
    AppError, AppResult, FixedClock, OperatingHours,
};
use rento_db::{MemoryStore, Stores};
use rento_gateways::{LogNotificationSink, SimulatedLockVendor};
use rento_services::{
    AvailabilityEngine, BookingService, EventDispatcher, InlinePublisher, LockAccessService,
    PricingEngine,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const WEBHOOK_SECRET: &str = "vendor-signing-secret";
const OWNER: i64 = 100;
const RENTER: i64 = 200;

#[derive(Default)]
struct ScriptedPayments {
    payments: Mutex<HashMap<String, PaymentStatus>>,
    down: AtomicBool,
}

impl ScriptedPayments {
    fn confirm(&self, order_id: &str, payment_id: &str, amount: Decimal) {
        let status = PaymentStatus {
            payment_id: payment_id.to_string(),
            order_id: Some(order_id.to_string()),
            amount,
            confirmed: true,
        };
        let mut payments = self.payments.lock();
        payments.insert(order_id.to_string(), status.clone());
        payments.insert(payment_id.to_string(), status);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedPayments {
    async fn check_status(&self, reference: &str) -> AppResult<PaymentStatus> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::Dependency("provider unreachable".into()));
        }
        self.payments
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("payment {}", reference)))
    }
}

struct TestContext {
    state: AppState,
    store: MemoryStore,
    hours: OperatingHours,
    payments: Arc<ScriptedPayments>,
    jwt: Arc<JwtService>,
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
}

impl TestContext {
    fn new() -> Self {
        let config = BookingConfig {
            timezone: "Etc/GMT-5".to_string(),
            ..BookingConfig::default()
        };
        let gateways = GatewayConfig {
            timeout_ms: 200,
            retry_attempts: 1,
            ..GatewayConfig::default()
        };
        let hours = OperatingHours::from_config(&config).unwrap();
        let clock = Arc::new(FixedClock::new(hours.at(day(), 8).unwrap()));

        let store = MemoryStore::new();
        let stores = Stores::memory(&store);
        let payments = Arc::new(ScriptedPayments::default());

        let lock_access = Arc::new(LockAccessService::new(
            &stores,
            Arc::new(SimulatedLockVendor::default()),
            clock.clone(),
            &config,
            &gateways,
        ));
        let dispatcher = Arc::new(
            EventDispatcher::new(lock_access.clone(), Arc::new(LogNotificationSink))
                .with_retry(1, std::time::Duration::from_millis(1)),
        );
        let pricing = Arc::new(PricingEngine::new(
            stores.settings.clone(),
            hours.clone(),
            &config,
        ));
        let availability = Arc::new(AvailabilityEngine::new(
            stores.apartments.clone(),
            stores.bookings.clone(),
            clock.clone(),
            hours.clone(),
            &config,
        ));
        let bookings = Arc::new(BookingService::new(
            &stores,
            pricing.clone(),
            availability.clone(),
            payments.clone(),
            Arc::new(InlinePublisher::new(dispatcher)),
            clock.clone(),
            &config,
            &gateways,
        ));

        Self {
            state: AppState {
                bookings,
                availability,
                pricing,
                lock_access,
                clock,
                webhooks: WebhookVerifier::new(Some(WEBHOOK_SECRET)),
            },
            store,
            hours,
            payments,
            jwt: Arc::new(JwtService::new("test-secret-key-12345", 3600)),
        }
    }

    fn local(&self, hour: u32) -> DateTime<Utc> {
        self.hours.at(day(), hour).unwrap()
    }

    fn bearer(&self, user_id: i64, role: UserRole) -> (&'static str, String) {
        let token = self.jwt.create_token_for_user(user_id, role).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    async fn seed_apartment(&self) -> Apartment {
        let now = self.local(0);
        self.store
            .apartments()
            .create(&Apartment {
                id: 0,
                owner_id: OWNER,
                title: "Loft near Green Bazaar".to_string(),
                rental_type_hourly: true,
                rental_type_daily: false,
                hourly_price: dec!(5000),
                daily_price: dec!(0),
                is_free: true,
                status: ApartmentStatus::Approved,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }
}

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.state.clone()))
                .app_data(web::Data::new($ctx.jwt.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_health() {
    let ctx = TestContext::new();
    let app = app!(ctx);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_rt::test]
async fn test_booking_paid_through_callback() {
    let ctx = TestContext::new();
    let apartment = ctx.seed_apartment().await;
    let app = app!(ctx);
    let renter = ctx.bearer(RENTER, UserRole::Renter);

    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(renter.clone())
        .set_json(json!({
            "apartment_id": apartment.id,
            "start_date": ctx.local(12),
            "duration": 2,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["status"], "created");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/bookings/{}/confirm", id))
        .insert_header(renter.clone())
        .to_request();
    let confirmed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(confirmed["data"]["status"], "awaiting_payment");

    let number = confirmed["data"]["booking_number"].as_str().unwrap().to_string();
    let price: Decimal = confirmed["data"]["final_price"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(price, dec!(11000));
    ctx.payments.confirm(&number, "pay-77", price);

    let callback = || {
        test::TestRequest::post()
            .uri("/api/v1/payments/callback")
            .set_json(json!({ "order_id": number }))
            .to_request()
    };
    let first: Value = test::call_and_read_body_json(&app, callback()).await;
    assert_eq!(first["status"], "processed");
    assert_eq!(first["outcome"]["kind"], "booking");

    let replay = test::call_service(&app, callback()).await;
    assert_eq!(replay.status(), StatusCode::OK);
    let replay: Value = test::read_body_json(replay).await;
    assert_eq!(replay["status"], "ignored");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/bookings/{}", id))
        .insert_header(renter)
        .to_request();
    let fetched: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched["data"]["status"], "approved");
    assert_eq!(fetched["data"]["payment_id"], "pay-77");
}

#[actix_rt::test]
async fn test_taken_slot_is_a_conflict() {
    let ctx = TestContext::new();
    let apartment = ctx.seed_apartment().await;
    let app = app!(ctx);

    for (renter, expected) in [(RENTER, StatusCode::OK), (RENTER + 1, StatusCode::CONFLICT)] {
        let auth = ctx.bearer(renter, UserRole::Renter);
        let req = test::TestRequest::post()
            .uri("/api/v1/bookings")
            .insert_header(auth.clone())
            .set_json(json!({
                "apartment_id": apartment.id,
                "start_date": ctx.local(12),
                "duration": 3,
            }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["data"]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/bookings/{}/confirm", id))
            .insert_header(auth)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected);
        if expected == StatusCode::CONFLICT {
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "slot_unavailable");
            assert_eq!(body["kind"], "conflict");
        }
    }
}

#[actix_rt::test]
async fn test_payment_provider_outage_is_retryable() {
    let ctx = TestContext::new();
    let app = app!(ctx);
    ctx.payments.down.store(true, Ordering::SeqCst);

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/callback")
        .set_json(json!({ "payment_id": "pay-unknown" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_rt::test]
async fn test_authentication_and_roles() {
    let ctx = TestContext::new();
    let apartment = ctx.seed_apartment().await;
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .set_json(json!({
            "apartment_id": apartment.id,
            "start_date": ctx.local(12),
            "duration": 2,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/locks/lock-1/emergency-reset")
        .insert_header(ctx.bearer(RENTER, UserRole::Renter))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn test_public_availability_views() {
    let ctx = TestContext::new();
    let apartment = ctx.seed_apartment().await;
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/apartments/{}/slots?date=2026-05-04&duration=2",
            apartment.id
        ))
        .to_request();
    let slots: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(slots["data"].as_array().unwrap().len(), 11);

    let start = ctx.local(10).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/apartments/{}/price?start={}&duration=6",
            apartment.id, start
        ))
        .to_request();
    let quote: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(quote["data"]["discount_percent"], 10);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/apartments/{}/slots?date=someday&duration=2",
            apartment.id
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_query");
}

#[actix_rt::test]
async fn test_webhook_requires_valid_signature() {
    let ctx = TestContext::new();
    let app = app!(ctx);
    let body = json!({ "devId": "lock-404", "bizCode": "online" }).to_string();

    let unsigned = test::TestRequest::post()
        .uri("/api/v1/locks/webhook")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.clone())
        .to_request();
    assert_eq!(test::call_service(&app, unsigned).await.status(), StatusCode::UNAUTHORIZED);

    let forged = WebhookVerifier::new(Some("guessed-secret")).sign(body.as_bytes()).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/locks/webhook")
        .insert_header((SIGNATURE_HEADER, forged))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_webhook_for_unknown_lock() {
    let ctx = TestContext::new();
    let app = app!(ctx);
    let body = json!({ "devId": "lock-404", "bizCode": "online" }).to_string();
    let signature = WebhookVerifier::new(Some(WEBHOOK_SECRET))
        .sign(body.as_bytes())
        .unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/locks/webhook")
        .insert_header((SIGNATURE_HEADER, format!("sha256={}", signature)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
