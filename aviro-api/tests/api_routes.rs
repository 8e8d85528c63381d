use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use aviro_api::{app, AppState};
use aviro_booking::{
    BookingLifecycle, LifecycleConfig, MockAirlineProvider, ReconciliationEngine,
};
use aviro_core::notify::NoopMailer;
use aviro_core::{Addon, Coupon, Flight, FlightOffer, Money, Seat, SeatMap};
use aviro_inventory::{MemorySeatMapStore, SeatInventory};
use aviro_payments::{GatewayConfig, MockProcessor, PaymentGateway};
use aviro_pricing::{PricingEngine, PricingPolicy};
use aviro_store::memory::{
    MemoryAddonRepository, MemoryBookingRepository, MemoryCouponRepository,
    MemoryFlightRepository, MemoryIdempotencyRepository, MemoryReconciliationLogRepository,
};

struct TestEnv {
    router: Router,
    seat_maps: Arc<MemorySeatMapStore>,
    coupons: Arc<MemoryCouponRepository>,
    addons: Arc<MemoryAddonRepository>,
    flights: Arc<MemoryFlightRepository>,
    processor: Arc<MockProcessor>,
    provider: Arc<MockAirlineProvider>,
}

fn env() -> TestEnv {
    let bookings = Arc::new(MemoryBookingRepository::new());
    let seat_maps = Arc::new(MemorySeatMapStore::new());
    let idempotency = Arc::new(MemoryIdempotencyRepository::new());
    let coupons = Arc::new(MemoryCouponRepository::new());
    let addons = Arc::new(MemoryAddonRepository::new());
    let flights = Arc::new(MemoryFlightRepository::new());
    let logs = Arc::new(MemoryReconciliationLogRepository::new());
    let processor = Arc::new(MockProcessor::new());
    let provider = Arc::new(MockAirlineProvider::new());
    let mailer = Arc::new(NoopMailer);

    let inventory = Arc::new(SeatInventory::new(seat_maps.clone()));
    let gateway = Arc::new(PaymentGateway::new(
        processor.clone(),
        bookings.clone(),
        mailer.clone(),
        GatewayConfig {
            webhook_secret: None,
            success_url: "https://shop.test/success".into(),
            cancel_url: "https://shop.test/cancel".into(),
        },
    ));
    let lifecycle = Arc::new(BookingLifecycle::new(
        bookings.clone(),
        idempotency,
        coupons.clone(),
        addons.clone(),
        flights.clone(),
        inventory.clone(),
        PricingEngine::new(PricingPolicy::default()),
        gateway.clone(),
        provider.clone(),
        mailer.clone(),
        LifecycleConfig::default(),
    ));
    let reconciler = Arc::new(ReconciliationEngine::new(
        bookings,
        processor.clone(),
        gateway.clone(),
        inventory.clone(),
        provider.clone(),
        mailer,
        logs,
    ));

    let state = AppState {
        lifecycle,
        gateway,
        inventory,
        reconciler,
        flights: flights.clone(),
        provider: provider.clone(),
        hold_minutes: 10,
    };

    TestEnv {
        router: app(state),
        seat_maps,
        coupons,
        addons,
        flights,
        processor,
        provider,
    }
}

fn priced_seat(id: &str, price: i64) -> Seat {
    let mut seat = Seat::free(id);
    seat.price = Some(price);
    seat
}

fn seed_standard_map(env: &TestEnv) {
    env.seat_maps.seed(SeatMap::new(
        "FL-100",
        vec![priced_seat("12A", 1_000), priced_seat("12B", 1_200)],
    ));
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

#[tokio::test]
async fn health_endpoint_responds() {
    let env = env();
    let (status, body) = send(&env.router, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn seat_hold_conflict_and_confirm_over_http() {
    let env = env();
    seed_standard_map(&env);

    let hold = json!({ "seat_ids": ["12A"], "holder": "alice" });
    let (status, body) = send(&env.router, "POST", "/seats/FL-100/hold", Some(hold.clone()), &[]).await;
    assert_eq!(status, StatusCode::OK);
    let seat = body["seats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "12A")
        .unwrap();
    assert_eq!(seat["state"], "HELD");

    let rival = json!({ "seat_ids": ["12A"], "holder": "bob" });
    let (status, _) = send(&env.router, "POST", "/seats/FL-100/hold", Some(rival), &[]).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let confirm = json!({ "seat_ids": ["12A"], "holder": "alice" });
    let (status, body) = send(&env.router, "POST", "/seats/FL-100/confirm", Some(confirm), &[]).await;
    assert_eq!(status, StatusCode::OK);
    let seat = body["seats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "12A")
        .unwrap();
    assert_eq!(seat["state"], "BOOKED");
}

#[tokio::test]
async fn unknown_seat_map_is_not_found() {
    let env = env();
    let (status, _) = send(&env.router, "GET", "/seats/NOPE", None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_booking_prices_on_the_server() {
    let env = env();
    seed_standard_map(&env);
    env.addons.seed(Addon::new("BAG20", "Extra bag", 300));
    let mut coupon = Coupon::percent_off("SAVE10", 10);
    coupon.cap_amount = Some(500);
    env.coupons.seed(coupon);

    let payload = json!({
        "user_id": "user-1",
        "flight_id": "FL-100",
        "passengers": [
            { "first_name": "Ada", "last_name": "Lovelace" }
        ],
        "seats": [
            { "seat_id": "12A", "price_hint": 1 },
            { "seat_id": "12B" }
        ],
        "addons": [{ "code": "BAG20", "qty": 1 }],
        "coupons": ["SAVE10"]
    });
    let (status, body) = send(&env.router, "POST", "/bookings", Some(payload), &[]).await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(body["status"], "PENDING_PAYMENT");
    assert_eq!(body["passengers"][0]["first_name"], "Ada");
    assert_eq!(body["price"]["seats_total"], 2_200);
    assert_eq!(body["price"]["addons_total"], 300);
    assert_eq!(body["price"]["discount_total"], 220);
    assert_eq!(body["price"]["taxable"], 2_280);
    assert_eq!(body["price"]["tax"], 114);
    assert_eq!(body["price"]["amount"], 2_394);

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = send(&env.router, "GET", &format!("/bookings/{id}"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["booking_ref"], body["booking_ref"]);

    let (status, list) = send(&env.router, "GET", "/bookings/by-user/user-1", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_booking_without_seats_is_rejected() {
    let env = env();
    let payload = json!({
        "user_id": "user-1",
        "flight_id": "FL-100",
        "seats": []
    });
    let (status, body) = send(&env.router, "POST", "/bookings", Some(payload), &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("seat"));
}

#[tokio::test]
async fn idempotency_key_replays_the_original_booking() {
    let env = env();
    seed_standard_map(&env);

    let payload = json!({
        "user_id": "user-1",
        "flight_id": "FL-100",
        "seats": [{ "seat_id": "12A" }]
    });
    let headers = [("idempotency-key", "req-777")];
    let (status, first) =
        send(&env.router, "POST", "/bookings", Some(payload.clone()), &headers).await;
    assert_eq!(status, StatusCode::CREATED);

    // A retry with the same key must not double-book the seat.
    let (status, second) = send(&env.router, "POST", "/bookings", Some(payload), &headers).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn cancel_flags_are_honored_over_http() {
    let env = env();
    seed_standard_map(&env);

    let payload = json!({
        "user_id": "user-1",
        "flight_id": "FL-100",
        "seats": [{ "seat_id": "12A" }]
    });
    let (_, booking) = send(&env.router, "POST", "/bookings", Some(payload), &[]).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let cancel = json!({ "reason": "schedule change", "restore_inventory": false });
    let (status, cancelled) = send(
        &env.router,
        "POST",
        &format!("/bookings/{id}/cancel"),
        Some(cancel),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    // The seat was deliberately not restored.
    let (_, map) = send(&env.router, "GET", "/seats/FL-100", None, &[]).await;
    let seat = map["seats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "12A")
        .unwrap();
    assert_eq!(seat["state"], "BOOKED");
}

#[tokio::test]
async fn checkout_session_then_webhook_marks_booking_paid() {
    let env = env();
    seed_standard_map(&env);

    let payload = json!({
        "user_id": "user-1",
        "flight_id": "FL-100",
        "seats": [{ "seat_id": "12A" }]
    });
    let (_, booking) = send(&env.router, "POST", "/bookings", Some(payload), &[]).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let session_req = json!({ "booking_id": booking_id, "amount": 1 });
    let (status, session) = send(
        &env.router,
        "POST",
        "/payments/create-checkout-session",
        Some(session_req),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = session["id"].as_str().unwrap().to_string();

    env.processor.mark_paid(&session_id);
    let intent = env.processor.payment_intent_for(&session_id).unwrap();
    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "payment_intent": intent } }
    });
    let (status, ack) = send(&env.router, "POST", "/payments/webhook", Some(event), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);

    let (_, fetched) =
        send(&env.router, "GET", &format!("/bookings/{booking_id}"), None, &[]).await;
    assert_eq!(fetched["status"], "PAID");
}

#[tokio::test]
async fn refund_of_unknown_booking_is_not_found() {
    let env = env();
    let payload = json!({ "booking_id": Uuid::new_v4() });
    let (status, _) = send(&env.router, "POST", "/payments/refund", Some(payload), &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn flight_search_falls_back_to_local_inventory() {
    let env = env();
    let departure = Utc::now() + Duration::days(7);
    env.flights.seed(Flight {
        id: Uuid::new_v4(),
        provider: "manual".into(),
        airline: "QF".into(),
        flight_number: "QF400".into(),
        origin: "SYD".into(),
        destination: "MEL".into(),
        departure_at: departure,
        arrival_at: departure + Duration::hours(2),
        price: Money::new(180, "usd"),
        seats_available: 120,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });

    let uri = format!(
        "/flights/search?origin=SYD&destination=MEL&date={}",
        departure.date_naive()
    );
    let (status, body) = send(&env.router, "GET", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "local");
    assert_eq!(body["offers"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &env.router,
        "GET",
        "/flights/search?origin=SYD&destination=PER&date=2026-09-01",
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["diagnostics"].as_array().is_some());
}

#[tokio::test]
async fn revalidate_reprices_a_known_offer() {
    let env = env();
    let departure = Utc::now() + Duration::days(7);
    env.provider.set_offers(vec![FlightOffer {
        provider: "mock".into(),
        offer_id: "OF-1".into(),
        airline: "QF".into(),
        flight_number: "QF400".into(),
        origin: "SYD".into(),
        destination: "MEL".into(),
        departure_at: departure,
        arrival_at: departure + Duration::hours(2),
        price: Money::new(180, "usd"),
        raw: None,
    }]);

    let (status, body) = send(&env.router, "GET", "/flights/revalidate/OF-1", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offer"]["offer_id"], "OF-1");

    let (status, _) = send(&env.router, "GET", "/flights/revalidate/GONE", None, &[]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn manual_reconcile_endpoint_reports_a_run() {
    let env = env();
    let payload = json!({ "dry_run": true, "limit": 10 });
    let (status, body) = send(&env.router, "POST", "/admin/reconcile", Some(payload), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["run_by"], "manual");
}
