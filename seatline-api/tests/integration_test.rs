use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use seatline_api::middleware::CustomerClaims;
use seatline_api::state::{AppState, AuthConfig};
use seatline_api::app;
use seatline_booking::gateways::signature;
use seatline_booking::{
    BookingOrchestrator, BookingRules, GatewayRegistry, PaymentReconciler, PaymentUrls, Repositories,
    SeatBroadcaster,
};
use seatline_core::repository::SeatStore;
use seatline_core::trip::{Trip, TripStatus};
use seatline_store::app_config::{BusinessRules, MomoConfig, PaymentsConfig};
use seatline_store::memory::{
    MemoryBookingRepository, MemoryCache, MemoryPaymentRepository, MemorySeatStore, MemoryTicketRepository,
    MemoryTripRepository,
};

const JWT_SECRET: &str = "test-secret";
const MOMO_SECRET: &str = "momo-secret";

struct TestApp {
    router: Router,
    trip_id: Uuid,
}

async fn test_app(rules: BusinessRules) -> TestApp {
    let cache = Arc::new(MemoryCache::new());
    let seats = Arc::new(MemorySeatStore::new());
    let trips = Arc::new(MemoryTripRepository::new());

    let departure = Utc::now() + Duration::days(2);
    let trip = Trip {
        id: Uuid::new_v4(),
        route_id: Uuid::new_v4(),
        bus_id: Uuid::new_v4(),
        departure_time: departure,
        arrival_time: departure + Duration::hours(8),
        price: 200_000,
        status: TripStatus::Scheduled,
    };
    let trip_id = trip.id;
    trips.insert(trip).await;
    let labels: Vec<String> = ["A1", "A2", "A3"].iter().map(|s| s.to_string()).collect();
    seats.initialize_seats(trip_id, &labels).await.unwrap();

    let repos = Repositories {
        trips,
        seats,
        bookings: Arc::new(MemoryBookingRepository::new()),
        payments: Arc::new(MemoryPaymentRepository::new()),
        tickets: Arc::new(MemoryTicketRepository::new()),
    };
    let orchestrator = Arc::new(BookingOrchestrator::new(
        repos.clone(),
        cache.clone(),
        BookingRules::from_config(&rules, "VND"),
    ));

    let payments = PaymentsConfig {
        currency: "VND".to_string(),
        return_url_base: "http://localhost:3000".to_string(),
        webhook_url_base: "http://localhost:8080".to_string(),
        momo: Some(MomoConfig {
            partner_code: "MOMOTEST".to_string(),
            access_key: "momo-access".to_string(),
            secret_key: MOMO_SECRET.to_string(),
            sandbox: false,
        }),
        zalopay: None,
        payos: None,
    };
    let reconciler = Arc::new(PaymentReconciler::new(
        repos.payments.clone(),
        Arc::new(GatewayRegistry::from_config(&payments)),
        orchestrator.clone(),
        PaymentUrls {
            return_url_base: payments.return_url_base.clone(),
            webhook_url_base: payments.webhook_url_base.clone(),
        },
    ));

    let state = AppState {
        orchestrator,
        reconciler,
        broadcaster: SeatBroadcaster::new(cache.clone(), rules.viewer_buffer),
        rate_limiter: cache,
        auth: AuthConfig { secret: JWT_SECRET.to_string() },
        business_rules: rules,
    };

    let router = app(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    TestApp { router, trip_id }
}

fn user_token(user_id: Uuid) -> String {
    let claims = CustomerClaims {
        sub: user_id.to_string(),
        email: Some("rider@example.com".to_string()),
        role: Some("CUSTOMER".to_string()),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn post_json(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

fn booking_body(trip_id: Uuid, seats: &[&str]) -> Value {
    json!({
        "trip_id": trip_id,
        "seat_numbers": seats,
        "contact": { "name": "Tran Thi B", "email": "b@example.com", "phone": "0911111111" }
    })
}

#[tokio::test]
async fn test_health() {
    let t = test_app(BusinessRules::default()).await;
    let (status, body) = send(&t.router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_anonymous_booking_mints_session() {
    let t = test_app(BusinessRules::default()).await;
    let body = booking_body(t.trip_id, &["A1", "A2"]);

    let (status, created) = send(
        &t.router,
        post_json("/v1/bookings").body(Body::from(body.to_string())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["total_price"], 400_000);
    assert_eq!(created["holder"]["kind"], "session");
    let session = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(created["holder"]["id"], session.as_str());

    let id = created["id"].as_str().unwrap();

    // The minted session reads its own booking
    let (status, fetched) = send(
        &t.router,
        Request::get(format!("/v1/bookings/{}", id))
            .header("X-Session-Id", &session)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);
    assert!(fetched.get("session_id").is_none());

    // Anyone else is turned away
    let (status, _) = send(
        &t.router,
        Request::get(format!("/v1/bookings/{}", id))
            .header("X-Session-Id", "someone-else")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &t.router,
        Request::get(format!("/v1/bookings/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_seat_conflict_and_seat_map() {
    let t = test_app(BusinessRules::default()).await;
    let body = booking_body(t.trip_id, &["A1"]);

    let (status, _) = send(
        &t.router,
        post_json("/v1/bookings").body(Body::from(body.to_string())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = send(
        &t.router,
        post_json("/v1/bookings").body(Body::from(body.to_string())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["error"].as_str().unwrap().contains("A1"));

    let (status, map) = send(
        &t.router,
        Request::get(format!("/v1/trips/{}/seats", t.trip_id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let seats = map["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 3);
    let a1 = seats.iter().find(|s| s["seat_number"] == "A1").unwrap();
    assert_eq!(a1["status"], "locked");

    let (status, _) = send(
        &t.router,
        Request::get(format!("/v1/trips/{}/seats", Uuid::new_v4())).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected() {
    let t = test_app(BusinessRules::default()).await;
    let body = booking_body(t.trip_id, &["A1"]);

    let (status, error) = send(
        &t.router,
        post_json("/v1/bookings")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(error["error"].is_string());

    let forged = {
        let claims = CustomerClaims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            role: None,
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"wrong-secret")).unwrap()
    };
    let (status, _) = send(
        &t.router,
        post_json("/v1/bookings")
            .header(header::AUTHORIZATION, format!("Bearer {}", forged))
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_listing_requires_a_user() {
    let t = test_app(BusinessRules::default()).await;
    let (status, _) = send(
        &t.router,
        Request::get("/v1/bookings").header("X-Session-Id", "abc").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cancel_then_cancel_again() {
    let t = test_app(BusinessRules::default()).await;
    let token = user_token(Uuid::new_v4());
    let body = booking_body(t.trip_id, &["A3"]);

    let (_, created) = send(
        &t.router,
        post_json("/v1/bookings")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(created["holder"]["kind"], "user");
    let id = created["id"].as_str().unwrap();

    let cancel = || {
        Request::post(format!("/v1/bookings/{}/cancel", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let (status, cancelled) = send(&t.router, cancel()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = send(&t.router, cancel()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_pay_confirm_and_board() {
    let t = test_app(BusinessRules::default()).await;
    let user_id = Uuid::new_v4();
    let bearer = format!("Bearer {}", user_token(user_id));

    // 1. Book two seats as a signed-in user
    let body = booking_body(t.trip_id, &["A1", "A2"]);
    let (status, booking) = send(
        &t.router,
        post_json("/v1/bookings")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(booking.get("session_id").is_none());
    let booking_id = booking["id"].as_str().unwrap().to_string();

    // 2. Open a MoMo payment
    let body = json!({ "booking_id": booking_id, "gateway": "momo" });
    let (status, session) = send(
        &t.router,
        post_json("/v1/payments")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["payment"]["status"], "pending");
    assert!(session["payment_url"].as_str().unwrap().contains(&booking_id));
    let payment_id = session["payment"]["id"].as_str().unwrap().to_string();
    let gateway_payment_id = session["payment"]["gateway_payment_id"].as_str().unwrap().to_string();

    // A live account cannot be polled into completion before the gateway calls back
    let (status, polled) = send(
        &t.router,
        Request::get(format!("/v1/payments/{}", payment_id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["status"], "pending");

    // 3. Gateway calls back
    let payload = json!({
        "gateway_payment_id": gateway_payment_id,
        "status": "success",
        "transaction_id": "MOMO-1",
        "amount": 400_000,
    })
    .to_string();
    let sig = signature::sign(MOMO_SECRET, payload.as_bytes()).unwrap();
    let (status, ack) = send(
        &t.router,
        Request::post("/v1/webhooks/momo")
            .header("X-Signature", sig)
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "status": "success" }));

    let (status, payment) = send(
        &t.router,
        Request::get(format!("/v1/payments/{}", payment_id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "completed");

    // 4. Confirm and collect tickets
    let body = json!({ "payment_id": payment_id });
    let (status, confirmed) = send(
        &t.router,
        post_json(&format!("/v1/bookings/{}/confirm", booking_id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["booking"]["status"], "confirmed");
    let tickets = confirmed["tickets"].as_array().unwrap();
    assert_eq!(tickets.len(), 2);
    let code = tickets[0]["ticket_code"].as_str().unwrap().to_string();

    let (status, listed) = send(
        &t.router,
        Request::get(format!("/v1/bookings/{}/tickets", booking_id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let (status, mine) = send(
        &t.router,
        Request::get("/v1/bookings").header(header::AUTHORIZATION, &bearer).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    // 5. Board once
    let (status, ticket) = send(
        &t.router,
        Request::get(format!("/v1/tickets/{}", code)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ticket["checked_in_at"].is_null());

    let checkin = || Request::post(format!("/v1/tickets/{}/checkin", code)).body(Body::empty()).unwrap();
    let (status, boarded) = send(&t.router, checkin()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(boarded["checked_in_at"].is_string());
    let (status, _) = send(&t.router, checkin()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 6. Seats now show as booked
    let (_, map) = send(
        &t.router,
        Request::get(format!("/v1/trips/{}/seats", t.trip_id)).body(Body::empty()).unwrap(),
    )
    .await;
    let booked = map["seats"].as_array().unwrap().iter().filter(|s| s["status"] == "booked").count();
    assert_eq!(booked, 2);
}

#[tokio::test]
async fn test_payment_for_someone_elses_booking_is_forbidden() {
    let t = test_app(BusinessRules::default()).await;
    let body = booking_body(t.trip_id, &["A2"]);
    let (_, booking) = send(
        &t.router,
        post_json("/v1/bookings")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token(Uuid::new_v4())))
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;

    let body = json!({ "booking_id": booking["id"], "gateway": "momo" });
    let (status, _) = send(
        &t.router,
        post_json("/v1/payments")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token(Uuid::new_v4())))
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_errors_use_status_envelope() {
    let t = test_app(BusinessRules::default()).await;
    let payload = json!({ "gateway_payment_id": "MOMO_X", "status": "success", "amount": 1 }).to_string();

    // Bad signature
    let (status, body) = send(
        &t.router,
        Request::post("/v1/webhooks/momo")
            .header("X-Signature", "deadbeef")
            .body(Body::from(payload.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());

    // Missing signature header
    let (status, body) = send(
        &t.router,
        Request::post("/v1/webhooks/momo").body(Body::from(payload.clone())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    // Unknown gateway name
    let (status, body) = send(
        &t.router,
        Request::post("/v1/webhooks/paypal").body(Body::from(payload.clone())).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    // Known but unconfigured gateway
    let (status, _) = send(
        &t.router,
        Request::post("/v1/webhooks/zalopay")
            .header("X-Mac", "00")
            .body(Body::from(payload.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Signed, but for a payment nobody created
    let sig = signature::sign(MOMO_SECRET, payload.as_bytes()).unwrap();
    let (status, body) = send(
        &t.router,
        Request::post("/v1/webhooks/momo")
            .header("X-Signature", sig)
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let rules = BusinessRules {
        rate_limit_per_minute: 2,
        ..BusinessRules::default()
    };
    let t = test_app(rules).await;

    for _ in 0..2 {
        let (status, _) = send(&t.router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&t.router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
