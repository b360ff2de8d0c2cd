//! `PushSender` against a wiremock push service.

use amezprice_core::VapidConfig;
use amezprice_notify::push::generate_keys;
use amezprice_notify::{Delivery, NotifyError, PushPayload, PushSender, PushTarget, RetryPolicy};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sender(max_retries: u32) -> PushSender {
    let (public_key, private_key) = generate_keys();
    PushSender::new(
        &VapidConfig {
            public_key,
            private_key,
            subject: "mailto:ops@amezprice.in".to_owned(),
        },
        RetryPolicy {
            max_retries,
            base_delay_ms: 0,
        },
        5,
    )
    .expect("valid VAPID keys")
}

fn target(server: &MockServer) -> PushTarget {
    let (p256dh, _) = generate_keys();
    PushTarget {
        endpoint: format!("{}/push/abc", server.uri()),
        p256dh,
        // 16 bytes, base64url
        auth: "AAECAwQFBgcICQoLDA0ODw".to_owned(),
    }
}

fn payload() -> PushPayload {
    PushPayload {
        title: "Price drop".to_owned(),
        body: "Kettle: ₹2,000.00 → ₹1,500.00".to_owned(),
        url: "https://amezprice.in/p/1".to_owned(),
        icon: None,
    }
}

#[tokio::test]
async fn delivers_encrypted_payload_with_vapid_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/push/abc"))
        .and(header("Content-Encoding", "aes128gcm"))
        .and(header("TTL", "86400"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sender = sender(0);
    let outcome = sender.send(&target(&server), &payload()).await.unwrap();
    assert_eq!(outcome, Delivery::Sent);

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_owned();
    assert!(auth.starts_with("vapid t="));
    assert!(auth.contains(&format!("k={}", sender.vapid_public_key().unwrap())));
    // Header (86 bytes) + payload + delimiter + tag: never plaintext-sized.
    assert!(requests[0].body.len() > 86 + 16);
    assert!(!String::from_utf8_lossy(&requests[0].body).contains("Kettle"));
}

#[tokio::test]
async fn gone_subscription_is_reported_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let err = sender(3)
        .send(&target(&server), &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::SubscriptionGone { status: 410 }));
}

#[tokio::test]
async fn throttled_push_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let outcome = sender(3).send(&target(&server), &payload()).await.unwrap();
    assert_eq!(outcome, Delivery::Sent);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn bad_request_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let err = sender(3)
        .send(&target(&server), &payload())
        .await
        .unwrap_err();
    match err {
        NotifyError::PushRejected { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad payload");
        }
        other => panic!("expected PushRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn disabled_sender_skips() {
    let server = MockServer::start().await;
    let sender = PushSender::disabled().unwrap();
    assert!(sender.vapid_public_key().is_none());
    let outcome = sender.send(&target(&server), &payload()).await.unwrap();
    assert_eq!(outcome, Delivery::Skipped);
    assert!(server.received_requests().await.unwrap().is_empty());
}
