//! End-to-end pipeline tests: a migrated Postgres database from
//! `#[sqlx::test]`, wiremock standing in for PA-API and the push service,
//! and a log-only email sender.

use amezprice_core::{
    AmazonCredentials, Marketplace, MarketplaceProduct, PromotionAudience, PromotionChannel, Role,
    VapidConfig,
};
use amezprice_db::{
    create_promotion, create_user, get_product_by_source, get_promotion, get_refresh_run,
    list_price_history, list_promotion_recipients, list_push_subscriptions_for_user,
    list_tracked_products, track_product, update_tracking, upsert_product,
    upsert_push_subscription, NewPromotion, NewPushSubscription, NewUser, TrackingUpdate,
    UpsertProduct,
};
use amezprice_marketplace::{redirect_client, AmazonClient, HttpOptions, MarketplaceClients};
use amezprice_notify::push::generate_keys;
use amezprice_notify::{EmailSender, Notifier, PushSender, RetryPolicy};
use amezprice_tracker::{
    dispatch_promotion, refresh_prices, search_product, ProductSource, RefreshOptions,
    RefreshTrigger, TrackerContext, TrackerError, TrackerSettings,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ASIN: &str = "B0CHX1W1XY";
const PRODUCT_URL: &str = "https://www.amazon.in/dp/B0CHX1W1XY";
// 16 bytes, base64url
const AUTH_SECRET: &str = "AAECAwQFBgcICQoLDA0ODw";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(product_stale_after_secs: u64) -> TrackerSettings {
    TrackerSettings {
        product_stale_after_secs,
        refresh_batch_size: 50,
        inter_request_delay_ms: 0,
        public_url: "https://amezprice.test".to_owned(),
    }
}

fn context(pool: PgPool, amazon_base: Option<&str>, stale_after_secs: u64) -> TrackerContext {
    let http = HttpOptions {
        timeout_secs: 5,
        user_agent: "amezprice-test/0.1".to_owned(),
        max_retries: 0,
        backoff_base_secs: 0,
    };
    let amazon = amazon_base.map(|base| {
        AmazonClient::with_base_url(
            AmazonCredentials {
                access_key: "AKIDEXAMPLE".to_owned(),
                secret_key: "secret".to_owned(),
                associate_tag: "amezprice-21".to_owned(),
                host: "webservices.amazon.in".to_owned(),
                region: "eu-west-1".to_owned(),
                marketplace: "www.amazon.in".to_owned(),
            },
            http.clone(),
            base,
        )
        .expect("amazon client")
    });

    let (public_key, private_key) = generate_keys();
    let push = PushSender::new(
        &VapidConfig {
            public_key,
            private_key,
            subject: "mailto:ops@amezprice.test".to_owned(),
        },
        RetryPolicy::none(),
        5,
    )
    .expect("push sender");

    TrackerContext {
        pool,
        marketplaces: MarketplaceClients {
            amazon,
            flipkart: None,
        },
        notifier: Notifier {
            email: EmailSender::log_only("alerts@amezprice.test", "AmezPrice").expect("email"),
            push,
        },
        redirect_client: redirect_client(5, "amezprice-test/0.1").expect("redirect client"),
        settings: settings(stale_after_secs),
    }
}

fn items_response(amount: f64) -> serde_json::Value {
    json!({
        "ItemsResult": { "Items": [{
            "ASIN": ASIN,
            "DetailPageURL": PRODUCT_URL,
            "ItemInfo": { "Title": { "DisplayValue": "Electric Kettle 1.5L" } },
            "Offers": { "Listings": [{
                "Price": { "Amount": amount, "Currency": "INR" },
                "Availability": { "Type": "Now" }
            }] }
        }] }
    })
}

async fn mount_items(server: &MockServer, amount: f64, times: u64) {
    Mock::given(method("POST"))
        .and(path("/paapi5/getitems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items_response(amount)))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

async fn insert_user(pool: &PgPool, username: &str) -> i64 {
    let email = format!("{username}@example.com");
    create_user(
        pool,
        &NewUser {
            first_name: "Asha",
            last_name: "Rao",
            username,
            email: &email,
            phone: None,
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA",
            role: Role::User,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("insert_user failed for '{username}': {e}"))
    .id
}

async fn subscribe(pool: &PgPool, user_id: i64, endpoint: &str) {
    let (p256dh, _) = generate_keys();
    upsert_push_subscription(
        pool,
        &NewPushSubscription {
            user_id,
            endpoint,
            p256dh: &p256dh,
            auth_secret: AUTH_SECRET,
            user_agent: Some("test-browser"),
        },
    )
    .await
    .expect("upsert_push_subscription failed");
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn search_fetches_stores_and_tracks(pool: PgPool) {
    let server = MockServer::start().await;
    mount_items(&server, 1499.0, 1).await;
    let ctx = context(pool.clone(), Some(&server.uri()), 3600);
    let user_id = insert_user(&pool, "asha").await;

    let outcome = search_product(&ctx, PRODUCT_URL, Some(user_id))
        .await
        .expect("search should succeed");

    assert_eq!(outcome.source, ProductSource::Fetched);
    assert_eq!(outcome.resolved.marketplace, Marketplace::Amazon);
    assert_eq!(outcome.resolved.source_product_id, ASIN);
    assert_eq!(outcome.product.current_price, Some(Decimal::new(1499, 0)));
    assert!(outcome.product.affiliate_url.contains("tag=amezprice-21"));

    let tracking = outcome.tracking.expect("signed-in search tracks");
    assert!(tracking.email_alert);
    assert!(!tracking.push_alert, "no push subscription yet");

    let history = list_price_history(&pool, outcome.product.id, None, 30)
        .await
        .expect("history");
    assert_eq!(history.len(), 1);

    // Second search is served from the database; the mock allows one call.
    let again = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect("cached search");
    assert_eq!(again.source, ProductSource::Cached);
    assert!(again.tracking.is_none());
    assert_eq!(list_tracked_products(&pool, user_id).await.expect("tracked").len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_enables_push_for_subscribed_user(pool: PgPool) {
    let server = MockServer::start().await;
    mount_items(&server, 999.0, 1).await;
    let ctx = context(pool.clone(), Some(&server.uri()), 3600);
    let user_id = insert_user(&pool, "ravi").await;
    subscribe(&pool, user_id, "https://push.example/ravi").await;

    let outcome = search_product(&ctx, PRODUCT_URL, Some(user_id))
        .await
        .expect("search should succeed");
    assert!(outcome.tracking.expect("tracked").push_alert);
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_serves_stale_row_when_marketplace_fails(pool: PgPool) {
    let server = MockServer::start().await;
    mount_items(&server, 1499.0, 1).await;
    Mock::given(method("POST"))
        .and(path("/paapi5/getitems"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    // Nothing is ever fresh, so the second search goes to the API.
    let ctx = context(pool, Some(&server.uri()), 0);

    let first = search_product(&ctx, PRODUCT_URL, None).await.expect("first");
    assert_eq!(first.source, ProductSource::Fetched);

    let second = search_product(&ctx, PRODUCT_URL, None).await.expect("second");
    assert_eq!(second.source, ProductSource::Stale);
    assert_eq!(second.product.id, first.product.id);
}

/// Redirect client that sends the marketplace hosts to the local mock.
fn loopback_redirect_client(server: &MockServer) -> reqwest::Client {
    let addr = *server.address();
    reqwest::Client::builder()
        .resolve("amzn.in", addr)
        .resolve("www.amazon.in", addr)
        .resolve("www.flipkart.com", addr)
        .build()
        .expect("redirect client")
}

#[sqlx::test(migrations = "../../migrations")]
async fn short_link_is_expanded_before_lookup(pool: PgPool) {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/d/abc123"))
        .respond_with(ResponseTemplate::new(301).insert_header(
            "Location",
            format!("http://www.amazon.in:{port}/dp/{ASIN}?ref=share").as_str(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/dp/{ASIN}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_items(&server, 2499.0, 1).await;

    let mut ctx = context(pool, Some(&server.uri()), 3600);
    ctx.redirect_client = loopback_redirect_client(&server);

    let outcome = search_product(&ctx, &format!("http://amzn.in:{port}/d/abc123"), None)
        .await
        .expect("short link search");
    assert_eq!(outcome.resolved.marketplace, Marketplace::Amazon);
    assert_eq!(outcome.resolved.source_product_id, ASIN);
    assert!(outcome.resolved.resolved_url.contains("www.amazon.in"));
    assert_eq!(outcome.source, ProductSource::Fetched);
    assert_eq!(outcome.product.current_price, Some(Decimal::new(2499, 0)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn short_link_landing_on_other_marketplace_is_rejected(pool: PgPool) {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/d/xyz789"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("http://www.flipkart.com:{port}/p/itm?pid=MOBGTAGPTB3VS24W").as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/itm"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut ctx = context(pool, Some(&server.uri()), 3600);
    ctx.redirect_client = loopback_redirect_client(&server);

    let err = search_product(&ctx, &format!("http://amzn.in:{port}/d/xyz789"), None)
        .await
        .expect_err("cross-marketplace landing");
    assert!(
        matches!(
            err,
            TrackerError::MarketplaceMismatch {
                expected: Marketplace::Amazon,
                actual: Marketplace::Flipkart,
            }
        ),
        "got {err:?}"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_without_credentials_or_stored_row_is_unavailable(pool: PgPool) {
    let ctx = context(pool, None, 3600);

    let err = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect_err("no client and no stored row");
    assert!(matches!(
        err,
        TrackerError::MarketplaceUnavailable(Marketplace::Amazon)
    ));
}

// ---------------------------------------------------------------------------
// Refresh and alerts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn refresh_detects_drop_and_alerts_trackers(pool: PgPool) {
    let amazon = MockServer::start().await;
    mount_items(&amazon, 1500.0, 1).await;
    mount_items(&amazon, 1200.0, 1).await;

    let push = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push/live"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&push)
        .await;
    Mock::given(method("POST"))
        .and(path("/push/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&push)
        .await;

    let ctx = context(pool.clone(), Some(&amazon.uri()), 3600);
    let user_id = insert_user(&pool, "meera").await;
    let product = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect("seed search")
        .product;

    subscribe(&pool, user_id, &format!("{}/push/live", push.uri())).await;
    subscribe(&pool, user_id, &format!("{}/push/gone", push.uri())).await;
    track_product(&pool, user_id, product.id, true, true)
        .await
        .expect("track");

    let summary = refresh_prices(
        &ctx,
        RefreshOptions {
            trigger: RefreshTrigger::Cli,
            dry_run: false,
        },
    )
    .await
    .expect("refresh should succeed");

    assert_eq!(summary.counters.products_checked, 1);
    assert_eq!(summary.counters.products_failed, 0);
    assert_eq!(summary.counters.price_changes, 1);
    // The log-only email is skipped, so only the live push counts.
    assert_eq!(summary.counters.alerts_sent, 1);

    let run = get_refresh_run(&pool, summary.run_id.expect("run id"))
        .await
        .expect("run");
    assert_eq!(run.status, "succeeded");
    assert_eq!(run.trigger_source, "cli");

    let stored = get_product_by_source(&pool, Marketplace::Amazon, ASIN)
        .await
        .expect("query")
        .expect("stored");
    assert_eq!(stored.current_price, Some(Decimal::new(1200, 0)));
    assert_eq!(stored.highest_price, Some(Decimal::new(1500, 0)));
    assert_eq!(stored.lowest_price, Some(Decimal::new(1200, 0)));

    let remaining = list_push_subscriptions_for_user(&pool, user_id)
        .await
        .expect("subscriptions");
    assert_eq!(remaining.len(), 1, "gone subscription is removed");
    assert!(remaining[0].endpoint.ends_with("/push/live"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn threshold_above_new_price_suppresses_alert(pool: PgPool) {
    let amazon = MockServer::start().await;
    mount_items(&amazon, 1500.0, 1).await;
    mount_items(&amazon, 1400.0, 1).await;
    let push = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&push)
        .await;

    let ctx = context(pool.clone(), Some(&amazon.uri()), 3600);
    let user_id = insert_user(&pool, "kiran").await;
    let product = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect("seed search")
        .product;
    subscribe(&pool, user_id, &format!("{}/push/kiran", push.uri())).await;
    track_product(&pool, user_id, product.id, true, true)
        .await
        .expect("track");
    update_tracking(
        &pool,
        user_id,
        product.id,
        TrackingUpdate {
            price_threshold: Some(Some(Decimal::new(1000, 0))),
            ..TrackingUpdate::default()
        },
    )
    .await
    .expect("update tracking");

    let summary = refresh_prices(
        &ctx,
        RefreshOptions {
            trigger: RefreshTrigger::Scheduler,
            dry_run: false,
        },
    )
    .await
    .expect("refresh");
    assert_eq!(summary.counters.price_changes, 1);
    assert_eq!(summary.counters.alerts_sent, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn refresh_fails_run_when_every_product_fails(pool: PgPool) {
    let amazon = MockServer::start().await;
    mount_items(&amazon, 1500.0, 1).await;
    Mock::given(method("POST"))
        .and(path("/paapi5/getitems"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&amazon)
        .await;

    let ctx = context(pool.clone(), Some(&amazon.uri()), 3600);
    let user_id = insert_user(&pool, "dev").await;
    let product = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect("seed search")
        .product;
    track_product(&pool, user_id, product.id, true, false)
        .await
        .expect("track");

    let err = refresh_prices(
        &ctx,
        RefreshOptions {
            trigger: RefreshTrigger::Admin,
            dry_run: false,
        },
    )
    .await
    .expect_err("every product failed");

    let TrackerError::RefreshFailed { run_id, .. } = err else {
        panic!("expected RefreshFailed, got {err:?}");
    };
    let run = get_refresh_run(&pool, run_id).await.expect("run");
    assert_eq!(run.status, "failed");
    assert!(run.error_message.is_some());
}

const OTHER_ASIN: &str = "B0D5K9QJ3M";

fn item(asin: &str, amount: f64) -> serde_json::Value {
    json!({
        "ASIN": asin,
        "DetailPageURL": format!("https://www.amazon.in/dp/{asin}"),
        "ItemInfo": { "Title": { "DisplayValue": format!("Product {asin}") } },
        "Offers": { "Listings": [{
            "Price": { "Amount": amount, "Currency": "INR" },
            "Availability": { "Type": "Now" }
        }] }
    })
}

#[sqlx::test(migrations = "../../migrations")]
async fn one_unstorable_product_does_not_stop_the_run(pool: PgPool) {
    let amazon = MockServer::start().await;
    let ctx = context(pool.clone(), Some(&amazon.uri()), 3600);
    let user_id = insert_user(&pool, "tara").await;

    let mut seeded_checked_at = None;
    for asin in [ASIN, OTHER_ASIN] {
        let product = upsert_product(
            &pool,
            UpsertProduct {
                product: &MarketplaceProduct {
                    marketplace: Marketplace::Amazon,
                    source_product_id: asin.to_owned(),
                    name: format!("Product {asin}"),
                    detail_url: None,
                    image_url: None,
                    category: None,
                    price: Some(Decimal::new(1000, 0)),
                    mrp: None,
                    currency_code: "INR".to_owned(),
                    in_stock: true,
                    rating: None,
                    rating_count: None,
                },
                affiliate_url: &format!("https://www.amazon.in/dp/{asin}"),
            },
        )
        .await
        .expect("seed product");
        if asin == ASIN {
            seeded_checked_at = product.last_checked_at;
        }
        track_product(&pool, user_id, product.id, true, false)
            .await
            .expect("track");
    }

    // The first price does not fit NUMERIC(12,2), so storing it fails.
    Mock::given(method("POST"))
        .and(path("/paapi5/getitems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [item(ASIN, 1e11), item(OTHER_ASIN, 900.0)] }
        })))
        .mount(&amazon)
        .await;

    for round in 0..2 {
        let summary = refresh_prices(
            &ctx,
            RefreshOptions {
                trigger: RefreshTrigger::Scheduler,
                dry_run: false,
            },
        )
        .await
        .unwrap_or_else(|e| panic!("round {round}: refresh should succeed, got {e:?}"));
        assert_eq!(summary.counters.products_checked, 2);
        assert_eq!(summary.counters.products_failed, 1);

        let run = get_refresh_run(&pool, summary.run_id.expect("run id"))
            .await
            .expect("run");
        assert_eq!(run.status, "succeeded");
    }

    let other = get_product_by_source(&pool, Marketplace::Amazon, OTHER_ASIN)
        .await
        .expect("query")
        .expect("stored");
    assert_eq!(other.current_price, Some(Decimal::new(900, 0)));

    let failing = get_product_by_source(&pool, Marketplace::Amazon, ASIN)
        .await
        .expect("query")
        .expect("stored");
    assert_eq!(failing.current_price, Some(Decimal::new(1000, 0)));
    assert!(
        failing.last_checked_at > seeded_checked_at,
        "failed product moves to the back of the queue"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn dry_run_writes_nothing(pool: PgPool) {
    let amazon = MockServer::start().await;
    mount_items(&amazon, 1500.0, 1).await;
    mount_items(&amazon, 1100.0, 1).await;

    let ctx = context(pool.clone(), Some(&amazon.uri()), 3600);
    let user_id = insert_user(&pool, "neha").await;
    let product = search_product(&ctx, PRODUCT_URL, None)
        .await
        .expect("seed search")
        .product;
    track_product(&pool, user_id, product.id, true, false)
        .await
        .expect("track");

    let summary = refresh_prices(
        &ctx,
        RefreshOptions {
            trigger: RefreshTrigger::Cli,
            dry_run: true,
        },
    )
    .await
    .expect("dry run");
    assert!(summary.run_id.is_none());
    assert_eq!(summary.counters.price_changes, 1);

    let stored = get_product_by_source(&pool, Marketplace::Amazon, ASIN)
        .await
        .expect("query")
        .expect("stored");
    assert_eq!(stored.current_price, Some(Decimal::new(1500, 0)));
}

// ---------------------------------------------------------------------------
// Promotions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn promotion_reaches_every_active_user(pool: PgPool) {
    let push = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push/promo"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&push)
        .await;

    let ctx = context(pool.clone(), None, 3600);
    let subscribed = insert_user(&pool, "priya").await;
    let _unsubscribed = insert_user(&pool, "arjun").await;
    subscribe(&pool, subscribed, &format!("{}/push/promo", push.uri())).await;

    let promotion = create_promotion(
        &pool,
        &NewPromotion {
            subject: "Diwali deals",
            body: "Prices on tracked products are falling.",
            link_url: None,
            channel: PromotionChannel::Both,
            audience: PromotionAudience::All,
            selected_user_ids: &[],
            created_by: None,
        },
    )
    .await
    .expect("create promotion");

    let counters = dispatch_promotion(&ctx, promotion.id)
        .await
        .expect("dispatch");
    assert_eq!(counters.emails_sent, 0, "log-only email is skipped");
    assert_eq!(counters.pushes_sent, 1);
    assert_eq!(counters.failures, 0);

    let stored = get_promotion(&pool, promotion.id).await.expect("promotion");
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.recipients_total, 2);

    let recipients = list_promotion_recipients(&pool, promotion.id, 100)
        .await
        .expect("recipients");
    assert_eq!(recipients.len(), 4);
    assert_eq!(
        recipients
            .iter()
            .filter(|r| r.channel == "push" && r.status == "sent")
            .count(),
        1
    );
    assert_eq!(
        recipients
            .iter()
            .filter(|r| r.channel == "email" && r.status == "skipped")
            .count(),
        2
    );
}
