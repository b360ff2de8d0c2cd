//! Integration tests for `FlipkartClient` against a wiremock affiliate API.

use amezprice_core::{FlipkartCredentials, Marketplace};
use amezprice_marketplace::{FlipkartClient, HttpOptions, MarketplaceError};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PID: &str = "MOBGTAGPTB3VS24W";

fn client(server: &MockServer, max_retries: u32) -> FlipkartClient {
    FlipkartClient::with_base_url(
        FlipkartCredentials {
            affiliate_id: "aff01".to_owned(),
            affiliate_token: "token01".to_owned(),
        },
        HttpOptions {
            timeout_secs: 5,
            user_agent: "amezprice-test/0.1".to_owned(),
            max_retries,
            backoff_base_secs: 0,
        },
        &server.uri(),
    )
    .expect("failed to build test FlipkartClient")
}

fn product_json() -> serde_json::Value {
    json!({
        "productBaseInfoV1": {
            "productId": PID,
            "title": "Apple iPhone 15 (Black, 128 GB)",
            "productUrl": "https://dl.flipkart.com/dl/apple-iphone-15/p/itm6ac6485515ae4?pid=MOBGTAGPTB3VS24W&affid=aff01",
            "imageUrls": {
                "200x200": "https://rukminim1.flixcart.com/200.jpeg",
                "800x800": "https://rukminim1.flixcart.com/800.jpeg"
            },
            "maximumRetailPrice": { "amount": 79900.0, "currency": "INR" },
            "flipkartSellingPrice": { "amount": 69900.0, "currency": "INR" },
            "flipkartSpecialPrice": { "amount": 65999.0, "currency": "INR" },
            "inStock": true,
            "categoryPath": "Mobiles>Apple"
        }
    })
}

#[tokio::test]
async fn get_product_sends_affiliate_headers_and_normalizes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/affiliate/1.0/product.json"))
        .and(query_param("id", PID))
        .and(header("Fk-Affiliate-Id", "aff01"))
        .and(header("Fk-Affiliate-Token", "token01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json()))
        .expect(1)
        .mount(&server)
        .await;

    let product = client(&server, 0).get_product(PID).await.unwrap();
    assert_eq!(product.marketplace, Marketplace::Flipkart);
    assert_eq!(product.source_product_id, PID);
    assert_eq!(product.price, Some(Decimal::new(65999, 0)));
    assert_eq!(product.mrp, Some(Decimal::new(79900, 0)));
    assert_eq!(
        product.image_url.as_deref(),
        Some("https://rukminim1.flixcart.com/800.jpeg")
    );
    assert_eq!(product.category.as_deref(), Some("Apple"));
    assert!(product.in_stock);
}

#[tokio::test]
async fn missing_product_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3).get_product(PID).await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::NotFound { marketplace: Marketplace::Flipkart, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json()))
        .mount(&server)
        .await;

    let product = client(&server, 2).get_product(PID).await.unwrap();
    assert_eq!(product.source_product_id, PID);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3).get_product(PID).await.unwrap_err();
    assert!(matches!(
        err,
        MarketplaceError::UnexpectedStatus { status: 401, .. }
    ));
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"unexpected\": true}"))
        .mount(&server)
        .await;

    let err = client(&server, 0).get_product(PID).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Deserialize { .. }));
}
