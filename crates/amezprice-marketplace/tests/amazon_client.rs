//! Integration tests for `AmazonClient` against a wiremock PA-API endpoint.

use amezprice_core::{AmazonCredentials, Marketplace};
use amezprice_marketplace::{AmazonClient, HttpOptions, MarketplaceError};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> AmazonCredentials {
    AmazonCredentials {
        access_key: "AKIDEXAMPLE".to_owned(),
        secret_key: "secret".to_owned(),
        associate_tag: "amezprice-21".to_owned(),
        host: "webservices.amazon.in".to_owned(),
        region: "eu-west-1".to_owned(),
        marketplace: "www.amazon.in".to_owned(),
    }
}

fn options(max_retries: u32) -> HttpOptions {
    HttpOptions {
        timeout_secs: 5,
        user_agent: "amezprice-test/0.1".to_owned(),
        max_retries,
        backoff_base_secs: 0,
    }
}

fn client(server: &MockServer, max_retries: u32) -> AmazonClient {
    AmazonClient::with_base_url(credentials(), options(max_retries), &server.uri())
        .expect("failed to build test AmazonClient")
}

fn item_json(asin: &str, amount: f64, availability: &str) -> serde_json::Value {
    json!({
        "ASIN": asin,
        "DetailPageURL": format!("https://www.amazon.in/dp/{asin}?tag=amezprice-21"),
        "ItemInfo": { "Title": { "DisplayValue": "boAt Airdopes 141" } },
        "Images": { "Primary": { "Large": { "URL": "https://m.media-amazon.com/images/I/x.jpg" } } },
        "BrowseNodeInfo": { "BrowseNodes": [{ "DisplayName": "In-Ear" }] },
        "Offers": { "Listings": [{
            "Price": { "Amount": amount, "Currency": "INR" },
            "SavingBasis": { "Amount": 4490.0, "Currency": "INR" },
            "Availability": { "Type": availability }
        }] },
        "CustomerReviews": { "StarRating": { "Value": 4.1 }, "Count": 1520 }
    })
}

#[tokio::test]
async fn get_item_sends_signed_request_and_normalizes_item() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/paapi5/getitems"))
        .and(header(
            "x-amz-target",
            "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems",
        ))
        .and(header("content-encoding", "amz-1.0"))
        .and(header_exists("x-amz-date"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "ItemIds": ["B0CHX1W1XY"],
            "PartnerTag": "amezprice-21",
            "PartnerType": "Associates",
            "Marketplace": "www.amazon.in"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [item_json("B0CHX1W1XY", 1299.0, "Now")] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let product = client(&server, 0)
        .get_item("B0CHX1W1XY")
        .await
        .expect("item should be returned");

    assert_eq!(product.marketplace, Marketplace::Amazon);
    assert_eq!(product.source_product_id, "B0CHX1W1XY");
    assert_eq!(product.name, "boAt Airdopes 141");
    assert_eq!(product.price, Some(Decimal::new(1299, 0)));
    assert_eq!(product.mrp, Some(Decimal::new(4490, 0)));
    assert_eq!(product.category.as_deref(), Some("In-Ear"));
    assert_eq!(product.rating_count, Some(1520));
    assert!(product.in_stock);
}

#[tokio::test]
async fn authorization_header_uses_paapi_scope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [item_json("B0CHX1W1XY", 1299.0, "Now")] }
        })))
        .mount(&server)
        .await;

    client(&server, 0).get_item("B0CHX1W1XY").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_owned();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/eu-west-1/ProductAdvertisingAPI/aws4_request"));
    assert!(auth.contains(
        "SignedHeaders=content-encoding;content-type;host;x-amz-date;x-amz-target"
    ));
}

#[tokio::test]
async fn out_of_stock_availability_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [item_json("B0CHX1W1XY", 1299.0, "OutOfStock")] }
        })))
        .mount(&server)
        .await;

    let product = client(&server, 0).get_item("B0CHX1W1XY").await.unwrap();
    assert!(!product.in_stock);
}

#[tokio::test]
async fn item_without_offers_has_no_price() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [{
                "ASIN": "B0CHX1W1XY",
                "ItemInfo": { "Title": { "DisplayValue": "Unavailable thing" } }
            }] }
        })))
        .mount(&server)
        .await;

    let product = client(&server, 0).get_item("B0CHX1W1XY").await.unwrap();
    assert!(product.price.is_none());
    assert!(!product.in_stock);
}

#[tokio::test]
async fn error_only_response_for_single_item_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Errors": [{
                "Code": "InvalidParameterValue",
                "Message": "The ItemId B0CHX1W1XY provided in the request is invalid."
            }]
        })))
        .mount(&server)
        .await;

    let err = client(&server, 0).get_item("B0CHX1W1XY").await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::NotFound { marketplace: Marketplace::Amazon, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn batch_skips_items_with_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ItemsResult": { "Items": [item_json("B0CHX1W1XY", 1299.0, "Now")] },
            "Errors": [{ "Code": "ItemNotAccessible", "Message": "gone" }]
        })))
        .mount(&server)
        .await;

    let ids = vec!["B0CHX1W1XY".to_owned(), "B000000000".to_owned()];
    let products = client(&server, 0).get_items(&ids).await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].source_product_id, "B0CHX1W1XY");
}

#[tokio::test]
async fn auth_failure_surfaces_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "Errors": [{ "Code": "InvalidSignature", "Message": "bad signature" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3).get_item("B0CHX1W1XY").await.unwrap_err();
    match err {
        MarketplaceError::Api { code, .. } => assert_eq!(code, "InvalidSignature"),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_is_retried_then_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, 2).get_item("B0CHX1W1XY").await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::RateLimited { service: "amazon", .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn more_than_ten_ids_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..11).map(|i| format!("B00000000{i:X}")).collect();
    let err = client(&server, 0).get_items(&ids).await.unwrap_err();
    assert!(matches!(
        err,
        MarketplaceError::TooManyItems { max: 10, count: 11 }
    ));
}
