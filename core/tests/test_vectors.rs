//! Verify build/parse against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and either the expected parse result or the expected error. Comparing
//! parsed JSON (not raw strings) avoids false negatives from field ordering.

use serde_json::Value;
use uuid::Uuid;
use vetcare_core::client::parse_data;
use vetcare_core::types::{Appointment, AppointmentStatus, CreateOrder, CreateProduct, Order, Product};
use vetcare_core::{ApiError, HttpMethod, HttpRequest, HttpResponse, VetCareClient};

const BASE_URL: &str = "http://localhost:3000";

fn client() -> VetCareClient {
    VetCareClient::new(BASE_URL)
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn simulated(case: &Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse::new(
        sim["status"].as_u64().unwrap() as u16,
        sim["body"].as_str().unwrap(),
    )
}

fn assert_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");

    if let Some(headers) = expected.get("headers") {
        let expected_headers: Vec<(String, String)> = headers
            .as_array()
            .unwrap()
            .iter()
            .map(|h| {
                let pair = h.as_array().unwrap();
                (pair[0].as_str().unwrap().to_string(), pair[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");
    }

    match expected.get("body") {
        Some(body) => {
            let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(&sent, body, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: body should be None"),
    }
}

/// Check an error against `{ "kind": ..., "message": ... }`.
fn assert_error(name: &str, err: &ApiError, expected: &Value) {
    let kind_matches = match expected["kind"].as_str().unwrap() {
        "EmptyResponse" => matches!(err, ApiError::EmptyResponse { .. }),
        "Rejected" => matches!(err, ApiError::Rejected(_)),
        "NotFound" => matches!(err, ApiError::NotFound { .. }),
        "Http" => matches!(err, ApiError::Http { .. }),
        "Deserialization" => matches!(err, ApiError::Deserialization(_)),
        other => panic!("{name}: unknown expected_error kind: {other}"),
    };
    assert!(kind_matches, "{name}: got {err:?}");
    if let Some(message) = expected.get("message") {
        assert_eq!(err.to_string(), message.as_str().unwrap(), "{name}: message");
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[test]
fn create_product_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/create_product.json")) {
        let name = case["name"].as_str().unwrap();
        let input: CreateProduct = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_create::<Product>(&input).unwrap();
        assert_request(name, &req, &case["expected_request"]);

        let product: Product = parse_data("create product", simulated(&case)).unwrap();
        let expected: Product = serde_json::from_value(case["expected_result"].clone()).unwrap();
        assert_eq!(product, expected, "{name}: parsed result");
    }
}

#[test]
fn list_product_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/list_products.json")) {
        let name = case["name"].as_str().unwrap();

        let req = c.build_list::<Product>();
        assert_request(name, &req, &case["expected_request"]);

        let products: Vec<Product> = parse_data("list products", simulated(&case)).unwrap();
        let expected: Vec<Product> = serde_json::from_value(case["expected_result"].clone()).unwrap();
        assert_eq!(products, expected, "{name}: parsed result");
    }
}

// ---------------------------------------------------------------------------
// Envelope classification
// ---------------------------------------------------------------------------

#[test]
fn classification_vectors() {
    for case in load(include_str!("../../test-vectors/classify.json")) {
        let name = case["name"].as_str().unwrap();
        let err = parse_data::<Product>("get product", simulated(&case)).unwrap_err();
        assert_error(name, &err, &case["expected_error"]);
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[test]
fn appointment_status_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/appointment_status.json")) {
        let name = case["name"].as_str().unwrap();
        let id: Uuid = case["input_id"].as_str().unwrap().parse().unwrap();
        let status: AppointmentStatus = serde_json::from_value(case["input_status"].clone()).unwrap();

        let req = c.build_change_status(id, status).unwrap();
        assert_request(name, &req, &case["expected_request"]);

        let result = parse_data::<Appointment>("change appointment status", simulated(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, &result.unwrap_err(), expected_error);
        } else {
            let expected: Appointment =
                serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[test]
fn checkout_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/checkout.json")) {
        let name = case["name"].as_str().unwrap();
        let input: CreateOrder = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_checkout(&input).unwrap();
        assert_request(name, &req, &case["expected_request"]);

        let result = parse_data::<Order>("place order", simulated(&case));
        if let Some(expected_error) = case.get("expected_error") {
            assert_error(name, &result.unwrap_err(), expected_error);
        } else {
            let expected: Order = serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}
