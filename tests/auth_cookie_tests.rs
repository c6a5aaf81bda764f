// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth cookie attribute tests.
//!
//! These tests verify the session cookies set at sign-in and refresh, and
//! that sign-out removes them on the same paths they were created with.

use axum::http::StatusCode;
use roost::config::Config;
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{find_cookie, json_request, set_cookie_headers};

async fn sign_in_cookies(h: &common::TestHarness) -> Vec<String> {
    h.auth.sign_up(common::alice_request()).await.unwrap();

    let response = h
        .router()
        .oneshot(json_request(
            "POST",
            "/auth/signin",
            json!({"email": "alice@x.com", "password": "Password1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    set_cookie_headers(&response)
}

#[tokio::test]
async fn test_signin_cookie_attributes_localhost() {
    let h = common::harness();
    let cookies = sign_in_cookies(&h).await;

    let refresh = find_cookie(&cookies, "roost_refresh");
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("SameSite=Lax"));
    assert!(refresh.contains("Path=/auth"));
    assert!(refresh.contains("Max-Age=604800"));
    assert!(!refresh.contains("Secure"));
    assert!(!refresh.contains("Domain="));

    let access = find_cookie(&cookies, "roost_access");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Path=/"));
    assert!(!access.contains("Path=/auth"));
    assert!(access.contains("Max-Age=900"));
    assert!(!access.contains("Secure"));
}

#[tokio::test]
async fn test_signin_cookie_attributes_production() {
    let config = Config {
        frontend_url: "https://roost.example".to_string(),
        ..Config::test_default()
    };
    let h = common::harness_with(config);
    let cookies = sign_in_cookies(&h).await;

    assert!(find_cookie(&cookies, "roost_refresh").contains("Secure"));
    assert!(find_cookie(&cookies, "roost_access").contains("Secure"));
}

#[tokio::test]
async fn test_refresh_cookie_carries_rotated_token() {
    let h = common::harness();
    let cookies = sign_in_cookies(&h).await;
    let first = find_cookie(&cookies, "roost_refresh");
    let first_value = first
        .trim_start_matches("roost_refresh=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = h
        .router()
        .oneshot(json_request(
            "POST",
            "/auth/refresh",
            json!({"refresh_token": first_value}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = find_cookie(&set_cookie_headers(&response), "roost_refresh");
    assert!(!rotated.starts_with(&format!("roost_refresh={first_value};")));
    assert!(rotated.contains("Path=/auth"));
}

#[tokio::test]
async fn test_signout_cookie_removal_attributes() {
    let h = common::harness();

    let response = h
        .router()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/auth/signout")
                .header(
                    axum::http::header::COOKIE,
                    "roost_refresh=stale; roost_access=stale",
                )
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let cookies = set_cookie_headers(&response);
    let refresh = find_cookie(&cookies, "roost_refresh");
    let access = find_cookie(&cookies, "roost_access");

    assert!(refresh.contains("Path=/auth"));
    assert!(refresh.contains("Max-Age=0"));
    assert!(!refresh.contains("Domain="));

    assert!(access.contains("Path=/"));
    assert!(access.contains("Max-Age=0"));
}
