// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Endpoint resolver behavior against a mocked upstream.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::io::Write;
use std::time::Duration;

use data_encoding::BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use portal_gateway::models::TokenPair;
use portal_gateway::resolver::{
    Capability, CandidateTable, EndpointCandidate, EndpointResolver, FailureReason, ResolveError,
};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap()
}

fn pair() -> TokenPair {
    TokenPair::new("token", "42")
}

fn candidates(upstream: &MockServer, paths: &[&str]) -> Vec<EndpointCandidate> {
    paths
        .iter()
        .map(|p| EndpointCandidate::new(upstream.uri(), "v1", *p))
        .collect()
}

async fn mount(upstream: &MockServer, route: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(calls)
        .mount(upstream)
        .await;
}

#[tokio::test]
async fn test_first_valid_candidate_wins() {
    let upstream = MockServer::start().await;
    mount(&upstream, "/v1/a", ResponseTemplate::new(404), 1).await;
    mount(
        &upstream,
        "/v1/b",
        ResponseTemplate::new(200).set_body_raw("<html><body>login</body></html>", "text/html"),
        1,
    )
    .await;
    mount(
        &upstream,
        "/v1/c",
        ResponseTemplate::new(200).set_body_json(json!([{"id": 3}])),
        1,
    )
    .await;
    mount(
        &upstream,
        "/v1/d",
        ResponseTemplate::new(200).set_body_json(json!([{"id": 4}])),
        0,
    )
    .await;

    let table = CandidateTable::new().with(
        Capability::Grades,
        candidates(&upstream, &["a", "b", "c", "d"]),
    );
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table);

    let value = resolver.invoke(Capability::Grades, &pair(), None).await.unwrap();
    assert_eq!(value, json!([{"id": 3}]));
}

#[tokio::test]
async fn test_html_without_content_type_is_rejected() {
    let upstream = MockServer::start().await;
    mount(
        &upstream,
        "/v1/a",
        ResponseTemplate::new(200).set_body_string("  <!DOCTYPE html>"),
        1,
    )
    .await;

    let table = CandidateTable::new().with(Capability::Grades, candidates(&upstream, &["a"]));
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table);

    let err = resolver
        .invoke(Capability::Grades, &pair(), None)
        .await
        .unwrap_err();
    match err {
        ResolveError::Unavailable { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].reason, FailureReason::HtmlBody);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_enveloped_response_is_normalized() {
    let upstream = MockServer::start().await;
    let evaluations = json!({"data": [{"id": "ev-1"}]});
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(evaluations.to_string().as_bytes())
        .unwrap();
    let body = json!({"result": BASE64.encode(&encoder.finish().unwrap())});

    Mock::given(method("GET"))
        .and(path("/v1/pending"))
        .and(header("authorization", "Bearer token"))
        .and(header("x-user-id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&upstream)
        .await;

    let table =
        CandidateTable::new().with(Capability::Evaluations, candidates(&upstream, &["pending"]));
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table);

    let value = resolver
        .invoke(Capability::Evaluations, &pair(), None)
        .await
        .unwrap();
    assert_eq!(value, evaluations);
}

#[tokio::test]
async fn test_wrong_shape_and_bad_envelope_advance() {
    let upstream = MockServer::start().await;
    mount(
        &upstream,
        "/v1/object",
        ResponseTemplate::new(200).set_body_json(json!({"message": "maintenance"})),
        1,
    )
    .await;
    mount(
        &upstream,
        "/v1/corrupt",
        ResponseTemplate::new(200).set_body_json(json!({"result": "not base64!"})),
        1,
    )
    .await;

    let table = CandidateTable::new().with(
        Capability::Grades,
        candidates(&upstream, &["object", "corrupt"]),
    );
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table);

    let err = resolver
        .invoke(Capability::Grades, &pair(), None)
        .await
        .unwrap_err();
    let ResolveError::Unavailable {
        capability,
        failures,
    } = err
    else {
        panic!("expected an unavailable error");
    };
    assert_eq!(capability, Capability::Grades);
    assert_eq!(failures[0].reason, FailureReason::UnexpectedShape);
    assert!(matches!(failures[1].reason, FailureReason::Decode(_)));
}

#[tokio::test]
async fn test_submission_posts_body_and_expects_object() {
    let upstream = MockServer::start().await;
    let answers = json!({"evaluationId": "ev-1", "answers": []});
    Mock::given(method("POST"))
        .and(path("/v1/answers"))
        .and(wiremock::matchers::body_json(answers.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "saved"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let table = CandidateTable::new().with(
        Capability::SubmitEvaluation,
        candidates(&upstream, &["answers"]),
    );
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table);

    let value: Value = resolver
        .invoke(Capability::SubmitEvaluation, &pair(), Some(&answers))
        .await
        .unwrap();
    assert_eq!(value["status"], "saved");
}

#[tokio::test]
async fn test_timeout_stops_resolution() {
    let upstream = MockServer::start().await;
    mount(
        &upstream,
        "/v1/slow",
        ResponseTemplate::new(200)
            .set_body_json(json!([]))
            .set_delay(Duration::from_millis(500)),
        1,
    )
    .await;
    mount(
        &upstream,
        "/v1/fast",
        ResponseTemplate::new(200).set_body_json(json!([])),
        0,
    )
    .await;

    let table = CandidateTable::new().with(
        Capability::Grades,
        candidates(&upstream, &["slow", "fast"]),
    );
    let resolver = EndpointResolver::new(client(Duration::from_millis(100)), table);

    let err = resolver
        .invoke(Capability::Grades, &pair(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Timeout {
            capability: Capability::Grades,
            ..
        }
    ));
}

#[tokio::test]
async fn test_budget_bounds_a_walk_over_slow_candidates() {
    let upstream = MockServer::start().await;
    let slow_miss = ResponseTemplate::new(404).set_delay(Duration::from_millis(300));
    mount(&upstream, "/v1/a", slow_miss.clone(), 1).await;
    mount(&upstream, "/v1/b", slow_miss.clone(), 1).await;
    mount(&upstream, "/v1/c", slow_miss.clone(), 0).await;
    mount(&upstream, "/v1/d", slow_miss, 0).await;

    let table = CandidateTable::new().with(
        Capability::Grades,
        candidates(&upstream, &["a", "b", "c", "d"]),
    );
    // every single call fits the client timeout, but the walk does not fit the budget
    let resolver = EndpointResolver::new(client(Duration::from_secs(2)), table)
        .with_budget(Duration::from_millis(450));

    let started = std::time::Instant::now();
    let err = resolver
        .invoke(Capability::Grades, &pair(), None)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(1_000));
    match err {
        ResolveError::Timeout {
            capability,
            candidate,
        } => {
            assert_eq!(capability, Capability::Grades);
            assert!(candidate.url().ends_with("/v1/b"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_oversized_body_advances_to_next_candidate() {
    let upstream = MockServer::start().await;
    let huge: Vec<Value> = (0..200_000).map(|i| json!({"id": i, "note": "padding"})).collect();
    mount(
        &upstream,
        "/v1/huge",
        ResponseTemplate::new(200).set_body_json(Value::Array(huge)),
        1,
    )
    .await;
    mount(
        &upstream,
        "/v1/small",
        ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])),
        1,
    )
    .await;

    let table = CandidateTable::new().with(
        Capability::Grades,
        candidates(&upstream, &["huge", "small"]),
    );
    let resolver = EndpointResolver::new(client(Duration::from_secs(5)), table);

    let value = resolver.invoke(Capability::Grades, &pair(), None).await.unwrap();
    assert_eq!(value, json!([{"id": 1}]));
}

#[tokio::test]
async fn test_oversized_body_is_reported() {
    let upstream = MockServer::start().await;
    mount(
        &upstream,
        "/v1/huge",
        ResponseTemplate::new(200).set_body_bytes(vec![b' '; 5 * 1024 * 1024]),
        1,
    )
    .await;

    let table = CandidateTable::new().with(Capability::Grades, candidates(&upstream, &["huge"]));
    let resolver = EndpointResolver::new(client(Duration::from_secs(5)), table);

    let ResolveError::Unavailable { failures, .. } = resolver
        .invoke(Capability::Grades, &pair(), None)
        .await
        .unwrap_err()
    else {
        panic!("expected an unavailable error");
    };
    assert_eq!(failures[0].reason, FailureReason::BodyTooLarge);
}
