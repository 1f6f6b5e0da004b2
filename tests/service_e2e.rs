// SPDX-License-Identifier: MIT OR Apache-2.0
//! Full service flow: façade, HTTP frontend and XML-RPC over one cache.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use convd_convert::{Client, MockConverter, Options};
use convd_daemon::{AppState, build_app};
use http_body_util::BodyExt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

fn test_app(cache_dir: PathBuf) -> axum::Router {
    build_app(Arc::new(AppState::new(
        Arc::new(MockConverter),
        Some(cache_dir),
    )))
}

#[tokio::test]
async fn facade_and_http_share_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("cache");
    let src = tmp.path().join("sample.txt");
    fs::write(&src, "Hi there!").unwrap();

    // Convert through the façade; the artifact lands in the cache.
    let client = Client::with_cache_dir(Arc::new(MockConverter), &cache_dir);
    let converted = tokio::task::spawn_blocking({
        let client = client.clone();
        let src = src.clone();
        move || client.convert(&src, &Options::default())
    })
    .await
    .unwrap()
    .unwrap();
    let cache_key = converted.cache_key.unwrap();
    assert_eq!(cache_key, "396199333edbf40ad43e62a1c1397793_1_1");

    // The HTTP frontend serves the same bytes under /docs/<cache_key>.
    let resp = test_app(cache_dir.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/docs/{cache_key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );
    let via_http = resp.into_body().collect().await.unwrap().to_bytes();
    let via_facade = fs::read(converted.path.unwrap()).unwrap();
    assert_eq!(&via_http[..], &via_facade[..]);

    // The XML-RPC frontend resolves the key to a cache path.
    let call = format!(
        "<?xml version='1.0'?><methodCall><methodName>get_cached</methodName>\
         <params><param><value><string>{cache_key}</string></value></param></params>\
         </methodCall>"
    );
    let resp = test_app(cache_dir.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/RPC2")
                .header(header::CONTENT_TYPE, "text/xml")
                .body(Body::from(call))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let body = std::str::from_utf8(&body).unwrap();
    assert!(body.contains(&*cache_dir.to_string_lossy()), "got: {body}");
}

#[tokio::test]
async fn http_upload_is_visible_to_the_facade() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("cache");

    let boundary = "x-service-e2e-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"doc\"; \
         filename=\"sample.txt\"\r\n\r\nHi there!\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"CREATE\"\r\n\r\nSend\r\n\
         --{boundary}--\r\n"
    );
    let resp = test_app(cache_dir.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/docs")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // The same source converted through the façade is now a cache hit.
    let src = tmp.path().join("sample.txt");
    fs::write(&src, "Hi there!").unwrap();
    let client = Client::with_cache_dir(Arc::new(MockConverter), &cache_dir);
    let hit = tokio::task::spawn_blocking(move || {
        client.get_cached_by_source(&src, &Options::default())
    })
    .await
    .unwrap()
    .unwrap();
    let (path, cache_key) = hit.expect("upload must be shared through the cache");
    assert!(path.starts_with(&cache_dir));
    assert_eq!(cache_key, "396199333edbf40ad43e62a1c1397793_1_1");
}
