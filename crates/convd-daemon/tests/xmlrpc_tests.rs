// SPDX-License-Identifier: MIT OR Apache-2.0
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use convd_cache::{CacheManager, ReprKey};
use convd_convert::MockConverter;
use convd_daemon::{AppState, build_app};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

fn test_app(cache_dir: Option<PathBuf>) -> axum::Router {
    build_app(Arc::new(AppState::new(Arc::new(MockConverter), cache_dir)))
}

fn rpc_request(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/RPC2")
        .header(header::CONTENT_TYPE, "text/xml")
        .body(Body::from(body.into()))
        .unwrap()
}

/// `<methodCall>` body with pre-rendered `<value>` elements as params.
fn call_xml(method: &str, values: &[&str]) -> String {
    let mut out = format!(
        "<?xml version='1.0'?>\n<methodCall><methodName>{method}</methodName><params>"
    );
    for value in values {
        out.push_str(&format!("<param><value>{value}</value></param>"));
    }
    out.push_str("</params></methodCall>");
    out
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn http_get_is_rejected() {
    let resp = test_app(None)
        .oneshot(Request::builder().uri("/RPC2").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_xml_post_is_rejected() {
    let resp = test_app(None)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/RPC2")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_methods_includes_conversion_api() {
    let resp = test_app(None)
        .oneshot(rpc_request(call_xml("system.listMethods", &[])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/xml");

    let body = body_text(resp).await;
    assert!(body.starts_with("<?xml version='1.0'?>"), "got: {body}");
    assert!(body.contains("<string>convert_locally</string>"));
    assert!(body.contains("<string>get_cached</string>"));
    assert!(body.contains("<string>system.methodHelp</string>"));
}

#[tokio::test]
async fn method_help_describes_methods() {
    let resp = test_app(None)
        .oneshot(rpc_request(call_xml(
            "system.methodHelp",
            &["<string>get_cached</string>"],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("get_cached(cache_key)"), "got: {body}");
}

#[tokio::test]
async fn unknown_method_is_a_fault() {
    let resp = test_app(None)
        .oneshot(rpc_request(call_xml("no.such.method", &[])))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("<fault>"), "got: {body}");
    assert!(body.contains("faultCode"));
    assert!(body.contains("no.such.method"));
}

#[tokio::test]
async fn malformed_xml_is_a_fault() {
    let resp = test_app(None)
        .oneshot(rpc_request("this is not xml-rpc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("<fault>"), "got: {body}");
}

#[tokio::test]
async fn convert_locally_without_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("sample.txt");
    std::fs::write(&src, "Hi there!\n").unwrap();

    let resp = test_app(None)
        .oneshot(rpc_request(call_xml(
            "convert_locally",
            &[
                &format!("<string>{}</string>", src.display()),
                "<struct></struct>",
            ],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("sample.html.zip"), "got: {body}");
    assert!(body.contains("<name>error</name><value><boolean>0</boolean></value>"));
    assert!(body.contains("<name>oocp_status</name><value><int>0</int></value>"));
    // No cache, no cache key.
    assert!(body.contains("<value><nil/></value>"));
}

#[tokio::test]
async fn convert_locally_with_cache_returns_cache_key() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("sample.txt");
    std::fs::write(&src, "Hi there!\n").unwrap();

    let resp = test_app(Some(tmp.path().join("cache")))
        .oneshot(rpc_request(call_xml(
            "convert_locally",
            &[
                &format!("<string>{}</string>", src.display()),
                "<struct></struct>",
            ],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(
        body.contains("<string>2b87e29fca6ee7f1df6c1a76cb58e101_1_1</string>"),
        "got: {body}"
    );
}

#[tokio::test]
async fn convert_locally_rejects_bad_options() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("sample.txt");
    std::fs::write(&src, "Hi there!\n").unwrap();

    let resp = test_app(None)
        .oneshot(rpc_request(call_xml(
            "convert_locally",
            &[
                &format!("<string>{}</string>", src.display()),
                "<struct><member><name>oocp-out-fmt</name>\
                 <value><string>foo</string></value></member></struct>",
            ],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("<fault>"), "got: {body}");
    assert!(body.contains("invalid value"));
}

#[tokio::test]
async fn get_cached_finds_registered_docs() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("cache");
    let src = tmp.path().join("sample.txt");
    let fake_result = tmp.path().join("result.txt");
    std::fs::write(&src, "Hi there!\n").unwrap();
    std::fs::write(&fake_result, "The Result\n").unwrap();

    let cache = CacheManager::new(&cache_dir).unwrap();
    let key = cache
        .register_doc(&src, &fake_result, ReprKey::from("somekey"))
        .unwrap();
    assert_eq!(key, "2b87e29fca6ee7f1df6c1a76cb58e101_1_1");

    let resp = test_app(Some(cache_dir.clone()))
        .oneshot(rpc_request(call_xml(
            "get_cached",
            &[&format!("<string>{key}</string>")],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;

    // The answer is a path inside the cache, not the registered file.
    let start = body.find("<string>").unwrap() + "<string>".len();
    let end = body.find("</string>").unwrap();
    let cached_path = PathBuf::from(&body[start..end]);
    assert_ne!(cached_path, fake_result);
    assert!(cached_path.starts_with(&cache_dir));
    assert_eq!(
        std::fs::read_to_string(cached_path).unwrap(),
        "The Result\n"
    );
}

#[tokio::test]
async fn get_cached_miss_is_nil() {
    let tmp = tempfile::tempdir().unwrap();
    let resp = test_app(Some(tmp.path().join("cache")))
        .oneshot(rpc_request(call_xml(
            "get_cached",
            &["<string>164dfcf01584bd0e3595b62fb53cf12c_1_1</string>"],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("<value><nil/></value>"), "got: {body}");
}

#[tokio::test]
async fn get_cached_without_cache_dir_is_nil() {
    let resp = test_app(None)
        .oneshot(rpc_request(call_xml(
            "get_cached",
            &["<string>164dfcf01584bd0e3595b62fb53cf12c_1_1</string>"],
        )))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("<value><nil/></value>"), "got: {body}");
}
