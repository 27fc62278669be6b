//! End-to-end tests against a server on a real socket.

mod common;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};

use devserve::project::ProjectDescriptor;

use common::{client, project_dir, start_chunked_backend, start_mock_backend, start_server};

#[tokio::test]
async fn dashboard_is_reachable_without_a_project() {
    let server = start_server(5).await;
    let http = client();

    let res = http.get(server.url("/_")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = res.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("/_/index.html?ver="));

    let res = http.get(server.url(&location)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "<h1>dashboard</h1>");

    let res = http.get(server.url("/index.html")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn activation_through_the_api_serves_files() {
    let server = start_server(5).await;
    let tmp = tempfile::tempdir().unwrap();
    let site = project_dir(tmp.path(), "site", "<p>site</p>");
    let http = client();

    let res = http
        .post(server.url("/_/api/projects/activate"))
        .json(&json!({ "path": site }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http.get(server.url("/index.html")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["cache-control"], "no-cache");
    assert!(res.headers().contains_key("x-request-id"));
    let page = res.text().await.unwrap();
    assert!(page.starts_with("<p>site</p>"));
    assert!(page.contains(r#"<script src="/_/reload.js"></script>"#));

    let res = http.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);

    let status: Value = http
        .get(server.url("/_/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["activeProject"]["path"], json!(site));
    assert_eq!(server.store.snapshot().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn file_change_wakes_every_long_poll() {
    let server = start_server(30).await;
    let tmp = tempfile::tempdir().unwrap();
    let site = project_dir(tmp.path(), "site", "v1");
    server.switcher.activate(ProjectDescriptor::new(&site)).await.unwrap();

    let polls: Vec<_> = (0..3)
        .map(|_| {
            let url = server.url("/_/api/changes?since=0");
            tokio::spawn(async move { client().get(url).send().await.unwrap().json::<Value>().await.unwrap() })
        })
        .collect();

    // Give the requests time to park before touching the file.
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(site.join("index.html"), "v2").unwrap();

    for outcome in futures_util::future::join_all(polls).await {
        let outcome = outcome.unwrap();
        assert_eq!(outcome["changed"], true);
        assert!(outcome["generation"].as_u64().unwrap() >= 1);
    }

    server.stop().await;
}

#[tokio::test]
async fn long_poll_times_out_without_change() {
    let server = start_server(1).await;

    let outcome: Value = client()
        .get(server.url("/_/api/changes?since=0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(outcome, json!({ "changed": false, "generation": 0 }));
    server.stop().await;
}

#[tokio::test]
async fn shutdown_releases_parked_long_polls() {
    let server = start_server(300).await;
    let url = server.url("/_/api/changes");
    let poll = tokio::spawn(async move { client().get(url).send().await.unwrap().json::<Value>().await.unwrap() });

    tokio::time::sleep(Duration::from_millis(300)).await;
    server.stop().await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), poll).await.unwrap().unwrap();
    assert_eq!(outcome["changed"], false);
}

#[tokio::test]
async fn proxy_mode_forwards_to_the_upstream() {
    let backend = start_mock_backend("from upstream").await;
    let server = start_server(5).await;
    let tmp = tempfile::tempdir().unwrap();
    let site = project_dir(tmp.path(), "site", "local");
    let http = client();

    let res = http
        .post(server.url("/_/api/projects/activate"))
        .json(&json!({ "path": site, "targetHost": backend.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http.get(server.url("/app/page?x=1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-echo-request"], "GET /app/page?x=1 HTTP/1.1");
    assert_eq!(res.headers()["x-echo-host"], backend.to_string().as_str());
    assert_eq!(res.text().await.unwrap(), "from upstream");

    // The dashboard and API stay local in proxy mode.
    let res = http.get(server.url("/_/api/projects")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn proxy_streams_chunks_as_they_arrive() {
    let (release, held) = tokio::sync::oneshot::channel();
    let backend = start_chunked_backend("first", "second", held).await;
    let server = start_server(5).await;
    let tmp = tempfile::tempdir().unwrap();
    let site = project_dir(tmp.path(), "site", "local");
    server
        .switcher
        .activate(ProjectDescriptor::new(&site).with_target_host(backend.to_string()))
        .await
        .unwrap();

    let mut res = client().get(server.url("/stream")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The upstream has not finished, so this chunk can only come through streaming.
    let first = tokio::time::timeout(Duration::from_secs(2), res.chunk())
        .await
        .expect("first chunk should arrive before the upstream finishes")
        .unwrap();
    assert_eq!(first.as_deref(), Some(&b"first"[..]));

    release.send(()).unwrap();
    let mut rest = Vec::new();
    while let Some(chunk) = res.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b"second");

    server.stop().await;
}

#[tokio::test]
async fn api_rejects_bad_requests() {
    let server = start_server(5).await;
    let http = client();

    let res = http
        .post(server.url("/_/api/projects/activate"))
        .json(&json!({ "path": "/definitely/not/here" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("does not exist"));

    let res = http
        .post(server.url("/_/api/projects/mute"))
        .json(&json!({ "path": "/definitely/not/here", "muteList": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}
