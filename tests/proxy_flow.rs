mod common;

use std::time::{Duration, Instant};

use common::{
    client, dead_address, encode, proxied, raw_response, start_mock_upstream, start_proxy,
    start_stalled_upstream,
};
use reqwest::StatusCode;
use rewrite_proxy::ProxyConfig;

#[tokio::test]
async fn html_page_is_rewritten_and_identity_spoofed() {
    let (upstream, recorded) = start_mock_upstream(|_| {
        raw_response(
            "200 OK",
            &[
                ("Content-Type", "text/html; charset=utf-8"),
                ("X-Frame-Options", "DENY"),
                ("Content-Security-Policy", "frame-ancestors 'none'"),
            ],
            br#"<html><a href="/next">n</a><img src="img/a.png"><script src="https://cdn.example/lib.js"></script><img src="data:image/gif;base64,R0lG"></html>"#,
        )
    })
    .await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let page = format!("http://{}/dir/page.html", upstream);
    let response = client()
        .get(proxied(proxy, &page))
        .header("X-Forwarded-For", "203.0.113.9")
        .header("CF-Connecting-IP", "203.0.113.9")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers().get("x-frame-options").is_none());
    assert!(response.headers().get("content-security-policy").is_none());
    assert!(response.headers().get("x-request-id").is_some());

    let body = response.text().await.unwrap();
    let base = format!("http://{}", upstream);
    assert!(body.contains(&format!(r#"href="{}""#, proxied(proxy, &format!("{}/next", base)))));
    assert!(body.contains(&format!(r#"src="{}""#, proxied(proxy, &format!("{}/dir/img/a.png", base)))));
    assert!(body.contains(&format!(r#"src="{}""#, proxied(proxy, "https://cdn.example/lib.js"))));
    assert!(body.contains(r#"src="data:image/gif;base64,R0lG""#));

    let requests = recorded.lock().unwrap();
    let seen = &requests[0];
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path, "/dir/page.html");
    assert!(seen.header("user-agent").unwrap().contains("Chrome/120"));
    assert_eq!(seen.header("referer"), Some(base.as_str()));
    assert_eq!(seen.header("origin"), Some(base.as_str()));
    assert_eq!(seen.header("sec-fetch-mode"), Some("navigate"));
    assert!(seen.header("x-forwarded-for").is_none());
    assert!(seen.header("cf-connecting-ip").is_none());

    shutdown.trigger();
}

#[tokio::test]
async fn hls_manifest_segments_route_through_proxy() {
    let (upstream, _) = start_mock_upstream(|_| {
        raw_response(
            "200 OK",
            &[("Content-Type", "application/vnd.apple.mpegurl")],
            b"#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nseg1.ts\n#EXT-X-ENDLIST\n",
        )
    })
    .await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let manifest = format!("http://{}/path/index.m3u8", upstream);
    let body = client()
        .get(proxied(proxy, &manifest))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let segment = proxied(proxy, &format!("http://{}/path/seg1.ts", upstream));
    assert_eq!(
        body,
        format!("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\n{}\n#EXT-X-ENDLIST\n", segment)
    );

    shutdown.trigger();
}

#[tokio::test]
async fn redirect_location_points_back_at_proxy() {
    let (upstream, _) = start_mock_upstream(|_| {
        raw_response("302 Found", &[("Location", "/new?x=1")], b"")
    })
    .await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let response = client()
        .get(proxied(proxy, &format!("http://{}/old", upstream)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"],
        proxied(proxy, &format!("http://{}/new?x=1", upstream)).as_str()
    );

    shutdown.trigger();
}

#[tokio::test]
async fn public_origin_is_used_for_wrapping() {
    let (upstream, _) = start_mock_upstream(|_| {
        raw_response("301 Moved Permanently", &[("Location", "https://site.example/new")], b"")
    })
    .await;
    let mut config = ProxyConfig::default();
    config.proxy.public_origin = Some("https://proxy.example".into());
    let (proxy, shutdown) = start_proxy(config).await;

    let response = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["location"],
        format!("https://proxy.example/?url={}", encode("https://site.example/new")).as_str()
    );

    shutdown.trigger();
}

#[tokio::test]
async fn missing_and_invalid_targets_are_400() {
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let response = client()
        .get(format!("http://{}/watch", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "missing_target");

    let response = client()
        .get(format!("http://{}/?url={}", proxy, encode("file:///etc/passwd")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "invalid_target");

    shutdown.trigger();
}

#[tokio::test]
async fn preflight_skips_upstream() {
    let (upstream, recorded) = start_mock_upstream(|_| raw_response("200 OK", &[], b"")).await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, proxied(proxy, &format!("http://{}/", upstream)))
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["access-control-max-age"], "86400");
    assert!(recorded.lock().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_is_502() {
    let dead = dead_address().await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let response = client()
        .get(proxied(proxy, &format!("http://{}/", dead)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "upstream_unavailable");
    assert!(!json["message"].as_str().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn stalled_html_body_is_502_before_router_timeout() {
    let upstream = start_stalled_upstream(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 100\r\n\r\n<html>",
    )
    .await;
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 1;
    config.upstream.request_timeout_secs = 3;
    let (proxy, shutdown) = start_proxy(config).await;

    let started = Instant::now();
    let response = client()
        .get(proxied(proxy, &format!("http://{}/slow.html", upstream)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "upstream_unavailable");
    assert!(!json["message"].as_str().unwrap().is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));

    shutdown.trigger();
}

#[tokio::test]
async fn post_body_and_cookie_are_forwarded() {
    let (upstream, recorded) = start_mock_upstream(|req| {
        raw_response("201 Created", &[("Content-Type", "application/json")], &req.body)
    })
    .await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    let payload = br#"{"query":"a&b=c"}"#.to_vec();
    let response = client()
        .post(proxied(proxy, &format!("http://{}/api/search", upstream)))
        .header("Content-Type", "application/json")
        .header("Cookie", "session=abc; theme=dark")
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.bytes().await.unwrap().as_ref(), payload.as_slice());

    let requests = recorded.lock().unwrap();
    let seen = &requests[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, payload);
    assert_eq!(seen.header("content-type"), Some("application/json"));
    assert_eq!(seen.header("cookie"), Some("session=abc; theme=dark"));

    shutdown.trigger();
}

#[tokio::test]
async fn get_body_is_not_forwarded() {
    let (upstream, recorded) = start_mock_upstream(|_| raw_response("200 OK", &[], b"ok")).await;
    let (proxy, shutdown) = start_proxy(ProxyConfig::default()).await;

    client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .body("ignored")
        .send()
        .await
        .unwrap();

    let requests = recorded.lock().unwrap();
    assert!(requests[0].body.is_empty());
    assert!(requests[0].header("content-length").is_none());

    shutdown.trigger();
}
