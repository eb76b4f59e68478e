//! Target reload semantics observed through the front surface.

use std::net::SocketAddr;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

use redfish_proxy::config::schema::{
    AuthMode, CallerConfig, CredentialsConfig, ProxyConfig, TargetConfig, TargetTimeoutConfig,
    TargetTlsConfig, TlsModeConfig, UpstreamScheme,
};
use redfish_proxy::proxy::{apply_reload, build_router, AppState};

mod common;
use common::{MockResponse, MockUpstream};

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn config_for(address: String) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.auth.mode = AuthMode::Basic;
    config.auth.callers = vec![CallerConfig {
        caller: "admin".into(),
        secret_hash: sha256_hex("pw"),
    }];
    config.targets = vec![TargetConfig {
        id: "a".into(),
        address,
        scheme: UpstreamScheme::Http,
        enabled: true,
        credentials: CredentialsConfig::Basic {
            username: "u".into(),
            secret: "p".into(),
        },
        tls: TargetTlsConfig {
            mode: TlsModeConfig::InsecureSkipVerify,
            ..TargetTlsConfig::default()
        },
        timeouts: TargetTimeoutConfig::default(),
    }];
    config
}

async fn start_proxy(config: ProxyConfig) -> (String, AppState) {
    let state = AppState::from_config(&config);
    let router = build_router(&config, state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), state)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_in_flight_request_survives_reload_and_new_requests_move_over() {
    let old_upstream =
        MockUpstream::start_with(|_| {
            MockResponse::new(200, r#"{"generation":"old"}"#)
                .with_delay(Duration::from_millis(1500))
        })
        .await;
    let new_upstream = MockUpstream::start(200, r#"{"generation":"new"}"#).await;

    let (url, state) = start_proxy(config_for(old_upstream.addr.to_string())).await;

    // Long-running request against the old generation.
    let in_flight = {
        let client = client();
        let url = url.clone();
        tokio::spawn(async move {
            client
                .get(format!("{}/a/redfish/v1", url))
                .basic_auth("admin", Some("pw"))
                .send()
                .await
                .unwrap()
        })
    };

    // Let the in-flight request reach the old upstream, then re-address
    // the target.
    tokio::time::sleep(Duration::from_millis(400)).await;
    apply_reload(&state, &config_for(new_upstream.addr.to_string()));

    // A fresh request resolves against the new generation.
    let response = client()
        .get(format!("{}/a/redfish/v1", url))
        .basic_auth("admin", Some("pw"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"generation":"new"}"#);

    // The in-flight request still completes against the old upstream.
    let response = in_flight.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"generation":"old"}"#);

    assert_eq!(old_upstream.requests().len(), 1);
    assert_eq!(new_upstream.requests().len(), 1);
}

#[tokio::test]
async fn test_removed_target_stops_resolving() {
    let upstream = MockUpstream::start(200, "{}").await;
    let (url, state) = start_proxy(config_for(upstream.addr.to_string())).await;

    let response = client()
        .get(format!("{}/a/redfish/v1", url))
        .basic_auth("admin", Some("pw"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let mut emptied = config_for(upstream.addr.to_string());
    emptied.targets.clear();
    apply_reload(&state, &emptied);

    let response = client()
        .get(format!("{}/a/redfish/v1", url))
        .basic_auth("admin", Some("pw"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.headers().get("x-proxy-origin").unwrap(), "true");
}
