use chrono::{TimeZone, Utc};
use providers::{
    AccountRequest, PanelCredentials, ProviderError, peer_panel::PeerPanelClient,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{basic_auth, body_partial_json, method, path},
};

fn credentials() -> PanelCredentials {
    PanelCredentials {
        username: "admin".to_string(),
        password: "s3cret".to_string(),
    }
}

#[tokio::test]
async fn provisions_peer_in_steps() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/interfaces"))
        .and(basic_auth("admin", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Identifier": "wg0" },
            { "Identifier": "wg1" },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/peers"))
        .and(body_partial_json(json!({
            "InterfaceIdentifier": "wg0",
            "DisplayName": "wg_user_42_9",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Identifier": "peer-9" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/peers/peer-9"))
        .and(body_partial_json(json!({ "Identifier": "peer-9" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/peers/peer-9/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[Interface]\nPrivateKey = abc\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = PeerPanelClient::new(&server.uri(), credentials()).unwrap();
    let account = client
        .create_account(&AccountRequest {
            identity: "wg_user_42_9".to_string(),
            quota_gb: 50.0,
            expires_at: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        })
        .await
        .unwrap();

    assert_eq!(account.external_id, "peer-9");
    assert_eq!(account.config_payload, "[Interface]\nPrivateKey = abc\n");
}

#[tokio::test]
async fn failed_step_reports_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/interfaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "Identifier": "wg0" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/peers"))
        .respond_with(ResponseTemplate::new(500).set_body_string("ip pool exhausted"))
        .mount(&server)
        .await;

    let client = PeerPanelClient::new(&server.uri(), credentials()).unwrap();
    let err = client
        .create_account(&AccountRequest {
            identity: "wg_user_1_1".to_string(),
            quota_gb: 0.0,
            expires_at: None,
        })
        .await
        .unwrap_err();

    match err {
        ProviderError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "ip pool exhausted");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn usage_is_summed_per_peer_and_failing_accounts_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Identifier": "acc-a" },
            { "Identifier": "acc-b" },
            { "Identifier": "acc-c" },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/usage-by-account/acc-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PeerMetrics": [
                { "PeerIdentifier": "peer-1", "BytesReceived": 100, "BytesTransmitted": 50 },
                { "PeerIdentifier": "peer-2", "BytesReceived": 7, "BytesTransmitted": 3 },
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/usage-by-account/acc-b"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/usage-by-account/acc-c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PeerMetrics": [
                { "PeerIdentifier": "peer-1", "BytesReceived": 1, "BytesTransmitted": 1 },
            ]
        })))
        .mount(&server)
        .await;

    let client = PeerPanelClient::new(&server.uri(), credentials()).unwrap();
    let usage = client.fetch_usage().await.unwrap();

    assert_eq!(usage.len(), 2);
    assert_eq!(usage["peer-1"], 152);
    assert_eq!(usage["peer-2"], 10);
}

#[tokio::test]
async fn huge_counters_saturate_instead_of_wrapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Identifier": "acc-a" },
            { "Identifier": "acc-b" },
        ])))
        .mount(&server)
        .await;
    for account in ["acc-a", "acc-b"] {
        Mock::given(method("GET"))
            .and(path(format!("/usage-by-account/{}", account)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "PeerMetrics": [
                    { "PeerIdentifier": "peer-1", "BytesReceived": i64::MAX, "BytesTransmitted": i64::MAX },
                ]
            })))
            .mount(&server)
            .await;
    }

    let client = PeerPanelClient::new(&server.uri(), credentials()).unwrap();
    let usage = client.fetch_usage().await.unwrap();

    assert_eq!(usage["peer-1"], i64::MAX);
}

#[tokio::test]
async fn disable_flags_the_peer() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/peers/peer-9"))
        .and(body_partial_json(json!({ "Identifier": "peer-9", "Disabled": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = PeerPanelClient::new(&server.uri(), credentials()).unwrap();
    client.disable_account("peer-9").await.unwrap();
}
