//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port in its own thread and
//! runtime, then drives the public `Precog` API over real HTTP. The socket
//! transport is used by default; the tunnel tests route the same calls
//! through `ScriptTransport`.

use std::net::SocketAddr;
use std::sync::Arc;

use precog_core::transport::{CallbackRegistry, ScriptTransport, SocketTransport};
use precog_core::{
    AccountCredentials, AsyncQuery, ClientConfig, Error, FileType, Precog, Query, UploadFile,
};
use serde_json::{json, Value};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn credentials() -> AccountCredentials {
    AccountCredentials::new("ann@example.com", "secret")
}

/// Create the test account and return `(accountId, a client using its key)`.
async fn signup(addr: SocketAddr) -> (String, Precog) {
    let anonymous = Precog::new(ClientConfig::new(&format!("http://{addr}")));
    let created = anonymous.create_account(&credentials()).await.unwrap();
    let account_id = created["accountId"].as_str().unwrap().to_string();

    let account = anonymous.describe_account(&credentials()).await.unwrap();
    assert_eq!(account["email"], "ann@example.com");
    assert_eq!(account["accountId"], account_id.as_str());
    let api_key = account["apiKey"].as_str().unwrap();

    let client = Precog::new(ClientConfig::new(&format!("http://{addr}")).with_api_key(api_key));
    (account_id, client)
}

#[tokio::test]
async fn account_lifecycle() {
    let addr = start_server();
    let (account_id, client) = signup(addr).await;

    assert_eq!(client.lookup_account_id("ann@example.com").await.unwrap(), account_id);
    let missing = client.lookup_account_id("bob@example.com").await.unwrap_err();
    assert_eq!(missing.status(), Some(400));

    let duplicate = client.create_account(&credentials()).await.unwrap_err();
    assert_eq!(duplicate.status(), Some(400));

    client.request_password_reset("ann@example.com").await.unwrap();

    assert_eq!(client.current_plan(&credentials()).await.unwrap(), "Free");
    client.change_plan(&credentials(), "Bronze").await.unwrap();
    assert_eq!(client.current_plan(&credentials()).await.unwrap(), "Bronze");
    assert_eq!(client.delete_plan(&credentials()).await.unwrap(), "Bronze");
    assert_eq!(client.current_plan(&credentials()).await.unwrap(), "Free");

    let wrong = AccountCredentials::new("ann@example.com", "wrong");
    assert_eq!(client.describe_account(&wrong).await.unwrap_err().status(), Some(401));
}

#[tokio::test]
async fn upload_list_and_delete() {
    let addr = start_server();
    let (account_id, client) = signup(addr).await;
    let dir = format!("/{account_id}");
    let file = format!("/{account_id}/test");

    let upload = UploadFile::new(&file, FileType::Json, "{\"a\":1}\n{\"a\":2}\n");
    let ingested = client.upload_file(&upload).await.unwrap();
    assert_eq!(ingested["ingested"], 2);

    assert_eq!(client.list_children(&dir).await.unwrap(), vec!["test/"]);
    assert!(client.exists_file(&file).await.unwrap());
    assert!(!client.exists_file(&format!("{dir}/other")).await.unwrap());

    // Uploading again replaces the previous contents.
    client.upload_file(&upload).await.unwrap();
    let stored = client.retrieve_file(&file).await.unwrap();
    assert_eq!(stored.file_type, FileType::Json);
    let records: Value = serde_json::from_str(&stored.contents).unwrap();
    assert_eq!(records, json!([{"a": 1}, {"a": 2}]));

    let exists = client.create_file(&upload).await.unwrap_err();
    assert!(matches!(exists, Error::AlreadyExists(_)));

    client.delete(&file).await.unwrap();
    assert!(client.list_children(&dir).await.unwrap().is_empty());
}

#[tokio::test]
async fn append_copy_move_and_delete_all() {
    let addr = start_server();
    let (account_id, client) = signup(addr).await;
    let dir = format!("/{account_id}");

    client.append(&format!("{dir}/events/clicks"), json!({"x": 1})).await.unwrap();
    client.append(&format!("{dir}/events/clicks"), json!({"x": 2})).await.unwrap();
    client
        .upload_file(&UploadFile::new(
            format!("{dir}/people.csv"),
            FileType::Csv,
            "name,age\nann,31\n",
        ))
        .await
        .unwrap();

    let mut descendants = client.list_descendants(&dir).await.unwrap();
    descendants.sort();
    assert_eq!(descendants, vec!["events", "events/clicks", "people.csv"]);

    client
        .copy_file(&format!("{dir}/people.csv"), &format!("{dir}/backup/people.csv"))
        .await
        .unwrap();
    let copied = client.retrieve_file(&format!("{dir}/backup/people.csv")).await.unwrap();
    let copied: Value = serde_json::from_str(&copied.contents).unwrap();
    assert_eq!(copied, json!([{"name": "ann", "age": 31}]));

    client
        .move_directory(&format!("{dir}/events"), &format!("{dir}/archive"))
        .await
        .unwrap();
    let mut children = client.list_children(&dir).await.unwrap();
    children.sort();
    assert_eq!(children, vec!["archive/", "backup/", "people.csv/"]);

    client
        .move_file(&format!("{dir}/people.csv"), &format!("{dir}/archive/people.csv"))
        .await
        .unwrap();
    assert!(!client.exists_file(&format!("{dir}/people.csv")).await.unwrap());

    let deleted = client.delete_all(&dir).await.unwrap();
    assert!(!deleted.is_empty());
    assert!(client.list_children(&dir).await.unwrap().is_empty());
}

#[tokio::test]
async fn queries() {
    let addr = start_server();
    let (account_id, client) = signup(addr).await;

    let result = client.execute(&Query::new("1 + 2")).await.unwrap();
    assert_eq!(result["data"], json!([3]));
    assert_eq!(result["errors"], json!([]));

    client
        .append(&format!("/{account_id}/nums"), json!(1))
        .await
        .unwrap();
    client
        .append(&format!("/{account_id}/nums"), json!(2))
        .await
        .unwrap();
    let mut relative = Query::new("//nums");
    relative.path = Some(account_id.clone());
    relative.skip = Some(1);
    let result = client.execute(&relative).await.unwrap();
    assert_eq!(result["data"], json!([2]));

    let err = client.execute(&Query::new("1 +")).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert_eq!(err.status(), Some(400));

    let job = client.async_query(&AsyncQuery::new("6 * 7")).await.unwrap();
    let job_id = job["jobId"].as_str().unwrap();
    let results = client.async_query_results(job_id).await.unwrap();
    assert_eq!(results["data"], json!([42]));
}

#[tokio::test]
async fn api_keys_and_grants() {
    let addr = start_server();
    let (account_id, client) = signup(addr).await;

    let grant = json!({
        "permissions": [{
            "accessType": "read",
            "path": format!("/{account_id}/"),
            "ownerAccountIds": [account_id],
        }]
    });
    let created = client
        .create_api_key(&json!({ "grants": [grant.clone()] }))
        .await
        .unwrap();
    let child_key = created["apiKey"].as_str().unwrap().to_string();

    let keys = client.list_api_keys().await.unwrap();
    assert_eq!(keys.as_array().unwrap().len(), 1);
    assert_eq!(client.describe_api_key(&child_key).await.unwrap()["apiKey"], child_key.as_str());

    let grant_id = client.create_grant(&grant).await.unwrap()["grantId"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(client.describe_grant(&grant_id).await.unwrap()["grantId"], grant_id.as_str());

    client
        .add_grant_to_api_key(&child_key, &json!({ "grantId": grant_id }))
        .await
        .unwrap();
    let grants = client.retrieve_api_key_grants(&child_key).await.unwrap();
    assert_eq!(grants.as_array().unwrap().len(), 2);
    client.remove_grant_from_api_key(&child_key, &grant_id).await.unwrap();
    let grants = client.retrieve_api_key_grants(&child_key).await.unwrap();
    assert_eq!(grants.as_array().unwrap().len(), 1);

    let child = client
        .create_grant_child(&grant_id, &json!({ "permissions": [] }))
        .await
        .unwrap();
    let children = client.list_grant_children(&grant_id).await.unwrap();
    assert_eq!(children[0]["grantId"], child["grantId"]);

    client.add_grant_to_account(&account_id, &grant_id).await.unwrap();
    client.delete_grant(&grant_id).await.unwrap();
    assert_eq!(client.describe_grant(&grant_id).await.unwrap_err().status(), Some(404));

    client.delete_api_key(&child_key).await.unwrap();
    assert_eq!(client.describe_api_key(&child_key).await.unwrap_err().status(), Some(404));
}

#[tokio::test]
async fn tunnel_transport_round_trips() {
    let addr = start_server();
    let registry = CallbackRegistry::new();
    let tunnel = Arc::new(ScriptTransport::new(SocketTransport::new(), registry.clone()));
    let anonymous = Precog::with_transport(ClientConfig::new(&format!("http://{addr}")), tunnel.clone());

    let created = anonymous.create_account(&credentials()).await.unwrap();
    let account = anonymous.describe_account(&credentials()).await.unwrap();
    assert_eq!(account["accountId"], created["accountId"]);

    let config = ClientConfig::new(&format!("http://{addr}"))
        .with_api_key(account["apiKey"].as_str().unwrap());
    let client = Precog::with_transport(config, tunnel);
    let result = client.execute(&Query::new("1 + 2")).await.unwrap();
    assert_eq!(result["data"], json!([3]));

    // Error statuses arrive inside the callback and still fail the call.
    let err = client.describe_grant("no-such-grant").await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    assert!(registry.is_empty());
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let client = Precog::new(ClientConfig::new("http://127.0.0.1:1").with_api_key("k"));
    let err = client.execute(&Query::new("1")).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
