use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{basic_credentials, fail, Account, ApiError, ApiKey, Db, Store};

const DEFAULT_PLAN: &str = "Free";

#[derive(Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Search {
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRef {
    pub grant_id: String,
}

#[derive(Deserialize)]
pub struct Plan {
    #[serde(rename = "type")]
    pub kind: String,
}

pub async fn create_account(
    State(db): State<Db>,
    Json(input): Json<NewAccount>,
) -> Result<Json<Value>, ApiError> {
    if input.email.is_empty() || input.password.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "email and password are required"));
    }
    let mut store = db.write().await;
    if store.accounts.iter().any(|a| a.email == input.email) {
        return Err(fail(StatusCode::BAD_REQUEST, "an account already exists for this email"));
    }

    let account_id = format!("{:010}", store.accounts.len() + 1);
    let api_key = uuid::Uuid::new_v4().to_string().to_uppercase();
    let permissions: Vec<Value> = ["read", "write", "explore", "execute"]
        .iter()
        .map(|access| {
            json!({
                "accessType": access,
                "path": format!("/{account_id}/"),
                "ownerAccountIds": [account_id],
            })
        })
        .collect();
    let root_grant_id = store.insert_grant(json!({ "permissions": permissions }), None, None);
    store.api_keys.insert(
        api_key.clone(),
        ApiKey {
            api_key: api_key.clone(),
            issuer: None,
            grants: vec![root_grant_id.clone()],
        },
    );
    store.accounts.push(Account {
        account_id: account_id.clone(),
        email: input.email,
        password: input.password,
        api_key,
        root_grant_id,
        plan: DEFAULT_PLAN.to_string(),
    });
    debug!(%account_id, "created account");
    Ok(Json(json!({ "accountId": account_id })))
}

pub async fn search(State(db): State<Db>, Query(q): Query<Search>) -> Json<Value> {
    let store = db.read().await;
    let found: Vec<Value> = store
        .accounts
        .iter()
        .filter(|a| Some(&a.email) == q.email.as_ref())
        .map(|a| json!({ "accountId": a.account_id }))
        .collect();
    Json(Value::Array(found))
}

/// The account `id`, provided the request carries its Basic credentials.
fn authenticated<'a>(store: &'a mut Store, id: &str, headers: &HeaderMap) -> Result<&'a mut Account, ApiError> {
    let (user, pass) = basic_credentials(headers)
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "basic credentials required"))?;
    let account = store
        .accounts
        .iter_mut()
        .find(|a| a.account_id == id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such account"))?;
    if account.email != user || account.password != pass {
        return Err(fail(StatusCode::UNAUTHORIZED, "invalid credentials"));
    }
    Ok(account)
}

pub async fn describe(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let account = authenticated(&mut store, &id, &headers)?;
    let mut record = serde_json::to_value(&*account).unwrap_or_default();
    record["plan"] = json!({ "type": account.plan });
    Ok(Json(record))
}

pub async fn reset_password(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    if !store.accounts.iter().any(|a| a.account_id == id) {
        return Err(fail(StatusCode::NOT_FOUND, "no such account"));
    }
    Ok(Json(json!({})))
}

pub async fn add_grant(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(grant): Json<GrantRef>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    if !store.grants.contains_key(&grant.grant_id) {
        return Err(fail(StatusCode::NOT_FOUND, "no such grant"));
    }
    let key = store
        .accounts
        .iter()
        .find(|a| a.account_id == id)
        .map(|a| a.api_key.clone())
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such account"))?;
    if let Some(api_key) = store.api_keys.get_mut(&key) {
        api_key.grants.push(grant.grant_id);
    }
    Ok(Json(json!({})))
}

pub async fn current_plan(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let account = authenticated(&mut store, &id, &headers)?;
    Ok(Json(json!({ "type": account.plan })))
}

pub async fn change_plan(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(plan): Json<Plan>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let account = authenticated(&mut store, &id, &headers)?;
    account.plan = plan.kind;
    Ok(Json(json!({})))
}

pub async fn delete_plan(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let account = authenticated(&mut store, &id, &headers)?;
    let previous = std::mem::replace(&mut account.plan, DEFAULT_PLAN.to_string());
    Ok(Json(json!({ "type": previous })))
}
