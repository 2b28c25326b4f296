use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{authorize, fail, ApiError, ApiKey, Db, KeyQuery};

#[derive(Deserialize)]
pub struct NewKey {
    #[serde(default)]
    pub grants: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRef {
    pub grant_id: String,
}

pub async fn list_keys(State(db): State<Db>, Query(q): Query<KeyQuery>) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    let caller = authorize(&store, &q)?;
    let keys: Vec<Value> = store
        .api_keys
        .values()
        .filter(|k| k.issuer.as_deref() == Some(caller.as_str()))
        .map(|k| store.render_key(k))
        .collect();
    Ok(Json(Value::Array(keys)))
}

pub async fn create_key(
    State(db): State<Db>,
    Query(q): Query<KeyQuery>,
    Json(input): Json<NewKey>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let caller = authorize(&store, &q)?;
    let grants = input
        .grants
        .into_iter()
        .map(|g| store.insert_grant(g, Some(caller.clone()), None))
        .collect();
    let key = ApiKey {
        api_key: uuid::Uuid::new_v4().to_string().to_uppercase(),
        issuer: Some(caller),
        grants,
    };
    let rendered = store.render_key(&key);
    store.api_keys.insert(key.api_key.clone(), key);
    Ok(Json(rendered))
}

pub async fn describe_key(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    let found = store
        .api_keys
        .get(&key)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such API key"))?;
    Ok(Json(store.render_key(found)))
}

pub async fn delete_key(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    authorize(&store, &q)?;
    store
        .api_keys
        .remove(&key)
        .map(|_| Json(json!({})))
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such API key"))
}

pub async fn key_grants(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    let found = store
        .api_keys
        .get(&key)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such API key"))?;
    Ok(Json(store.render_key(found)["grants"].clone()))
}

/// Attach a grant to a key. The body is either `{"grantId": ..}` naming an
/// existing grant or a full grant record, which is stored first.
pub async fn add_key_grant(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(q): Query<KeyQuery>,
    Json(grant): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let caller = authorize(&store, &q)?;
    if !store.api_keys.contains_key(&key) {
        return Err(fail(StatusCode::NOT_FOUND, "no such API key"));
    }
    let grant_id = match serde_json::from_value::<GrantRef>(grant.clone()) {
        Ok(GrantRef { grant_id }) if store.grants.contains_key(&grant_id) => grant_id,
        Ok(_) => return Err(fail(StatusCode::NOT_FOUND, "no such grant")),
        Err(_) => store.insert_grant(grant, Some(caller), None),
    };
    if let Some(found) = store.api_keys.get_mut(&key) {
        if !found.grants.contains(&grant_id) {
            found.grants.push(grant_id);
        }
    }
    Ok(Json(json!({})))
}

pub async fn remove_key_grant(
    State(db): State<Db>,
    Path((key, grant)): Path<(String, String)>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    authorize(&store, &q)?;
    let found = store
        .api_keys
        .get_mut(&key)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such API key"))?;
    let before = found.grants.len();
    found.grants.retain(|g| *g != grant);
    if found.grants.len() == before {
        return Err(fail(StatusCode::NOT_FOUND, "grant not attached to key"));
    }
    Ok(Json(json!({})))
}

pub async fn create_grant(
    State(db): State<Db>,
    Query(q): Query<KeyQuery>,
    Json(grant): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let caller = authorize(&store, &q)?;
    let id = store.insert_grant(grant, Some(caller), None);
    Ok(Json(json!({ "grantId": id })))
}

pub async fn describe_grant(
    State(db): State<Db>,
    Path(grant): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    store
        .grants
        .get(&grant)
        .map(|g| Json(g.record.clone()))
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such grant"))
}

pub async fn delete_grant(
    State(db): State<Db>,
    Path(grant): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let caller = authorize(&store, &q)?;
    let found = store
        .grants
        .get(&grant)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such grant"))?;
    if found.issuer.as_deref() != Some(caller.as_str()) {
        return Err(fail(StatusCode::FORBIDDEN, "only the issuing key may delete a grant"));
    }
    store.grants.remove(&grant);
    for key in store.api_keys.values_mut() {
        key.grants.retain(|g| *g != grant);
    }
    Ok(Json(json!({})))
}

pub async fn grant_children(
    State(db): State<Db>,
    Path(grant): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    if !store.grants.contains_key(&grant) {
        return Err(fail(StatusCode::NOT_FOUND, "no such grant"));
    }
    let children: Vec<Value> = store
        .grants
        .values()
        .filter(|g| g.parent.as_deref() == Some(grant.as_str()))
        .map(|g| g.record.clone())
        .collect();
    Ok(Json(Value::Array(children)))
}

pub async fn create_grant_child(
    State(db): State<Db>,
    Path(grant): Path<String>,
    Query(q): Query<KeyQuery>,
    Json(child): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    let caller = authorize(&store, &q)?;
    if !store.grants.contains_key(&grant) {
        return Err(fail(StatusCode::NOT_FOUND, "no such grant"));
    }
    let id = store.insert_grant(child, Some(caller), Some(grant));
    Ok(Json(json!({ "grantId": id })))
}
