//! The Precog API facade.
//!
//! # Design
//! `Precog` holds only its configuration and a `PrecogHttp`; it keeps no
//! state between calls. Each operation validates its inputs, describes one
//! request with `RequestOptions`, and hands back the envelope content.
//! Operations that need an account id chain a lookup first; `delete_all`,
//! `move_directory` and `list_descendants` fan out and wait for every branch.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ClientConfig;
use crate::descendants::{self, ChildLister};
use crate::error::{Error, Result};
use crate::path::{file_target, join_path, sanitize_path};
use crate::precog_http::PrecogHttp;
use crate::request::{Body, RequestOptions};
use crate::response::Envelope;
use crate::transport::Transport;
use crate::types::{
    require, AccountCredentials, Append, AsyncQuery, FileContents, FileType, Query, UploadFile,
};

const SERVICE_VERSION: u32 = 1;

/// Async client for the Precog REST API.
#[derive(Debug, Clone)]
pub struct Precog {
    config: ClientConfig,
    http: PrecogHttp,
}

fn content(envelope: Envelope) -> Value {
    envelope.content.to_value()
}

fn field_str(value: &Value, field: &'static str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Deserialization(format!("expected a string field \"{field}\"")))
}

fn require_value(name: &'static str, value: &Value) -> Result<()> {
    if value.is_null() {
        Err(Error::MissingField(name))
    } else {
        Ok(())
    }
}

/// Wait for every result, then surface the first failure.
fn collect_all<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results.into_iter().collect()
}

impl Precog {
    /// A client using the transport selected for the current runtime.
    pub fn new(config: ClientConfig) -> Self {
        let http = PrecogHttp::detect(config.json_policy);
        Self { config, http }
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let http = PrecogHttp::new(transport, config.json_policy);
        Self { config, http }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn http(&self) -> &PrecogHttp {
        &self.http
    }

    /// `{analyticsService}/{service}/v{version}/{path}` with slash runs
    /// collapsed in the path part.
    pub fn service_url(&self, service: &str, version: u32, path: &str) -> String {
        format!(
            "{}{}",
            self.config.analytics_service.trim_end_matches('/'),
            sanitize_path(&format!("/{service}/v{version}/{path}"))
        )
    }

    pub fn accounts_url(&self, path: &str) -> String {
        self.service_url("accounts", SERVICE_VERSION, path)
    }

    pub fn security_url(&self, path: &str) -> String {
        self.service_url("security", SERVICE_VERSION, path)
    }

    pub fn data_url(&self, path: &str) -> String {
        self.service_url("ingest", SERVICE_VERSION, path)
    }

    pub fn analysis_url(&self, path: &str) -> String {
        self.service_url("analytics", SERVICE_VERSION, path)
    }

    pub fn metadata_url(&self, path: &str) -> String {
        self.service_url("meta", SERVICE_VERSION, path)
    }

    /// `options` with the configured API key attached.
    fn keyed(&self, options: RequestOptions) -> Result<RequestOptions> {
        let key = self.config.require_api_key()?;
        Ok(options.query("apiKey", key))
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account. The email must not already be registered.
    pub async fn create_account(&self, account: &AccountCredentials) -> Result<Value> {
        account.validate()?;
        let body = serde_json::to_value(account).map_err(|e| Error::Serialization(e.to_string()))?;
        let options = RequestOptions::post(self.accounts_url("accounts/")).json(body);
        self.http.post(options).await.map(content)
    }

    /// The account id registered for `email`.
    pub async fn lookup_account_id(&self, email: &str) -> Result<String> {
        require("email", email)?;
        let options = RequestOptions::get(self.accounts_url("accounts/search")).query("email", email);
        let found = content(self.http.get(options).await?);

        match found.as_array().and_then(|a| a.first()) {
            None => Err(Error::http(400, "No account ID found for given email")),
            Some(Value::String(id)) => Ok(id.clone()),
            Some(record) => field_str(record, "accountId"),
        }
    }

    /// Ask the service to send a password reset mail.
    pub async fn request_password_reset(&self, email: &str) -> Result<Value> {
        require("email", email)?;
        let account_id = self.lookup_account_id(email).await?;
        let options = RequestOptions::post(
            self.accounts_url(&format!("accounts/{account_id}/password/reset")),
        )
        .json(json!({ "email": email }));
        self.http.post(options).await.map(content)
    }

    pub async fn describe_account(&self, account: &AccountCredentials) -> Result<Value> {
        account.validate()?;
        let account_id = self.lookup_account_id(&account.email).await?;
        let options = RequestOptions::get(self.accounts_url(&format!("accounts/{account_id}")))
            .basic_auth(&account.email, &account.password);
        self.http.get(options).await.map(content)
    }

    pub async fn add_grant_to_account(&self, account_id: &str, grant_id: &str) -> Result<Value> {
        require("accountId", account_id)?;
        require("grantId", grant_id)?;
        let options = RequestOptions::post(self.accounts_url(&format!("accounts/{account_id}/grants/")))
            .json(json!({ "grantId": grant_id }));
        self.http.post(options).await.map(content)
    }

    /// The name of the plan the account is on.
    pub async fn current_plan(&self, account: &AccountCredentials) -> Result<String> {
        let options = self.plan_request(account).await?;
        let plan = content(self.http.get(options).await?);
        field_str(&plan, "type")
    }

    pub async fn change_plan(&self, account: &AccountCredentials, plan: &str) -> Result<Value> {
        require("plan", plan)?;
        let options = self.plan_request(account).await?.json(json!({ "type": plan }));
        self.http.put(options).await.map(content)
    }

    /// Reset the account to the default plan, returning the plan it was on.
    pub async fn delete_plan(&self, account: &AccountCredentials) -> Result<String> {
        let options = self.plan_request(account).await?;
        let plan = content(self.http.delete(options).await?);
        field_str(&plan, "type")
    }

    async fn plan_request(&self, account: &AccountCredentials) -> Result<RequestOptions> {
        account.validate()?;
        let account_id = self.lookup_account_id(&account.email).await?;
        Ok(
            RequestOptions::get(self.accounts_url(&format!("accounts/{account_id}/plan")))
                .basic_auth(&account.email, &account.password),
        )
    }

    // ------------------------------------------------------------------
    // Security
    // ------------------------------------------------------------------

    pub async fn list_api_keys(&self) -> Result<Value> {
        let options = self.keyed(RequestOptions::get(self.security_url("apikeys/")))?;
        self.http.get(options).await.map(content)
    }

    /// Create an API key carrying `grants`.
    pub async fn create_api_key(&self, grants: &Value) -> Result<Value> {
        require_value("grants", grants)?;
        let options = self
            .keyed(RequestOptions::post(self.security_url("apikeys/")))?
            .json(grants.clone());
        self.http.post(options).await.map(content)
    }

    pub async fn describe_api_key(&self, api_key: &str) -> Result<Value> {
        require("apiKey", api_key)?;
        let options = self.keyed(RequestOptions::get(self.security_url(&format!("apikeys/{api_key}"))))?;
        self.http.get(options).await.map(content)
    }

    pub async fn delete_api_key(&self, api_key: &str) -> Result<Value> {
        require("apiKey", api_key)?;
        let options =
            self.keyed(RequestOptions::delete(self.security_url(&format!("apikeys/{api_key}"))))?;
        self.http.delete(options).await.map(content)
    }

    pub async fn retrieve_api_key_grants(&self, api_key: &str) -> Result<Value> {
        require("apiKey", api_key)?;
        let options = self.keyed(RequestOptions::get(
            self.security_url(&format!("apikeys/{api_key}/grants/")),
        ))?;
        self.http.get(options).await.map(content)
    }

    pub async fn add_grant_to_api_key(&self, api_key: &str, grant: &Value) -> Result<Value> {
        require("apiKey", api_key)?;
        require_value("grant", grant)?;
        let options = self
            .keyed(RequestOptions::post(
                self.security_url(&format!("apikeys/{api_key}/grants/")),
            ))?
            .json(grant.clone());
        self.http.post(options).await.map(content)
    }

    pub async fn remove_grant_from_api_key(&self, api_key: &str, grant_id: &str) -> Result<Value> {
        require("apiKey", api_key)?;
        require("grantId", grant_id)?;
        let options = self.keyed(RequestOptions::delete(
            self.security_url(&format!("apikeys/{api_key}/grants/{grant_id}")),
        ))?;
        self.http.delete(options).await.map(content)
    }

    pub async fn create_grant(&self, grant: &Value) -> Result<Value> {
        require_value("grant", grant)?;
        let options = self
            .keyed(RequestOptions::post(self.security_url("grants/")))?
            .json(grant.clone());
        self.http.post(options).await.map(content)
    }

    pub async fn describe_grant(&self, grant_id: &str) -> Result<Value> {
        require("grantId", grant_id)?;
        let options = self.keyed(RequestOptions::get(self.security_url(&format!("grants/{grant_id}"))))?;
        self.http.get(options).await.map(content)
    }

    /// Delete a grant. Only the API key that created it may do so.
    pub async fn delete_grant(&self, grant_id: &str) -> Result<Value> {
        require("grantId", grant_id)?;
        let options =
            self.keyed(RequestOptions::delete(self.security_url(&format!("grants/{grant_id}"))))?;
        self.http.delete(options).await.map(content)
    }

    pub async fn list_grant_children(&self, grant_id: &str) -> Result<Value> {
        require("grantId", grant_id)?;
        let options = self.keyed(RequestOptions::get(
            self.security_url(&format!("grants/{grant_id}/children/")),
        ))?;
        self.http.get(options).await.map(content)
    }

    pub async fn create_grant_child(&self, parent_grant_id: &str, child_grant: &Value) -> Result<Value> {
        require("parentGrantId", parent_grant_id)?;
        require_value("childGrant", child_grant)?;
        let options = self
            .keyed(RequestOptions::post(
                self.security_url(&format!("grants/{parent_grant_id}/children/")),
            ))?
            .json(child_grant.clone());
        self.http.post(options).await.map(content)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub async fn get_metadata(&self, path: &str) -> Result<Value> {
        require("path", path)?;
        let options = self.keyed(RequestOptions::get(self.metadata_url(&format!("fs/{path}"))))?;
        self.http.get(options).await.map(content)
    }

    /// Names of the immediate children of `path`, exactly as the service
    /// reports them (directories may carry a trailing `/`).
    pub async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let metadata = self.get_metadata(path).await?;
        let children = metadata
            .get("children")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Deserialization("metadata has no \"children\" array".to_string()))?;
        children
            .iter()
            .map(|c| {
                c.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Deserialization(format!("child {c} is not a string")))
            })
            .collect()
    }

    /// Every path below `path`, relative to it.
    pub async fn list_descendants(&self, path: &str) -> Result<Vec<String>> {
        require("path", path)?;
        descendants::list_descendants(self, path).await
    }

    /// Whether `path` names an existing file. `path` must not end in `/`.
    pub async fn exists_file(&self, path: &str) -> Result<bool> {
        require("path", path)?;
        let (dir, name) = file_target(
            path,
            "To determine if a file exists, the file name must be specified",
        )?;
        let children = self.list_children(&dir).await?;
        Ok(children
            .iter()
            .any(|c| c.as_str() == name || c.strip_suffix('/') == Some(name.as_str())))
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Replace the file at `upload.path` with `upload.contents`.
    ///
    /// The previous contents are deleted first; a missing file is not an
    /// error.
    pub async fn upload_file(&self, upload: &UploadFile) -> Result<Value> {
        upload.validate()?;
        self.config.require_api_key()?;
        let (dir, name) = file_target(&upload.path, "A file may only be uploaded to a specific path")?;
        let full_path = join_path(&dir, &name);

        match self.delete(&full_path).await {
            Err(e) if e.is_not_found() => debug!(path = %full_path, "nothing to replace"),
            other => {
                other?;
            }
        }

        let mode = if upload.asynchronous { "async" } else { "sync" };
        let options = self
            .keyed(RequestOptions::post(self.data_url(&format!("{mode}/fs/{full_path}"))))?
            .query("ownerAccountId", upload.owner_account_id.as_deref())
            .query("delimiter", upload.delimiter.as_deref())
            .query("quote", upload.quote.as_deref())
            .query("escape", upload.escape.as_deref())
            .header("Content-Type", upload.file_type.mime())
            .content(Body::Text(upload.contents.clone()));
        self.http.post(options).await.map(content)
    }

    /// Upload a file that must not exist yet.
    pub async fn create_file(&self, upload: &UploadFile) -> Result<Value> {
        upload.validate()?;
        if self.exists_file(&upload.path).await? {
            return Err(Error::AlreadyExists(upload.path.clone()));
        }
        self.upload_file(upload).await
    }

    /// Read a file back by loading it through the query engine.
    pub async fn retrieve_file(&self, path: &str) -> Result<FileContents> {
        require("path", path)?;
        let results = self.execute(&Query::new(format!("load(\"{path}\")"))).await?;
        let data = results.get("data").cloned().unwrap_or(Value::Null);
        Ok(FileContents {
            contents: data.to_string(),
            file_type: FileType::Json,
        })
    }

    pub async fn append(&self, path: &str, value: Value) -> Result<Value> {
        self.append_all(&Append::new(path, vec![value])).await
    }

    pub async fn append_all(&self, append: &Append) -> Result<Value> {
        require("path", &append.path)?;
        if append.values.is_empty() {
            return Err(Error::MissingField("values"));
        }
        let (dir, name) = file_target(&append.path, "Data must be appended to a specific file")?;
        let full_path = join_path(&dir, &name);

        let mode = if append.asynchronous { "async" } else { "sync" };
        let options = self
            .keyed(RequestOptions::post(self.data_url(&format!("{mode}/fs/{full_path}"))))?
            .query("ownerAccountId", append.owner_account_id.as_deref())
            .header("Content-Type", FileType::Json.mime())
            .json(Value::Array(append.values.clone()));
        self.http.post(options).await.map(content)
    }

    /// Delete a single path.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        require("path", path)?;
        let options = self.keyed(RequestOptions::delete(self.data_url(&format!("async/fs/{path}"))))?;
        self.http.delete(options).await.map(content)
    }

    /// Delete a directory and everything below it.
    ///
    /// All deletes are issued together; the call fails if any of them does,
    /// once every one has finished.
    pub async fn delete_all(&self, path: &str) -> Result<Vec<Value>> {
        require("path", path)?;
        self.config.require_api_key()?;
        let dir = sanitize_path(&format!("{path}/"));

        let mut targets: Vec<String> = self
            .list_descendants(&dir)
            .await?
            .into_iter()
            .map(|child| format!("{dir}{child}"))
            .collect();
        targets.push(dir);

        let results = join_all(targets.iter().map(|target| self.delete(target))).await;
        collect_all(results)
    }

    pub async fn copy_file(&self, source: &str, dest: &str) -> Result<Value> {
        require("source", source)?;
        require("dest", dest)?;
        let file = self.retrieve_file(source).await?;
        self.upload_file(&UploadFile::new(dest, file.file_type, file.contents))
            .await
    }

    pub async fn move_file(&self, source: &str, dest: &str) -> Result<Value> {
        self.copy_file(source, dest).await?;
        self.delete(source).await
    }

    /// Copy every descendant of `source` under `dest`, then delete `source`.
    pub async fn move_directory(&self, source: &str, dest: &str) -> Result<Vec<Value>> {
        require("source", source)?;
        require("dest", dest)?;
        let descendants = self.list_descendants(source).await?;

        let copies = descendants.iter().map(|relative| {
            let from = join_path(source, relative);
            let to = join_path(dest, relative);
            async move { self.copy_file(&from, &to).await }
        });
        collect_all(join_all(copies).await)?;

        self.delete_all(source).await
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Run a Quirrel query and wait for `{data, errors, warnings}`.
    pub async fn execute(&self, query: &Query) -> Result<Value> {
        require("query", &query.query)?;
        let base = query.path.as_deref().unwrap_or_default();
        let options = self
            .keyed(RequestOptions::get(self.analysis_url(&format!("fs/{base}"))))?
            .query("q", query.query.as_str())
            .query("limit", query.limit)
            .query("skip", query.skip)
            .query("sortOn", query.sort_on.as_deref())
            .query("format", "detailed");
        self.http.get(options).await.map(content)
    }

    /// Submit a query as a job. Poll it with [`Precog::async_query_results`].
    pub async fn async_query(&self, query: &AsyncQuery) -> Result<Value> {
        require("query", &query.query)?;
        let options = RequestOptions::post(self.analysis_url("queries"))
            .query("apiKey", self.config.api_key.as_deref())
            .query("q", query.query.as_str())
            .query("limit", query.limit)
            .query("basePath", query.path.as_deref())
            .query("skip", query.skip)
            .query("order", query.order.as_deref())
            .query("sortOn", query.sort_on.as_deref())
            .query("sortOrder", query.sort_order.as_deref())
            .query("timeout", query.timeout)
            .query("prefixPath", query.prefix_path.as_deref())
            .query("format", query.format.as_deref());
        self.http.post(options).await.map(content)
    }

    pub async fn async_query_results(&self, job_id: &str) -> Result<Value> {
        require("jobId", job_id)?;
        let options = RequestOptions::get(self.analysis_url(&format!("queries/{job_id}")))
            .query("apiKey", self.config.api_key.as_deref());
        self.http.get(options).await.map(content)
    }
}

#[async_trait]
impl ChildLister for Precog {
    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        Precog::list_children(self, path).await
    }
}
