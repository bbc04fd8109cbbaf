use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use crate::config::{AppwriteConfig, Config};
use crate::error::{SyncError, SyncResult};
use crate::model::{
  AccountPreferences, Campus, ChatGroup, Department, FollowedDepartments, Job, JobQuery,
  Membership, Notification, Profile, ProfilePatch, SavedJob, Session,
};

use super::api_types::{
  ApiAccount, ApiCampus, ApiChatGroup, ApiDepartment, ApiDocumentList, ApiErrorBody,
  ApiFollowedDepartments, ApiJob, ApiMembership, ApiNotification, ApiProfile, ApiSavedJob,
  ApiSessionToken,
};
use super::{DocumentRequest, Filter, Gateway};

/// Gateway over the document BaaS REST API and the WordPress jobs feed.
#[derive(Clone)]
pub struct HttpGateway {
  http: reqwest::Client,
  appwrite: AppwriteConfig,
  jobs_url: Url,
  session: Arc<RwLock<Option<String>>>,
}

impl HttpGateway {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.appwrite.timeout_secs))
      .gzip(true)
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    let jobs_url = jobs_url(&config.wordpress.base_url).map_err(|e| {
      color_eyre::eyre::eyre!(
        "Invalid WordPress base url {}: {}",
        config.wordpress.base_url,
        e
      )
    })?;

    Ok(Self {
      http,
      appwrite: config.appwrite.clone(),
      jobs_url,
      session: Arc::new(RwLock::new(None)),
    })
  }

  fn session_token(&self) -> Option<String> {
    self.session.read().ok().and_then(|s| s.clone())
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let url = format!("{}{}", self.appwrite.endpoint.trim_end_matches('/'), path);
    let builder = self
      .http
      .request(method, url)
      .header("X-Appwrite-Project", &self.appwrite.project_id);

    match self.session_token() {
      Some(token) => builder.header("X-Appwrite-Session", token),
      None => builder,
    }
  }

  /// Send a request and map non-2xx responses onto the error taxonomy.
  async fn send(&self, builder: RequestBuilder, what: &'static str) -> SyncResult<Response> {
    let response = builder.send().await.map_err(|e| {
      tracing::debug!("{} request failed: {}", what, e);
      SyncError::Network(e.to_string())
    })?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
      .map(|b| b.message)
      .unwrap_or(body);
    tracing::debug!(status = status.as_u16(), "{} request rejected: {}", what, message);

    if status.as_u16() == 404 {
      return Err(SyncError::not_found(what, message));
    }
    Err(SyncError::from_status(status.as_u16(), message))
  }

  async fn send_json<T: DeserializeOwned>(
    &self,
    builder: RequestBuilder,
    what: &'static str,
  ) -> SyncResult<T> {
    let response = self.send(builder, what).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| SyncError::decode(what, e))
  }

  fn documents_path(&self, req: &DocumentRequest) -> String {
    documents_path(&self.appwrite.database_id, req)
  }

  async fn list_documents<T: DeserializeOwned>(
    &self,
    req: DocumentRequest,
    what: &'static str,
  ) -> SyncResult<Vec<T>> {
    let queries: Vec<(&str, String)> = req
      .filters
      .iter()
      .map(|f| ("queries[]", f.to_query()))
      .collect();
    let builder = self
      .request(Method::GET, &self.documents_path(&req))
      .query(&queries);

    let list: ApiDocumentList<T> = self.send_json(builder, what).await?;
    tracing::debug!(total = list.total, "Listed {}", what);
    Ok(list.documents)
  }

  async fn get_document<T: DeserializeOwned>(
    &self,
    req: DocumentRequest,
    what: &'static str,
  ) -> SyncResult<T> {
    let builder = self.request(Method::GET, &self.documents_path(&req));
    self.send_json(builder, what).await
  }

  async fn create_document<T: DeserializeOwned>(
    &self,
    req: DocumentRequest,
    what: &'static str,
  ) -> SyncResult<T> {
    let body = json!({
      "documentId": req.document_id.clone().unwrap_or_else(|| "unique()".to_string()),
      "data": req.payload.clone().unwrap_or_else(|| json!({})),
    });
    let path = self.documents_path(&DocumentRequest {
      document_id: None,
      ..req
    });
    let builder = self.request(Method::POST, &path).json(&body);
    self.send_json(builder, what).await
  }

  async fn update_document<T: DeserializeOwned>(
    &self,
    req: DocumentRequest,
    what: &'static str,
  ) -> SyncResult<T> {
    let body = json!({ "data": req.payload.clone().unwrap_or_else(|| json!({})) });
    let builder = self
      .request(Method::PATCH, &self.documents_path(&req))
      .json(&body);
    self.send_json(builder, what).await
  }

  async fn delete_document(&self, req: DocumentRequest, what: &'static str) -> SyncResult<()> {
    let builder = self.request(Method::DELETE, &self.documents_path(&req));
    self.send(builder, what).await?;
    Ok(())
  }

  async fn fetch_jobs(&self, params: &[(&str, String)]) -> SyncResult<Vec<Job>> {
    let builder = self.http.get(self.jobs_url.clone()).query(params);
    let jobs: Vec<ApiJob> = self.send_json(builder, "jobs").await?;
    Ok(jobs.into_iter().map(Job::from).collect())
  }

  fn collections(&self) -> &crate::config::Collections {
    &self.appwrite.collections
  }
}

fn jobs_url(base: &str) -> Result<Url, url::ParseError> {
  Url::parse(base)?.join("wp-json/biso/v1/jobs")
}

fn documents_path(database_id: &str, req: &DocumentRequest) -> String {
  let mut path = format!(
    "/databases/{}/collections/{}/documents",
    database_id, req.collection
  );
  if let Some(id) = &req.document_id {
    path.push('/');
    path.push_str(id);
  }
  path
}

fn saved_job_document_id(user_id: &str, job_id: u64) -> String {
  format!("{}_{}", user_id, job_id)
}

fn profile_patch_payload(patch: &ProfilePatch) -> Value {
  let mut data = serde_json::Map::new();
  if let Some(v) = &patch.student_id {
    data.insert("student_id".to_string(), Value::from(v.trim()));
  }
  if let Some(v) = &patch.address {
    data.insert("address".to_string(), Value::from(v.as_str()));
  }
  if let Some(v) = &patch.campus_id {
    data.insert("campus_id".to_string(), Value::from(v.as_str()));
  }
  if let Some(v) = &patch.department_ids {
    data.insert(
      "departments".to_string(),
      Value::from(v.iter().cloned().collect::<Vec<_>>()),
    );
  }
  if let Some(v) = &patch.avatar {
    data.insert("avatar".to_string(), Value::from(v.as_str()));
  }
  Value::Object(data)
}

#[async_trait]
impl Gateway for HttpGateway {
  async fn create_session(&self, user_id: &str, secret: &str) -> SyncResult<String> {
    let builder = self
      .request(Method::POST, "/account/sessions/token")
      .json(&json!({ "userId": user_id, "secret": secret }));
    let token: ApiSessionToken = self.send_json(builder, "session").await?;
    Ok(if token.secret.is_empty() {
      token.id
    } else {
      token.secret
    })
  }

  fn set_session_token(&self, token: Option<String>) {
    if let Ok(mut guard) = self.session.write() {
      *guard = token;
    }
  }

  async fn delete_session(&self) -> SyncResult<()> {
    let builder = self.request(Method::DELETE, "/account/sessions/current");
    self.send(builder, "session").await?;
    Ok(())
  }

  async fn get_account(&self) -> SyncResult<Session> {
    let builder = self.request(Method::GET, "/account");
    let account: ApiAccount = self.send_json(builder, "account").await?;
    Ok(account.into())
  }

  async fn update_account_name(&self, name: &str) -> SyncResult<Session> {
    let builder = self
      .request(Method::PATCH, "/account/name")
      .json(&json!({ "name": name }));
    let account: ApiAccount = self.send_json(builder, "account").await?;
    Ok(account.into())
  }

  async fn update_account_preferences(&self, prefs: &AccountPreferences) -> SyncResult<Session> {
    let builder = self
      .request(Method::PATCH, "/account/prefs")
      .json(&json!({ "prefs": prefs.to_raw() }));
    let account: ApiAccount = self.send_json(builder, "account").await?;
    Ok(account.into())
  }

  async fn get_profile(&self, user_id: &str) -> SyncResult<Profile> {
    let req = DocumentRequest::collection(&self.collections().profiles).document(user_id);
    let profile: ApiProfile = self.get_document(req, "profile").await?;
    Ok(profile.into())
  }

  async fn create_profile(&self, user_id: &str, name: &str) -> SyncResult<Profile> {
    let req = DocumentRequest::collection(&self.collections().profiles)
      .document(user_id)
      .payload(json!({ "user_id": user_id, "name": name }));
    let profile: ApiProfile = self.create_document(req, "profile").await?;
    Ok(profile.into())
  }

  async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> SyncResult<Profile> {
    let req = DocumentRequest::collection(&self.collections().profiles)
      .document(user_id)
      .payload(profile_patch_payload(patch));
    let profile: ApiProfile = self.update_document(req, "profile").await?;
    Ok(profile.into())
  }

  async fn list_campuses(&self) -> SyncResult<Vec<Campus>> {
    let req = DocumentRequest::collection(&self.collections().campuses);
    let campuses: Vec<ApiCampus> = self.list_documents(req, "campuses").await?;
    Ok(campuses.into_iter().map(Campus::from).collect())
  }

  async fn list_departments(&self, campus_id: Option<&str>) -> SyncResult<Vec<Department>> {
    let mut req = DocumentRequest::collection(&self.collections().departments)
      .filter(Filter::equal("active", true))
      .filter(Filter::Limit(100));
    if let Some(campus_id) = campus_id {
      req = req.filter(Filter::equal("campus_id", campus_id));
    }
    let departments: Vec<ApiDepartment> = self.list_documents(req, "departments").await?;
    Ok(departments.into_iter().map(Department::from).collect())
  }

  async fn get_followed_departments(&self, user_id: &str) -> SyncResult<FollowedDepartments> {
    let req =
      DocumentRequest::collection(&self.collections().followed_departments).document(user_id);
    let followed: ApiFollowedDepartments = self.get_document(req, "followed departments").await?;
    Ok(followed.into())
  }

  async fn put_followed_departments(
    &self,
    followed: &FollowedDepartments,
  ) -> SyncResult<FollowedDepartments> {
    let req = DocumentRequest::collection(&self.collections().followed_departments)
      .document(&followed.user_id)
      .payload(json!({
        "user_id": followed.user_id,
        "department_ids": followed.department_ids,
      }));

    let result: SyncResult<ApiFollowedDepartments> = self
      .update_document(req.clone(), "followed departments")
      .await;
    let doc = match result {
      Err(e) if e.is_not_found() => self.create_document(req, "followed departments").await?,
      other => other?,
    };
    Ok(doc.into())
  }

  async fn get_membership(&self, student_id: &str) -> SyncResult<Membership> {
    let req = DocumentRequest::collection(&self.collections().memberships)
      .filter(Filter::equal("student_id", student_id))
      .filter(Filter::OrderDesc("$createdAt".to_string()))
      .filter(Filter::Limit(1));
    let memberships: Vec<ApiMembership> = self.list_documents(req, "membership").await?;
    memberships
      .into_iter()
      .next()
      .map(Membership::from)
      .ok_or_else(|| SyncError::not_found("membership", student_id))
  }

  async fn list_jobs(&self, query: &JobQuery) -> SyncResult<Vec<Job>> {
    let mut params = vec![("includeExpired", query.include_expired.to_string())];
    if let Some(campus) = &query.campus {
      params.push(("campus", campus.clone()));
    }
    if let Some(page) = query.page {
      params.push(("page", page.to_string()));
    }
    self.fetch_jobs(&params).await
  }

  async fn get_job(&self, job_id: u64) -> SyncResult<Job> {
    let params = [
      ("job_id", job_id.to_string()),
      ("includeExpired", "true".to_string()),
    ];
    self
      .fetch_jobs(&params)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| SyncError::not_found("job", job_id.to_string()))
  }

  async fn list_saved_jobs(&self, user_id: &str) -> SyncResult<Vec<SavedJob>> {
    let req = DocumentRequest::collection(&self.collections().saved_jobs)
      .filter(Filter::equal("user_id", user_id))
      .filter(Filter::Limit(100));
    let saved: Vec<ApiSavedJob> = self.list_documents(req, "saved jobs").await?;
    Ok(saved.into_iter().map(SavedJob::from).collect())
  }

  async fn save_job(&self, user_id: &str, job: &SavedJob) -> SyncResult<SavedJob> {
    let req = DocumentRequest::collection(&self.collections().saved_jobs)
      .document(saved_job_document_id(user_id, job.job_id))
      .payload(json!({
        "user_id": user_id,
        "job_id": job.job_id,
        "saved_at": job.saved_at,
        "title": job.title,
        "campus": job.campus,
      }));
    let saved: ApiSavedJob = self.create_document(req, "saved job").await?;
    Ok(saved.into())
  }

  async fn unsave_job(&self, user_id: &str, job_id: u64) -> SyncResult<()> {
    let req = DocumentRequest::collection(&self.collections().saved_jobs)
      .document(saved_job_document_id(user_id, job_id));
    self.delete_document(req, "saved job").await
  }

  async fn list_chats(&self, user_id: &str) -> SyncResult<Vec<ChatGroup>> {
    let req = DocumentRequest::collection(&self.collections().chats)
      .filter(Filter::equal("members", user_id))
      .filter(Filter::Limit(100));
    let chats: Vec<ApiChatGroup> = self.list_documents(req, "chats").await?;
    Ok(chats.into_iter().map(ChatGroup::from).collect())
  }

  async fn mark_chat_read(&self, user_id: &str, chat_id: &str) -> SyncResult<()> {
    let req = DocumentRequest::collection(&self.collections().chat_reads).payload(json!({
      "user_id": user_id,
      "chat_id": chat_id,
      "read_at": chrono::Utc::now(),
    }));
    let _: Value = self.create_document(req, "chat read").await?;
    Ok(())
  }

  async fn list_notifications(&self, user_id: &str) -> SyncResult<Vec<Notification>> {
    let req = DocumentRequest::collection(&self.collections().notifications)
      .filter(Filter::equal("user_id", user_id))
      .filter(Filter::OrderDesc("$createdAt".to_string()))
      .filter(Filter::Limit(50));
    let notifications: Vec<ApiNotification> =
      self.list_documents(req, "notifications").await?;
    Ok(notifications.into_iter().map(Notification::from).collect())
  }
}
