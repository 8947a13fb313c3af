use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Client for the Recruiter AI backend.
///
/// Cheap to clone; clones share the bearer token, so a login through one
/// handle authenticates every other handle.
#[derive(Clone)]
pub struct RecruiterApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl RecruiterApiClient {
    /// Creates a new `RecruiterApiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend root, e.g. `http://localhost:8000`.
    /// * `request_timeout` - Per-request timeout.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attaches (or with `None`, detaches) the bearer token.
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.current_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request once, maps transport failures and non-success
    /// statuses to `AppError`.
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, AppError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("{} request failed: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("{} returned {}: {}", what, status, error_text);
            return Err(AppError::from_status(status, &error_text));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, AppError> {
        let response = self.send(builder, what).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("{} body read failed: {}", what, e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Decode(format!("Failed to parse {} response: {}", what, e)))
    }

    // ---------- auth ----------

    /// Logs in (or auto-registers) with an identity string.
    ///
    /// Any 4xx answer means the backend refused the identity and is
    /// reported as `InvalidCredentials`.
    pub async fn login_by_identity(&self, identity: &str) -> Result<TokenResponse, AppError> {
        let url = self.url("/auth/identity");
        tracing::info!("Logging in by identity");
        tracing::debug!("POST {}", url);

        let body = IdentityRequest {
            identity: identity.to_string(),
        };
        let result = self
            .send_json::<TokenResponse>(self.client.post(&url).json(&body), "Login")
            .await;

        match result {
            Ok(token) => {
                tracing::info!("✓ Logged in as recruiter {}", token.user.id);
                Ok(token)
            }
            Err(AppError::Unauthorized(_)) | Err(AppError::NotFound(_)) => {
                Err(AppError::InvalidCredentials)
            }
            Err(AppError::Api { status, .. }) if (400..500).contains(&status) => {
                Err(AppError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates an account with email and password.
    ///
    /// The backend answers 400 when the email is taken; that comes back as
    /// `Validation` carrying the backend's message.
    pub async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse, AppError> {
        let url = self.url("/auth/register");
        tracing::info!("Registering new recruiter account");
        tracing::debug!("POST {}", url);

        let result = self
            .send_json::<TokenResponse>(self.client.post(&url).json(request), "Registration")
            .await;

        match result {
            Ok(token) => {
                tracing::info!("✓ Registered recruiter {}", token.user.id);
                Ok(token)
            }
            Err(AppError::Api { status, message }) if status == 400 || status == 422 => {
                Err(AppError::Validation(message))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches the profile of the token's owner.
    pub async fn get_profile(&self) -> Result<User, AppError> {
        if !self.has_token() {
            return Err(AppError::Unauthorized("no session token".to_string()));
        }
        let url = self.url("/auth/profile");
        tracing::debug!("GET {}", url);
        self.send_json(self.client.get(&url), "Profile").await
    }

    pub async fn update_profile(
        &self,
        full_name: Option<&str>,
        company: Option<&str>,
    ) -> Result<User, AppError> {
        let url = self.url("/auth/profile");
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = full_name {
            params.push(("full_name", name));
        }
        if let Some(company) = company {
            params.push(("company", company));
        }
        tracing::info!("Updating profile ({} field(s))", params.len());
        self.send_json(self.client.put(&url).query(&params), "Profile update")
            .await
    }

    // ---------- queries ----------

    /// Submits a recruiter query. The backend either answers with the
    /// finished result or with a query id to poll.
    pub async fn submit_query(
        &self,
        query: &str,
        recruiter_id: Option<&str>,
    ) -> Result<Query, AppError> {
        let url = self.url("/api/recruiter/query");
        tracing::info!("Submitting query ({} chars)", query.chars().count());

        let body = QueryRequest {
            query: query.to_string(),
            recruiter_id: recruiter_id.map(str::to_string),
        };
        let submitted: Query = self
            .send_json(self.client.post(&url).json(&body), "Query submission")
            .await?;

        tracing::info!(
            "✓ Query {} accepted with status {}",
            submitted.query_id,
            submitted.status
        );
        Ok(submitted)
    }

    /// Fetches the current state of a query.
    pub async fn get_query_status(&self, query_id: &str) -> Result<Query, AppError> {
        let url = self.url(&format!("/api/recruiter/query/{}", query_id));
        tracing::debug!("GET {}", url);
        self.send_json(self.client.get(&url), "Query status").await
    }

    pub async fn list_queries(
        &self,
        recruiter_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<QueryHistoryPage, AppError> {
        let url = self.url("/api/recruiter/queries");
        let mut params = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(id) = recruiter_id {
            params.push(("recruiter_id", id.to_string()));
        }
        tracing::info!("Fetching query history");
        self.send_json(self.client.get(&url).query(&params), "Query history")
            .await
    }

    // ---------- leads ----------

    pub async fn get_leads(&self, filter: &LeadFilter) -> Result<LeadsPage, AppError> {
        let url = self.url("/api/recruiter/leads");
        tracing::info!(
            "Fetching leads (limit {}, offset {})",
            filter.limit,
            filter.offset
        );
        let page: LeadsPage = self
            .send_json(self.client.get(&url).query(&filter.query_pairs()), "Leads")
            .await?;
        tracing::info!("✓ Received {} lead(s)", page.leads.len());
        Ok(page)
    }

    pub async fn get_lead(&self, lead_id: i64) -> Result<LeadDetail, AppError> {
        let url = self.url(&format!("/api/recruiter/leads/{}", lead_id));
        tracing::info!("Fetching lead {}", lead_id);
        self.send_json(self.client.get(&url), "Lead detail").await
    }

    pub async fn submit_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackAck, AppError> {
        let url = self.url("/api/recruiter/feedback");
        tracing::info!(
            "Sending feedback for lead {} (rating {})",
            feedback.lead_id,
            feedback.rating
        );
        let ack: FeedbackAck = self
            .send_json(self.client.post(&url).json(feedback), "Feedback")
            .await?;
        tracing::info!("✓ Feedback acknowledged: {}", ack.status);
        Ok(ack)
    }

    /// Downloads the lead export as raw bytes.
    pub async fn export_leads(
        &self,
        format: ExportFormat,
        recruiter_id: Option<&str>,
    ) -> Result<Vec<u8>, AppError> {
        let url = self.url("/api/recruiter/leads/export");
        let mut params = vec![("format", format.as_str().to_string())];
        if let Some(id) = recruiter_id {
            params.push(("recruiter_id", id.to_string()));
        }
        tracing::info!("Exporting leads as {}", format.as_str());

        let response = self
            .send(self.client.get(&url).query(&params), "Lead export")
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("Lead export download failed: {}", e)))?;

        tracing::info!("✓ Export downloaded ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }

    // ---------- metrics ----------

    pub async fn dashboard_metrics(
        &self,
        recruiter_id: Option<&str>,
    ) -> Result<DashboardMetrics, AppError> {
        let url = self.url("/api/recruiter/metrics/dashboard");
        let params: Vec<(&str, &str)> = recruiter_id
            .map(|id| vec![("recruiter_id", id)])
            .unwrap_or_default();
        self.send_json(self.client.get(&url).query(&params), "Dashboard metrics")
            .await
    }

    pub async fn usage_metrics(
        &self,
        period: &str,
        recruiter_id: Option<&str>,
    ) -> Result<UsageMetrics, AppError> {
        if validate_period(period).is_none() {
            return Err(AppError::Validation(format!(
                "period must look like '30d', got '{}'",
                period
            )));
        }
        let url = self.url("/api/recruiter/metrics/usage");
        let mut params = vec![("period", period)];
        if let Some(id) = recruiter_id {
            params.push(("recruiter_id", id));
        }
        self.send_json(self.client.get(&url).query(&params), "Usage metrics")
            .await
    }

    pub async fn performance_metrics(&self) -> Result<PerformanceMetrics, AppError> {
        let url = self.url("/api/recruiter/metrics/performance");
        self.send_json(self.client.get(&url), "Performance metrics")
            .await
    }

    pub async fn recruiter_stats(&self, recruiter_id: &str) -> Result<RecruiterStats, AppError> {
        let url = self.url(&format!("/api/recruiter/stats/{}", recruiter_id));
        self.send_json(self.client.get(&url), "Recruiter stats").await
    }

    pub async fn health(&self) -> Result<HealthStatus, AppError> {
        let url = self.url("/api/recruiter/health");
        self.send_json(self.client.get(&url), "Health check").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = RecruiterApiClient::new("https://example.com/", Duration::from_secs(5));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url(), "https://example.com");
    }

    #[test]
    fn test_token_shared_between_clones() {
        let client = RecruiterApiClient::new("http://localhost:8000", Duration::from_secs(5)).unwrap();
        let clone = client.clone();

        client.set_token(Some("abc".to_string()));
        assert!(clone.has_token());

        clone.set_token(None);
        assert!(!client.has_token());
    }

    #[tokio::test]
    async fn test_profile_without_token_is_unauthorized() {
        let client = RecruiterApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.get_profile().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_bad_usage_period_rejected_before_request() {
        let client = RecruiterApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.usage_metrics("monthly", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
