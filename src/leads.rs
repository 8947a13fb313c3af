use crate::api_client::RecruiterApiClient;
use crate::errors::AppError;
use crate::models::*;
use crate::poller::{
    new_registry, spawn_poll, PollConfig, PollHandle, PollOutcome, QueryRegistry, TrackedQuery,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Longest query text the backend accepts.
pub const MAX_QUERY_CHARS: usize = 500;

/// What `submit_query` hands back.
pub struct Submission {
    /// The query as first returned by the backend.
    pub query: Query,
    /// Present when the query still needs polling.
    pub handle: Option<PollHandle>,
}

/// Holds the fetched lead list and the queries this client submitted.
pub struct LeadStore {
    client: Arc<RecruiterApiClient>,
    poll_config: PollConfig,
    leads: RwLock<Vec<Lead>>,
    queries: QueryRegistry,
    last_error: RwLock<Option<String>>,
}

impl LeadStore {
    pub fn new(client: RecruiterApiClient, poll_config: PollConfig) -> Self {
        Self {
            client: Arc::new(client),
            poll_config,
            leads: RwLock::new(Vec::new()),
            queries: new_registry(),
            last_error: RwLock::new(None),
        }
    }

    // ---------- leads ----------

    /// Replaces the held lead list with the server's page.
    pub async fn fetch_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        let page = match self.client.get_leads(filter).await {
            Ok(page) => page,
            Err(e) => return Err(self.remember(e).await),
        };

        let leads: Vec<Lead> = page
            .leads
            .into_iter()
            .filter(|lead| filter.accepts(lead))
            .collect();

        *self.leads.write().await = leads.clone();
        self.clear_error().await;
        Ok(leads)
    }

    pub async fn get_lead(&self, lead_id: i64) -> Result<LeadDetail, AppError> {
        match self.client.get_lead(lead_id).await {
            Ok(detail) => Ok(detail),
            Err(e) => Err(self.remember(e).await),
        }
    }

    /// Snapshot of the held lead list.
    pub async fn leads(&self) -> Vec<Lead> {
        self.leads.read().await.clone()
    }

    /// Sends a 1-5 rating for a lead.
    ///
    /// The held lead is only updated once the backend has acknowledged the
    /// rating; a failed call leaves local state untouched.
    pub async fn submit_feedback(
        &self,
        lead_id: i64,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<FeedbackAck, AppError> {
        if !(1..=5).contains(&rating) {
            return Err(self
                .remember(AppError::Validation(format!(
                    "rating must be between 1 and 5, got {}",
                    rating
                )))
                .await);
        }

        let known = self
            .leads
            .read()
            .await
            .iter()
            .find(|lead| lead.id == Some(lead_id))
            .cloned();

        let (company, query_id) = match known {
            Some(lead) => (lead.company, lead.query_id.unwrap_or_default()),
            None => {
                let detail = self.get_lead(lead_id).await?;
                (
                    detail.lead.company,
                    detail.lead.query_id.unwrap_or_default(),
                )
            }
        };

        let request = FeedbackRequest {
            lead_id,
            query_id,
            company,
            rating,
            feedback_type: "lead_quality".to_string(),
            comment: comment
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };

        let ack = match self.client.submit_feedback(&request).await {
            Ok(ack) => ack,
            Err(e) => return Err(self.remember(e).await),
        };

        if let Some(lead) = self
            .leads
            .write()
            .await
            .iter_mut()
            .find(|lead| lead.id == Some(lead_id))
        {
            lead.feedback_rating = Some(rating);
        }
        Ok(ack)
    }

    pub async fn export_leads(
        &self,
        format: ExportFormat,
        recruiter_id: Option<&str>,
    ) -> Result<Vec<u8>, AppError> {
        match self.client.export_leads(format, recruiter_id).await {
            Ok(blob) => Ok(blob),
            Err(e) => Err(self.remember(e).await),
        }
    }

    // ---------- queries ----------

    /// Submits a query and starts following it when it is not done yet.
    ///
    /// Earlier submissions keep their own poll tasks.
    pub async fn submit_query(
        &self,
        text: &str,
        recruiter_id: Option<&str>,
    ) -> Result<Submission, AppError> {
        let text = match validate_query_text(text) {
            Ok(text) => text,
            Err(e) => return Err(self.remember(e).await),
        };

        let query = match self.client.submit_query(text, recruiter_id).await {
            Ok(query) => query,
            Err(e) => return Err(self.remember(e).await),
        };

        self.queries
            .write()
            .await
            .insert(query.query_id.clone(), TrackedQuery::new(query.clone()));
        self.clear_error().await;

        if query.is_terminal() {
            tracing::info!("Query {} finished on submission", query.query_id);
            return Ok(Submission {
                query,
                handle: None,
            });
        }

        let handle = spawn_poll(
            self.client.clone(),
            query.clone(),
            self.queries.clone(),
            self.poll_config,
        );
        Ok(Submission {
            query,
            handle: Some(handle),
        })
    }

    /// Waits for a poll task and turns its outcome into a finished query.
    ///
    /// # Errors
    ///
    /// * `JobFailed` when the backend reports the query as failed.
    /// * `PollTimeout` when the deadline passed first.
    /// * `Aborted` when the handle was aborted.
    /// * The status request's error when polling broke off; the
    ///   user-visible message is the generic poll error.
    pub async fn wait_for_query(&self, handle: PollHandle) -> Result<Query, AppError> {
        let outcome = match handle.wait().await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.remember(e).await),
        };
        let result = match outcome {
            PollOutcome::Finished(query) => finished(query),
            PollOutcome::TimedOut { last, waited } => Err(AppError::PollTimeout {
                query_id: last.query_id,
                waited_secs: waited.as_secs(),
            }),
            PollOutcome::Aborted(last) => Err(AppError::Aborted(last.query_id)),
            PollOutcome::Errored { error, .. } => {
                *self.last_error.write().await =
                    Some(crate::errors::GENERIC_POLL_ERROR.to_string());
                return Err(error);
            }
        };

        if let Err(ref e) = result {
            *self.last_error.write().await = Some(e.user_message());
        }
        result
    }

    /// Submits and follows a query to its end.
    pub async fn run_query(
        &self,
        text: &str,
        recruiter_id: Option<&str>,
    ) -> Result<Query, AppError> {
        let submission = self.submit_query(text, recruiter_id).await?;
        match submission.handle {
            Some(handle) => self.wait_for_query(handle).await,
            None => {
                let result = finished(submission.query);
                if let Err(ref e) = result {
                    *self.last_error.write().await = Some(e.user_message());
                }
                result
            }
        }
    }

    /// One-shot status lookup that also refreshes the held record.
    ///
    /// Records that already reached a terminal status are served from
    /// memory without a request.
    pub async fn refresh_query(&self, query_id: &str) -> Result<Query, AppError> {
        if let Some(tracked) = self.queries.read().await.get(query_id) {
            if tracked.query.is_terminal() {
                return Ok(tracked.query.clone());
            }
        }

        let query = match self.client.get_query_status(query_id).await {
            Ok(query) => query,
            Err(e) => return Err(self.remember(e).await),
        };

        // A record created here has no poll task behind it.
        let mut records = self.queries.write().await;
        let entry = records
            .entry(query_id.to_string())
            .or_insert_with(|| TrackedQuery::unfollowed(query.clone()));
        entry.query = query.clone();
        drop(records);
        self.clear_error().await;
        Ok(query)
    }

    /// Drops a settled record. Records still being polled are kept and
    /// `false` is returned.
    pub async fn forget(&self, query_id: &str) -> bool {
        let mut records = self.queries.write().await;
        let settled = records
            .get(query_id)
            .is_some_and(|tracked| tracked.poll_state.is_settled());
        if !settled {
            return false;
        }
        records.remove(query_id);
        tracing::debug!("Forgot query {}", query_id);
        true
    }

    /// Drops every settled record, returning how many went.
    pub async fn forget_settled(&self) -> usize {
        let mut records = self.queries.write().await;
        let before = records.len();
        records.retain(|_, tracked| !tracked.poll_state.is_settled());
        before - records.len()
    }

    pub async fn query(&self, query_id: &str) -> Option<TrackedQuery> {
        self.queries.read().await.get(query_id).cloned()
    }

    pub async fn queries(&self) -> Vec<TrackedQuery> {
        self.queries.read().await.values().cloned().collect()
    }

    // ---------- dashboard / metrics ----------

    pub async fn query_history(
        &self,
        recruiter_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<QueryHistoryPage, AppError> {
        match self.client.list_queries(recruiter_id, limit, offset).await {
            Ok(page) => Ok(page),
            Err(e) => Err(self.remember(e).await),
        }
    }

    pub async fn dashboard_metrics(
        &self,
        recruiter_id: Option<&str>,
    ) -> Result<DashboardMetrics, AppError> {
        match self.client.dashboard_metrics(recruiter_id).await {
            Ok(metrics) => Ok(metrics),
            Err(e) => Err(self.remember(e).await),
        }
    }

    pub async fn usage_metrics(
        &self,
        period: &str,
        recruiter_id: Option<&str>,
    ) -> Result<UsageMetrics, AppError> {
        match self.client.usage_metrics(period, recruiter_id).await {
            Ok(metrics) => Ok(metrics),
            Err(e) => Err(self.remember(e).await),
        }
    }

    pub async fn recruiter_stats(&self, recruiter_id: &str) -> Result<RecruiterStats, AppError> {
        match self.client.recruiter_stats(recruiter_id).await {
            Ok(stats) => Ok(stats),
            Err(e) => Err(self.remember(e).await),
        }
    }

    pub async fn performance_metrics(&self) -> Result<PerformanceMetrics, AppError> {
        match self.client.performance_metrics().await {
            Ok(metrics) => Ok(metrics),
            Err(e) => Err(self.remember(e).await),
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, AppError> {
        match self.client.health().await {
            Ok(health) => Ok(health),
            Err(e) => Err(self.remember(e).await),
        }
    }

    // ---------- errors ----------

    /// Last user-visible error message, if the most recent call failed.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    async fn remember(&self, error: AppError) -> AppError {
        *self.last_error.write().await = Some(error.user_message());
        error
    }

    async fn clear_error(&self) {
        *self.last_error.write().await = None;
    }
}

/// Trims and bounds query text before anything is sent.
pub fn validate_query_text(text: &str) -> Result<&str, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("query cannot be empty".to_string()));
    }
    let chars = text.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(AppError::Validation(format!(
            "query is {} characters; the limit is {}",
            chars, MAX_QUERY_CHARS
        )));
    }
    Ok(text)
}

fn finished(query: Query) -> Result<Query, AppError> {
    if query.status == QueryStatus::Failed {
        return Err(AppError::JobFailed {
            message: query
                .error
                .clone()
                .unwrap_or_else(|| "the search could not be completed".to_string()),
            query_id: query.query_id,
        });
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollState;

    #[test]
    fn test_validate_query_text() {
        assert_eq!(
            validate_query_text("  Rust engineers in Lisbon ").unwrap(),
            "Rust engineers in Lisbon"
        );
        assert!(matches!(
            validate_query_text(" \n\t "),
            Err(AppError::Validation(_))
        ));
        assert!(validate_query_text(&"a".repeat(MAX_QUERY_CHARS)).is_ok());
        assert!(validate_query_text(&"a".repeat(MAX_QUERY_CHARS + 1)).is_err());
    }

    #[test]
    fn test_failed_query_becomes_job_failed() {
        let query: Query = serde_json::from_value(serde_json::json!({
            "query_id": "q1",
            "status": "failed",
            "error": "No data sources responded"
        }))
        .unwrap();

        match finished(query) {
            Err(AppError::JobFailed { query_id, message }) => {
                assert_eq!(query_id, "q1");
                assert_eq!(message, "No data sources responded");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_query_issues_no_request() {
        let client = RecruiterApiClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(200)).unwrap();
        let store = LeadStore::new(client, PollConfig::default());

        let err = store.submit_query("   ", None).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.queries().await.is_empty());
    }

    fn offline_store() -> LeadStore {
        let client = RecruiterApiClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(200)).unwrap();
        LeadStore::new(client, PollConfig::default())
    }

    fn tracked(id: &str, status: QueryStatus, state: PollState) -> TrackedQuery {
        let query: Query = serde_json::from_value(serde_json::json!({
            "query_id": id,
            "status": status.as_str()
        }))
        .unwrap();
        TrackedQuery {
            query,
            poll_state: state,
            polls: 0,
        }
    }

    #[tokio::test]
    async fn test_validation_error_replaces_previous_error() {
        let store = offline_store();

        assert!(store.fetch_leads(&LeadFilter::default()).await.is_err());
        assert!(store.last_error().await.unwrap().starts_with("Network error"));

        assert!(store.submit_query("   ", None).await.is_err());
        assert_eq!(
            store.last_error().await.as_deref(),
            Some("Invalid input: query cannot be empty")
        );

        assert!(store.submit_feedback(1, 9, None).await.is_err());
        assert!(store.last_error().await.unwrap().contains("rating must be between 1 and 5"));
    }

    #[tokio::test]
    async fn test_health_failure_is_remembered() {
        let store = offline_store();
        assert!(store.health().await.is_err());
        assert!(store.last_error().await.unwrap().starts_with("Network error"));
    }

    #[tokio::test]
    async fn test_forget_only_drops_settled_records() {
        let store = offline_store();
        {
            let mut records = store.queries.write().await;
            records.insert("done".into(), tracked("done", QueryStatus::Completed, PollState::Finished));
            records.insert("live".into(), tracked("live", QueryStatus::Processing, PollState::Polling));
            records.insert("gone".into(), tracked("gone", QueryStatus::Processing, PollState::TimedOut));
        }

        assert!(!store.forget("live").await);
        assert!(store.forget("done").await);
        assert!(!store.forget("done").await);
        assert!(store.query("done").await.is_none());

        assert_eq!(store.forget_settled().await, 1);
        let left = store.queries().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].query.query_id, "live");
    }

    #[tokio::test]
    async fn test_bad_rating_rejected_before_request() {
        let client = RecruiterApiClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(200)).unwrap();
        let store = LeadStore::new(client, PollConfig::default());

        assert!(matches!(
            store.submit_feedback(1, 0, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store.submit_feedback(1, 6, None).await,
            Err(AppError::Validation(_))
        ));
    }
}
