use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============ Auth Models ============

/// Recruiter profile as returned by `/auth/identity` and `/auth/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Backend identifier; doubles as the recruiter id for queries.
    pub id: i64,
    /// Login identity (email or free-form id).
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
    /// Employer, if set.
    #[serde(default)]
    pub company: Option<String>,
    /// Whether the account is active.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Account creation time (present on profile responses only).
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Recruiter identifier sent with queries and lead filters.
    pub fn recruiter_id(&self) -> String {
        self.id.to_string()
    }
}

/// Body for `POST /auth/identity`.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityRequest {
    pub identity: String,
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Response from `POST /auth/identity` and `POST /auth/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

/// An authenticated session: bearer token plus the user it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

// ============ Lead Models ============

/// One candidate company with its match score and supporting reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Backend row id; absent on leads embedded in a query result.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(alias = "company_name")]
    pub company: String,
    #[serde(default, alias = "role_title")]
    pub role: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Match score, 0-100.
    #[serde(default)]
    pub score: f64,
    /// Model confidence, 0-1.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub evidence_count: u32,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Rating the recruiter gave this lead, once acknowledged by the backend.
    #[serde(default)]
    pub feedback_rating: Option<u8>,
}

impl Lead {
    /// Score clamped into the documented 0-100 range.
    pub fn display_score(&self) -> f64 {
        if self.score.is_finite() {
            self.score.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Confidence clamped into 0-1.
    pub fn display_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Lead plus the raw evidence served by `GET /api/recruiter/leads/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    #[serde(default)]
    pub evidence_objects: Option<serde_json::Value>,
    #[serde(default)]
    pub job_postings: Option<serde_json::Value>,
    #[serde(default)]
    pub news_mentions: Option<serde_json::Value>,
}

/// Response wrapper for `GET /api/recruiter/leads`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadsPage {
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub total: usize,
}

/// Server-side filter for the lead list, plus a client-side score floor.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadFilter {
    pub recruiter_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
    /// Applied after the page is fetched; never sent to the backend.
    pub min_score: Option<f64>,
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            recruiter_id: None,
            limit: 50,
            offset: 0,
            min_score: None,
        }
    }
}

impl LeadFilter {
    /// Query-string pairs for the backend call.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(ref recruiter_id) = self.recruiter_id {
            pairs.push(("recruiter_id", recruiter_id.clone()));
        }
        pairs
    }

    pub fn accepts(&self, lead: &Lead) -> bool {
        self.min_score
            .map_or(true, |floor| lead.display_score() >= floor)
    }
}

// ============ Query Models ============

/// Lifecycle status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Any status string this client does not know; treated as in progress.
    #[serde(other)]
    Unknown,
}

impl QueryStatus {
    /// Completed and failed are terminal; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryStatus::Completed | QueryStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
            QueryStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body for `POST /api/recruiter/query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recruiter_id: Option<String>,
}

/// One asynchronous natural-language search job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub query_id: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub original_query: String,
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub total_leads_found: usize,
    /// Narrative summary written by the synthesis stage, when present.
    #[serde(default, alias = "synthesis_text")]
    pub synthesis: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Query {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Row of `GET /api/recruiter/queries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "query")]
    pub query_text: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryHistoryPage {
    #[serde(default)]
    pub queries: Vec<QueryHistoryEntry>,
    #[serde(default)]
    pub total: usize,
}

// ============ Feedback / Export ============

/// Body for `POST /api/recruiter/feedback`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub lead_id: i64,
    pub query_id: String,
    pub company: String,
    pub rating: u8,
    pub feedback_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackAck {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// File format for `GET /api/recruiter/leads/export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

// ============ Metrics ============

#[derive(Debug, Clone, Deserialize)]
pub struct RecentQuery {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub query_text: String,
    pub status: QueryStatus,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyLeadCount {
    pub company: String,
    pub leads: u64,
}

/// Response from `GET /api/recruiter/metrics/dashboard`.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardMetrics {
    #[serde(default)]
    pub today_leads: u64,
    #[serde(default)]
    pub total_leads: u64,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub recent_queries: Vec<RecentQuery>,
    #[serde(default)]
    pub top_companies: Vec<CompanyLeadCount>,
}

/// Response from `GET /api/recruiter/metrics/usage`.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageMetrics {
    pub period: String,
    #[serde(default)]
    pub total_queries: u64,
    #[serde(default)]
    pub successful_queries: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub average_cost_per_query: f64,
}

/// Response from `GET /api/recruiter/metrics/performance`. Backend-wide,
/// not per recruiter.
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub average_execution_time: f64,
    #[serde(default)]
    pub average_lead_score: f64,
    #[serde(default)]
    pub query_success_rate: f64,
    #[serde(default)]
    pub average_leads_per_query: f64,
    #[serde(default)]
    pub total_queries: u64,
    #[serde(default)]
    pub total_leads: u64,
}

/// Response from `GET /api/recruiter/stats/{recruiter_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecruiterStats {
    pub recruiter_id: String,
    #[serde(default)]
    pub total_queries: u64,
    #[serde(default)]
    pub total_leads: u64,
    #[serde(default)]
    pub average_lead_score: f64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub leads_per_query: f64,
}

/// Response from `GET /api/recruiter/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}

/// Usage periods are whole days written as `Nd`, e.g. `30d`.
pub fn validate_period(period: &str) -> Option<u32> {
    let days = period.strip_suffix('d')?;
    if days.is_empty() || !days.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    days.parse::<u32>().ok().filter(|d| *d > 0)
}

// ============ Serde helpers ============

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The backend emits `datetime.isoformat()` which omits the offset for
/// naive UTC timestamps; accept both forms and treat garbage as absent.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_status_terminal() {
        assert!(QueryStatus::Completed.is_terminal());
        assert!(QueryStatus::Failed.is_terminal());
        assert!(!QueryStatus::Pending.is_terminal());
        assert!(!QueryStatus::Processing.is_terminal());
        assert!(!QueryStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_unknown_status_decodes_as_unknown() {
        let query: Query = serde_json::from_value(json!({
            "query_id": "q1",
            "status": "queued"
        }))
        .unwrap();
        assert_eq!(query.status, QueryStatus::Unknown);
        assert!(!query.is_terminal());
    }

    #[test]
    fn test_completed_query_payload() {
        let query: Query = serde_json::from_value(json!({
            "query_id": "abc123",
            "status": "completed",
            "original_query": "Find senior React developers in Berlin",
            "leads": [{"company": "Acme", "score": 85, "confidence": 0.9, "reasons": ["Hiring 3 React roles"]}],
            "total_leads_found": 1,
            "completed_at": "2026-03-01T10:15:30.123456",
            "error": null
        }))
        .unwrap();

        assert_eq!(query.leads.len(), 1);
        assert_eq!(query.leads[0].company, "Acme");
        assert_eq!(query.leads[0].score, 85.0);
        assert_eq!(query.leads[0].reasons, vec!["Hiring 3 React roles"]);
        assert!(query.completed_at.is_some());
    }

    #[test]
    fn test_lead_accepts_company_name_alias_and_bad_timestamp() {
        let lead: Lead = serde_json::from_value(json!({
            "id": 7,
            "company_name": "Globex",
            "score": 140.0,
            "created_at": "yesterday-ish"
        }))
        .unwrap();

        assert_eq!(lead.company, "Globex");
        assert_eq!(lead.display_score(), 100.0);
        assert!(lead.created_at.is_none());
    }

    #[test]
    fn test_lead_detail_flattens_lead() {
        let detail: LeadDetail = serde_json::from_value(json!({
            "id": 3,
            "company": "Initech",
            "score": 72.5,
            "confidence": 0.6,
            "reasons": [],
            "evidence_count": 4,
            "job_postings": [{"title": "Staff Engineer"}],
            "query_id": "q9"
        }))
        .unwrap();

        assert_eq!(detail.lead.id, Some(3));
        assert_eq!(detail.lead.evidence_count, 4);
        assert!(detail.job_postings.is_some());
        assert!(detail.news_mentions.is_none());
    }

    #[test]
    fn test_filter_query_pairs() {
        let filter = LeadFilter {
            recruiter_id: Some("42".into()),
            ..LeadFilter::default()
        };
        let pairs = filter.query_pairs();
        assert!(pairs.contains(&("limit", "50".to_string())));
        assert!(pairs.contains(&("offset", "0".to_string())));
        assert!(pairs.contains(&("recruiter_id", "42".to_string())));
    }

    #[test]
    fn test_history_accepts_numeric_ids() {
        let entry: QueryHistoryEntry = serde_json::from_value(json!({
            "id": 12,
            "query_text": "Rust engineers in Lisbon",
            "status": "processing",
            "created_at": "2026-03-01T10:00:00"
        }))
        .unwrap();
        assert_eq!(entry.id, "12");
        assert_eq!(entry.status, QueryStatus::Processing);
    }

    #[test]
    fn test_validate_period() {
        assert_eq!(validate_period("30d"), Some(30));
        assert_eq!(validate_period("7d"), Some(7));
        assert_eq!(validate_period("0d"), None);
        assert_eq!(validate_period("30"), None);
        assert_eq!(validate_period("d"), None);
        assert_eq!(validate_period("-3d"), None);
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!("json".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
