//! Azure DevOps API interactions for fetching backlog items.
//!
//! This module provides a blocking client for the handful of endpoints the
//! tool needs:
//! - WIQL query + per-item detail (`fetch_items`)
//! - Projects of an organization (`list_projects`)
//! - Iteration tree of a project (`list_iterations`)
//! - Organizations visible to a token (`list_organizations`)
//!
//! Failures are not retried; callers are expected to abort the run.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{WorkItem, WorkItemId};

/// Azure DevOps API base URL
pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// Base URL of the profile/accounts service
pub const DEFAULT_PROFILE_BASE_URL: &str = "https://app.vssps.visualstudio.com";

/// API version used for work item endpoints
pub const DEFAULT_API_VERSION: &str = "7.0";

/// Classification nodes need a preview version
const ITERATIONS_API_VERSION: &str = "7.1-preview.2";

/// Profile and accounts endpoints
const PROFILE_API_VERSION: &str = "6.0";

/// How deep the iteration tree is fetched
const ITERATION_DEPTH: u32 = 10;

/// Work item type selected by the backlog query
pub const WORK_ITEM_TYPE: &str = "Product Backlog Item";

/// User-Agent header sent with every request
const USER_AGENT: &str = "backlog-lens";

/// Errors that can occur while talking to Azure DevOps.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The API answered with a non-success status
    #[error("Azure DevOps returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Network or other transport failure
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Failed to parse a response
    #[error("Failed to parse Azure DevOps response: {0}")]
    Decode(String),

    /// A rich-text field could not be converted to text
    #[error("Failed to convert HTML of work item {id}: {message}")]
    Html { id: WorkItemId, message: String },
}

impl From<ureq::Error> for TrackerError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                TrackerError::Status { code, body }
            }
            other => TrackerError::Transport(other.to_string()),
        }
    }
}

/// A source of backlog items for one iteration.
pub trait WorkItemSource {
    /// Fetch at most `max_items` items under `iteration_path`.
    fn fetch_items(
        &self,
        iteration_path: &str,
        max_items: usize,
    ) -> Result<Vec<WorkItem>, TrackerError>;
}

/// Blocking Azure DevOps REST client authenticated with a personal access token.
#[derive(Clone)]
pub struct AzureDevOpsClient {
    agent: ureq::Agent,
    base_url: String,
    profile_base_url: String,
    org: String,
    project: String,
    api_version: String,
    auth_header: String,
}

impl std::fmt::Debug for AzureDevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsClient")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("project", &self.project)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AzureDevOpsClient {
    /// Create a client for `org`/`project` using `pat` for Basic auth.
    pub fn new(org: impl Into<String>, project: impl Into<String>, pat: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().user_agent(USER_AGENT).build(),
            base_url: DEFAULT_BASE_URL.to_string(),
            profile_base_url: DEFAULT_PROFILE_BASE_URL.to_string(),
            org: org.into(),
            project: project.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth_header: basic_auth_header(pat),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_slash(base_url.into());
        self
    }

    /// Point organization discovery at a different profile host.
    pub fn with_profile_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.profile_base_url = trim_slash(base_url.into());
        self
    }

    /// Use a different `api-version` for work item endpoints.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// List project names of the organization.
    pub fn list_projects(&self) -> Result<Vec<String>, TrackerError> {
        let url = format!("{}/{}/_apis/projects", self.base_url, self.org);
        let list: ValueList<NamedProject> =
            self.get_json(&url, &[("api-version", self.api_version.as_str())])?;
        Ok(list.value.into_iter().map(|p| p.name).collect())
    }

    /// List leaf iteration paths of `project`, most recent start date first.
    pub fn list_iterations(&self, project: &str) -> Result<Vec<String>, TrackerError> {
        let url = format!(
            "{}/{}/{}/_apis/wit/classificationnodes/Iterations",
            self.base_url, self.org, project
        );
        let depth = ITERATION_DEPTH.to_string();
        let root: ClassificationNode = self.get_json(
            &url,
            &[("$depth", depth.as_str()), ("api-version", ITERATIONS_API_VERSION)],
        )?;
        Ok(leaf_iterations(&root))
    }

    /// List organizations the token's owner is a member of.
    pub fn list_organizations(&self) -> Result<Vec<String>, TrackerError> {
        let url = format!("{}/_apis/profile/profiles/me", self.profile_base_url);
        let profile: Profile = self.get_json(&url, &[("api-version", PROFILE_API_VERSION)])?;

        let url = format!("{}/_apis/accounts", self.profile_base_url);
        let accounts: ValueList<Account> = self.get_json(
            &url,
            &[("memberId", profile.id.as_str()), ("api-version", PROFILE_API_VERSION)],
        )?;
        Ok(accounts.value.into_iter().map(|a| a.account_name).collect())
    }

    /// Fetch the full detail of one work item.
    pub fn fetch_item(&self, id: WorkItemId) -> Result<WorkItem, TrackerError> {
        let url = format!("{}/{}/_apis/wit/workitems/{}", self.base_url, self.org, id);
        let detail: WorkItemDetail =
            self.get_json(&url, &[("api-version", self.api_version.as_str())])?;

        let url = detail
            .links
            .and_then(|l| l.html)
            .map(|h| h.href)
            .unwrap_or_else(|| {
                format!(
                    "{}/{}/{}/_workitems/edit/{}",
                    self.base_url, self.org, self.project, id
                )
            });

        Ok(WorkItem {
            id: detail.id,
            title: detail.fields.title,
            url,
            description: html_to_text(detail.id, detail.fields.description.as_deref())?,
            acceptance_criteria: html_to_text(
                detail.id,
                detail.fields.acceptance_criteria.as_deref(),
            )?,
        })
    }

    fn query_ids(&self, iteration_path: &str) -> Result<Vec<WorkItemId>, TrackerError> {
        let url = format!(
            "{}/{}/{}/_apis/wit/wiql",
            self.base_url, self.org, self.project
        );
        let query = build_wiql(iteration_path);
        tracing::debug!(%query, "running WIQL query");

        let resp = self
            .agent
            .post(&url)
            .query("api-version", &self.api_version)
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
            .send_json(serde_json::json!({ "query": query }))?;
        let result: WiqlResult = decode(resp)?;
        Ok(result.work_items.into_iter().map(|r| r.id).collect())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TrackerError> {
        let mut request = self
            .agent
            .get(url)
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }
        decode(request.call()?)
    }
}

impl WorkItemSource for AzureDevOpsClient {
    fn fetch_items(
        &self,
        iteration_path: &str,
        max_items: usize,
    ) -> Result<Vec<WorkItem>, TrackerError> {
        let ids = self.query_ids(iteration_path)?;
        tracing::info!(found = ids.len(), max_items, "backlog query finished");

        ids.into_iter()
            .take(max_items)
            .map(|id| self.fetch_item(id))
            .collect()
    }
}

fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, TrackerError> {
    resp.into_json()
        .map_err(|e| TrackerError::Decode(e.to_string()))
}

fn basic_auth_header(pat: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{}", pat)))
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn html_to_text(id: WorkItemId, html: Option<&str>) -> Result<String, TrackerError> {
    match html {
        Some(html) if !html.trim().is_empty() => htmd::convert(html)
            .map(|text| text.trim().to_string())
            .map_err(|e| TrackerError::Html {
                id,
                message: e.to_string(),
            }),
        _ => Ok(String::new()),
    }
}

/// Convert an iteration path to the form WIQL expects.
///
/// Classification paths look like `\Project\Iteration\Sprint 1`; WIQL wants
/// `Project\Sprint 1`. Paths without a leading backslash are taken as-is.
pub fn wiql_iteration_path(path: &str) -> String {
    let Some(stripped) = path.strip_prefix('\\') else {
        return path.to_string();
    };

    let parts: Vec<&str> = stripped.split('\\').collect();
    if parts.len() >= 2 && parts[1].eq_ignore_ascii_case("Iteration") {
        std::iter::once(parts[0])
            .chain(parts[2..].iter().copied())
            .collect::<Vec<_>>()
            .join("\\")
    } else {
        stripped.to_string()
    }
}

/// Build the backlog query for an iteration, including its sub-iterations.
pub fn build_wiql(iteration_path: &str) -> String {
    let path = wiql_iteration_path(iteration_path).replace('\'', "''");
    format!(
        "SELECT [System.Id], [System.Title] FROM WorkItems \
         WHERE [System.WorkItemType] = '{}' \
         AND [System.IterationPath] UNDER '{}'",
        WORK_ITEM_TYPE, path
    )
}

/// Human-friendly name of an iteration path (`Release 1 > Sprint 2`).
pub fn iteration_display_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('\\').collect();
    if parts.len() > 3 {
        parts[3..].join(" > ")
    } else {
        path.to_string()
    }
}

/// Collect leaf iteration paths, newest start date first, undated last.
pub fn leaf_iterations(root: &ClassificationNode) -> Vec<String> {
    let mut leaves = Vec::new();
    collect_leaves(root, &mut leaves);
    leaves.sort_by(|a, b| b.start_date().cmp(&a.start_date()));
    leaves
        .into_iter()
        .filter_map(|node| node.path.clone())
        .collect()
}

fn collect_leaves<'a>(node: &'a ClassificationNode, leaves: &mut Vec<&'a ClassificationNode>) {
    if node.structure_type.as_deref() == Some("iteration") && !node.has_children {
        leaves.push(node);
    }
    for child in &node.children {
        collect_leaves(child, leaves);
    }
}

/// A node of the project's iteration tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationNode {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "structureType")]
    pub structure_type: Option<String>,
    #[serde(default, rename = "hasChildren")]
    pub has_children: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: Option<NodeAttributes>,
    #[serde(default)]
    pub children: Vec<ClassificationNode>,
}

impl ClassificationNode {
    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.attributes.as_ref().and_then(|a| a.start_date)
    }
}

/// Scheduling attributes of an iteration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeAttributes {
    #[serde(default, rename = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "finishDate")]
    pub finish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NamedProject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "accountName")]
    account_name: String,
}

#[derive(Debug, Deserialize)]
struct WiqlResult {
    #[serde(default, rename = "workItems")]
    work_items: Vec<WiqlReference>,
}

#[derive(Debug, Deserialize)]
struct WiqlReference {
    id: WorkItemId,
}

#[derive(Debug, Deserialize)]
struct WorkItemDetail {
    id: WorkItemId,
    fields: WorkItemFields,
    #[serde(default, rename = "_links")]
    links: Option<WorkItemLinks>,
}

#[derive(Debug, Deserialize)]
struct WorkItemFields {
    #[serde(rename = "System.Title", default)]
    title: String,
    #[serde(rename = "System.Description", default)]
    description: Option<String>,
    #[serde(rename = "Microsoft.VSTS.Common.AcceptanceCriteria", default)]
    acceptance_criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkItemLinks {
    #[serde(default)]
    html: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiql_path_strips_iteration_segment() {
        assert_eq!(
            wiql_iteration_path(r"\Acme\Iteration\Release 1\Sprint 3"),
            r"Acme\Release 1\Sprint 3"
        );
    }

    #[test]
    fn test_wiql_path_project_root() {
        assert_eq!(wiql_iteration_path(r"\Acme\Iteration"), "Acme");
    }

    #[test]
    fn test_wiql_path_relative_is_unchanged() {
        assert_eq!(wiql_iteration_path(r"Acme\Sprint 3"), r"Acme\Sprint 3");
    }

    #[test]
    fn test_wiql_path_leading_slash_without_iteration_segment() {
        assert_eq!(wiql_iteration_path(r"\Acme\Sprint 3"), r"Acme\Sprint 3");
    }

    #[test]
    fn test_build_wiql_uses_under_and_escapes_quotes() {
        let query = build_wiql(r"\Acme\Iteration\Bob's Sprint");
        assert!(query.contains("[System.IterationPath] UNDER 'Acme\\Bob''s Sprint'"));
        assert!(query.contains("[System.WorkItemType] = 'Product Backlog Item'"));
    }

    #[test]
    fn test_iteration_display_name() {
        assert_eq!(
            iteration_display_name(r"\Acme\Iteration\Release 1\Sprint 2"),
            "Release 1 > Sprint 2"
        );
        assert_eq!(iteration_display_name(r"Acme\Sprint 2"), r"Acme\Sprint 2");
    }

    #[test]
    fn test_leaf_iterations_sorted_newest_first() {
        let json = r#"{
            "name": "Acme",
            "structureType": "iteration",
            "hasChildren": true,
            "path": "\\Acme\\Iteration",
            "children": [
                {
                    "name": "Sprint 1",
                    "structureType": "iteration",
                    "hasChildren": false,
                    "path": "\\Acme\\Iteration\\Sprint 1",
                    "attributes": { "startDate": "2024-01-01T00:00:00Z" }
                },
                {
                    "name": "Backlog",
                    "structureType": "iteration",
                    "hasChildren": false,
                    "path": "\\Acme\\Iteration\\Backlog"
                },
                {
                    "name": "Release 2",
                    "structureType": "iteration",
                    "hasChildren": true,
                    "path": "\\Acme\\Iteration\\Release 2",
                    "children": [
                        {
                            "name": "Sprint 2",
                            "structureType": "iteration",
                            "hasChildren": false,
                            "path": "\\Acme\\Iteration\\Release 2\\Sprint 2",
                            "attributes": { "startDate": "2024-02-01T00:00:00Z" }
                        }
                    ]
                }
            ]
        }"#;
        let root: ClassificationNode = serde_json::from_str(json).unwrap();

        assert_eq!(
            leaf_iterations(&root),
            vec![
                r"\Acme\Iteration\Release 2\Sprint 2".to_string(),
                r"\Acme\Iteration\Sprint 1".to_string(),
                r"\Acme\Iteration\Backlog".to_string(),
            ]
        );
    }

    #[test]
    fn test_leaf_iterations_skips_root_without_children() {
        let root: ClassificationNode =
            serde_json::from_str(r#"{"name": "Acme", "structureType": "area"}"#).unwrap();
        assert!(leaf_iterations(&root).is_empty());
    }

    #[test]
    fn test_work_item_detail_deserialize() {
        let json = r#"{
            "id": 12,
            "fields": {
                "System.Title": "Checkout",
                "System.Description": "<p>Pay</p>"
            },
            "_links": { "html": { "href": "https://dev.azure.com/acme/web/12" } }
        }"#;
        let detail: WorkItemDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.id, 12);
        assert_eq!(detail.fields.title, "Checkout");
        assert!(detail.fields.acceptance_criteria.is_none());
        assert_eq!(
            detail.links.unwrap().html.unwrap().href,
            "https://dev.azure.com/acme/web/12"
        );
    }

    #[test]
    fn test_html_to_text_converts_markup() {
        let text = html_to_text(1, Some("<p>Hello <strong>world</strong></p>")).unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_html_to_text_empty_field() {
        assert_eq!(html_to_text(1, None).unwrap(), "");
        assert_eq!(html_to_text(1, Some("   ")).unwrap(), "");
    }

    #[test]
    fn test_basic_auth_header_has_empty_user() {
        // ":secret" in base64
        assert_eq!(basic_auth_header("secret"), "Basic OnNlY3JldA==");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client =
            AzureDevOpsClient::new("acme", "web", "pat").with_base_url("http://localhost:1234/");
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
