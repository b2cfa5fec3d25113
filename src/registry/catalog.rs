//! Harbor catalog queries
//!
//! Implements the three read-only Harbor API calls the replicator needs:
//! - Project listing (GET /api/projects)
//! - Repository listing (GET /api/repositories?project_id={id})
//! - Tag listing with creation times (GET /api/repositories/{name}/tags)

use crate::config::RegistryEndpoint;
use crate::error::{ReplicatorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A project as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub name: String,
    pub project_id: i64,
}

/// A tag and the time its image was created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub name: String,
    pub created: DateTime<Utc>,
}

impl TagRecord {
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    created: String,
}

/// Read access to the source registry's catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// List every project visible to the configured user
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// List the repository names of a project previously returned by `list_projects`
    async fn list_repositories(&self, project: &Project) -> Result<Vec<String>>;

    /// List the tags of a repository. Fails as a whole if any entry is malformed.
    async fn list_tags(&self, repository: &str) -> Result<Vec<TagRecord>>;
}

/// Catalog client for a Harbor registry, authenticated with basic credentials
#[derive(Clone)]
pub struct HarborClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl HarborClient {
    pub fn new(endpoint: &RegistryEndpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_base_url(
            client,
            endpoint.base_url()?,
            endpoint.username(),
            endpoint.password(),
        )
    }

    /// Builds a client against an explicit API root, which must end in `/`
    pub fn with_base_url(
        client: Client,
        base_url: Url,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(ReplicatorError::Configuration(format!(
                "Invalid catalog URL: {}",
                base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn query_api(&self, url: Url) -> Result<Vec<u8>> {
        debug!(%url, "querying catalog");

        let mut request = self.client.get(url.clone());
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(ReplicatorError::Registry(format!(
                "GET {} failed (status {}): {}",
                url,
                status,
                error_text.trim()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl CatalogSource for HarborClient {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let url = self.base_url.join("api/projects")?;
        let body = self.query_api(url).await?;
        parse_projects(&body)
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<String>> {
        let mut url = self.base_url.join("api/repositories")?;
        url.query_pairs_mut()
            .append_pair("project_id", &project.project_id.to_string());
        let body = self.query_api(url).await?;
        parse_repositories(&body)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<TagRecord>> {
        let url = self
            .base_url
            .join(&format!("api/repositories/{}/tags", repository))?;
        let body = self.query_api(url).await?;
        parse_tags(&body)
    }
}

// Harbor answers `null` instead of `[]` for empty collections.
fn parse_list<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>> {
    let list: Option<Vec<T>> = serde_json::from_slice(body)?;
    Ok(list.unwrap_or_default())
}

pub fn parse_projects(body: &[u8]) -> Result<Vec<Project>> {
    parse_list(body)
}

pub fn parse_repositories(body: &[u8]) -> Result<Vec<String>> {
    Ok(parse_list::<RepositoryEntry>(body)?
        .into_iter()
        .map(|r| r.name)
        .collect())
}

pub fn parse_tags(body: &[u8]) -> Result<Vec<TagRecord>> {
    parse_list::<TagEntry>(body)?
        .into_iter()
        .map(|entry| {
            let created = DateTime::parse_from_rfc3339(&entry.created).map_err(|e| {
                ReplicatorError::Parse(format!(
                    "Invalid creation time {:?} for tag {}: {}",
                    entry.created, entry.name, e
                ))
            })?;
            Ok(TagRecord::new(entry.name, created.with_timezone(&Utc)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_projects() {
        let body = br#"[{"project_id":1,"name":"library","public":true},
            {"project_id":7,"name":"app"}]"#;
        let projects = parse_projects(body).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(
            projects[1],
            Project {
                name: "app".to_string(),
                project_id: 7,
            }
        );
    }

    #[test]
    fn test_parse_repositories_null_body() {
        assert!(parse_repositories(b"null").unwrap().is_empty());
        let repos = parse_repositories(br#"[{"id":3,"name":"app/web","tags_count":2}]"#).unwrap();
        assert_eq!(repos, vec!["app/web".to_string()]);
    }

    #[test]
    fn test_parse_tags_with_fractional_seconds() {
        let body = br#"[{"name":"v1","created":"2024-03-01T10:00:00.123456789Z","size":10}]"#;
        let tags = parse_tags(body).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1");
        assert_eq!(
            tags[0].created.timestamp(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap().timestamp()
        );
        assert_eq!(tags[0].created.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_parse_tags_offset_is_normalized() {
        let tags = parse_tags(br#"[{"name":"v1","created":"2024-03-01T12:00:00+02:00"}]"#).unwrap();
        assert_eq!(tags[0].created, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_tags_rejects_malformed_time() {
        let body = br#"[{"name":"v1","created":"2024-03-01T10:00:00Z"},
            {"name":"v2","created":"yesterday"}]"#;
        let err = parse_tags(body).unwrap_err();
        assert!(matches!(err, ReplicatorError::Parse(_)));
        assert!(err.to_string().contains("v2"));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(parse_projects(b"<html>"), Err(ReplicatorError::Parse(_))));
    }
}
