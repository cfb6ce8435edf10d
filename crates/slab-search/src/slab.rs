//! Slab API client.
//!
//! Implements [`RemoteSource`] against Slab's GraphQL API plus its
//! markdown export endpoint. All requests carry the configured bearer
//! token; nothing is retried here.
//!
//! | Call | Request |
//! |------|---------|
//! | [`list_documents`](RemoteSource::list_documents) | `currentSession.organization.posts` |
//! | [`fetch_owner`](RemoteSource::fetch_owner) | `post(id).owner` |
//! | [`fetch_body`](RemoteSource::fetch_body) | `GET {base_url}/posts/{id}/export/markdown` |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use slab_search_core::models::{Owner, RemoteDocument, Topic};
use slab_search_core::source::RemoteSource;

use crate::config::SlabConfig;

const LIST_POSTS_QUERY: &str = r#"
{
    currentSession {
        organization {
            posts {
                id
                title
                publishedAt
                updatedAt
                archivedAt
                topics {
                    id
                    name
                }
            }
        }
    }
}
"#;

const POST_OWNER_QUERY: &str = r#"
query GetPostOwner($id: ID!) {
    post(id: $id) {
        id
        owner {
            id
            name
            email
        }
    }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    current_session: Session,
}

#[derive(Debug, Deserialize)]
struct Session {
    organization: Organization,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    posts: Vec<SlimPost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlimPost {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    topics: Vec<Topic>,
}

impl From<SlimPost> for RemoteDocument {
    fn from(post: SlimPost) -> Self {
        RemoteDocument {
            key: post.id,
            title: post.title.unwrap_or_default(),
            published_at: post.published_at,
            updated_at: post.updated_at,
            archived_at: post.archived_at,
            topics: post.topics,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostData {
    post: Option<PostOwner>,
}

#[derive(Debug, Deserialize)]
struct PostOwner {
    owner: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Slab GraphQL and export client.
pub struct SlabClient {
    graphql_url: String,
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl SlabClient {
    pub fn new(graphql_url: &str, base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            graphql_url: graphql_url.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Build a client from `[slab]`, resolving the token.
    pub fn from_config(config: &SlabConfig) -> Result<Self> {
        let token = config.resolve_token()?;
        Self::new(
            &config.graphql_endpoint(),
            &config.base_url,
            &token,
            config.timeout_secs,
        )
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("GraphQL request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Slab GraphQL error {}: {}", status, text);
        }

        let parsed: GraphQlResponse<T> = response
            .json()
            .await
            .context("Failed to decode GraphQL response")?;
        decode_graphql(parsed)
    }
}

fn decode_graphql<T>(response: GraphQlResponse<T>) -> Result<T> {
    if let Some(err) = response.errors.first() {
        bail!("graphql error: {}", err.message);
    }
    response
        .data
        .ok_or_else(|| anyhow!("GraphQL response has no data"))
}

#[async_trait]
impl RemoteSource for SlabClient {
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        let data: SessionData = self
            .graphql(LIST_POSTS_QUERY, serde_json::json!({}))
            .await
            .context("get all posts")?;

        Ok(data
            .current_session
            .organization
            .posts
            .into_iter()
            .map(RemoteDocument::from)
            .collect())
    }

    async fn fetch_body(&self, key: &str) -> Result<String> {
        let url = format!("{}/posts/{}/export/markdown", self.base_url, key);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("markdown export request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("unexpected status exporting {}: {}", key, status);
        }

        Ok(response.text().await?)
    }

    async fn fetch_owner(&self, key: &str) -> Result<Option<Owner>> {
        let data: PostData = self
            .graphql(POST_OWNER_QUERY, serde_json::json!({ "id": key }))
            .await
            .context("get post owner")?;

        let post = data
            .post
            .ok_or_else(|| anyhow!("post {} not found", key))?;
        Ok(post.owner.map(|u| Owner {
            name: u.name.unwrap_or_default(),
            email: u.email.filter(|e| !e.is_empty()),
        }))
    }

    fn document_url(&self, key: &str) -> String {
        format!("{}/posts/{}", self.base_url, key)
    }
}
