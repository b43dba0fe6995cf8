//! Notion REST client.

use crate::error::{Error, Result};
use crate::export::{PageRef, PageRequest, PageWriter};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

const SERVICE: &str = "notion";

/// Structured error body: `{object: "error", status, code, message}`.
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// [`PageWriter`] for the Notion API.
pub struct NotionClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    api_version: String,
}

impl NotionClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            api_version: api_version.into(),
        }
    }

    fn request(&self, method: HttpMethod, path: &str, body: &Value) -> HttpRequest {
        HttpRequest::json(method, format!("{}{path}", self.base_url), body)
            .with_header("Authorization", format!("Bearer {}", self.token))
            .with_header("Notion-Version", self.api_version.clone())
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "notion request");
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(map_error(&response))
        }
    }
}

/// Map a non-2xx response onto the error taxonomy.
fn map_error(response: &HttpResponse) -> Error {
    let body: Option<ApiError> = response.parse_json().ok();
    let (code, message) = body.map_or_else(
        || (String::new(), response.body_snippet()),
        |b| (b.code, b.message),
    );

    match (response.status, code.as_str()) {
        (401 | 403, _) | (_, "unauthorized" | "restricted_resource") => {
            Error::auth(SERVICE, response.status, message)
        }
        (429, _) | (_, "rate_limited") => Error::RateLimited {
            retry_after: response.retry_after(),
        },
        (404, _) | (_, "object_not_found") => Error::not_found(message),
        (400 | 413 | 422, _) | (_, "validation_error" | "invalid_json" | "invalid_request") => {
            Error::Validation(format!("{code}: {message}"))
        }
        (status, _) => Error::Transport(format!("notion {status} {code}: {message}")),
    }
}

#[async_trait]
impl PageWriter for NotionClient {
    async fn create_page(&self, request: &PageRequest) -> Result<PageRef> {
        let response = self
            .send(self.request(HttpMethod::Post, "/v1/pages", &request.to_json()))
            .await?;
        let created: CreatedPage = response
            .parse_json()
            .map_err(|e| Error::Validation(format!("unexpected page response: {e}")))?;
        Ok(PageRef {
            id: created.id,
            url: created.url,
        })
    }

    async fn append_children(&self, page_id: &str, children: &[Value]) -> Result<()> {
        self.send(self.request(
            HttpMethod::Patch,
            &format!("/v1/blocks/{page_id}/children"),
            &json!({ "children": children }),
        ))
        .await?;
        Ok(())
    }

    async fn archive_page(&self, page_id: &str) -> Result<()> {
        self.send(self.request(
            HttpMethod::Patch,
            &format!("/v1/pages/{page_id}"),
            &json!({ "archived": true }),
        ))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::PageParent;
    use crate::http::MockTransport;

    const BASE: &str = "https://notion.test";

    fn client(transport: &MockTransport) -> NotionClient {
        NotionClient::new(Arc::new(transport.clone()), BASE, "secret", "2022-06-28")
    }

    fn request() -> PageRequest {
        PageRequest {
            parent: PageParent::Page("parent-1".into()),
            properties: json!({"title": {"title": []}}),
            children: vec![json!({"type": "divider", "divider": {}})],
        }
    }

    #[tokio::test]
    async fn test_create_page_sends_headers_and_body() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            format!("{BASE}/v1/pages"),
            200,
            json!({"object": "page", "id": "page-9", "url": "https://notion.so/page-9"}),
        );
        let page = client(&transport).create_page(&request()).await.unwrap();
        assert_eq!(page.id, "page-9");

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("authorization"), Some("Bearer secret"));
        assert_eq!(sent.header("notion-version"), Some("2022-06-28"));
        let body = sent.body_json().unwrap();
        assert_eq!(body["parent"]["page_id"], "parent-1");
        assert_eq!(body["children"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_structured_errors_map_to_taxonomy() {
        let transport = MockTransport::new();
        let url = format!("{BASE}/v1/blocks/p/children");
        transport.push_json(
            HttpMethod::Patch,
            &url,
            400,
            json!({"object": "error", "status": 400, "code": "validation_error", "message": "body.children.length should be ≤ 100"}),
        );
        transport.push_json(
            HttpMethod::Patch,
            &url,
            401,
            json!({"object": "error", "status": 401, "code": "unauthorized", "message": "API token is invalid."}),
        );
        transport.push_response(
            HttpMethod::Patch,
            &url,
            HttpResponse::json(429, &json!({"code": "rate_limited", "message": "slow down"}))
                .with_header("Retry-After", "3"),
        );
        transport.push_json(HttpMethod::Patch, &url, 502, json!({}));
        let client = client(&transport);

        let errors = [
            client.append_children("p", &[]).await.unwrap_err(),
            client.append_children("p", &[]).await.unwrap_err(),
            client.append_children("p", &[]).await.unwrap_err(),
            client.append_children("p", &[]).await.unwrap_err(),
        ];
        assert!(matches!(errors[0], Error::Validation(_)));
        assert!(matches!(errors[1], Error::Auth { status: 401, .. }));
        assert!(matches!(
            errors[2],
            Error::RateLimited { retry_after: Some(d) } if d.as_secs() == 3
        ));
        assert!(errors[3].is_retryable());
        assert!(!errors[0].is_retryable());
    }
}
