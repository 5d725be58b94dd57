//! Admission enforcement as reqwest middleware.

use async_trait::async_trait;
use http::{Extensions, Method};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};

use crate::admission::{AccessRequest, AdmissionPipeline};
use crate::error::GatewayError;

/// Who is making a request and which resource it is billed to.
///
/// Attach it with
/// [`RequestBuilder::with_extension`](reqwest_middleware::RequestBuilder::with_extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionContext {
    pub subject: String,
    pub resource_id: String,
    pub origin_domain: Option<String>,
}

impl AdmissionContext {
    #[must_use]
    pub fn new(subject: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            resource_id: resource_id.into(),
            origin_domain: None,
        }
    }

    #[must_use]
    pub fn origin(mut self, domain: impl Into<String>) -> Self {
        self.origin_domain = Some(domain.into());
        self
    }

    /// Admission attributes for a request to `path` with `method`.
    pub(crate) fn access<'a>(&'a self, path: &'a str, method: &'a str) -> AccessRequest<'a> {
        let access = AccessRequest::new(&self.subject, &self.resource_id, path, method);
        match &self.origin_domain {
            Some(domain) => access.origin(domain),
            None => access,
        }
    }
}

/// Admits or rejects each outbound request before it is sent.
///
/// The request's path (with query) and method are checked against the
/// resource named in its [`AdmissionContext`], and admitted requests are
/// counted against the subject's quota. Requests without a context are
/// rejected with [`GatewayError::MissingAdmissionContext`].
///
/// # Example
///
/// ```rust,no_run
/// use gateway_admission::{
///     AdmissionContext, AdmissionMiddleware, AdmissionPipeline, InMemoryResources,
///     RateLimitStore,
/// };
/// use reqwest_middleware::ClientBuilder;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let pipeline = AdmissionPipeline::new(
///     Arc::new(InMemoryResources::new()),
///     Arc::new(RateLimitStore::new()),
/// );
/// let client = ClientBuilder::new(reqwest::Client::new())
///     .with(AdmissionMiddleware::new(pipeline))
///     .build();
///
/// client
///     .get("https://api.example.com/v1/models")
///     .with_extension(AdmissionContext::new("0xabc", "openai-resale"))
///     .send()
///     .await
///     .unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionMiddleware {
    pipeline: AdmissionPipeline,
}

impl AdmissionMiddleware {
    #[must_use]
    pub fn new(pipeline: AdmissionPipeline) -> Self {
        Self { pipeline }
    }

    async fn admit(
        &self,
        path: &str,
        method: &Method,
        extensions: &Extensions,
    ) -> Result<(), GatewayError> {
        let ctx = extensions
            .get::<AdmissionContext>()
            .ok_or(GatewayError::MissingAdmissionContext)?;

        let access = ctx.access(path, method.as_str());
        self.pipeline.admit(&access).await.map_err(|denial| {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                subject = %ctx.subject,
                resource = %ctx.resource_id,
                code = denial.code(),
                "request denied by admission middleware"
            );
            GatewayError::from(denial)
        })?;
        Ok(())
    }
}

#[async_trait]
impl Middleware for AdmissionMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let path = request_path(&req);
        let method = req.method().clone();
        self.admit(&path, &method, extensions).await?;
        next.run(req, extensions).await
    }
}

/// Path and query of an outbound request.
fn request_path(req: &Request) -> String {
    let url = req.url();
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
