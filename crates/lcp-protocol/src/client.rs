//! License Status Document protocol client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use lcp_core::media::{HTML, LCP_LICENSE_DOCUMENT, LCP_STATUS_DOCUMENT, XHTML};
use lcp_core::{LicenseDocument, LicenseRel, Link, ParseError, StatusDocument, StatusRel};

use crate::device::DeviceInfo;
use crate::error::{ProtocolError, Result};
use crate::retry::{retry, RetryPolicy};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

#[cfg(feature = "http")]
use crate::error::TransportError;
#[cfg(feature = "http")]
use crate::transport::{ReqwestTransport, TransportConfig};

/// Default timeout of a status document fetch.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// The status protocol operations.
///
/// Every operation returns the status document sent back by the server; the
/// caller decides what to persist.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Fetch the status document of `license`.
    async fn fetch_status(&self, license: &LicenseDocument) -> Result<StatusDocument>;

    /// Fetch the latest license document offered by `status`.
    async fn fetch_license(&self, status: &StatusDocument) -> Result<LicenseDocument>;

    /// Register `device`. Registering an already registered device returns
    /// `status` unchanged.
    async fn register(&self, status: &StatusDocument, device: &DeviceInfo)
        -> Result<StatusDocument>;

    /// Extend the loan, to `end` when given or by the provider's default
    /// period otherwise.
    async fn renew(
        &self,
        status: &StatusDocument,
        device: &DeviceInfo,
        end: Option<DateTime<Utc>>,
    ) -> Result<StatusDocument>;

    /// Return the publication.
    async fn return_license(
        &self,
        status: &StatusDocument,
        device: &DeviceInfo,
    ) -> Result<StatusDocument>;
}

/// [`ProtocolClient`] over an [`HttpTransport`].
pub struct LsdClient<T> {
    transport: T,
    retry: RetryPolicy,
    status_timeout: Duration,
}

impl<T: HttpTransport> LsdClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            status_timeout: STATUS_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request`, retrying transient failures. 5xx responses are
    /// errors; every other status is handed back to the caller.
    async fn send(&self, operation: &'static str, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(operation, method = ?request.method, url = %request.url, "status server request");
        retry(&self.retry, operation, || {
            let request = request.clone();
            async move {
                let response = self.transport.execute(request).await?;
                if response.status >= 500 {
                    return Err(ProtocolError::Server {
                        status: response.status,
                    });
                }
                Ok(response)
            }
        })
        .await
    }

    fn parse_status(response: &HttpResponse) -> Result<StatusDocument> {
        Ok(StatusDocument::parse(response.body.clone())?)
    }
}

#[cfg(feature = "http")]
impl LsdClient<ReqwestTransport> {
    /// A client using reqwest.
    pub fn with_reqwest(config: &TransportConfig) -> std::result::Result<Self, TransportError> {
        Ok(Self::new(ReqwestTransport::new(config)?))
    }
}

/// Map a link resolution failure: a missing link is not a malformed
/// document.
fn link_error(error: ParseError) -> ProtocolError {
    match error {
        ParseError::MissingLink(rel) => ProtocolError::LinkNotAvailable(rel),
        other => ProtocolError::MalformedResponse(other),
    }
}

/// Read-only failures shared by GET requests.
fn unexpected(response: &HttpResponse) -> ProtocolError {
    match response.status {
        401 | 403 => ProtocolError::Forbidden,
        status => ProtocolError::Rejected {
            status,
            body: response.body_text(),
        },
    }
}

/// Pick the renew link: status document API first, then a web page for
/// interactive renewal, then an untyped link.
fn renew_link(status: &StatusDocument) -> Option<&Link<StatusRel>> {
    let links = status.links();
    links
        .first_with_rel(StatusRel::Renew, Some(LCP_STATUS_DOCUMENT))
        .or_else(|| links.first_with_rel(StatusRel::Renew, Some(HTML)))
        .or_else(|| links.first_with_rel(StatusRel::Renew, Some(XHTML)))
        .or_else(|| links.first_with_rel_no_type(StatusRel::Renew))
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl<T: HttpTransport> ProtocolClient for LsdClient<T> {
    async fn fetch_status(&self, license: &LicenseDocument) -> Result<StatusDocument> {
        let url = license
            .url(LicenseRel::Status, Some(LCP_STATUS_DOCUMENT), &[])
            .map_err(link_error)?;
        let request = HttpRequest::get(url).with_timeout(self.status_timeout);
        let response = self.send("fetch_status", request).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }

        let status = Self::parse_status(&response)?;
        tracing::debug!(license_id = %license.id(), status = %status.status(), "fetched status document");
        Ok(status)
    }

    async fn fetch_license(&self, status: &StatusDocument) -> Result<LicenseDocument> {
        let url = status
            .url(StatusRel::License, Some(LCP_LICENSE_DOCUMENT), &[])
            .map_err(link_error)?;
        let response = self.send("fetch_license", HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        Ok(LicenseDocument::parse(response.body)?)
    }

    async fn register(
        &self,
        status: &StatusDocument,
        device: &DeviceInfo,
    ) -> Result<StatusDocument> {
        let url = status
            .url(
                StatusRel::Register,
                Some(LCP_STATUS_DOCUMENT),
                &device.as_query_params(),
            )
            .map_err(link_error)?;
        let response = self.send("register", HttpRequest::put(url)).await?;

        match response.status {
            200..=299 => Self::parse_status(&response),
            400 => {
                tracing::debug!(device_id = %device.id, "device already registered");
                Ok(status.clone())
            }
            _ => Err(unexpected(&response)),
        }
    }

    async fn renew(
        &self,
        status: &StatusDocument,
        device: &DeviceInfo,
        end: Option<DateTime<Utc>>,
    ) -> Result<StatusDocument> {
        let link = renew_link(status).ok_or(ProtocolError::LinkNotAvailable("renew"))?;
        if link.is_html() {
            let url: Url = link.url(&[])?;
            return Err(ProtocolError::InteractionRequired { url });
        }

        let end = end.map(format_date);
        let mut params = device.as_query_params().to_vec();
        if let Some(end) = end.as_deref() {
            params.push(("end", end));
        }
        let url = link.url(&params)?;
        let response = self.send("renew", HttpRequest::put(url)).await?;

        match response.status {
            200..=299 => Self::parse_status(&response),
            400 => Err(ProtocolError::Rejected {
                status: 400,
                body: response.body_text(),
            }),
            403 => Err(ProtocolError::InvalidRenewalPeriod {
                max_end: status.max_renew_date(),
            }),
            _ => Err(unexpected(&response)),
        }
    }

    async fn return_license(
        &self,
        status: &StatusDocument,
        device: &DeviceInfo,
    ) -> Result<StatusDocument> {
        let url = status
            .url(
                StatusRel::Return,
                Some(LCP_STATUS_DOCUMENT),
                &device.as_query_params(),
            )
            .map_err(link_error)?;
        let response = self.send("return", HttpRequest::put(url)).await?;

        match response.status {
            200..=299 => Self::parse_status(&response),
            400 => Err(ProtocolError::Rejected {
                status: 400,
                body: response.body_text(),
            }),
            403 => Err(ProtocolError::AlreadyReturned),
            _ => Err(unexpected(&response)),
        }
    }
}
