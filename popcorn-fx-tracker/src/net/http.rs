use crate::tracker::TrackerHandle;
use bytes::Bytes;
use derive_more::Display;
use log::{debug, trace, warn};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use thiserror::Error;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The sender on which the completions of http requests are delivered to the owning thread.
pub type HttpResponseSender = UnboundedSender<HttpResponse>;

/// The result type of a completed http request.
pub type HttpResult = std::result::Result<HttpBody, HttpError>;

/// The transport error of a http request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HttpError {
    #[error("failed to create the http client, {0}")]
    Client(String),
    #[error("an error occurred while connecting, {0}")]
    Connection(String),
    #[error("the request timed out")]
    Timeout,
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }

        Self::Connection(err.to_string())
    }
}

/// The address family over which a request leg is executed.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IpFamily {
    /// The family is resolved by the system.
    #[display("unspecified")]
    Unspecified,
    #[display("ipv4")]
    V4,
    #[display("ipv6")]
    V6,
}

/// Identifies the owner of a request leg.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
#[display("{}#{} ({})", tracker, request_id, family)]
pub struct RequestTag {
    /// The tracker which issued the request.
    pub tracker: TrackerHandle,
    /// The logical request of the tracker to which the leg belongs.
    pub request_id: u64,
    /// The family of the leg.
    pub family: IpFamily,
}

/// A single GET request leg.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: Url,
    pub family: IpFamily,
    pub timeout: Duration,
}

/// The received body of a finished transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpBody {
    /// The http status code of the response.
    pub status: u16,
    pub body: Bytes,
}

impl HttpBody {
    /// Returns true when the status code is within the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The completion of a request leg.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub tag: RequestTag,
    pub result: HttpResult,
}

/// The non-blocking http client used by the tracker workers.
pub trait HttpGet: Debug + Send + Sync {
    /// Start the given GET request without blocking.
    /// The completion is delivered once on the given sender, unless the request is cancelled first.
    ///
    /// It returns the token which cancels the request.
    fn get(
        &self,
        tag: RequestTag,
        request: HttpRequest,
        sender: HttpResponseSender,
    ) -> CancellationToken;
}

/// The [HttpGet] implementation backed by [reqwest].
///
/// Requests are spawned on the tokio runtime of the calling thread.
#[derive(Debug, Clone)]
pub struct ReqwestHttpGet {
    client: Client,
    client_ipv4: Client,
    client_ipv6: Client,
}

impl ReqwestHttpGet {
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self {
            client: Self::create_client(None)?,
            client_ipv4: Self::create_client(Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))?,
            client_ipv6: Self::create_client(Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)))?,
        })
    }

    fn create_client(local_address: Option<IpAddr>) -> Result<Client, HttpError> {
        Client::builder()
            .redirect(Policy::limited(3))
            .local_address(local_address)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))
    }

    fn client(&self, family: IpFamily) -> &Client {
        match family {
            IpFamily::Unspecified => &self.client,
            IpFamily::V4 => &self.client_ipv4,
            IpFamily::V6 => &self.client_ipv6,
        }
    }

    async fn execute(client: Client, request: HttpRequest) -> HttpResult {
        let response = client
            .get(request.url)
            .timeout(request.timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpBody { status, body })
    }
}

impl HttpGet for ReqwestHttpGet {
    fn get(
        &self,
        tag: RequestTag,
        request: HttpRequest,
        sender: HttpResponseSender,
    ) -> CancellationToken {
        let cancellation_token = CancellationToken::new();
        let client = self.client(request.family).clone();

        trace!("Http client is requesting {} for {}", request.url, tag);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let token = cancellation_token.clone();
                runtime.spawn(async move {
                    select! {
                        _ = token.cancelled() => {
                            debug!("Http client request {} has been cancelled", tag);
                        },
                        result = Self::execute(client, request) => {
                            if sender.send(HttpResponse { tag, result }).is_err() {
                                trace!("Http client completion of {} has no receiver", tag);
                            }
                        },
                    }
                });
            }
            Err(e) => {
                warn!("Http client is unable to spawn request {}, {}", tag, e);
                let _ = sender.send(HttpResponse {
                    tag,
                    result: Err(HttpError::Connection(e.to_string())),
                });
            }
        }

        cancellation_token
    }
}
