//! Provider implementation for tvmao.com using its token-guarded channel EPG endpoints.

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, REFERER, USER_AGENT,
};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use epgpatch_core::{
    config::ListingsConfig,
    model::{AccessToken, ScheduleDay},
    ports::{ListingsPort, PortError},
};

const TOKEN_PATH: &str = "/servlet/accessToken";
const EPG_PATH: &str = "/servlet/channelEpg";
const TOKEN_GRANTED: i64 = 1;
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");

/// Token handshake reply, validated once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenReply {
    /// `[1, "<token>"]`
    Granted(AccessToken),
    /// A well-shaped reply whose status is not the success sentinel.
    Rejected {
        /// Status reported by the site.
        status: i64,
    },
    /// Anything that is not a `[status, token]` pair.
    Malformed,
}

impl TokenReply {
    /// Classify a decoded token response body.
    #[must_use]
    pub fn from_json(body: &Value) -> Self {
        let Some([status, token]) = body.as_array().map(Vec::as_slice) else {
            return Self::Malformed;
        };
        match (status.as_i64(), token.as_str()) {
            (Some(TOKEN_GRANTED), Some(token)) => Self::Granted(AccessToken(token.to_owned())),
            (Some(status), Some(_)) => Self::Rejected { status },
            _ => Self::Malformed,
        }
    }

    /// Turn the reply into a token or an authentication error.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Authentication`] unless the token was granted.
    pub fn into_token(self) -> Result<AccessToken, PortError> {
        match self {
            Self::Granted(token) => Ok(token),
            Self::Rejected { status } => Err(PortError::Authentication(format!(
                "token request rejected with status {status}"
            ))),
            Self::Malformed => Err(PortError::Authentication(
                "token response is not a [status, token] pair".to_owned(),
            )),
        }
    }
}

/// Keep the textual elements of an AJAX schedule reply; anything else is skipped.
///
/// # Errors
///
/// Returns [`PortError::Internal`] if the body is not a JSON array.
pub fn fragments_from_json(body: Value) -> Result<Vec<String>, PortError> {
    let Value::Array(items) = body else {
        return Err(PortError::Internal(
            "channel EPG response is not a JSON array".to_owned(),
        ));
    };
    let total = items.len();
    let fragments: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(fragment) => Some(fragment),
            _ => None,
        })
        .collect();
    if fragments.len() < total {
        warn!(skipped = total - fragments.len(), "ignoring non-text channel EPG elements");
    }
    Ok(fragments)
}

/// Listing backend for a single tvmao station/sub-channel.
pub struct TvmaoListings {
    client: Client,
    config: ListingsConfig,
    headers: HeaderMap,
}

impl TvmaoListings {
    /// Create a listing port bound to the given HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Internal`] if the configured user agent or base URL
    /// cannot be used as a header value.
    pub fn new(client: Client, config: ListingsConfig) -> Result<Self, PortError> {
        let headers = request_headers(&config).map_err(|err| {
            PortError::Internal(format!("invalid listing request header: {err}"))
        })?;
        Ok(Self {
            client,
            config,
            headers,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{path}", self.config.base_url))
            .headers(self.headers.clone())
    }

    fn token_request(&self) -> RequestBuilder {
        self.post(TOKEN_PATH)
            .form(&[("p", self.config.token_scope.as_str())])
    }

    fn page_request(&self, day: &ScheduleDay) -> RequestBuilder {
        self.client
            .get(page_url(&self.config, day.weekday))
            .headers(self.headers.clone())
    }

    fn epg_request(&self, day: &ScheduleDay, token: &AccessToken) -> RequestBuilder {
        let weekday = day.weekday.to_string();
        self.post(EPG_PATH).form(&[
            ("tc", self.config.station.as_str()),
            ("cc", self.config.subchannel.as_str()),
            ("w", weekday.as_str()),
            ("token", token.as_str()),
        ])
    }
}

#[async_trait]
impl ListingsPort for TvmaoListings {
    async fn access_token(&self) -> Result<AccessToken, PortError> {
        let body = fetch_json(self.token_request()).await?;
        TokenReply::from_json(&body).into_token()
    }

    async fn day_page(&self, day: &ScheduleDay) -> Result<String, PortError> {
        debug!(date = %day.date, weekday = day.weekday, "fetching schedule page");
        self.page_request(day)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(PortError::from)
    }

    async fn day_fragments(
        &self,
        day: &ScheduleDay,
        token: &AccessToken,
    ) -> Result<Vec<String>, PortError> {
        debug!(date = %day.date, weekday = day.weekday, "fetching channel EPG fragments");
        let body = fetch_json(self.epg_request(day, token)).await?;
        fragments_from_json(body)
    }
}

fn page_url(config: &ListingsConfig, weekday: u32) -> String {
    format!(
        "{}/program/{}-{}-w{weekday}.html",
        config.base_url, config.station, config.subchannel
    )
}

fn request_headers(config: &ListingsConfig) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
    headers.insert(REFERER, HeaderValue::from_str(&page_url(config, 1))?);
    headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
    Ok(headers)
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json(req: RequestBuilder) -> Result<Value, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
