use crate::args::Args;
use anyhow::Result;
use reqwest::{Client, Response};
use serde::Serialize;

/// Headers attached to every query, in render order.
pub const HEADERS: [(&str, &str); 2] = [
    ("Content-Type", "application/json"),
    ("Accept", "text/plain"),
];

/// JSON body of the query endpoint.
#[derive(Serialize, Debug)]
pub struct QueryBody {
    #[serde(rename = "queryString")]
    query_string: String,
    start: String,
    end: String,
    #[serde(rename = "isLive")]
    is_live: bool,
}

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    url: String,
    body: QueryBody,
}

impl ApiClient {
    pub fn new(args: &Args) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            url: format!(
                "http://{}/api/v1/dataspaces/{}/query",
                args.hostport, args.dataspace
            ),
            body: QueryBody {
                query_string: args.query.clone(),
                start: args.from.clone(),
                end: args.to.clone(),
                is_live: args.live,
            },
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body_json(&self) -> Result<String> {
        serde_json::to_string(&self.body).map_err(Into::into)
    }

    /// Renders the request as a standalone curl invocation.
    pub fn as_curl(&self) -> Result<String> {
        let headers = HEADERS
            .iter()
            .map(|(name, value)| format!("-H \"{name}: {value}\""))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format!(
            "curl {} -XPOST -d '{}' {}",
            headers,
            self.body_json()?,
            self.url
        ))
    }

    /// POSTs the query, leaving the response body unconsumed so the caller
    /// can stream it.
    pub async fn send(&self) -> Result<Response> {
        let mut request = self.client.post(&self.url);
        for (name, value) in HEADERS {
            request = request.header(name, value);
        }
        request.json(&self.body).send().await.map_err(Into::into)
    }
}
