use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ToolError, names, parameters_for};

/// Bytes of response text returned to the model.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP method for [`WebFetchArgs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    /// GET request.
    #[default]
    Get,
    /// POST request with `body`.
    Post,
}

/// Arguments for [`WebFetchTool`].
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct WebFetchArgs {
    /// Absolute http(s) URL.
    pub url: String,
    /// GET or POST.
    #[serde(default)]
    pub method: FetchMethod,
    /// Request body for POST.
    #[serde(default)]
    pub body: Option<String>,
}

/// Fetches a URL and returns the status and the start of the body.
#[derive(Debug, Clone)]
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebFetchTool {
    /// Tool with its own HTTP client.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Tool for WebFetchTool {
    const NAME: &'static str = names::WEB_FETCH;
    type Error = ToolError;
    type Args = WebFetchArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch a web page or API endpoint with GET or POST. \
                          Returns the HTTP status code and the first 10 KB of the response."
                .to_string(),
            parameters: parameters_for::<WebFetchArgs>(),
        }
    }

    async fn call(&self, args: WebFetchArgs) -> Result<String, ToolError> {
        if !(args.url.starts_with("http://") || args.url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!(
                "url must start with http:// or https://, got '{}'",
                args.url
            )));
        }

        let request = match args.method {
            FetchMethod::Get => self.client.get(&args.url),
            FetchMethod::Post => self.client.post(&args.url).body(args.body.unwrap_or_default()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("request to {} failed: {e}", args.url)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("reading response failed: {e}")))?;

        Ok(format!(
            "Status Code: {status}\nResponse: {}",
            truncate_bytes(&text, MAX_RESPONSE_BYTES)
        ))
    }
}

fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
