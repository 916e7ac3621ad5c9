use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

/// Blocking client for the daemon's REST API
pub struct Api {
    base_uri: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl Api {
    pub fn new(base_uri: &str, token: Option<String>) -> Self {
        Api {
            base_uri: base_uri.trim_end_matches('/').to_owned(),
            token,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    fn authorize(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let req = self.authorize(self.client.get(self.url(path)));
        read(req.send()?)
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, RestError> {
        let req = self.authorize(self.client.post(self.url(path)).json(body));
        read(req.send()?)
    }

    pub fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, RestError> {
        let req = self.authorize(self.client.put(self.url(path)).json(body));
        read(req.send()?)
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let req = self.authorize(self.client.delete(self.url(path)));
        read(req.send()?)
    }
}

fn read<T: DeserializeOwned>(res: reqwest::blocking::Response) -> Result<T, RestError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json()?);
    }

    let text = res.text()?;
    Err(RestError::Server {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// Pull the `error` field out of an error body, falling back to the raw text
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
