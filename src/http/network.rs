use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use url::{Origin, Url};

use super::{Method, Request, Response, ResponseType};

/// Transport used by the worker for every outgoing request.
///
/// An `Err` means the request never produced a response (offline, DNS, TLS,
/// timeout). Any HTTP status, including 5xx, is an `Ok` response.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network backed by a shared reqwest client
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl ReqwestNetwork {
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("floatly-sw/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.origin(),
    })
  }
}

/// Classify a response by where it finally came from.
fn response_type(origin: &Origin, requested: &Url, final_url: &Url) -> ResponseType {
  if &final_url.origin() == origin {
    ResponseType::Basic
  } else if final_url != requested {
    // Redirected off-origin
    ResponseType::Opaque
  } else {
    ResponseType::Cors
  }
}

impl Network for ReqwestNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
      Method::Options => reqwest::Method::OPTIONS,
    };

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("{} {} failed: {}", request.method, request.url, e))?;

    let status = response.status();
    let final_url = response.url().clone();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", final_url, e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or("").to_string(),
      headers,
      body: body.to_vec(),
      response_type: response_type(&self.origin, &request.url, &final_url),
      url: Some(final_url.to_string()),
    })
  }
}
