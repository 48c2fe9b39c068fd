use crate::classify::reason_phrase;
use crate::{path, StorageError};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use ureq::http::Method;

/// HTTP verbs the storage API uses. `Describe` is non-standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Put,
    Delete,
    Describe,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Describe => "DESCRIBE",
        }
    }

    fn method(self) -> Result<Method, StorageError> {
        match self {
            Verb::Get => Ok(Method::GET),
            Verb::Put => Ok(Method::PUT),
            Verb::Delete => Ok(Method::DELETE),
            Verb::Describe => Method::from_bytes(self.as_str().as_bytes())
                .map_err(|e| StorageError::Transport(Box::new(e))),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against the zone. `path` is relative to the endpoint and not yet encoded.
pub struct Request<'a> {
    pub verb: Verb,
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<&'a [u8]>,
}

impl<'a> Request<'a> {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Header values stay out of Debug output: one of them is the access key.
impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| *k).collect();
        f.debug_struct("Request")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("headers", &names)
            .field("body_len", &self.body.map(<[u8]>::len))
            .finish()
    }
}

/// Response head plus a live body stream. Dropping it releases the connection.
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }

    pub fn into_bytes(mut self) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read and drop a bounded amount of the remaining body so the connection can be reused.
    pub fn discard(mut self) {
        let _ = std::io::copy(&mut (&mut self.body).take(64 * 1024), &mut std::io::sink());
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Executes a single request. Implementations do not retry.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request<'_>) -> Result<Response, StorageError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &Request<'_>) -> Result<Response, StorageError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a shared `ureq` agent.
///
/// Every status code is returned as a [`Response`]; only connection, timeout and
/// protocol failures become errors.
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .timeout_global(timeout)
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request<'_>) -> Result<Response, StorageError> {
        let url = path::url(&self.endpoint, &request.path);
        let mut builder = ureq::http::Request::builder()
            .method(request.verb.method()?)
            .uri(url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let resp = match request.body {
            Some(body) => {
                let req = builder
                    .body(body)
                    .map_err(|e| StorageError::Transport(Box::new(e)))?;
                self.agent.run(req)?
            }
            None => {
                let req = builder
                    .body(())
                    .map_err(|e| StorageError::Transport(Box::new(e)))?;
                self.agent.run(req)?
            }
        };

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = resp.into_body().into_reader();
        Ok(Response::new(status, headers, Box::new(body)))
    }
}
