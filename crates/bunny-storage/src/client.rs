use crate::checksum::{checksum, checksum_reader, CHECKSUM_HEADER};
use crate::classify::{classify, OperationKind, Outcome};
use crate::config::ClientConfig;
use crate::object::Object;
use crate::path::as_directory;
use crate::range::ByteRange;
use crate::retry::{RetryPolicy, RetryingTransport};
use crate::transport::{HttpTransport, Request, Response, Transport, Verb};
use crate::{Result, StorageError, ACCESS_KEY_HEADER};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

const OCTET_STREAM: &str = "application/octet-stream";
const JSON: &str = "application/json";

/// Client for one storage zone.
///
/// Endpoint and access key are fixed at construction; every call builds its own
/// request state, so a `Client` can be shared freely between threads.
///
/// | call | request |
/// |---|---|
/// | [`upload`](Self::upload) | `PUT {endpoint}/{path}` (+ `Checksum`) |
/// | [`download`](Self::download) | `GET {endpoint}/{path}` |
/// | [`download_range`](Self::download_range) | `GET` with `Range: bytes=start-end` |
/// | [`delete`](Self::delete) | `DELETE {endpoint}/{path}[/]` |
/// | [`list`](Self::list) | `GET {endpoint}/{path}/` |
/// | [`describe`](Self::describe) | `DESCRIBE {endpoint}/{path}` |
pub struct Client<T: Transport = HttpTransport> {
    config: ClientConfig,
    transport: RetryingTransport<T>,
    dispatch: Option<tracing::Dispatch>,
}

impl Client<HttpTransport> {
    pub fn new(endpoint: &str, access_key: &str) -> Result<Self> {
        Self::from_config(ClientConfig::new(endpoint, access_key))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.endpoint, config.timeout());
        Ok(Self::with_transport(config, transport))
    }

    /// Build from `BUNNY_ENDPOINT` / `BUNNY_ACCESS_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }
}

impl<T: Transport> Client<T> {
    /// Use a custom transport. Retry settings come from `config`.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let policy = RetryPolicy::new(config.max_attempts).with_backoff(config.backoff());
        Self {
            config,
            transport: RetryingTransport::new(transport, policy),
            dispatch: None,
        }
    }

    #[must_use]
    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        Self {
            config: self.config,
            transport: RetryingTransport::new(self.transport.into_inner(), policy),
            dispatch: self.dispatch,
        }
    }

    /// Route this client's log events to `dispatch` instead of the global subscriber.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.policy()
    }

    /// Store `content` at `path`, replacing any existing object.
    ///
    /// With `generate_checksum` the SHA-256 of `content` travels in the `Checksum`
    /// header and the backend rejects the upload if the bytes do not match.
    pub fn upload(&self, path: &str, content: &[u8], generate_checksum: bool) -> Result<()> {
        let digest = generate_checksum.then(|| checksum(content));
        self.put(path, content, digest)
    }

    /// Buffer `reader` and upload it. Read failures are reported before anything is sent.
    pub fn upload_reader<R: Read>(
        &self,
        path: &str,
        mut reader: R,
        generate_checksum: bool,
    ) -> Result<()> {
        if generate_checksum {
            let (content, digest) = checksum_reader(reader)?;
            self.put(path, &content, Some(digest))
        } else {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            self.put(path, &content, None)
        }
    }

    pub fn upload_file(&self, path: &str, local: &Path, generate_checksum: bool) -> Result<()> {
        let file = std::fs::File::open(local)?;
        self.upload_reader(path, file, generate_checksum)
    }

    fn put(&self, path: &str, content: &[u8], digest: Option<String>) -> Result<()> {
        self.scoped(|| {
            let mut request = self
                .request(Verb::Put, path)
                .header("Content-Type", OCTET_STREAM)
                .body(content);
            if let Some(digest) = digest {
                request = request.header(CHECKSUM_HEADER, digest);
            }
            let (_, resp) = self.send(&request, OperationKind::Upload)?;
            resp.discard();
            debug!(path, bytes = content.len(), "upload stored");
            Ok(())
        })
    }

    /// Fetch a whole object into memory.
    pub fn download(&self, path: &str) -> Result<Vec<u8>> {
        read_all(self.download_reader(path)?)
    }

    /// Streaming download. The connection is held until the reader is dropped.
    pub fn download_reader(&self, path: &str) -> Result<ObjectReader> {
        self.scoped(|| {
            let request = self.request(Verb::Get, path);
            let (_, resp) = self.send(&request, OperationKind::Download)?;
            Ok(ObjectReader::new(resp))
        })
    }

    /// Fetch bytes `start..=end` of an object. Both bounds are included.
    pub fn download_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        read_all(self.download_range_reader(path, start, end)?)
    }

    /// Streaming range download. A whole-object `200` answer is sliced locally to
    /// the requested bytes.
    pub fn download_range_reader(&self, path: &str, start: u64, end: u64) -> Result<ObjectReader> {
        let range = ByteRange::new(start, end)?;
        self.scoped(|| {
            let request = self
                .request(Verb::Get, path)
                .header("Range", range.header_value());
            let (_, resp) = self.send(&request, OperationKind::DownloadRange)?;
            debug!(path, %range, status = resp.status, "range response");
            let reader = ObjectReader::new(resp);
            if reader.status == 206 {
                return Ok(reader);
            }
            warn!(
                path,
                %range,
                status = reader.status,
                "range ignored by backend, slicing full body"
            );
            reader.narrow(range)
        })
    }

    /// Delete a file, or a directory with everything below it when `is_directory` is set.
    ///
    /// Deleting something that does not exist succeeds.
    pub fn delete(&self, path: &str, is_directory: bool) -> Result<()> {
        let target = if is_directory {
            as_directory(path)
        } else {
            path.to_owned()
        };
        self.scoped(|| {
            let request = self.request(Verb::Delete, target.as_str());
            let (outcome, resp) = self.send(&request, OperationKind::Delete)?;
            resp.discard();
            if outcome == Outcome::NotFoundIsSuccess {
                debug!(path = %target, "delete target already absent");
            }
            Ok(())
        })
    }

    /// List the direct children of a directory. A missing directory lists as empty.
    pub fn list(&self, path: &str) -> Result<Vec<Object>> {
        let target = as_directory(path);
        self.scoped(|| {
            let request = self
                .request(Verb::Get, target.as_str())
                .header("Accept", JSON);
            let (outcome, resp) = self.send(&request, OperationKind::List)?;
            if outcome == Outcome::EmptyResult {
                resp.discard();
                return Ok(Vec::new());
            }
            let body = resp.into_bytes()?;
            if is_blank(&body) {
                return Ok(Vec::new());
            }
            let objects: Vec<Object> = serde_json::from_slice(&body)?;
            debug!(path = %target, entries = objects.len(), "listed");
            Ok(objects)
        })
    }

    /// Metadata for a single object. Experimental: the backend does not document
    /// this verb.
    ///
    /// `Ok(None)` means the backend answered successfully but sent no record, or
    /// only the empty placeholder record.
    pub fn describe(&self, path: &str) -> Result<Option<Object>> {
        self.scoped(|| {
            let request = self.request(Verb::Describe, path).header("Accept", JSON);
            let (outcome, resp) = self.send(&request, OperationKind::Describe)?;
            if outcome == Outcome::EmptyResult {
                resp.discard();
                return Ok(None);
            }
            let body = resp.into_bytes()?;
            if is_blank(&body) {
                return Ok(None);
            }
            let object: Object = serde_json::from_slice(&body)?;
            Ok((!object.is_empty()).then_some(object))
        })
    }

    fn request<'a>(&self, verb: Verb, path: impl Into<String>) -> Request<'a> {
        Request::new(verb, path).header(ACCESS_KEY_HEADER, self.config.access_key.expose())
    }

    /// Execute with retries and classify. Failures come back as `StorageError::Backend`.
    fn send(&self, request: &Request<'_>, kind: OperationKind) -> Result<(Outcome, Response)> {
        let resp = self.transport.execute(request)?;
        match classify(resp.status, kind) {
            Outcome::Failure { status, reason } => {
                resp.discard();
                debug!(verb = %request.verb, path = %request.path, status, "backend refused request");
                Err(StorageError::Backend { status, reason })
            }
            outcome => Ok((outcome, resp)),
        }
    }

    fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl<T: Transport> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.config.endpoint)
            .field("retry", self.transport.policy())
            .finish_non_exhaustive()
    }
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn read_all(mut reader: ObjectReader) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Body of a successful download. Owns the connection; dropping it releases it.
pub struct ObjectReader {
    status: u16,
    content_length: Option<u64>,
    body: Box<dyn Read + Send>,
}

impl ObjectReader {
    fn new(resp: Response) -> Self {
        let content_length = resp
            .header("Content-Length")
            .and_then(|v| v.trim().parse().ok());
        Self {
            status: resp.status,
            content_length,
            body: resp.body,
        }
    }

    /// Skip to `range` within a whole-object body and stop after its last byte.
    fn narrow(mut self, range: ByteRange) -> Result<Self> {
        let mut head = (&mut self.body).take(range.start());
        let skipped = std::io::copy(&mut head, &mut std::io::sink())?;
        self.content_length = self
            .content_length
            .map(|len| len.saturating_sub(skipped).min(range.len()));
        self.body = Box::new(self.body.take(range.len()));
        Ok(self)
    }

    /// 200 for whole objects, 206 when the backend honored a range.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.read(buf)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
