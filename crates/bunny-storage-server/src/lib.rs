//! In-process storage-zone emulator.
//!
//! Serves one zone under `/{zone}/` with the same request shapes the client sends:
//! `PUT` (with optional `Checksum` verification), `GET` of files (with `Range`
//! support) and directories (JSON listing), `DELETE` of files and whole
//! directories, and the non-standard `DESCRIBE`. Objects live in memory.
//!
//! [`TestServer`] starts it on a random port for integration tests and can inject
//! `429 Too Many Requests` responses via [`Zone::throttle`].

use bunny_storage::{checksum, Object};
use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tiny_http::{Header, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct StoredObject {
    guid: String,
    data: Vec<u8>,
    checksum: String,
    content_type: String,
    created: NaiveDateTime,
    changed: NaiveDateTime,
}

/// One storage zone: a flat map from object path to contents.
///
/// Keys are normalized (`a/b/c`, no leading, trailing or repeated separators);
/// directories exist only as key prefixes.
pub struct Zone {
    name: String,
    access_key: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    throttled: AtomicU32,
    ranges: AtomicBool,
    next_id: AtomicU64,
}

impl Zone {
    pub fn new(name: &str, access_key: &str) -> Self {
        Self {
            name: name.to_owned(),
            access_key: access_key.to_owned(),
            objects: RwLock::new(BTreeMap::new()),
            throttled: AtomicU32::new(0),
            ranges: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer the next `n` requests with `429 Too Many Requests`.
    pub fn throttle(&self, n: u32) {
        self.throttled.store(n, Ordering::SeqCst);
    }

    /// When disabled, `Range` headers are ignored and whole objects are served with 200.
    pub fn set_ranges_enabled(&self, enabled: bool) {
        self.ranges.store(enabled, Ordering::SeqCst);
    }

    fn ranges_enabled(&self) -> bool {
        self.ranges.load(Ordering::SeqCst)
    }

    fn take_throttle(&self) -> bool {
        self.throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("zone lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put(&self, path: &str, data: Vec<u8>, content_type: &str) {
        let key = normalize(path);
        let now = Utc::now().naive_utc();
        let mut objects = self.objects.write().expect("zone lock poisoned");
        let (guid, created) = match objects.get(&key) {
            Some(existing) => (existing.guid.clone(), existing.created),
            None => (self.new_guid(), now),
        };
        objects.insert(
            key,
            StoredObject {
                guid,
                checksum: checksum(&data).to_uppercase(),
                data,
                content_type: content_type.to_owned(),
                created,
                changed: now,
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        let objects = self.objects.read().expect("zone lock poisoned");
        objects.get(&normalize(path)).map(|o| o.data.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        let objects = self.objects.read().expect("zone lock poisoned");
        objects.contains_key(&normalize(path))
    }

    pub fn delete_file(&self, path: &str) -> bool {
        let mut objects = self.objects.write().expect("zone lock poisoned");
        objects.remove(&normalize(path)).is_some()
    }

    /// Remove everything below `dir`. Returns the number of objects removed.
    pub fn delete_dir(&self, dir: &str) -> usize {
        let prefix = dir_prefix(dir);
        let mut objects = self.objects.write().expect("zone lock poisoned");
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&prefix));
        before - objects.len()
    }

    fn is_dir(&self, dir: &str) -> bool {
        let prefix = dir_prefix(dir);
        let objects = self.objects.read().expect("zone lock poisoned");
        prefix.is_empty() || objects.keys().any(|k| k.starts_with(&prefix))
    }

    /// Direct children of `dir`: files first-level below it, plus one record per subdirectory.
    pub fn list(&self, dir: &str) -> Vec<Object> {
        let dir = normalize(dir);
        let prefix = dir_prefix(&dir);
        let objects = self.objects.read().expect("zone lock poisoned");

        let mut entries = Vec::new();
        let mut seen_dirs: Vec<&str> = Vec::new();
        for (key, stored) in objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    if !seen_dirs.contains(&sub) {
                        seen_dirs.push(sub);
                        entries.push(self.dir_record(&dir, sub, stored.changed));
                    }
                }
                None => entries.push(self.file_record(&dir, rest, stored)),
            }
        }
        entries
    }

    pub fn describe(&self, path: &str) -> Option<Object> {
        let key = normalize(path);
        {
            let objects = self.objects.read().expect("zone lock poisoned");
            if let Some(stored) = objects.get(&key) {
                let (parent, name) = split_parent(&key);
                return Some(self.file_record(parent, name, stored));
            }
        }
        if self.is_dir(&key) {
            let (parent, name) = split_parent(&key);
            return Some(self.dir_record(parent, name, Utc::now().naive_utc()));
        }
        None
    }

    fn new_guid(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("00000000-0000-4000-8000-{id:012x}")
    }

    fn record_path(&self, parent: &str) -> String {
        if parent.is_empty() {
            format!("/{}/", self.name)
        } else {
            format!("/{}/{parent}/", self.name)
        }
    }

    fn file_record(&self, parent: &str, name: &str, stored: &StoredObject) -> Object {
        Object {
            guid: stored.guid.clone(),
            storage_zone_name: self.name.clone(),
            path: self.record_path(parent),
            object_name: name.to_owned(),
            length: stored.data.len() as u64,
            last_changed: Some(stored.changed),
            is_directory: false,
            content_type: stored.content_type.clone(),
            date_created: Some(stored.created),
            checksum: Some(stored.checksum.clone()),
            ..Object::default()
        }
    }

    fn dir_record(&self, parent: &str, name: &str, changed: NaiveDateTime) -> Object {
        Object {
            guid: format!("dir-{}", checksum(format!("{parent}/{name}").as_bytes())),
            storage_zone_name: self.name.clone(),
            path: self.record_path(parent),
            object_name: name.to_owned(),
            last_changed: Some(changed),
            date_created: Some(changed),
            is_directory: true,
            ..Object::default()
        }
    }
}

/// Collapse repeated separators and trim them at both ends.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn dir_prefix(dir: &str) -> String {
    let dir = normalize(dir);
    if dir.is_empty() {
        dir
    } else {
        format!("{dir}/")
    }
}

fn split_parent(key: &str) -> (&str, &str) {
    key.rsplit_once('/').unwrap_or(("", key))
}

/// Parse a `Range` header against an object of `len` bytes.
///
/// `None` means the header is absent or malformed and the whole object is served;
/// `Some(Err(()))` means the range cannot be satisfied.
pub fn parse_range(header: &str, len: u64) -> Option<Result<(u64, u64), ()>> {
    let bounds = header.trim().strip_prefix("bytes=")?;
    if bounds.contains(',') {
        return None;
    }
    let (start, end) = bounds.split_once('-')?;
    let (start, end) = match (start.trim(), end.trim()) {
        ("", suffix) => {
            let n: u64 = suffix.parse().ok()?;
            if n == 0 {
                return Some(Err(()));
            }
            (len.saturating_sub(n), len.saturating_sub(1))
        }
        (start, "") => (start.parse().ok()?, len.saturating_sub(1)),
        (start, end) => {
            let (s, e): (u64, u64) = (start.parse().ok()?, end.parse().ok()?);
            if s > e {
                return None;
            }
            (s, e.min(len.saturating_sub(1)))
        }
    };
    if len == 0 || start >= len {
        return Some(Err(()));
    }
    Some(Ok((start, end)))
}

fn header_value<'r>(req: &'r tiny_http::Request, name: &str) -> Option<&'r str> {
    req.headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn json_header() -> Header {
    Header::from_bytes("Content-Type", "application/json").expect("valid header")
}

fn respond_status(req: tiny_http::Request, code: u16, msg: &str) {
    let body = serde_json::json!({ "HttpCode": code, "Message": msg }).to_string();
    let _ = req.respond(
        Response::from_string(body)
            .with_status_code(StatusCode(code))
            .with_header(json_header()),
    );
}

fn respond_json(req: tiny_http::Request, body: Vec<u8>) {
    let _ = req.respond(Response::from_data(body).with_header(json_header()));
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

/// Split a request URL into the zone-relative path, percent-decoded.
/// `None` when the URL is outside `/{zone}`.
fn zone_path(zone: &str, url: &str) -> Option<String> {
    let url = url.split(['?', '#']).next().unwrap_or_default();
    let rest = url.strip_prefix('/')?.strip_prefix(zone)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let decoded: Vec<String> = rest
        .split('/')
        .map(|segment| urlencoding::decode(segment).map(std::borrow::Cow::into_owned))
        .collect::<Result<_, _>>()
        .ok()?;
    Some(decoded.join("/"))
}

fn handle_put(zone: &Zone, mut req: tiny_http::Request, path: &str) {
    let Some(body) = read_body(&mut req) else {
        respond_status(req, 500, "read error");
        return;
    };
    if let Some(expected) = header_value(&req, "Checksum") {
        let actual = checksum(&body);
        if !expected.trim().eq_ignore_ascii_case(&actual) {
            warn!("PUT {path}: checksum mismatch");
            respond_status(req, 400, "Checksum and file hash do not match");
            return;
        }
    }
    let content_type = header_value(&req, "Content-Type")
        .unwrap_or("application/octet-stream")
        .to_owned();
    info!("PUT {path}: {} bytes", body.len());
    zone.put(path, body, &content_type);
    respond_status(req, 201, "File uploaded.");
}

fn handle_get_file(zone: &Zone, req: tiny_http::Request, path: &str) {
    let Some(data) = zone.get(path) else {
        respond_status(req, 404, "Object Not Found");
        return;
    };
    let len = data.len() as u64;
    let range = header_value(&req, "Range")
        .filter(|_| zone.ranges_enabled())
        .and_then(|h| parse_range(h, len));
    match range {
        None => {
            let _ = req.respond(Response::from_data(data));
        }
        Some(Ok((start, end))) => {
            let slice = data[start as usize..=end as usize].to_vec();
            let mut resp = Response::from_data(slice).with_status_code(StatusCode(206));
            if let Ok(h) = Header::from_bytes("Content-Range", format!("bytes {start}-{end}/{len}"))
            {
                resp = resp.with_header(h);
            }
            let _ = req.respond(resp);
        }
        Some(Err(())) => {
            let mut resp = Response::from_data(Vec::new()).with_status_code(StatusCode(416));
            if let Ok(h) = Header::from_bytes("Content-Range", format!("bytes */{len}")) {
                resp = resp.with_header(h);
            }
            let _ = req.respond(resp);
        }
    }
}

fn handle_list(zone: &Zone, req: tiny_http::Request, dir: &str) {
    let entries = zone.list(dir);
    debug!("LIST {dir}/: {} entries", entries.len());
    match serde_json::to_vec(&entries) {
        Ok(body) => respond_json(req, body),
        Err(e) => {
            error!("LIST {dir}/: {e}");
            respond_status(req, 500, "serialization error");
        }
    }
}

fn handle_delete(zone: &Zone, req: tiny_http::Request, path: &str, is_dir: bool) {
    let found = if is_dir {
        let removed = zone.delete_dir(path);
        info!("DELETE {path}/: {removed} objects");
        removed > 0
    } else {
        zone.delete_file(path)
    };
    if found {
        respond_status(req, 200, "File deleted successfuly.");
    } else {
        respond_status(req, 404, "Object Not Found");
    }
}

fn handle_describe(zone: &Zone, req: tiny_http::Request, path: &str) {
    match zone.describe(path) {
        Some(object) => match serde_json::to_vec(&object) {
            Ok(body) => respond_json(req, body),
            Err(e) => {
                error!("DESCRIBE {path}: {e}");
                respond_status(req, 500, "serialization error");
            }
        },
        None => respond_status(req, 404, "Object Not Found"),
    }
}

/// Handle a single HTTP request against `zone`.
pub fn handle_request(zone: &Zone, req: tiny_http::Request) {
    let method = req.method().to_string();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if zone.take_throttle() {
        respond_status(req, 429, "Too Many Requests");
        return;
    }
    if header_value(&req, "AccessKey") != Some(zone.access_key.as_str()) {
        respond_status(req, 401, "Unauthorized");
        return;
    }
    let Some(path) = zone_path(&zone.name, &url) else {
        respond_status(req, 404, "Storage zone not found");
        return;
    };
    let is_dir = path.is_empty() || path.ends_with('/');

    match (method.as_str(), is_dir) {
        ("PUT", false) => handle_put(zone, req, &path),
        ("PUT", true) => respond_status(req, 400, "Cannot upload to a directory path"),
        ("GET", false) => handle_get_file(zone, req, &path),
        ("GET", true) => handle_list(zone, req, &path),
        ("DELETE", _) => handle_delete(zone, req, &path, is_dir),
        ("DESCRIBE", _) => handle_describe(zone, req, &path),
        _ => respond_status(req, 405, "Method Not Allowed"),
    }
}

/// Serve `zone` on `addr`, blocking the current thread.
pub fn run_server(
    zone: &Arc<Zone>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(zone, request);
    }
    Ok(())
}

/// Emulator on `127.0.0.1:{random port}` in a background thread.
///
/// `url` is the zone endpoint to hand to the client. Dropping the `TestServer`
/// stops the accept loop.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    zone: Arc<Zone>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    pub fn start(zone_name: &str, access_key: &str) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}/{zone_name}");

        let zone = Arc::new(Zone::new(zone_name, access_key));
        let srv = Arc::clone(&server);
        let served = Arc::clone(&zone);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&served, request);
            }
        });

        Self {
            url,
            port,
            zone,
            server,
            _handle: handle,
        }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    /// Answer the next `n` requests with 429.
    pub fn throttle(&self, n: u32) {
        self.zone.throttle(n);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
