use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_BODY, KIND_EVENT, KIND_HELLO};
use crate::error::{PortError, Result};
use crate::traits::{lock, origin_allowed, ListenerSet, MessageListener, MessagePort};

/// Body budget for hello frames, much tighter than the runtime budget.
const HELLO_MAX_BODY: usize = 4 * 1024;
/// How long each side waits for the peer's hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    origin: String,
}

/// Unix-domain-socket listener producing connected [`UdsPort`]s.
///
/// Each accepted connection completes an origin handshake: the connecting
/// side sends a hello frame naming its origin, the listener replies with its
/// own. Both sides then know who they are talking to, which is what `post`'s
/// destination restriction is checked against.
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
    origin: String,
    created_inode: Option<(u64, u64)>,
    cleanup_on_drop: bool,
    max_body: usize,
}

impl UdsListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// The socket file is created at `path`. If the file already exists and is
    /// a socket, it is removed first (stale socket cleanup).
    pub fn bind(path: impl AsRef<Path>, origin: impl Into<String>) -> Result<Self> {
        Self::bind_with_mode(path, origin, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode on the socket path.
    pub fn bind_with_mode(
        path: impl AsRef<Path>,
        origin: impl Into<String>,
        mode: u32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(PortError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| PortError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| PortError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(PortError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| PortError::Bind {
            path: path.clone(),
            source: e,
        })?;
        listener.set_nonblocking(true).map_err(|e| PortError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            PortError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let created_metadata = std::fs::symlink_metadata(&path).map_err(|e| PortError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            origin: origin.into(),
            created_inode,
            cleanup_on_drop: true,
            max_body: DEFAULT_MAX_BODY,
        })
    }

    /// Accept one pending connection, or `None` if nothing is waiting.
    pub fn try_accept(&self) -> Result<Option<Arc<UdsPort>>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                let port = self.handshake_accepted(stream)?;
                Ok(Some(port))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(PortError::Accept(e)),
        }
    }

    /// Accept the next connection, waiting for one to arrive.
    pub fn accept(&self) -> Result<Arc<UdsPort>> {
        loop {
            if let Some(port) = self.try_accept()? {
                return Ok(port);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn handshake_accepted(&self, mut stream: UnixStream) -> Result<Arc<UdsPort>> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(HELLO_TIMEOUT))?;
        stream.set_write_timeout(Some(HELLO_TIMEOUT))?;

        // Connecting side speaks first.
        let mut buf = BytesMut::new();
        let hello = read_hello(&mut stream, &mut buf)?;
        write_hello(&mut stream, &self.origin)?;

        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        stream.set_nonblocking(true)?;

        debug!(peer = %hello.origin, "accepted connection");
        Ok(Arc::new(UdsPort {
            io: Mutex::new(IoState { stream, buf }),
            local_origin: self.origin.clone(),
            peer_origin: hello.origin,
            listeners: ListenerSet::new(),
            max_body: self.max_body,
        }))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The origin this listener announces to connecting peers.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            if let Some((expected_dev, expected_ino)) = self.created_inode {
                if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                    if metadata.file_type().is_socket()
                        && metadata.dev() == expected_dev
                        && metadata.ino() == expected_ino
                    {
                        debug!(path = ?self.path, "cleaning up socket file");
                        let _ = std::fs::remove_file(&self.path);
                    } else {
                        debug!(
                            path = ?self.path,
                            "socket path identity changed; skipping cleanup"
                        );
                    }
                }
            }
        }
    }
}

struct IoState {
    stream: UnixStream,
    buf: BytesMut,
}

/// One end of a connected Unix-socket message channel.
///
/// Reads are cooperative: nothing arrives until [`UdsPort::poll`] runs, which
/// drains whatever the kernel has buffered and hands complete event frames to
/// the registered listeners.
pub struct UdsPort {
    io: Mutex<IoState>,
    local_origin: String,
    peer_origin: String,
    listeners: ListenerSet,
    max_body: usize,
}

impl UdsPort {
    /// Connect to a listening socket and complete the origin handshake.
    pub fn connect(path: impl AsRef<Path>, origin: impl Into<String>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let origin = origin.into();
        let mut stream = UnixStream::connect(path).map_err(|e| PortError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        stream.set_read_timeout(Some(HELLO_TIMEOUT))?;
        stream.set_write_timeout(Some(HELLO_TIMEOUT))?;

        write_hello(&mut stream, &origin)?;
        let mut buf = BytesMut::new();
        let hello = read_hello(&mut stream, &mut buf)?;

        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        stream.set_nonblocking(true)?;

        debug!(?path, peer = %hello.origin, "connected to unix domain socket");
        Ok(Arc::new(Self {
            io: Mutex::new(IoState { stream, buf }),
            local_origin: origin,
            peer_origin: hello.origin,
            listeners: ListenerSet::new(),
            max_body: DEFAULT_MAX_BODY,
        }))
    }

    /// Drain inbound frames and deliver event messages to listeners.
    ///
    /// Returns the number of messages delivered. `PortError::Closed` is
    /// reported once every message received before the peer hung up has been
    /// delivered.
    pub fn poll(&self) -> Result<usize> {
        let mut inbound: Vec<Value> = Vec::new();
        let mut closed = false;
        {
            let mut io = lock(&self.io);
            let mut scratch = [0u8; 8192];
            loop {
                while let Some(frame) = decode_frame(&mut io.buf, self.max_body)? {
                    self.collect_frame(frame, &mut inbound);
                }
                match io.stream.read(&mut scratch) {
                    Ok(0) => {
                        closed = true;
                        break;
                    }
                    Ok(n) => io.buf.extend_from_slice(&scratch[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if closed && inbound.is_empty() {
            return Err(PortError::Closed);
        }

        // Deliver outside the I/O lock so listeners may post on this port.
        let listeners = self.listeners.snapshot();
        for message in &inbound {
            for listener in &listeners {
                if let Err(error) = listener(message) {
                    warn!(%error, peer = %self.peer_origin, "listener failed handling message");
                }
            }
        }
        Ok(inbound.len())
    }

    fn collect_frame(&self, frame: Frame, inbound: &mut Vec<Value>) {
        match frame.kind {
            KIND_EVENT => match serde_json::from_slice(&frame.body) {
                Ok(value) => inbound.push(value),
                Err(error) => warn!(%error, "discarding event frame with invalid JSON"),
            },
            KIND_HELLO => debug!("ignoring hello after handshake"),
            other => debug!(kind = other, "ignoring unknown frame kind"),
        }
    }

    /// The origin announced by the peer during the handshake.
    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }

    /// The origin this side announced.
    pub fn local_origin(&self) -> &str {
        &self.local_origin
    }
}

impl MessagePort for UdsPort {
    fn post(&self, message: &Value, target_origin: &str) {
        if !origin_allowed(target_origin, &self.peer_origin) {
            debug!(
                restriction = %target_origin,
                peer = %self.peer_origin,
                "destination restriction filtered message"
            );
            return;
        }

        let body = match serde_json::to_vec(message) {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "failed to serialize outbound message");
                return;
            }
        };

        let mut out = BytesMut::new();
        if let Err(error) = encode_frame(KIND_EVENT, &body, &mut out) {
            warn!(%error, "failed to encode outbound message");
            return;
        }

        let mut io = lock(&self.io);
        if let Err(error) = write_all_retry(&mut io.stream, &out) {
            warn!(%error, peer = %self.peer_origin, "failed to send message");
        }
    }

    fn add_listener(&self, listener: MessageListener) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &MessageListener) {
        self.listeners.remove(listener);
    }
}

impl std::fmt::Debug for UdsPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsPort")
            .field("local_origin", &self.local_origin)
            .field("peer_origin", &self.peer_origin)
            .finish()
    }
}

fn write_hello(stream: &mut UnixStream, origin: &str) -> Result<()> {
    let body = serde_json::to_vec(&Hello {
        origin: origin.to_string(),
    })?;
    let mut out = BytesMut::new();
    encode_frame(KIND_HELLO, &body, &mut out)?;
    write_all_retry(stream, &out)
}

fn read_hello(stream: &mut UnixStream, buf: &mut BytesMut) -> Result<Hello> {
    let mut scratch = [0u8; 1024];
    loop {
        if let Some(frame) = decode_frame(buf, HELLO_MAX_BODY)? {
            if frame.kind != KIND_HELLO {
                return Err(PortError::HandshakeFailed(format!(
                    "expected hello frame, got kind {}",
                    frame.kind
                )));
            }
            let hello: Hello = serde_json::from_slice(&frame.body)
                .map_err(|e| PortError::HandshakeFailed(format!("malformed hello: {e}")))?;
            return Ok(hello);
        }
        match stream.read(&mut scratch) {
            Ok(0) => return Err(PortError::Closed),
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Err(PortError::HandshakeFailed(
                    "timed out waiting for hello".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn write_all_retry(stream: &mut UnixStream, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        match stream.write(data) {
            Ok(0) => return Err(PortError::Closed),
            Ok(n) => data = &data[n..],
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                continue
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::*;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/relaybus-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("port.sock")
    }

    fn cleanup(sock_path: &Path) {
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn recording_listener() -> (MessageListener, Arc<Mutex<Vec<Value>>>) {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: MessageListener = Arc::new(move |message: &Value| {
            sink.lock().expect("seen lock").push(message.clone());
            Ok(())
        });
        (listener, seen)
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn handshake_exchanges_origins() {
        let sock_path = make_sock_path("handshake");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        let connect_path = sock_path.clone();
        let client_thread = std::thread::spawn(move || {
            UdsPort::connect(&connect_path, "app://child").expect("connect should succeed")
        });

        let server_port = listener.accept().expect("accept should succeed");
        let client_port = client_thread.join().expect("client thread should finish");

        assert_eq!(server_port.peer_origin(), "app://child");
        assert_eq!(server_port.local_origin(), "app://parent");
        assert_eq!(client_port.peer_origin(), "app://parent");
        assert_eq!(client_port.local_origin(), "app://child");

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn post_and_poll_roundtrip_both_directions() {
        let sock_path = make_sock_path("roundtrip");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        let connect_path = sock_path.clone();
        let client_thread = std::thread::spawn(move || {
            UdsPort::connect(&connect_path, "app://child").expect("connect should succeed")
        });
        let server_port = listener.accept().expect("accept should succeed");
        let client_port = client_thread.join().expect("client thread should finish");

        let (server_listener, server_seen) = recording_listener();
        server_port.add_listener(server_listener);
        let (client_listener, client_seen) = recording_listener();
        client_port.add_listener(client_listener);

        client_port.post(&json!({"n": 1}), "*");
        assert!(wait_until(Duration::from_secs(5), || {
            let _ = server_port.poll();
            !server_seen.lock().expect("seen lock").is_empty()
        }));
        assert_eq!(
            *server_seen.lock().expect("seen lock"),
            vec![json!({"n": 1})]
        );

        server_port.post(&json!({"n": 2}), "app://child");
        assert!(wait_until(Duration::from_secs(5), || {
            let _ = client_port.poll();
            !client_seen.lock().expect("seen lock").is_empty()
        }));
        assert_eq!(
            *client_seen.lock().expect("seen lock"),
            vec![json!({"n": 2})]
        );

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn restriction_is_checked_against_peer_origin() {
        let sock_path = make_sock_path("restriction");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        let connect_path = sock_path.clone();
        let client_thread = std::thread::spawn(move || {
            UdsPort::connect(&connect_path, "app://child").expect("connect should succeed")
        });
        let server_port = listener.accept().expect("accept should succeed");
        let client_port = client_thread.join().expect("client thread should finish");

        let (server_listener, server_seen) = recording_listener();
        server_port.add_listener(server_listener);

        // Filtered at the sender: the peer's announced origin does not match.
        client_port.post(&json!("filtered"), "app://other");
        client_port.post(&json!("delivered"), "app://parent");

        assert!(wait_until(Duration::from_secs(5), || {
            let _ = server_port.poll();
            !server_seen.lock().expect("seen lock").is_empty()
        }));
        assert_eq!(
            *server_seen.lock().expect("seen lock"),
            vec![json!("delivered")]
        );

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn poll_reports_closed_after_peer_hangs_up() {
        let sock_path = make_sock_path("closed");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        let connect_path = sock_path.clone();
        let client_thread = std::thread::spawn(move || {
            UdsPort::connect(&connect_path, "app://child").expect("connect should succeed")
        });
        let server_port = listener.accept().expect("accept should succeed");
        let client_port = client_thread.join().expect("client thread should finish");

        client_port.post(&json!("parting"), "*");
        drop(client_port);

        let (server_listener, server_seen) = recording_listener();
        server_port.add_listener(server_listener);

        assert!(wait_until(Duration::from_secs(5), || {
            matches!(server_port.poll(), Err(PortError::Closed))
        }));
        // The message sent before hanging up was still delivered.
        assert_eq!(
            *server_seen.lock().expect("seen lock"),
            vec![json!("parting")]
        );

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn try_accept_returns_none_without_pending_connection() {
        let sock_path = make_sock_path("try-accept");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        assert!(listener
            .try_accept()
            .expect("try_accept should succeed")
            .is_none());

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn bind_path_too_long_errors() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UdsListener::bind(&long_path, "app://parent");
        assert!(matches!(result, Err(PortError::PathTooLong { .. })));
    }

    #[test]
    fn bind_default_permissions_hardened() {
        let sock_path = make_sock_path("perms");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");

        let mode = std::fs::metadata(&sock_path)
            .expect("socket metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        cleanup(&sock_path);
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let sock_path = make_sock_path("bind-file");
        std::fs::write(&sock_path, b"regular-file").expect("write placeholder");

        let result = UdsListener::bind(&sock_path, "app://parent");
        assert!(matches!(result, Err(PortError::Bind { .. })));

        cleanup(&sock_path);
    }

    #[test]
    fn bind_replaces_stale_socket() {
        let sock_path = make_sock_path("stale");
        let first = UdsListener::bind(&sock_path, "app://parent").expect("first bind");
        // Simulate a crashed process leaving its socket file behind.
        std::mem::forget(first);

        let second = UdsListener::bind(&sock_path, "app://parent");
        assert!(second.is_ok());

        drop(second);
        cleanup(&sock_path);
    }

    #[test]
    fn drop_cleans_up_socket_file() {
        let sock_path = make_sock_path("drop");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");
        assert!(sock_path.exists());

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        cleanup(&sock_path);
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let sock_path = make_sock_path("drop-race");
        let listener = UdsListener::bind(&sock_path, "app://parent").expect("bind should succeed");
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).expect("remove socket");
        std::fs::write(&sock_path, b"replacement-file").expect("write replacement");

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );
        cleanup(&sock_path);
    }
}
