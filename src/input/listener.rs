//! Key listener endpoint.
//!
//! The key notifier helper finds this process through a Unix domain socket
//! registered under a well-known name and writes one notification per line:
//!
//! ```text
//! keyDown <keycode> <chars>
//! keyUp <keycode> <chars>
//! quasimodeStart
//! quasimodeEnd
//! quasimodeCancel
//! someKey
//! ```
//!
//! `<chars>` is everything after the second space and may be empty or
//! contain spaces. The listener only parses lines and posts them to the
//! event loop; handlers never run on the listener's threads.

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::os::unix::fs::MetadataExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::event_loop::LoopProxy;
use crate::error::PlatformError;

/// A message from the key notifier helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    KeyDown { keycode: u16, chars: String },
    KeyUp { keycode: u16, chars: String },
    QuasimodeStart,
    QuasimodeEnd,
    QuasimodeCancel,
    SomeKey,
}

impl FromStr for Notification {
    type Err = PlatformError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();

        let key_fields = |mut parts: std::str::SplitN<'_, char>| {
            let code = parts
                .next()
                .ok_or_else(|| PlatformError::Protocol(format!("missing key code in {line:?}")))?;
            let keycode = code
                .parse::<u16>()
                .map_err(|_| PlatformError::Protocol(format!("bad key code {code:?}")))?;
            Ok::<_, PlatformError>((keycode, parts.next().unwrap_or_default().to_string()))
        };

        let simple = |n: Notification, mut parts: std::str::SplitN<'_, char>| match parts.next() {
            None => Ok(n),
            Some(_) => Err(PlatformError::Protocol(format!(
                "unexpected arguments in {line:?}"
            ))),
        };

        match name {
            "keyDown" => key_fields(parts).map(|(keycode, chars)| Self::KeyDown { keycode, chars }),
            "keyUp" => key_fields(parts).map(|(keycode, chars)| Self::KeyUp { keycode, chars }),
            "quasimodeStart" => simple(Self::QuasimodeStart, parts),
            "quasimodeEnd" => simple(Self::QuasimodeEnd, parts),
            "quasimodeCancel" => simple(Self::QuasimodeCancel, parts),
            "someKey" => simple(Self::SomeKey, parts),
            "" => Err(PlatformError::Protocol("empty notification".into())),
            other => Err(PlatformError::Protocol(format!(
                "unknown notification {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyDown { keycode, chars } => write!(f, "keyDown {keycode} {chars}"),
            Self::KeyUp { keycode, chars } => write!(f, "keyUp {keycode} {chars}"),
            Self::QuasimodeStart => f.write_str("quasimodeStart"),
            Self::QuasimodeEnd => f.write_str("quasimodeEnd"),
            Self::QuasimodeCancel => f.write_str("quasimodeCancel"),
            Self::SomeKey => f.write_str("someKey"),
        }
    }
}

/// How often idle listener threads look at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Registered listener endpoint. Dropping it unregisters the name.
pub struct KeyListener {
    path: PathBuf,
    /// `(dev, ino)` of the socket file this listener bound.
    identity: Option<(u64, u64)>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyListener {
    /// Binds the socket at `path` and starts accepting helper connections.
    ///
    /// A stale socket file left by a previous run is replaced. A name some
    /// live process still accepts on is refused with `AddrInUse`.
    pub fn register(path: &Path, proxy: LoopProxy) -> Result<Self, PlatformError> {
        let registration_error = |source| PlatformError::Registration {
            path: path.to_path_buf(),
            source,
        };

        match UnixStream::connect(path) {
            Ok(_) => {
                return Err(registration_error(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    "another listener is registered under this name",
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::debug!("listener: {} is stale ({e})", path.display());
                match std::fs::remove_file(path) {
                    Ok(()) => log::debug!("listener: replaced stale socket {}", path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(registration_error(e)),
                }
            }
        }
        let listener = UnixListener::bind(path).map_err(registration_error)?;
        listener.set_nonblocking(true).map_err(registration_error)?;
        let identity = file_identity(path);
        log::info!("listener: registered at {}", path.display());

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("key-listener".into())
            .spawn(move || accept_loop(listener, proxy, accept_shutdown))
            .map_err(registration_error)?;

        Ok(Self {
            path: path.to_path_buf(),
            identity,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        // Leave the name alone if someone else has bound it since.
        if self.identity.is_some() && file_identity(&self.path) == self.identity {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::debug!("listener: could not remove {}: {e}", self.path.display());
            }
        }
        log::info!("listener: unregistered {}", self.path.display());
    }
}

fn file_identity(path: &Path) -> Option<(u64, u64)> {
    std::fs::symlink_metadata(path)
        .ok()
        .map(|meta| (meta.dev(), meta.ino()))
}

/// Accepts helper connections until shutdown, then waits for their readers.
fn accept_loop(listener: UnixListener, proxy: LoopProxy, shutdown: Arc<AtomicBool>) {
    let mut readers = Vec::new();
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                log::debug!("listener: helper connected");
                let proxy = proxy.clone();
                let reader_shutdown = shutdown.clone();
                let spawned = thread::Builder::new()
                    .name("key-listener-conn".into())
                    .spawn(move || read_notifications(stream, &proxy, &reader_shutdown));
                match spawned {
                    Ok(handle) => readers.push(handle),
                    Err(e) => log::warn!("listener: could not start connection reader: {e}"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("listener: accept failed: {e}");
                thread::sleep(POLL_INTERVAL);
            }
        }
        readers.retain(|r: &JoinHandle<()>| !r.is_finished());
    }
    for reader in readers {
        let _ = reader.join();
    }
}

/// Forwards every well-formed line to the loop until EOF, shutdown, or the
/// loop is gone.
fn read_notifications(stream: UnixStream, proxy: &LoopProxy, shutdown: &AtomicBool) {
    // Accepted sockets inherit non-blocking mode on some systems.
    let configured = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(POLL_INTERVAL)));
    if let Err(e) = configured {
        log::warn!("listener: could not configure connection: {e}");
        return;
    }

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        // Partial lines stay in `buf` across read timeouts.
        let at_eof = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => true,
            Ok(_) if buf.ends_with(b"\n") => false,
            Ok(_) => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                log::warn!("listener: read failed: {e}");
                return;
            }
        };
        if !buf.is_empty() && !forward_line(&buf, proxy, shutdown) {
            return;
        }
        buf.clear();
        if at_eof {
            break;
        }
    }
    log::debug!("listener: helper disconnected");
}

/// Returns `false` once nothing should be posted any more.
fn forward_line(bytes: &[u8], proxy: &LoopProxy, shutdown: &AtomicBool) -> bool {
    let line = match std::str::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => {
            log::warn!("listener: {e}");
            return true;
        }
    };
    match line.parse::<Notification>() {
        Ok(notification) => {
            log::trace!("listener: {notification}");
            !shutdown.load(Ordering::SeqCst) && proxy.notify(notification)
        }
        Err(e) => {
            log::warn!("listener: {e}");
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
