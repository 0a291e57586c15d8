//! Single-use local HTTP listener for the OAuth redirect.
//!
//! [`RedirectListener::start`] binds the socket, then serves the redirect route with
//! axum on a dedicated OS thread that owns its own current-thread tokio runtime, so
//! it never depends on the caller's event loop. Exactly one redirect is handled; the
//! listener then shuts down.
//!
//! Results are delivered twice: every lifecycle step is reported synchronously to
//! the registered [`ListenerCallback`] from the listener thread, and the final
//! outcome is pushed onto a oneshot channel that async callers await through
//! [`ListenerHandle::token`].

use std::{
    collections::HashMap,
    future::Future,
    io,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use axum::{Extension, Router, routing::get, serve::Listener};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Notify, oneshot},
};
use url::{Url, form_urlencoded};

use crate::{
    api,
    error::{ApiError, AuthError},
    spotify::{CodeExchanger, Credentials, SpotifyClient, SpotifyCodeExchange},
};

const MAX_ACCEPT_FAILURES: u32 = 16;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// The socket is bound and the user can be sent to the authorize URL.
    RequestingAuthorization,
    TokenReceived(String),
    /// The redirect carried no usable code.
    AuthorizationError(String),
    /// Spotify rejected the code exchange.
    SpotifyError(ApiError),
    SocketError(String),
}

pub type ListenerCallback = Arc<dyn Fn(ListenerEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    TokenReceived,
    AuthorizationError,
    SpotifyError,
    SocketError,
    Stopped,
}

/// Builder for a single redirect capture.
pub struct RedirectListener {
    port: u16,
    path: String,
    exchanger: Arc<dyn CodeExchanger>,
    callback: ListenerCallback,
    expected_state: Option<String>,
}

impl RedirectListener {
    /// Listener that exchanges the code against the real token endpoint.
    ///
    /// The route is taken from the path of `credentials.redirect_uri`.
    pub fn new(
        port: u16,
        credentials: Credentials,
        client: SpotifyClient,
        callback: ListenerCallback,
    ) -> Self {
        let path = redirect_path(&credentials.redirect_uri);
        let exchanger = Arc::new(SpotifyCodeExchange::new(client, credentials));
        Self::with_exchanger(port, exchanger, callback).with_path(path)
    }

    pub fn with_exchanger(
        port: u16,
        exchanger: Arc<dyn CodeExchanger>,
        callback: ListenerCallback,
    ) -> Self {
        Self {
            port,
            path: "/".to_string(),
            exchanger,
            callback,
            expected_state: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Rejects redirects whose `state` parameter differs from `state`.
    pub fn with_expected_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    /// Binds `127.0.0.1:<port>` and starts serving on a background thread.
    ///
    /// Does not block. Port `0` picks a free port, see [`ListenerHandle::local_addr`].
    ///
    /// # Errors
    ///
    /// A bind failure is fatal: it is reported as [`ListenerEvent::SocketError`] and
    /// returned as [`AuthError::Socket`].
    pub fn start(self) -> Result<ListenerHandle, AuthError> {
        let (std_listener, local_addr) = match bind(self.port) {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!(port = self.port, error = %e, "listener.bind_failed");
                (self.callback)(ListenerEvent::SocketError(e.to_string()));
                return Err(AuthError::Socket(e.to_string()));
            }
        };

        let (result_tx, result_rx) = oneshot::channel();
        let shared = Arc::new(ListenerShared {
            exchanger: self.exchanger,
            callback: self.callback,
            expected_state: self.expected_state,
            handled: AtomicBool::new(false),
            state: Mutex::new(ListenerState::Idle),
            shutdown: Notify::new(),
            result: Mutex::new(Some(result_tx)),
        });

        let thread = {
            let shared = shared.clone();
            let path = self.path;
            thread::Builder::new()
                .name("redirect-listener".to_string())
                .spawn(move || run_listener(shared, std_listener, path))
                .map_err(|e| AuthError::Socket(e.to_string()))?
        };

        tracing::info!(addr = %local_addr, "listener.started");
        Ok(ListenerHandle {
            shared,
            local_addr,
            thread: Some(thread),
            result: Some(result_rx),
        })
    }
}

/// Control handle of a started listener. Dropping it requests shutdown.
pub struct ListenerHandle {
    shared: Arc<ListenerShared>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
    result: Option<oneshot::Receiver<Result<String, AuthError>>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    /// Asks the listener to close its socket and exit.
    pub fn stop(&self) {
        self.shared.shutdown.notify_one();
    }

    /// Blocks until the listener thread has exited.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("listener.thread_panicked");
            }
        }
    }

    /// Waits for the outcome of the single redirect.
    ///
    /// Returns [`AuthError::Stopped`] if the listener ended without one, or when
    /// called a second time.
    pub async fn token(&mut self) -> Result<String, AuthError> {
        match self.result.take() {
            Some(rx) => rx.await.unwrap_or(Err(AuthError::Stopped)),
            None => Err(AuthError::Stopped),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State shared between the handle, the serving thread and the route handler.
pub(crate) struct ListenerShared {
    exchanger: Arc<dyn CodeExchanger>,
    callback: ListenerCallback,
    expected_state: Option<String>,
    handled: AtomicBool,
    state: Mutex<ListenerState>,
    shutdown: Notify,
    result: Mutex<Option<oneshot::Sender<Result<String, AuthError>>>>,
}

impl ListenerShared {
    fn emit(&self, event: ListenerEvent) {
        (self.callback)(event);
    }

    fn state(&self) -> ListenerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ListenerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn send_result(&self, outcome: Result<String, AuthError>) {
        let sender = self.result.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }

    /// Returns true for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        !self.handled.swap(true, Ordering::SeqCst)
    }

    /// Handles the redirect query, reports the outcome and triggers shutdown.
    pub(crate) async fn complete(&self, query: Option<&str>) -> Result<String, AuthError> {
        let outcome = self.authorize(query).await;

        match &outcome {
            Ok(token) => {
                tracing::info!("listener.token_received");
                self.set_state(ListenerState::TokenReceived);
                self.emit(ListenerEvent::TokenReceived(token.clone()));
            }
            Err(AuthError::Api(error)) => {
                tracing::warn!(error = %error, "listener.spotify_error");
                self.set_state(ListenerState::SpotifyError);
                self.emit(ListenerEvent::SpotifyError(error.clone()));
            }
            Err(error) => {
                tracing::warn!(error = %error, "listener.authorization_error");
                self.set_state(ListenerState::AuthorizationError);
                self.emit(ListenerEvent::AuthorizationError(error.to_string()));
            }
        }

        self.send_result(outcome.clone());
        self.shutdown.notify_one();
        outcome
    }

    /// Stops serving without an outcome; the handle then reports [`AuthError::Stopped`].
    pub(crate) fn abandon(&self) {
        self.shutdown.notify_one();
    }

    async fn authorize(&self, query: Option<&str>) -> Result<String, AuthError> {
        let params: HashMap<String, String> = query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        if let Some(error) = params.get("error") {
            return Err(AuthError::Denied(error.clone()));
        }

        if let Some(expected) = &self.expected_state {
            if params.get("state") != Some(expected) {
                return Err(AuthError::StateMismatch);
            }
        }

        let code = match params.get("code").filter(|c| !c.is_empty()) {
            Some(code) => code,
            None => {
                return Err(AuthError::MissingCode(
                    "the redirect query has no `code` parameter".to_string(),
                ));
            }
        };

        Ok(self.exchanger.exchange_code(code).await?)
    }

    fn fail_socket(&self, message: String) {
        tracing::error!(error = %message, "listener.socket_error");
        self.set_state(ListenerState::SocketError);
        self.emit(ListenerEvent::SocketError(message.clone()));
        self.send_result(Err(AuthError::Socket(message)));
    }

    fn finish(&self) {
        self.send_result(Err(AuthError::Stopped));
        self.set_state(ListenerState::Stopped);
        tracing::debug!("listener.stopped");
    }
}

fn bind(port: u16) -> io::Result<(StdTcpListener, SocketAddr)> {
    let listener = StdTcpListener::bind(("127.0.0.1", port))?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

fn redirect_path(redirect_uri: &str) -> String {
    Url::parse(redirect_uri)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

fn run_listener(shared: Arc<ListenerShared>, listener: StdTcpListener, path: String) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            shared.fail_socket(e.to_string());
            shared.finish();
            return;
        }
    };

    runtime.block_on(async {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                shared.fail_socket(e.to_string());
                return;
            }
        };

        shared.set_state(ListenerState::Listening);
        shared.emit(ListenerEvent::RequestingAuthorization);

        let app = Router::new()
            .route(&path, get(api::redirect))
            .layer(Extension(shared.clone()));

        let incoming = ReportingListener {
            inner: listener,
            shared: shared.clone(),
            failures: AcceptFailures::default(),
        };

        let signal = shared.clone();
        let served = axum::serve(incoming, app)
            .with_graceful_shutdown(async move { signal.shutdown.notified().await })
            .await;

        if let Err(e) = served {
            shared.fail_socket(e.to_string());
        }
    });

    shared.finish();
}

/// Consecutive accept failures, reset by every successful accept.
#[derive(Debug, Default)]
struct AcceptFailures(u32);

impl AcceptFailures {
    /// Counts a failure and returns true once the listener should give up.
    fn record(&mut self) -> bool {
        self.0 += 1;
        self.0 >= MAX_ACCEPT_FAILURES
    }

    fn reset(&mut self) {
        self.0 = 0;
    }

    fn count(&self) -> u32 {
        self.0
    }
}

/// Reports accept failures as events and gives up after too many in a row.
struct ReportingListener {
    inner: TcpListener,
    shared: Arc<ListenerShared>,
    failures: AcceptFailures,
}

impl Listener for ReportingListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = (Self::Io, Self::Addr)> + Send {
        async move {
            loop {
                match self.inner.accept().await {
                    Ok(conn) => {
                        self.failures.reset();
                        return conn;
                    }
                    Err(e) => {
                        if self.failures.record() {
                            self.shared.fail_socket(format!(
                                "giving up after {} accept failures: {e}",
                                self.failures.count()
                            ));
                            self.shared.shutdown.notify_one();
                            // Graceful shutdown drops this future.
                            std::future::pending::<()>().await;
                        }

                        tracing::warn!(error = %e, failures = self.failures.count(), "listener.accept_failed");
                        self.shared.emit(ListenerEvent::SocketError(e.to_string()));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_max_consecutive_accept_failures() {
        let mut failures = AcceptFailures::default();
        for _ in 1..MAX_ACCEPT_FAILURES {
            assert!(!failures.record());
        }
        assert!(failures.record());
        assert_eq!(failures.count(), MAX_ACCEPT_FAILURES);
    }

    #[test]
    fn successful_accept_resets_failures() {
        let mut failures = AcceptFailures::default();
        for _ in 1..MAX_ACCEPT_FAILURES {
            failures.record();
        }
        failures.reset();

        assert_eq!(failures.count(), 0);
        assert!(!failures.record());
    }

    #[test]
    fn redirect_path_defaults_to_root() {
        assert_eq!(redirect_path("http://localhost:3000"), "/");
        assert_eq!(redirect_path("http://localhost:3000/callback"), "/callback");
        assert_eq!(redirect_path("not a url"), "/");
    }
}
