// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Provisioning portal
//!
//! A tiny HTTP server on the setup access point, plus the DHCP server and
//! captive DNS responder that make the portal reachable.  All three run as
//! permanently spawned tasks gated on a watch, because embassy tasks
//! cannot be torn down: "stopping" the portal parks the tasks until the
//! next `start_portal()`.
//!
//! Two routes:
//! - `GET /` renders the credential form and mints a fresh CSRF token
//!   (invalidating the previous one).
//! - `POST /save` runs the submission pipeline in strict order: rate
//!   limit, body parse, setup-password check, CSRF check, field
//!   validation, persist, respond.  The success page is flushed to the
//!   client before the connect hand-off is signalled, so the operator
//!   always sees the result before the access point disappears.

use core::cell::RefCell;
use core::net::{Ipv4Addr, SocketAddr};
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_sync::watch::{Receiver, Watch};
use embassy_time::{Duration, Instant, Timer};
use esp_hal::rng::Rng;
use leasehund::DhcpServer;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use gatepost_core::creds::{Credentials, PASSWORD_MAX_LEN, SSID_MAX_LEN};
use gatepost_core::form::FormBody;
use gatepost_core::ratelimit::RateLimiter;
use gatepost_core::token::CsrfToken;
use gatepost_util::net::Wifi;

use crate::{SecurityReason, SetupError};
use crate::setup::html;
use crate::setup::http::{
    HTTPD_BODY_BUF_SIZE, HTTPD_HEADER_BUF_SIZE, HTTPD_MAX_HEADERS, HTTPD_TASK_TCP_RX_BUF_SIZE,
    HTTPD_TASK_TCP_TX_BUF_SIZE, Method, PORTAL_PORT, Response, StatusCode,
};
use crate::store::CredentialStore;

/// The setup access point's address and DHCP pool.
pub(crate) const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
pub(crate) const AP_PREFIX_LEN: u8 = 24;
const DHCP_POOL_START: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 100);
const DHCP_POOL_END: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 200);
const AP_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

// Raw cap for the setup-password and csrf fields, before decoding.
const SETUP_FIELD_MAX: usize = 15;

// How long to let the success page drain to the client before the access
// point is torn down.
const HANDOFF_DRAIN: Duration = Duration::from_millis(1_000);

// Gate for the portal tasks.  Three receivers: HTTP, DHCP, DNS.
static PORTAL_RUN: Watch<CriticalSectionRawMutex, bool, 3> = Watch::new();

// Signalled by the save handler after the success page has been flushed.
static HANDOFF: Signal<CriticalSectionRawMutex, ()> = Signal::new();

// Per-portal security state: the outstanding CSRF token and the
// submission rate limiter.
struct PortalState {
    csrf: Option<CsrfToken>,
    limiter: RateLimiter,
}

static PORTAL_STATE: BlockingMutex<CriticalSectionRawMutex, RefCell<PortalState>> =
    BlockingMutex::new(RefCell::new(PortalState {
        csrf: None,
        limiter: RateLimiter::new(),
    }));

/// Releases or parks the portal tasks.
pub(crate) fn set_running(run: bool) {
    if !run {
        // The next portal session starts without a usable token.
        PORTAL_STATE.lock(|state| state.borrow_mut().csrf = None);
    }
    PORTAL_RUN.sender().send(run);
}

async fn wait_for(run_rx: &mut Receiver<'static, CriticalSectionRawMutex, bool, 3>, want: bool) {
    loop {
        if run_rx.changed().await == want {
            return;
        }
    }
}

/// What the serve loop should do after writing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostAction {
    /// Credentials stored: trigger the connect hand-off.
    Provisioned,
}

#[embassy_executor::task]
pub(crate) async fn http_task(stack: Stack<'static>, secret: &'static str, mut rng: Rng) {
    let mut rx_buffer = [0; HTTPD_TASK_TCP_RX_BUF_SIZE];
    let mut tx_buffer = [0; HTTPD_TASK_TCP_TX_BUF_SIZE];
    let mut run_rx = PORTAL_RUN.receiver().expect("portal watch exhausted");

    loop {
        wait_for(&mut run_rx, true).await;
        info!("portal: http server listening on {AP_IP}:{PORTAL_PORT}");

        match select(
            serve(stack, &mut rx_buffer, &mut tx_buffer, secret, &mut rng),
            wait_for(&mut run_rx, false),
        )
        .await
        {
            // The serve loop never completes on its own.
            Either::First(_) => {}
            Either::Second(()) => info!("portal: http server stopped"),
        }
    }
}

// Accept loop.  One client at a time, matching the AP's single-client
// limit.
async fn serve(
    stack: Stack<'static>,
    rx_buffer: &mut [u8],
    tx_buffer: &mut [u8],
    secret: &str,
    rng: &mut Rng,
) {
    loop {
        let mut socket = TcpSocket::new(stack, &mut *rx_buffer, &mut *tx_buffer);

        if let Err(e) = socket.accept(PORTAL_PORT).await {
            warn!("portal: accept error: {e:?}");
            continue;
        }

        if let Some(endpoint) = socket.remote_endpoint().as_ref() {
            info!("portal: connection from {}", endpoint.addr);
        }

        // Handle requests on this connection until it errors or closes
        loop {
            match handle_request(&mut socket, secret, rng).await {
                Ok((response, action)) => {
                    trace!("portal: response {response}");
                    if response.write_to(&mut socket).await.is_err() {
                        break;
                    }
                    // The ordering guarantee: the client holds the page
                    // before any teardown can begin.
                    let _ = socket.flush().await;
                    if action == Some(PostAction::Provisioned) {
                        HANDOFF.signal(());
                    }
                }
                Err(_) => break,
            }
        }
        info!("portal: connection closed");
        socket.close();
    }
}

// Reads and parses one request, routes it, and returns the response plus
// any follow-up action.  Errors mean the connection is done.
async fn handle_request(
    socket: &mut TcpSocket<'_>,
    secret: &str,
    rng: &mut Rng,
) -> Result<(Response, Option<PostAction>), SetupError> {
    let mut header_buf = [0u8; HTTPD_HEADER_BUF_SIZE];
    let mut body_buf = [0u8; HTTPD_BODY_BUF_SIZE];

    // Read headers until we find \r\n\r\n
    let header_end;
    let mut total_read = 0;
    loop {
        if total_read >= HTTPD_HEADER_BUF_SIZE {
            info!("portal: header buffer overflow, request too large");
            return Ok((
                Response::error_page(StatusCode::TooLarge, "Request too large"),
                None,
            ));
        }

        let n = socket.read(&mut header_buf[total_read..]).await?;
        if n == 0 {
            if total_read == 0 {
                debug!("portal: client dropped connection");
            } else {
                info!("portal: connection closed while reading headers");
            }
            return Err(SetupError::Network);
        }
        total_read += n;

        if let Some(pos) = header_buf[..total_read]
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
        {
            header_end = pos + 4;
            break;
        }
    }

    // Parse headers
    let mut headers = [httparse::EMPTY_HEADER; HTTPD_MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    if let Err(e) = req.parse(&header_buf[..header_end]) {
        info!("portal: failed to parse request: {e}");
        return Ok((
            Response::error_page(StatusCode::BadRequest, "Invalid request"),
            None,
        ));
    }

    let (method, path) = match (req.method, req.path) {
        (Some(method_str), Some(path)) => match Method::from_str(method_str) {
            Some(method) => (method, path),
            None => {
                info!("portal: unsupported method {method_str}");
                return Ok((
                    Response::error_page(StatusCode::BadRequest, "Invalid request"),
                    None,
                ));
            }
        },
        _ => {
            info!("portal: malformed request line");
            return Ok((
                Response::error_page(StatusCode::BadRequest, "Invalid request"),
                None,
            ));
        }
    };

    // Find Content-Length if present
    let content_length = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| core::str::from_utf8(h.value).ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > HTTPD_BODY_BUF_SIZE {
        info!("portal: body too large");
        return Ok((
            Response::error_page(StatusCode::TooLarge, "Request too large"),
            None,
        ));
    }

    // Read body if present
    let body = if content_length > 0 {
        // May already have some body bytes after the headers
        let already_read = total_read - header_end;
        let mut body_read = already_read.min(content_length);
        body_buf[..body_read].copy_from_slice(&header_buf[header_end..header_end + body_read]);

        while body_read < content_length {
            let n = socket.read(&mut body_buf[body_read..content_length]).await?;
            if n == 0 {
                info!("portal: connection closed before body was fully read");
                return Err(SetupError::Network);
            }
            body_read += n;
        }

        match core::str::from_utf8(&body_buf[..content_length]) {
            Ok(body) => Some(body),
            Err(e) => {
                info!("portal: request body is not valid UTF-8: {e}");
                return Ok((
                    Response::error_page(StatusCode::BadRequest, "Invalid data"),
                    None,
                ));
            }
        }
    } else {
        None
    };

    trace!("portal: handle {method} {path}");
    let (response, action) = match (method, path) {
        (Method::Get, "/") => (render_form(secret, rng), None),
        (Method::Post, "/save") => handle_save(body, secret),
        _ => {
            info!("portal: no route for {method} {path}");
            (Response::error_page(StatusCode::NotFound, "Not found"), None)
        }
    };
    Ok((response, action))
}

// GET /: mint a fresh CSRF token (replacing any previous one) and render
// the form.
fn render_form(secret: &str, rng: &mut Rng) -> Response {
    let token = CsrfToken::new(rng.random());
    PORTAL_STATE.lock(|state| state.borrow_mut().csrf = Some(token));

    let page = html::page_setup_form(secret, token.render().as_str());
    Response::html(page, StatusCode::Ok)
}

// POST /save: the ordered submission pipeline.  Every rejection leaves
// the session state, the stored credentials and the CSRF token untouched.
fn handle_save(body: Option<&str>, secret: &str) -> (Response, Option<PostAction>) {
    // 1. Rate limit, before anything else is evaluated.
    let now_ms = Instant::now().as_millis();
    let allowed = PORTAL_STATE.lock(|state| state.borrow_mut().limiter.register_attempt(now_ms));
    if allowed.is_err() {
        warn!("portal: rate limit exceeded");
        return (
            Response::error(
                SetupError::Security(SecurityReason::RateLimited),
                "Too many attempts",
            ),
            None,
        );
    }

    // 2. Body parse.
    let Some(body) = body else {
        return (
            Response::error(SetupError::InvalidArgument, "Invalid data"),
            None,
        );
    };
    let form = FormBody::new(body);

    // 3. Setup password.
    let setup_pwd = form
        .field::<SETUP_FIELD_MAX>("setup_pwd")
        .unwrap_or_default();
    if setup_pwd.as_str() != secret {
        warn!("portal: invalid setup password");
        return (
            Response::error(
                SetupError::Security(SecurityReason::SetupSecret),
                "Invalid password",
            ),
            None,
        );
    }

    // 4. CSRF token.  Checking does not consume it; only a new page
    // render replaces it.
    let token_ok = PORTAL_STATE.lock(|state| {
        let state = state.borrow();
        match (state.csrf, form.raw("csrf")) {
            (Some(token), Some(submitted)) => token.matches(submitted),
            _ => false,
        }
    });
    if !token_ok {
        warn!("portal: csrf token mismatch");
        return (
            Response::error(SetupError::Security(SecurityReason::Csrf), "Invalid request"),
            None,
        );
    }

    // 5. Field presence and validity.
    if form.raw("ssid").is_none() || form.raw("password").is_none() {
        return (
            Response::error(SetupError::InvalidArgument, "Missing data"),
            None,
        );
    }
    let ssid = form.field::<SSID_MAX_LEN>("ssid").unwrap_or_default();
    let password = form.field::<PASSWORD_MAX_LEN>("password").unwrap_or_default();
    let creds = match Credentials::new(ssid.as_str(), password.as_str()) {
        Ok(creds) => creds,
        Err(_) => {
            return (
                Response::error(SetupError::InvalidArgument, "Network name required"),
                None,
            );
        }
    };

    // 6. Persist.
    if CredentialStore::new().set_credentials(&creds).is_err() {
        return (Response::error(SetupError::Storage, "Save failed"), None);
    }
    info!("portal: credentials accepted for '{}'", creds.ssid);

    // 7./8. Respond; the serve loop signals the hand-off after the flush.
    (
        Response::html(html::page_success(), StatusCode::Ok),
        Some(PostAction::Provisioned),
    )
}

/// Runs the portal-to-connect hand-off on its own task, so the HTTP
/// response is long gone before the access point drops.
#[embassy_executor::task]
pub(crate) async fn handoff_task(wifi: &'static Wifi) {
    loop {
        HANDOFF.wait().await;
        Timer::after(HANDOFF_DRAIN).await;

        info!("portal: hand-off, stopping portal and connecting");
        crate::setup::stop_portal(wifi).await;
        if let Err(e) = crate::setup::connect(false) {
            warn!("portal: hand-off connect failed: {e}");
            crate::setup::notify(false, None);
        }
    }
}

#[embassy_executor::task]
pub(crate) async fn dhcp_task(stack: Stack<'static>) {
    let mut run_rx = PORTAL_RUN.receiver().expect("portal watch exhausted");
    loop {
        wait_for(&mut run_rx, true).await;
        info!("portal: dhcp server started");

        let mut dhcp_server: DhcpServer<32, 4> =
            DhcpServer::new_with_dns(AP_IP, AP_NETMASK, AP_IP, AP_IP, DHCP_POOL_START, DHCP_POOL_END);
        match select(dhcp_server.run(stack), wait_for(&mut run_rx, false)).await {
            Either::First(_) => {}
            Either::Second(()) => info!("portal: dhcp server stopped"),
        }
    }
}

#[embassy_executor::task]
pub(crate) async fn captive_dns_task(stack: Stack<'static>) {
    let mut run_rx = PORTAL_RUN.receiver().expect("portal watch exhausted");
    let mut tx_buf = [0u8; 256];
    let mut rx_buf = [0u8; 256];

    // Bind to all interfaces
    let local_addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 53);
    let ttl = Duration::from_secs(300);

    loop {
        wait_for(&mut run_rx, true).await;
        debug!("portal: captive dns answering with {AP_IP}");

        let udp_buffers = edge_nal_embassy::UdpBuffers::<1, 256, 256, 1>::new();
        let udp = edge_nal_embassy::Udp::new(stack, &udp_buffers);

        let dns = async {
            loop {
                if let Err(e) = edge_captive::io::run(
                    &udp,
                    local_addr,
                    &mut tx_buf,
                    &mut rx_buf,
                    AP_IP,
                    ttl.into(),
                )
                .await
                {
                    warn!("portal: captive dns error: {e:?}");
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        };
        match select(dns, wait_for(&mut run_rx, false)).await {
            Either::First(_) => {}
            Either::Second(()) => info!("portal: captive dns stopped"),
        }
    }
}
