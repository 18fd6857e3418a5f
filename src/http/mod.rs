use std::{
    convert::Infallible, error::Error, net::SocketAddr, panic::AssertUnwindSafe, sync::Arc,
};

use futures::FutureExt as _;
use http_body_util::{BodyExt as _, Full};
use hyper::{
    Method, Request, StatusCode,
    body::{Bytes, Incoming},
    header,
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::{
    auth::{self, AuthConfig, Principal, SessionKey},
    config::Config,
    engine::{Controller, EngineConfig},
    prelude::*,
};

mod config;
mod pages;

pub use self::config::HttpConfig;


/// Main entry point for a single incoming request
async fn handle(req: Request<Incoming>, ctx: Arc<Context>) -> Response {
    trace!("incoming req: {} {}", req.method(), req.uri().path());

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => panel_page(&req, &ctx).await,
        (&Method::GET, "/login") => login_page(&req, &ctx),
        (&Method::GET, "/login_submit") => login_submit(&req, &ctx),
        (&Method::GET, "/logout") => logout(&ctx),
        (&Method::POST, "/start") => start_test(req, &ctx).await,
        (&Method::POST, "/stop") => stop_test(&req, &ctx).await,
        (_, "/" | "/login" | "/login_submit" | "/logout") => method_not_allowed("GET"),
        (_, "/start" | "/stop") => method_not_allowed("POST"),
        _ => {
            trace!(path = req.uri().path(), "response: 404 Not Found");
            error_response(StatusCode::NOT_FOUND)
        }
    }
}

/// The control panel: engine status plus the start/stop forms.
async fn panel_page(req: &Request<Incoming>, ctx: &Context) -> Response {
    let user = match authorize(req, ctx) {
        Ok(user) => user,
        Err(response) => return response,
    };

    // An unreachable engine is shown in the panel, not treated as an error:
    // the console must stay usable while the engine is down or restarting.
    let engine = match engine_metrics(&ctx.config.engine).await {
        Ok(metrics) => pages::EngineStatus::Reachable { metrics },
        Err(e) => {
            debug!("load-test engine unreachable: {e:#}");
            pages::EngineStatus::Unreachable { error: format!("{e:#}") }
        }
    };

    let msg = first_query_param(req, "msg");
    html_response(pages::panel(user.as_ref(), &engine, msg.as_deref()))
}

fn login_page(req: &Request<Incoming>, ctx: &Context) -> Response {
    if !ctx.config.auth.enabled() || auth::authenticate(req, &ctx.session_key).is_some() {
        return redirect("/");
    }

    let error = first_query_param(req, "error");
    html_response(pages::login(error.as_deref()))
}

/// The credential callback the login form submits to. Always answers with a
/// redirect: to the panel (with a fresh session cookie) on success, back to
/// the login page with an error message otherwise.
fn login_submit(req: &Request<Incoming>, ctx: &Context) -> Response {
    if !ctx.config.auth.enabled() {
        return redirect("/");
    }

    let username = first_query_param(req, "username").unwrap_or_default();
    let password = first_query_param(req, "password").unwrap_or_default();

    if !ctx.config.auth.check_credentials(&username, &password) {
        debug!(user = username.as_str(), "failed login attempt");
        return redirect("/login?error=Invalid+username+or+password");
    }

    info!(user = username.as_str(), "successful login");
    let token = ctx.session_key.issue(&username, ctx.config.auth.session_lifetime);
    let cookie = cookie_header(&token, ctx.config.auth.session_lifetime.as_secs(), &ctx.config.auth);
    redirect_with_cookie("/", &cookie)
}

fn logout(ctx: &Context) -> Response {
    let cookie = cookie_header("", 0, &ctx.config.auth);
    redirect_with_cookie("/login", &cookie)
}

async fn start_test(req: Request<Incoming>, ctx: &Context) -> Response {
    if let Err(response) = authorize(&req, ctx) {
        return response;
    }

    let form = match read_form(req).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    // Both fields are optional: the engine keeps its current setting for
    // anything not sent.
    let users = match form_value(&form, "users") {
        None | Some("") => None,
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) if n > 0 => Some(n),
            _ => return redirect_with_msg("Number of users must be a positive integer"),
        },
    };
    let hatch_rate = match form_value(&form, "hatch_rate") {
        None | Some("") => None,
        Some(raw) => match raw.parse::<f64>() {
            Ok(r) if r.is_finite() && r > 0.0 => Some(r),
            _ => return redirect_with_msg("Hatch rate must be a positive number"),
        },
    };

    match send_start(&ctx.config.engine, users, hatch_rate).await {
        Ok(replies) => redirect_with_msg(&replies),
        Err(e) => {
            warn!("failed to start load test: {e:#}");
            redirect_with_msg(&format!("Failed to start load test: {e:#}"))
        }
    }
}

async fn stop_test(req: &Request<Incoming>, ctx: &Context) -> Response {
    if let Err(response) = authorize(req, ctx) {
        return response;
    }

    match send_stop(&ctx.config.engine).await {
        Ok(reply) => redirect_with_msg(&reply),
        Err(e) => {
            warn!("failed to stop load test: {e:#}");
            redirect_with_msg(&format!("Failed to stop load test: {e:#}"))
        }
    }
}

/// Access check for gated routes. `Ok` carries the authenticated user
/// (`None` with auth disabled), `Err` the redirect to the login page.
fn authorize<B>(req: &Request<B>, ctx: &Context) -> Result<Option<Principal>, Response> {
    if !ctx.config.auth.enabled() {
        return Ok(None);
    }

    match auth::authenticate(req, &ctx.session_key) {
        Some(principal) => Ok(Some(principal)),
        None => {
            trace!(path = req.uri().path(), "gated route without valid session -> login redirect");
            Err(redirect("/login"))
        }
    }
}

async fn engine_metrics(config: &EngineConfig) -> Result<String> {
    Controller::connect(config).await?.metrics().await
}

/// Sends the start sequence over a single controller connection: sizing
/// commands first, then `start`. Replies are joined for display.
async fn send_start(
    config: &EngineConfig,
    users: Option<u64>,
    hatch_rate: Option<f64>,
) -> Result<String> {
    let mut controller = Controller::connect(config).await?;
    let mut replies = Vec::new();
    if let Some(users) = users {
        replies.push(controller.set_users(users).await?);
    }
    if let Some(rate) = hatch_rate {
        replies.push(controller.set_hatch_rate(rate).await?);
    }
    replies.push(controller.start().await?);
    Ok(replies.join(" / "))
}

async fn send_stop(config: &EngineConfig) -> Result<String> {
    Controller::connect(config).await?.stop().await
}

/// Reads and parses an `application/x-www-form-urlencoded` request body.
async fn read_form(req: Request<Incoming>) -> Result<Vec<(String, String)>, Response> {
    match req.into_body().collect().await {
        Ok(body) => {
            let body = body.to_bytes();
            Ok(form_urlencoded::parse(&body).into_owned().collect())
        }
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(error_response(StatusCode::BAD_REQUEST))
        }
    }
}

fn form_value<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
}

/// Returns the first query parameter with the given name, percent-decoded.
fn first_query_param<B>(req: &Request<B>, name: &str) -> Option<String> {
    let raw_query = req.uri().query().unwrap_or("");
    form_urlencoded::parse(raw_query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// `Set-Cookie` value for the session cookie. Clearing is setting an empty
/// token with `max_age` 0.
fn cookie_header(token: &str, max_age: u64, config: &AuthConfig) -> String {
    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}",
        auth::SESSION_COOKIE,
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

fn html_response(html: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .unwrap()
}

fn redirect(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn redirect_with_cookie(location: &str, cookie: &str) -> Response {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .header(header::SET_COOKIE, cookie)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Redirects to the panel with a message to display there.
fn redirect_with_msg(msg: &str) -> Response {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("msg", msg)
        .finish();
    redirect(&format!("/?{query}"))
}

fn method_not_allowed(allowed: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(header::ALLOW, allowed)
        .body(Full::new(Bytes::from("405 Method Not Allowed")))
        .unwrap()
}

fn error_response(status: StatusCode) -> Response {
    let body = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or_default());
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Data available to each request handler via reference.
pub struct Context {
    pub config: Config,
    pub session_key: SessionKey,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let session_key = match &config.auth.secret {
            Some(secret) => SessionKey::from_secret(secret),
            None => {
                if config.auth.enabled() {
                    warn!("no 'auth.secret' configured -> sessions will not survive a restart");
                }
                SessionKey::ephemeral()?
            }
        };

        Ok(Self { config, session_key })
    }
}

/// Main entry point: starting the HTTP server.
pub async fn serve(ctx: Context) -> Result<()> {
    let addr = SocketAddr::from((ctx.config.http.address, ctx.config.http.port));
    let listener = TcpListener::bind(addr).await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);
    serve_on(listener, ctx).await
}

/// Runs the server on an already bound listener until a shutdown signal
/// arrives. This is mainly plumbing code and does not contain much
/// interesting logic.
pub async fn serve_on(listener: TcpListener, ctx: Context) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let mut signal = std::pin::pin!(shutdown_signal());

    let http = http1::Builder::new();

    let shutdown_timeout = ctx.config.http.shutdown_timeout;
    let ctx = Arc::new(ctx);

    loop {
        tokio::select! {
            Ok((stream, _addr)) = listener.accept() => {
                let io = TokioIo::new(stream);
                let ctx = Arc::clone(&ctx);
                let conn = http.serve_connection(io, service_fn(move |req| {
                    handle_internal_errors(handle(req, Arc::clone(&ctx)))
                }));
                let fut = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        log_hyper_error(e);
                    }
                });
            },

            _ = &mut signal => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    tokio::select! {
        _ = graceful.shutdown() => {
            info!("All HTTP connections gracefully closed");
        },
        _ = tokio::time::sleep(shutdown_timeout) => {
            eprintln!("Timed out waiting for all HTTP connections to close");
        }
    }

    Ok(())
}

/// Future that resolves when a shutdown signal is received by our app.
async fn shutdown_signal() {
    // Wait for the CTRL+C signal
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}

/// Wraps another future and catches all panics that occur while polling it,
/// turning them into 500 responses. Hyper would catch the panic anyway, but
/// would just kill the connection; this way the client gets an answer.
async fn handle_internal_errors(
    future: impl Future<Output = Response>,
) -> Result<Response, Infallible> {
    // `AssertUnwindSafe` is fine here: handlers only share the immutable
    // `Context`, so a panicking handler cannot leave broken state behind.
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(response) => Ok(response),
        Err(panic) => {
            // For `panic!`-style panics the payload is a `String` or `&str`.
            let msg = panic.downcast_ref::<String>()
                .map(|s| s.as_str())
                .or(panic.downcast_ref::<&str>().copied());

            match msg {
                Some(msg) => error!("INTERNAL SERVER ERROR: HTTP handler panicked: '{msg}'"),
                None => error!("INTERNAL SERVER ERROR: HTTP handler panicked"),
            }

            let response = Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("Internal server error: panic")))
                .unwrap();
            Ok(response)
        }
    }
}

fn log_hyper_error(err: hyper::Error) {
    // Browsers regularly close connections prematurely, so some of these
    // errors are expected during normal operation and only logged at debug
    // level.
    let warn = if let Some(io) = err.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
        !matches!(
            io.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::NotConnected,
        )
    } else {
        err.is_timeout() || err.is_user() || err.is_closed() || err.is_canceled()
    };

    let full_chain = anyhow::Chain::new(&err)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", caused by ");

    if warn {
        warn!("HTTP error: {full_chain} ({err:?})");
    } else {
        debug!("HTTP error: {full_chain} ({err:?})");
    }
}

type Response<B = Full<Bytes>> = hyper::Response<B>;


#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;

    fn auth_config(secure_cookie: bool) -> AuthConfig {
        AuthConfig {
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            secret: None,
            session_lifetime: Duration::from_secs(600),
            secure_cookie,
        }
    }

    #[test]
    fn cookie_headers() {
        assert_eq!(
            cookie_header("abc", 600, &auth_config(false)),
            "gander_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=600",
        );
        assert_eq!(
            cookie_header("", 0, &auth_config(false)),
            "gander_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        );
        assert!(cookie_header("abc", 600, &auth_config(true)).ends_with("; Secure"));
    }

    #[test]
    fn msg_redirect_encodes() {
        let response = redirect_with_msg("5 users & 2s <ok>");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(location, "/?msg=5+users+%26+2s+%3Cok%3E");
    }

    #[test]
    fn query_param_extraction() {
        let req = Request::builder()
            .uri("/login_submit?username=admin&password=a%26b&username=other")
            .body(())
            .unwrap();
        assert_eq!(first_query_param(&req, "username").as_deref(), Some("admin"));
        assert_eq!(first_query_param(&req, "password").as_deref(), Some("a&b"));
        assert_eq!(first_query_param(&req, "missing"), None);
    }

    #[test]
    fn form_value_first_occurrence() {
        let form: Vec<(String, String)> = form_urlencoded::parse(b"users=2&users=9&hatch_rate=1")
            .into_owned()
            .collect();
        assert_eq!(form_value(&form, "users"), Some("2"));
        assert_eq!(form_value(&form, "hatch_rate"), Some("1"));
        assert_eq!(form_value(&form, "missing"), None);
    }

    #[test]
    fn context_key_without_secret() {
        let config = Config {
            auth: auth_config(false),
            engine: EngineConfig {
                controller_host: "127.0.0.1".into(),
                controller_port: 5116,
                connect_timeout: Duration::from_secs(1),
                command_timeout: Duration::from_secs(1),
            },
            http: HttpConfig {
                port: 0,
                address: [127, 0, 0, 1].into(),
                shutdown_timeout: Duration::from_secs(1),
            },
            log: crate::log::LogConfig {
                filters: Default::default(),
                file: None,
                stdout: false,
            },
        };

        // Auth enabled but no secret: an ephemeral key is generated and
        // sessions still round-trip within this process.
        let ctx = Context::new(config).unwrap();
        assert!(ctx.config.auth.enabled());
        let token = ctx.session_key.issue("admin", Duration::from_secs(60));
        assert_eq!(ctx.session_key.verify(&token).unwrap().username(), "admin");
    }
}
