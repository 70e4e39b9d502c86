use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use rand::{distr::Alphanumeric, Rng};
use reqwest::Url;
use rouille::{Request, Response};
use std::net::SocketAddr;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

use crate::models::AccessToken;

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.spotify.com/authorize";
// Not used by the implicit grant.
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(180);

const STATE_LEN: usize = 16;
const TOKEN_PATH: &str = "/token";

// The token arrives in the URL fragment, which browsers never send to the
// server. This page bounces it back as a query string.
const FORWARD_PAGE: &str = r#"<!doctype html>
<html><head><title>tracklist</title></head>
<body>
<p>Finishing sign-in&hellip;</p>
<script>
  var params = window.location.hash.substring(1) || window.location.search.substring(1);
  window.location.replace("/token?" + params);
</script>
</body></html>"#;

const DONE_PAGE: &str = r#"<!doctype html>
<html><head><title>tracklist</title></head>
<body><p>Connected. You can close this window and return to the terminal.</p></body></html>"#;

/// Parsed result of the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    Success {
        access_token: String,
        token_type: String,
        expires_in: Option<u64>,
        state: Option<String>,
    },
    Denied {
        error: String,
        state: Option<String>,
    },
}

impl AuthResponse {
    /// Accept the response if it succeeded and echoes the state we sent.
    pub fn into_token(self, expected_state: Option<&str>) -> Result<AccessToken> {
        match self {
            AuthResponse::Denied { error, .. } => Err(anyhow!("Authorization denied: {error}")),
            AuthResponse::Success {
                access_token,
                token_type,
                expires_in,
                state,
            } => {
                if let Some(expected) = expected_state {
                    if state.as_deref() != Some(expected) {
                        bail!("Authorization state mismatch");
                    }
                }
                Ok(AccessToken {
                    access_token,
                    token_type,
                    expires_in,
                })
            }
        }
    }
}

pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

pub fn authorize_url(client_id: &str, redirect_uri: &str, scopes: &[String], state: &str) -> String {
    let scope = scopes.join(" ");
    format!(
        "{AUTHORIZATION_ENDPOINT}?response_type=token&client_id={}&scope={}&redirect_uri={}&state={}&show_dialog=false",
        urlencoding::encode(client_id),
        urlencoding::encode(&scope),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
    )
}

/// Parse a redirect URL, its fragment or a bare `key=value&...` string.
pub fn parse_redirect(input: &str) -> Result<AuthResponse> {
    let input = input.trim();
    let params = match (input.split_once('#'), input.split_once('?')) {
        (Some((_, fragment)), _) => fragment,
        (None, Some((_, query))) => query,
        (None, None) => input,
    };

    let mut access_token = None;
    let mut token_type = None;
    let mut expires_in = None;
    let mut state = None;
    let mut error = None;

    for pair in params.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(&value.replace('+', " "))
            .with_context(|| format!("Invalid encoding for {key}"))?
            .into_owned();

        match key {
            "access_token" => access_token = Some(value),
            "token_type" => token_type = Some(value),
            "expires_in" => expires_in = value.parse().ok(),
            "state" => state = Some(value),
            "error" => error = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Ok(AuthResponse::Denied { error, state });
    }

    match access_token {
        Some(access_token) if !access_token.is_empty() => Ok(AuthResponse::Success {
            access_token,
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in,
            state,
        }),
        _ => Err(anyhow!("Redirect carried neither access_token nor error")),
    }
}

type Handler = Box<dyn Fn(&Request) -> Response + Send + Sync + 'static>;

/// One-shot HTTP listener bound to the redirect URI.
pub struct CallbackListener {
    server: rouille::Server<Handler>,
    responses: mpsc::Receiver<AuthResponse>,
}

impl CallbackListener {
    pub fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri).with_context(|| format!("Invalid redirect URI {redirect_uri}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Redirect URI has no host: {redirect_uri}"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Redirect URI has no port: {redirect_uri}"))?;
        let callback_path = url.path().to_string();

        let (sender, responses) = mpsc::channel();
        let sender = Mutex::new(sender);

        let handler: Handler = Box::new(move |request: &Request| -> Response {
            debug!("Callback request: {} {}", request.method(), request.url());

            if request.url() == callback_path {
                return Response::html(FORWARD_PAGE);
            }
            if request.url() != TOKEN_PATH {
                return Response::empty_404();
            }

            match parse_redirect(request.raw_query_string()) {
                Ok(response) => {
                    if let Ok(sender) = sender.lock() {
                        let _ = sender.send(response);
                    }
                    Response::html(DONE_PAGE)
                }
                Err(e) => {
                    warn!("Unusable authorization redirect: {e}");
                    Response::text(format!("Authorization failed: {e}")).with_status_code(400)
                }
            }
        });

        let server = rouille::Server::new(format!("{host}:{port}"), handler)
            .map_err(|e| anyhow!("Failed to listen on {host}:{port}: {e}"))?;
        info!("Waiting for authorization redirect on {}", server.server_addr());

        Ok(Self { server, responses })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.server_addr()
    }

    pub fn wait(&self, timeout: Duration) -> Result<AuthResponse> {
        let started = Instant::now();
        loop {
            self.server.poll_timeout(Duration::from_millis(100));

            match self.responses.try_recv() {
                Ok(response) => return Ok(response),
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => bail!("Callback listener stopped"),
            }

            if started.elapsed() >= timeout {
                bail!("Timed out waiting for authorization");
            }
        }
    }
}

/// Client-side OAuth implicit grant against the Spotify accounts service.
#[derive(Debug, Clone)]
pub struct ImplicitGrant {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl ImplicitGrant {
    pub fn new(client_id: String, redirect_uri: String, scopes: Vec<String>) -> Self {
        Self {
            client_id,
            redirect_uri,
            scopes,
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        authorize_url(&self.client_id, &self.redirect_uri, &self.scopes, state)
    }

    /// Run the redirect flow. `prompt` receives the authorize URL and is
    /// expected to send the user there.
    pub fn authorize<F>(&self, prompt: F, timeout: Duration) -> Result<AccessToken>
    where
        F: FnOnce(&str),
    {
        let state = generate_state();
        let listener = CallbackListener::bind(&self.redirect_uri)?;

        prompt(&self.authorize_url(&state));

        let token = listener.wait(timeout)?.into_token(Some(&state))?;
        info!("Authorization succeeded ({})", token.token_type);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_encoding() {
        let scopes = vec!["user-top-read".to_string(), "user-read-email".to_string()];
        let url = authorize_url("abc123", "http://127.0.0.1:8888/callback", &scopes, "xyz");

        assert!(url.starts_with("https://accounts.spotify.com/authorize?response_type=token&"));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("scope=user-top-read%20user-read-email"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_generate_state() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), STATE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_redirect_fragment() {
        let response = parse_redirect(
            "http://127.0.0.1:8888/callback#access_token=BQD%2Fabc&token_type=Bearer&expires_in=3600&state=s1",
        )
        .unwrap();

        assert_eq!(
            response,
            AuthResponse::Success {
                access_token: "BQD/abc".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: Some(3600),
                state: Some("s1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_redirect_bare_and_query() {
        let bare = parse_redirect("access_token=tok&state=s").unwrap();
        assert!(matches!(bare, AuthResponse::Success { ref access_token, .. } if access_token == "tok"));

        let query = parse_redirect("http://localhost/callback?error=access_denied&state=s").unwrap();
        assert_eq!(
            query,
            AuthResponse::Denied {
                error: "access_denied".to_string(),
                state: Some("s".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_redirect_missing_fields() {
        assert!(parse_redirect("").is_err());
        assert!(parse_redirect("state=s1").is_err());
        assert!(parse_redirect("access_token=&state=s1").is_err());
    }

    #[test]
    fn test_parse_redirect_defaults_token_type() {
        match parse_redirect("#access_token=tok&expires_in=soon").unwrap() {
            AuthResponse::Success {
                token_type,
                expires_in,
                state,
                ..
            } => {
                assert_eq!(token_type, "Bearer");
                assert_eq!(expires_in, None);
                assert_eq!(state, None);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_into_token() {
        let ok = parse_redirect("access_token=tok&state=s1").unwrap();
        let token = ok.clone().into_token(Some("s1")).unwrap();
        assert_eq!(token.secret(), "tok");

        // State is checked when we sent one
        assert!(ok.clone().into_token(Some("other")).is_err());
        assert!(ok.into_token(None).is_ok());

        let denied = parse_redirect("error=access_denied&state=s1").unwrap();
        let err = denied.into_token(Some("s1")).unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_callback_listener_receives_token() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback").unwrap();
        let addr = listener.local_addr();

        let client = std::thread::spawn(move || {
            let page = reqwest::blocking::get(format!("http://{addr}/callback"))
                .unwrap()
                .text()
                .unwrap();
            assert!(page.contains("/token?"));

            reqwest::blocking::get(format!(
                "http://{addr}/token?access_token=tok&token_type=Bearer&expires_in=3600&state=s1"
            ))
            .unwrap()
            .status()
        });

        let response = listener.wait(Duration::from_secs(10)).unwrap();
        let token = response.into_token(Some("s1")).unwrap();
        assert_eq!(token.secret(), "tok");
        assert_eq!(token.expires_in, Some(3600));

        // The browser gets its page once the next poll runs
        let _ = listener.wait(Duration::from_millis(300));
        assert!(client.join().unwrap().is_success());
    }

    #[test]
    fn test_callback_listener_rejects_bad_uri() {
        assert!(CallbackListener::bind("not a uri").is_err());
    }
}
