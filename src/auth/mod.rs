//! Controller authentication
//!
//! Produces a trusted auth token for a controller base URL, either by
//! password login or by the browser SSO flow. The token and the URL that
//! issued it are always stored together; a token from another controller is
//! never reused.

pub mod pkce;
pub mod sso;

pub use pkce::PkcePair;
pub use sso::{PollOutcome, SsoFailure};

use crate::config::SsoSettings;
use crate::controller::{AuthReply, Controller, ControllerError, LoginRequest};
use crate::platform::BrowserLauncher;
use crate::store::{Store, StoreError};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid controller URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Controller at {base_url} is not healthy: {detail}")]
    ControllerUnhealthy { base_url: String, detail: String },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Login failed: {0}")]
    LoginFailed(#[source] ControllerError),

    #[error("Timed out after {}s waiting for browser login", .0.as_secs())]
    AuthTimeout(Duration),

    #[error("Browser login failed: {0}")]
    SsoRejected(#[source] SsoFailure),

    #[error("Failed to read login choice: {0}")]
    PromptFailed(#[source] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the operator chose to log in
#[derive(Clone)]
pub enum LoginMethod {
    Password { email: String, password: String },
    BrowserSso,
}

impl LoginMethod {
    pub fn kind(&self) -> LoginKind {
        match self {
            LoginMethod::Password { .. } => LoginKind::Password,
            LoginMethod::BrowserSso => LoginKind::BrowserSso,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    Password,
    BrowserSso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The stored token was trusted and unexpired, nothing was sent
    AlreadyAuthenticated,
    LoggedIn(LoginKind),
}

/// Validate a controller URL and strip one trailing slash
pub fn normalize_base_url(input: &str) -> Result<String, AuthError> {
    let invalid = |reason: &str| AuthError::InvalidUrl {
        url: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }

    Ok(trimmed.strip_suffix('/').unwrap_or(trimmed).to_string())
}

#[derive(Deserialize)]
struct Claims {
    // NumericDate may carry a fractional part
    exp: Option<f64>,
}

/// `exp` claim of a JWT, read without verifying the signature
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.exp.filter(|exp| exp.is_finite())?;
    DateTime::from_timestamp(exp.trunc() as i64, 0)
}

/// True when the token carries an expiry later than `now`
pub fn is_token_fresh(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_some_and(|exp| exp > now)
}

const EMAIL_PATTERN: &str = r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,10}$";

/// Lowercase `local@domain.tld` with a 2 to 10 letter TLD
fn is_valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN).is_ok_and(|re| re.is_match(email))
}

pub struct Authenticator<C, B> {
    controller: C,
    store: Arc<Store>,
    browser: B,
    sso: SsoSettings,
}

impl<C, B> Authenticator<C, B>
where
    C: Controller + Clone + 'static,
    B: BrowserLauncher,
{
    pub fn new(controller: C, store: Arc<Store>, browser: B, sso: SsoSettings) -> Self {
        Self {
            controller,
            store,
            browser,
            sso,
        }
    }

    /// Make sure a trusted, unexpired token exists for `base_url`
    ///
    /// `choose` is only called when a login is actually needed.
    pub async fn ensure_authenticated<F>(
        &self,
        base_url: &str,
        force: bool,
        choose: F,
    ) -> Result<AuthOutcome, AuthError>
    where
        F: FnOnce() -> io::Result<LoginMethod>,
    {
        let base_url = normalize_base_url(base_url)?;
        self.store.set_base_url(&base_url)?;
        self.check_health(&base_url).await?;

        if !force
            && let Some(token) = self.store.trusted_token(&base_url)
            && is_token_fresh(&token, Utc::now())
        {
            info!("Already authenticated with {}", base_url);
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        let method = choose().map_err(AuthError::PromptFailed)?;
        let kind = method.kind();
        match method {
            LoginMethod::Password { email, password } => {
                self.password_login(&base_url, &email, &password).await?
            }
            LoginMethod::BrowserSso => self.sso_login(&base_url).await?,
        }

        info!("Logged in to {}", base_url);
        Ok(AuthOutcome::LoggedIn(kind))
    }

    async fn check_health(&self, base_url: &str) -> Result<(), AuthError> {
        debug!("Probing controller health at {}", base_url);
        let unhealthy = |detail: String| AuthError::ControllerUnhealthy {
            base_url: base_url.to_string(),
            detail,
        };

        let reply = self
            .controller
            .health(base_url)
            .await
            .map_err(|e| unhealthy(e.to_string()))?;

        if !reply.is_healthy() {
            return Err(unhealthy(format!(
                "HTTP {}, success={}",
                reply.status, reply.success
            )));
        }
        Ok(())
    }

    /// Exchange email and password for a token
    pub async fn password_login(
        &self,
        base_url: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidCredentials(format!(
                "{:?} is not a valid email address",
                email
            )));
        }

        info!("Logging in as {}", email);
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let reply = self
            .controller
            .login(base_url, &request)
            .await
            .map_err(AuthError::LoginFailed)?;

        match reply {
            AuthReply::Token(token) => {
                self.store.set_auth(&token, base_url)?;
                Ok(())
            }
            AuthReply::Error { error, message } => Err(AuthError::InvalidCredentials(
                message.map_or(error.clone(), |m| format!("{}: {}", error, m)),
            )),
            AuthReply::Empty => Err(AuthError::InvalidCredentials(
                "controller returned an empty token".to_string(),
            )),
        }
    }

    /// Run the browser SSO flow and store the resulting token
    pub async fn sso_login(&self, base_url: &str) -> Result<(), AuthError> {
        let pkce = PkcePair::generate();
        let url = self
            .controller
            .sso_initiate_url(base_url, &pkce.challenge)
            .map_err(|e| AuthError::InvalidUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        info!("Opening {} in your browser", url);
        if let Err(e) = self.browser.open(url.as_str()) {
            warn!("Could not open a browser ({}); open the link above manually", e);
        }

        let token = sso::wait_for_token(
            &self.controller,
            base_url,
            &pkce,
            self.sso.poll_interval(),
            self.sso.timeout(),
        )
        .await?;

        self.store.set_auth(&token, base_url)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::fake::{FakeController, issued, pending};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// JWT-shaped token with the given `exp`, unsigned
    pub(crate) fn jwt_with_exp(exp: DateTime<Utc>) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp.timestamp()));
        format!("{}.{}.sig", header, payload)
    }

    #[derive(Clone, Default)]
    struct RecordingBrowser {
        opened: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl BrowserLauncher for RecordingBrowser {
        fn open(&self, url: &str) -> io::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            if self.fail {
                return Err(io::Error::other("no display"));
            }
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<Store>,
        controller: FakeController,
        browser: RecordingBrowser,
        auth: Authenticator<FakeController, RecordingBrowser>,
    }

    fn fixture(browser: RecordingBrowser) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("session.json")).unwrap());
        let controller = FakeController::new();
        let auth = Authenticator::new(
            controller.clone(),
            store.clone(),
            browser.clone(),
            SsoSettings::default(),
        );
        Fixture {
            _dir: dir,
            store,
            controller,
            browser,
            auth,
        }
    }

    fn password() -> io::Result<LoginMethod> {
        Ok(LoginMethod::Password {
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
        })
    }

    fn never_asked() -> io::Result<LoginMethod> {
        panic!("login method must not be requested")
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://vpn.example.com/").unwrap(),
            "https://vpn.example.com"
        );
        assert_eq!(
            normalize_base_url("http://10.0.0.1:8080").unwrap(),
            "http://10.0.0.1:8080"
        );
        // Only one slash is stripped
        assert_eq!(
            normalize_base_url("https://vpn.example.com//").unwrap(),
            "https://vpn.example.com/"
        );
    }

    #[test]
    fn test_normalize_rejects_bad_urls() {
        for input in ["vpn.example.com", "ftp://vpn.example.com", "not a url", ""] {
            assert!(
                matches!(normalize_base_url(input), Err(AuthError::InvalidUrl { .. })),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_token_expiry() {
        let exp = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        assert_eq!(token_expiry(&jwt_with_exp(exp)), Some(exp));
        assert_eq!(token_expiry("opaque-token"), None);
        assert_eq!(token_expiry("a.!!!.c"), None);
    }

    #[test]
    fn test_fractional_exp_is_truncated() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1","exp":4102444800.5}"#);
        let token = format!("e30.{}.sig", payload);

        let expected = DateTime::from_timestamp(4_102_444_800, 0).unwrap();
        assert_eq!(token_expiry(&token), Some(expected));
        assert!(is_token_fresh(&token, Utc::now()));
    }

    #[test]
    fn test_token_freshness_has_no_grace() {
        let now = Utc::now();
        assert!(is_token_fresh(&jwt_with_exp(now + chrono::Duration::seconds(5)), now));
        assert!(!is_token_fresh(&jwt_with_exp(now), now));
        assert!(!is_token_fresh(&jwt_with_exp(now - chrono::Duration::hours(1)), now));
        assert!(!is_token_fresh("opaque-token", now));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.co"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@@example.com"));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("Alice@example.com"));
        assert!(!is_valid_email("ali!ce@example.com"));
        assert!(!is_valid_email("alice@example.c"));
        assert!(!is_valid_email("alice@example.toolongtldxx"));
    }

    #[tokio::test]
    async fn test_already_authenticated_skips_login() {
        let f = fixture(RecordingBrowser::default());
        let token = jwt_with_exp(Utc::now() + chrono::Duration::hours(1));
        f.store.set_auth(&token, "https://vpn.example.com").unwrap();

        let outcome = f
            .auth
            .ensure_authenticated("https://vpn.example.com/", false, never_asked)
            .await
            .unwrap();

        assert_eq!(outcome, AuthOutcome::AlreadyAuthenticated);
        assert_eq!(f.controller.calls(), vec!["health"]);
    }

    #[tokio::test]
    async fn test_token_from_other_controller_is_not_trusted() {
        let f = fixture(RecordingBrowser::default());
        let token = jwt_with_exp(Utc::now() + chrono::Duration::hours(1));
        f.store.set_auth(&token, "https://old.example.com").unwrap();
        f.controller.with(|s| s.login = Some(AuthReply::Token("NEW".into())));

        let outcome = f
            .auth
            .ensure_authenticated("https://vpn.example.com", false, password)
            .await
            .unwrap();

        assert_eq!(outcome, AuthOutcome::LoggedIn(LoginKind::Password));
        assert_eq!(f.store.auth_token().as_deref(), Some("NEW"));
        assert_eq!(
            f.store.auth_token_issuer_url().as_deref(),
            Some("https://vpn.example.com")
        );
    }

    #[tokio::test]
    async fn test_force_logs_in_again() {
        let f = fixture(RecordingBrowser::default());
        let token = jwt_with_exp(Utc::now() + chrono::Duration::hours(1));
        f.store.set_auth(&token, "https://vpn.example.com").unwrap();
        f.controller.with(|s| s.login = Some(AuthReply::Token("NEW".into())));

        f.auth
            .ensure_authenticated("https://vpn.example.com", true, password)
            .await
            .unwrap();
        assert_eq!(f.controller.count("login"), 1);
        assert_eq!(f.store.auth_token().as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn test_unhealthy_controller() {
        let f = fixture(RecordingBrowser::default());
        f.controller.with(|s| s.healthy = false);

        let result = f
            .auth
            .ensure_authenticated("https://vpn.example.com", false, never_asked)
            .await;

        assert!(matches!(result, Err(AuthError::ControllerUnhealthy { .. })));
        // The URL is remembered even though the health check failed
        assert_eq!(f.store.base_url().as_deref(), Some("https://vpn.example.com"));
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_calls() {
        let f = fixture(RecordingBrowser::default());
        let result = f
            .auth
            .ensure_authenticated("vpn.example.com", false, never_asked)
            .await;

        assert!(matches!(result, Err(AuthError::InvalidUrl { .. })));
        assert!(f.controller.calls().is_empty());
        assert_eq!(f.store.base_url(), None);
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid_credentials() {
        let f = fixture(RecordingBrowser::default());
        f.controller.with(|s| s.login = Some(AuthReply::Empty));

        let result = f
            .auth
            .ensure_authenticated("https://vpn.example.com", false, password)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
        assert_eq!(f.store.auth_token(), None);
    }

    #[tokio::test]
    async fn test_login_transport_failure() {
        let f = fixture(RecordingBrowser::default());
        f.controller.with(|s| s.login = None);

        let result = f
            .auth
            .password_login("https://vpn.example.com", "alice@example.com", "pw")
            .await;
        assert!(matches!(result, Err(AuthError::LoginFailed(_))));
    }

    #[tokio::test]
    async fn test_bad_email_is_rejected_before_sending() {
        let f = fixture(RecordingBrowser::default());
        let result = f
            .auth
            .password_login("https://vpn.example.com", "alice", "pw")
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
        assert_eq!(f.controller.count("login"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sso_login_stores_token() {
        let f = fixture(RecordingBrowser::default());
        f.controller.with(|s| s.sso.extend([pending(), issued("SSO")]));

        let outcome = f
            .auth
            .ensure_authenticated("https://vpn.example.com", false, || Ok(LoginMethod::BrowserSso))
            .await
            .unwrap();

        assert_eq!(outcome, AuthOutcome::LoggedIn(LoginKind::BrowserSso));
        assert_eq!(f.store.auth_token().as_deref(), Some("SSO"));

        let opened = f.browser.opened.lock().unwrap().clone();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("https://vpn.example.com/sso/initiate?code_challenge="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sso_continues_when_browser_fails() {
        let f = fixture(RecordingBrowser {
            fail: true,
            ..RecordingBrowser::default()
        });
        f.controller.with(|s| s.sso.push_back(issued("SSO")));

        f.auth.sso_login("https://vpn.example.com").await.unwrap();
        assert_eq!(f.store.auth_token().as_deref(), Some("SSO"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sso_timeout_leaves_store_untouched() {
        let f = fixture(RecordingBrowser::default());
        let result = f.auth.sso_login("https://vpn.example.com").await;

        assert!(matches!(result, Err(AuthError::AuthTimeout(_))));
        assert_eq!(f.store.auth_token(), None);
    }
}
