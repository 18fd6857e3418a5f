use std::time::Duration;

use aws_lc_rs::constant_time;


#[derive(Debug, Clone, confique::Config)]
#[config(validate = Self::validate)]
pub struct AuthConfig {
    /// Username required to log into the web console. Must be set together
    /// with `password`. If both are unset, no login is required and the
    /// console is open to everyone who can reach it.
    #[config(env = "GANDER_AUTH_USERNAME")]
    pub username: Option<String>,

    /// Password required to log into the web console.
    #[config(env = "GANDER_AUTH_PASSWORD")]
    pub password: Option<String>,

    /// Secret used to sign session cookies. Should be a long random string.
    /// If unset, a random key is generated at startup, which invalidates
    /// all sessions whenever the process restarts.
    #[config(env = "GANDER_AUTH_SECRET")]
    pub secret: Option<String>,

    /// How long a login session stays valid before the user has to log in
    /// again.
    #[config(default = "12h", deserialize_with = crate::config::deserialize_duration)]
    pub session_lifetime: Duration,

    /// Whether to set the `Secure` attribute on the session cookie, making
    /// browsers send it over HTTPS only. Enable this whenever the console
    /// is served via HTTPS.
    #[config(default = false)]
    pub secure_cookie: bool,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), String> {
        match (&self.username, &self.password) {
            (Some(_), None) => return Err("'username' is set, but 'password' is not".into()),
            (None, Some(_)) => return Err("'password' is set, but 'username' is not".into()),
            _ => {}
        }

        let fields = [
            ("username", &self.username),
            ("password", &self.password),
            ("secret", &self.secret),
        ];
        for (field, value) in fields {
            if value.as_deref() == Some("") {
                return Err(format!("'{field}' must not be empty"));
            }
        }

        Ok(())
    }

    /// Whether logging in is required at all. If `false`, no credentials
    /// are configured and everyone may use the console.
    pub fn enabled(&self) -> bool {
        self.username.is_some()
    }

    /// Compares the given login data against the configured credentials.
    /// Always `false` if no credentials are configured.
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        let (Some(expected_username), Some(expected_password))
            = (&self.username, &self.password)
        else {
            return false;
        };

        // Both comparisons always run, so the timing does not reveal which
        // of the two fields was wrong.
        let username_ok = constant_time_eq(expected_username.as_bytes(), username.as_bytes());
        let password_ok = constant_time_eq(expected_password.as_bytes(), password.as_bytes());
        username_ok & password_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(a, b).is_ok()
}
