use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "location", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny,
    Redirect(String),
}

/// Route-level gate in front of the protected dashboard area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteGuard {
    protected_prefix: String,
    home_path: String,
    login_path: String,
}

impl RouteGuard {
    pub fn new(
        protected_prefix: impl Into<String>,
        home_path: impl Into<String>,
        login_path: impl Into<String>,
    ) -> Self {
        let protected_prefix = protected_prefix.into();
        let protected_prefix = match protected_prefix.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self { protected_prefix, home_path: home_path.into(), login_path: login_path.into() }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Plain string prefix match, so `/dashboards` falls under `/dashboard`
    /// as well. A trailing slash on the configured prefix is ignored.
    pub fn is_protected(&self, path: &str) -> bool {
        path.starts_with(self.protected_prefix.as_str())
    }

    pub fn authorize(&self, is_authenticated: bool, path: &str) -> AccessDecision {
        if self.is_protected(path) {
            if is_authenticated {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny
            }
        } else if is_authenticated {
            AccessDecision::Redirect(self.home_path.clone())
        } else {
            AccessDecision::Allow
        }
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new("/dashboard", "/dashboard", "/login")
    }
}
