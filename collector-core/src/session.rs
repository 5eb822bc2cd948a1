use std::fmt;

const IDENTITY_COOKIE: &str = "a1";
const MS_TOKEN_COOKIE: &str = "msToken";

/// Cookie-backed session for one collection run.
#[derive(Clone)]
pub struct SessionCredential {
    cookie: String,
    pairs: Vec<(String, String)>,
    user_agent: String,
}

impl SessionCredential {
    pub fn new(cookie: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let cookie = cookie.into();
        let pairs = parse_cookie(&cookie);
        Self {
            cookie,
            pairs,
            user_agent: user_agent.into(),
        }
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// The `a1` identity token bound into every Xiaohongshu signature.
    pub fn identity(&self) -> Option<&str> {
        self.value(IDENTITY_COOKIE)
    }

    pub fn ms_token(&self) -> Option<&str> {
        self.value(MS_TOKEN_COOKIE)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.pairs.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("SessionCredential")
            .field("cookies", &names)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Splits a `Cookie` header into ordered name/value pairs. A repeated name
/// keeps its first position and its last value.
pub fn parse_cookie(cookie: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for part in cookie.split(';') {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"').to_string();
        match pairs.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value,
            None => pairs.push((name.to_string(), value)),
        }
    }
    pairs
}
