//! Authenticated game session
//!
//! The planner never logs in by itself. The host hands over the cookies and
//! the CSRF token of a live browser session and every outbound request
//! carries them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session data consumed by transports and the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    /// World base URL, e.g. `https://it94.tribals.it`
    pub world_url: String,

    /// CSRF token the game expects as the `h` parameter on state-changing calls
    pub csrf_token: String,

    #[serde(default)]
    pub player_id: u64,

    /// Village used for screens that are not tied to a specific source
    #[serde(default)]
    pub village_id: u64,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub cookies: Vec<Cookie>,

    #[serde(default = "chrono::Utc::now")]
    pub created_at: chrono::DateTime<chrono::Utc>,

    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Individual cookie data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl GameSession {
    pub fn new(world_url: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            world_url: world_url.into().trim_end_matches('/').to_string(),
            csrf_token: csrf_token.into(),
            player_id: 0,
            village_id: 0,
            headers: HashMap::new(),
            cookies: Vec::new(),
            created_at: chrono::Utc::now(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match &self.expires_at {
            Some(expires) => chrono::Utc::now() > *expires,
            None => false,
        }
    }

    /// A session is usable when it names a world and carries a CSRF token
    pub fn is_valid(&self) -> bool {
        !self.world_url.is_empty() && !self.csrf_token.is_empty() && !self.is_expired()
    }

    /// Headers to attach to a request, with cookies folded into `Cookie`
    pub fn get_http_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();

        if !self.cookies.is_empty() && !headers.contains_key("Cookie") {
            let cookie_header = self
                .cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            headers.insert("Cookie".to_string(), cookie_header);
        }

        headers
    }

    /// Absolute `game.php` URL for the given village and query string
    pub fn game_url(&self, village_id: u64, query: &str) -> String {
        if query.is_empty() {
            format!("{}/game.php?village={}", self.world_url, village_id)
        } else {
            format!("{}/game.php?village={}&{}", self.world_url, village_id, query)
        }
    }

    /// Absolute URL for a world-relative path such as `/map/village.txt`
    pub fn world_path(&self, path: &str) -> String {
        format!("{}/{}", self.world_url, path.trim_start_matches('/'))
    }
}
