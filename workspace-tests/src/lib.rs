//! In-memory game server used by the cross-crate tests
//!
//! Serves listing pages by URL fragment and answers farm commands, recording
//! every request it sees.

use async_trait::async_trait;
use farm_engine::{FarmResult, HttpRequest, HttpResponse, Method, Transport};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct FakeGameServer {
    routes: Vec<(String, String)>,
    rejected_targets: Vec<u64>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeGameServer {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            rejected_targets: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve `body` for GET URLs containing `fragment`; first match wins
    pub fn route(mut self, fragment: &str, body: impl Into<String>) -> Self {
        self.routes.push((fragment.to_string(), body.into()));
        self
    }

    /// Farm commands against `target_id` come back with an `error` member
    pub fn reject_target(mut self, target_id: u64) -> Self {
        self.rejected_targets.push(target_id);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Bodies of every farm command received
    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| r.body)
            .collect()
    }

    fn command_reply(&self, body: &str) -> String {
        let target = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("target="))
            .and_then(|id| id.parse::<u64>().ok());
        match target {
            Some(id) if self.rejected_targets.contains(&id) => {
                r#"{"error":["Target is under attack protection"]}"#.to_string()
            }
            _ => r#"{"response":{"success":"Farm attack sent"}}"#.to_string(),
        }
    }
}

impl Default for FakeGameServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeGameServer {
    async fn send(&self, request: &HttpRequest) -> FarmResult<HttpResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if request.method == Method::Post {
            let body = request.body.clone().unwrap_or_default();
            return Ok(HttpResponse::ok(self.command_reply(&body)));
        }

        for (fragment, body) in &self.routes {
            if request.url.contains(fragment.as_str()) {
                return Ok(HttpResponse::ok(body.clone()));
            }
        }

        Ok(HttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: String::new(),
        })
    }
}

/// Village overview page; `troops` follows the world's unit column order
pub fn source_page(villages: &[(u64, &str, Vec<u32>)]) -> String {
    let mut body = String::from("<table id=\"combined_table\"><tr><th>Village</th></tr>");
    for (id, label, troops) in villages {
        body.push_str(&format!(
            "<tr><td><span class=\"quickedit-vn\" data-id=\"{}\"><span class=\"quickedit-label\">{}</span></span></td>",
            id, label
        ));
        for count in troops {
            body.push_str(&format!("<td class=\"unit-item\">{}</td>", count));
        }
        body.push_str("</tr>");
    }
    body.push_str("</table>");
    body
}

/// Outgoing commands page from `(label, arrival text)` rows
pub fn command_page(commands: &[(&str, &str)]) -> String {
    let rows: String = commands
        .iter()
        .map(|(label, arrival)| {
            format!(
                "<tr><td><span class=\"quickedit-label\">{}</span></td><td>{}</td></tr>",
                label, arrival
            )
        })
        .collect();
    format!("<table id=\"commands_table\">{}</table>", rows)
}

/// A farm-assistant target row
pub struct FarmTarget<'a> {
    pub id: u64,
    pub coord: &'a str,
    pub dot: &'a str,
    pub loot_full: bool,
    pub wall: &'a str,
}

/// Farm assistant page with two templates given as `(unit, count)` inputs
pub fn farm_page(template_a: (u64, &[(&str, u32)]), template_b: (u64, &[(&str, u32)]), targets: &[FarmTarget<'_>]) -> String {
    let mut body = String::from("<script>var game_data = {};</script><form>");
    for (id, units) in [template_a, template_b] {
        for (unit, count) in units {
            body.push_str(&format!("<input type=\"text\" name=\"{}[{}]\" value=\"{}\">", unit, id, count));
        }
    }
    body.push_str("</form><table id=\"plunder_list\">");
    for target in targets {
        body.push_str(&format!(
            "<tr id=\"village_{}\"><td></td><td><img src=\"/graphic/dots/{}.png\"></td>\
             <td><img src=\"/graphic/max_loot/{}.png\"></td><td><a>({}) K55</a></td>\
             <td></td><td></td><td>{}</td></tr>",
            target.id,
            target.dot,
            u8::from(target.loot_full),
            target.coord,
            target.wall
        ));
    }
    body.push_str("</table>");
    body
}
