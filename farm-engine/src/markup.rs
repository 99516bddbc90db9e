//! Regex-based extraction over the game's listing markup
//!
//! Pages are treated as text. Rows are `<tr>` blocks, cells are `<td>` blocks,
//! and anything that does not look like the expected structure is skipped.

use crate::traits::PageParser;
use crate::types::{CommandRow, Extracted, FarmRow, MapEntry, SourceRow, TemplateRow, ThreatLevel};
use farm_common::{parse_coord, parse_count, TroopVector, UnitKind};
use regex::Regex;
use std::str::FromStr;
use url::form_urlencoded;

/// Built-in [`PageParser`] for overview screens, the farm assistant and the
/// raw map directory.
#[derive(Debug, Clone)]
pub struct MarkupParser {
    row: Regex,
    cell: Regex,
    tag: Regex,
    village_id: Regex,
    label: Regex,
    farm_row_id: Regex,
    threat_dot: Regex,
    end_time: Regex,
    time_of_day: Regex,
    input: Regex,
    input_name: Regex,
    input_value: Regex,
    nav_item: Regex,
    nav_current: Regex,
}

impl Default for MarkupParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupParser {
    pub fn new() -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("static markup pattern");
        Self {
            row: compile(r#"(?is)<tr\b([^>]*)>(.*?)</tr>"#),
            cell: compile(r#"(?is)<td\b([^>]*)>(.*?)</td>"#),
            tag: compile(r#"(?s)<[^>]*>"#),
            village_id: compile(r#"quickedit-vn"[^>]*data-id="(\d+)""#),
            label: compile(r#"(?is)class="quickedit-label"[^>]*>(.*?)</span>"#),
            farm_row_id: compile(r#"id="village_(\d+)""#),
            threat_dot: compile(r#"dots/([a-z_]+)\.png"#),
            end_time: compile(r#"data-endtime="(\d+)""#),
            time_of_day: compile(r#"\d{1,2}:\d{2}:\d{2}"#),
            input: compile(r#"(?i)<input\b[^>]*>"#),
            input_name: compile(r#"name="([a-z]+)\[(\d+)\]""#),
            input_value: compile(r#"value="(\d*)""#),
            nav_item: compile(r#"(?s)class="paged-nav-item"[^>]*>\s*\[?\s*(\d+)"#),
            nav_current: compile(r#"(?s)<strong>\s*&gt;\s*(\d+)\s*&lt;"#),
        }
    }

    /// Visible text of a markup fragment
    fn text(&self, html: &str) -> String {
        let stripped = self.tag.replace_all(html, " ");
        let decoded = stripped
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// `(attributes, inner)` of every table row
    fn rows<'a>(&self, body: &'a str) -> Vec<(&'a str, &'a str)> {
        self.row
            .captures_iter(body)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect()
    }

    fn cells<'a>(&self, row: &'a str) -> Vec<(&'a str, &'a str)> {
        self.cell
            .captures_iter(row)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect()
    }

    /// Highest page number offered by the pagination control
    fn nav_len(&self, body: &str) -> usize {
        self.nav_item
            .captures_iter(body)
            .chain(self.nav_current.captures_iter(body))
            .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
            .max()
            .unwrap_or(0)
    }

    fn label_text(&self, row: &str) -> Option<String> {
        let caps = self.label.captures(row)?;
        Some(self.text(caps.get(1)?.as_str()))
    }
}

/// Village name without the trailing `(x|y) Kxx` part of a label
fn strip_coord_suffix(label: &str) -> String {
    match label.rfind(" (") {
        Some(at) => label[..at].trim().to_string(),
        None => label.trim().to_string(),
    }
}

fn threat_from_dot(dot: &str) -> ThreatLevel {
    match dot {
        "yellow" => ThreatLevel::PartialLoss,
        d if d.starts_with("red") => ThreatLevel::FullDefense,
        _ => ThreatLevel::None,
    }
}

impl PageParser for MarkupParser {
    fn source_rows(&self, body: &str, columns: &[UnitKind]) -> Extracted<SourceRow> {
        let mut rows = Vec::new();
        for (_, inner) in self.rows(body) {
            let id = match self
                .village_id
                .captures(inner)
                .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
            {
                Some(id) => id,
                None => continue,
            };
            let label = match self.label_text(inner) {
                Some(label) => label,
                None => continue,
            };
            let coord = match parse_coord(&label) {
                Some(coord) => coord,
                None => continue,
            };

            let counts = self
                .cells(inner)
                .into_iter()
                .filter(|(attrs, _)| attrs.contains("unit-item"))
                .map(|(_, html)| parse_count(&self.text(html)));
            let troops = TroopVector::from_pairs(columns.iter().copied().zip(counts));

            rows.push(SourceRow {
                id,
                name: strip_coord_suffix(&label),
                coord,
                troops,
            });
        }

        Extracted {
            rows,
            nav_len: self.nav_len(body),
        }
    }

    fn command_rows(&self, body: &str) -> Extracted<CommandRow> {
        let mut rows = Vec::new();
        for (_, inner) in self.rows(body) {
            let target = match self.label_text(inner).as_deref().and_then(parse_coord) {
                Some(coord) => coord,
                None => continue,
            };
            let arrival_text = self
                .cells(inner)
                .into_iter()
                .map(|(_, html)| self.text(html))
                .find(|text| self.time_of_day.is_match(text));
            if let Some(arrival_text) = arrival_text {
                rows.push(CommandRow { target, arrival_text });
            }
        }

        Extracted {
            rows,
            nav_len: self.nav_len(body),
        }
    }

    fn farm_rows(&self, body: &str) -> Extracted<FarmRow> {
        let mut rows = Vec::new();
        for (attrs, inner) in self.rows(body) {
            let id = match self
                .farm_row_id
                .captures(attrs)
                .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
            {
                Some(id) => id,
                None => continue,
            };

            let texts: Vec<String> = self
                .cells(inner)
                .into_iter()
                .map(|(_, html)| self.text(html))
                .collect();
            let (coord_index, coord) = match texts
                .iter()
                .enumerate()
                .find_map(|(i, text)| parse_coord(text).map(|coord| (i, coord)))
            {
                Some(found) => found,
                None => continue,
            };

            let threat = self
                .threat_dot
                .captures(inner)
                .and_then(|caps| caps.get(1))
                .map(|dot| threat_from_dot(dot.as_str()))
                .unwrap_or(ThreatLevel::None);

            // "?" when the wall has never been scouted
            let wall = texts
                .get(coord_index + 3)
                .map(|text| parse_count(text).min(u32::from(u8::MAX)) as u8)
                .unwrap_or(0);

            let arrival = self
                .end_time
                .captures(inner)
                .and_then(|caps| caps.get(1)?.as_str().parse::<i64>().ok());

            rows.push(FarmRow {
                id,
                coord,
                threat,
                wall,
                loot_full: inner.contains("max_loot/1.png"),
                arrival,
            });
        }

        Extracted {
            rows,
            nav_len: self.nav_len(body),
        }
    }

    fn templates(&self, body: &str) -> Vec<TemplateRow> {
        let mut templates: Vec<TemplateRow> = Vec::new();
        for input in self.input.find_iter(body) {
            let input = input.as_str();
            let (unit, id) = match self.input_name.captures(input).and_then(|caps| {
                let unit = UnitKind::from_str(caps.get(1)?.as_str()).ok()?;
                let id = caps.get(2)?.as_str().parse::<u64>().ok()?;
                Some((unit, id))
            }) {
                Some(found) => found,
                None => continue,
            };
            let count = self
                .input_value
                .captures(input)
                .and_then(|caps| caps.get(1))
                .map(|value| parse_count(value.as_str()))
                .unwrap_or(0);

            match templates.iter_mut().find(|t| t.id == id) {
                Some(template) => template.troops.set(unit, count),
                None => templates.push(TemplateRow {
                    id,
                    troops: TroopVector::from_pairs([(unit, count)]),
                }),
            }
        }
        templates
    }

    fn map_entries(&self, body: &str) -> Vec<MapEntry> {
        body.lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.trim().split(',').collect();
                if fields.len() < 5 {
                    return None;
                }
                let id = fields[0].parse().ok()?;
                let name = form_urlencoded::parse(fields[1].as_bytes())
                    .next()
                    .map(|(name, _)| name.into_owned())
                    .unwrap_or_default();
                let x = fields[2].parse().ok()?;
                let y = fields[3].parse().ok()?;
                let owner_id = fields[4].parse().ok()?;
                Some(MapEntry {
                    id,
                    name,
                    coord: farm_common::Coord::new(x, y),
                    owner_id,
                })
            })
            .collect()
    }
}
