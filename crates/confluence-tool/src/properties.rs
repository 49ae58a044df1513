//! Page properties extraction
//!
//! Confluence renders the "Page Properties" macro as
//!
//! ```html
//! <div class="plugin-tabmeta-details">
//!   <table><tbody>
//!     <tr><th>Owner</th><td>Kiwi</td></tr>
//!     <tr><th>Status</th><td><span class="status">DONE</span></td></tr>
//!   </tbody></table>
//! </div>
//! ```
//!
//! The first cell of each row is the key, the second one the value. The
//! rendered view is close enough to XML that a lenient `quick_xml` reader
//! copes with it (unmatched end tags and void elements are tolerated). Void elements and
//! block boundaries inside a cell separate words in its text.

use anyhow::{anyhow, Result};
use html_escape::decode_html_entities;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Class of the wrapper element around a page properties table
pub const DETAILS_CLASS: &str = "plugin-tabmeta-details";

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Keep the inner markup of value cells instead of their text
    pub html: bool,
    /// Only keep these keys (all keys when `None` or empty)
    pub properties: Option<Vec<String>>,
}

impl ExtractOptions {
    fn wants(&self, key: &str) -> bool {
        match &self.properties {
            Some(names) if !names.is_empty() => names.iter().any(|n| n == key),
            _ => true,
        }
    }
}

/// Elements that never have an end tag in HTML
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose boundaries separate words in the text of a cell
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "table", "tr", "th", "td", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre",
];

fn separates_words(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name) || BLOCK_ELEMENTS.contains(&name)
}

/// A table cell being collected
struct Cell {
    tag: String,
    /// Nested elements with the same tag name
    nesting: usize,
    text: String,
    html: String,
}

impl Cell {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            nesting: 0,
            text: String::new(),
            html: String::new(),
        }
    }

    fn text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn has_class(element: &BytesStart<'_>, class: &str) -> bool {
    element.html_attributes().flatten().any(|attr| {
        attr.key.as_ref().eq_ignore_ascii_case(b"class")
            && String::from_utf8_lossy(&attr.value)
                .split_whitespace()
                .any(|c| c == class)
    })
}

/// Extract the page properties from a rendered (`body.view`) page body.
///
/// Keys keep document order; if several property tables define the same
/// key the first one wins.
pub fn extract(html: &str, options: &ExtractOptions) -> Result<Map<String, Value>> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;

    let mut properties = Map::new();
    let mut div_depth = 0usize;
    let mut details_depth: Option<usize> = None;
    let mut row: Vec<Cell> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag_name(e.name().as_ref());

                if name == "div" {
                    div_depth += 1;
                    if details_depth.is_none() && has_class(&e, DETAILS_CLASS) {
                        details_depth = Some(div_depth);
                    }
                }

                if details_depth.is_some() {
                    match cell.as_mut() {
                        Some(current) => {
                            if name == current.tag {
                                current.nesting += 1;
                            }
                            if separates_words(&name) {
                                current.text.push(' ');
                            }
                            current.html.push('<');
                            current.html.push_str(&String::from_utf8_lossy(&e));
                            current.html.push('>');
                        }
                        None if name == "th" || name == "td" => cell = Some(Cell::new(&name)),
                        None if name == "tr" => row.clear(),
                        None => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = tag_name(e.name().as_ref());

                if let Some(mut current) = cell.take() {
                    if name == current.tag && current.nesting == 0 {
                        row.push(current);
                    } else {
                        if name == current.tag {
                            current.nesting -= 1;
                        }
                        if BLOCK_ELEMENTS.contains(&name.as_str()) {
                            current.text.push(' ');
                        }
                        current.html.push_str(&format!("</{}>", name));
                        cell = Some(current);
                    }
                } else if details_depth.is_some() && name == "tr" {
                    if let [key_cell, value_cell, ..] = row.as_slice() {
                        let key = key_cell.text();
                        if !key.is_empty() && options.wants(&key) {
                            let value = if options.html {
                                value_cell.html.trim().to_string()
                            } else {
                                value_cell.text()
                            };
                            properties.entry(key).or_insert(Value::String(value));
                        }
                    }
                    row.clear();
                }

                if name == "div" {
                    if details_depth == Some(div_depth) {
                        details_depth = None;
                    }
                    div_depth = div_depth.saturating_sub(1);
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(current) = cell.as_mut() {
                    current.text.push(' ');
                    current.html.push('<');
                    current.html.push_str(&String::from_utf8_lossy(&e));
                    current.html.push_str("/>");
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = cell.as_mut() {
                    let raw = String::from_utf8_lossy(&e);
                    current.text.push_str(&decode_html_entities(&raw));
                    current.html.push_str(&raw);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = cell.as_mut() {
                    let raw = String::from_utf8_lossy(&e);
                    current.text.push_str(&raw);
                    current.html.push_str(&raw);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to parse page body at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(properties)
}
