use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::borrow::Cow;
use crate::error::ParseError;
use crate::models::{Document, Item};

/// Parses an RSS document and HTML-unescapes its textual fields.
///
/// Only the unprefixed `title`, `link` and `description` children of the
/// first `<channel>` are read, plus `title`, `link`, `description` and
/// `pubDate` of each `<item>` directly under it. Missing fields stay empty.
/// Each field is trimmed once, after all of its text and CDATA is joined.
pub fn parse_document(bytes: &[u8]) -> Result<Document, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let mut reader = Reader::from_str(text);

    let mut path: Vec<String> = Vec::new();
    let mut channel: Option<Document> = None;
    let mut channel_depth = 0;
    let mut in_channel = false;
    let mut item: Option<Item> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                if name == "channel" && channel.is_none() {
                    channel = Some(Document::default());
                    channel_depth = path.len() + 1;
                    in_channel = true;
                } else if name == "item" && in_channel && path.len() == channel_depth {
                    item = Some(Item::default());
                }

                path.push(name);
            }
            Event::Empty(e) => {
                let name = e.name();

                if name.as_ref() == b"channel" && channel.is_none() {
                    channel = Some(Document::default());
                } else if name.as_ref() == b"item" && in_channel && path.len() == channel_depth {
                    if let Some(document) = channel.as_mut() {
                        document.items.push(Item::default());
                    }
                }
            }
            Event::Text(e) => {
                if in_channel {
                    let raw = String::from_utf8_lossy(&e);
                    let text = Cow::Owned(decode_xml_references(&raw));
                    append_text(&path, channel_depth, channel.as_mut(), item.as_mut(), &text);
                }
            }
            Event::CData(e) => {
                if in_channel {
                    let text = String::from_utf8_lossy(&e);
                    append_text(&path, channel_depth, channel.as_mut(), item.as_mut(), &text);
                }
            }
            Event::End(_) => {
                let closed = path.pop();
                let depth = path.len();

                if closed.as_deref() == Some("item") && in_channel && depth == channel_depth {
                    if let (Some(document), Some(finished)) = (channel.as_mut(), item.take()) {
                        document.items.push(finished);
                    }
                } else if closed.as_deref() == Some("channel") && in_channel && depth + 1 == channel_depth {
                    in_channel = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        return Err(ParseError::Xml {
            position: reader.buffer_position() as u64,
            message: format!("unexpected end of document inside <{}>", open),
        });
    }

    let mut document = channel.ok_or(ParseError::MissingChannel)?;
    unescape_document(&mut document);
    Ok(document)
}

fn append_text(
    path: &[String],
    channel_depth: usize,
    channel: Option<&mut Document>,
    item: Option<&mut Item>,
    text: &Cow<'_, str>,
) {
    let Some(channel) = channel else {
        return;
    };
    let depth = path.len();

    if depth == channel_depth + 1 {
        let target = match path[depth - 1].as_str() {
            "title" => &mut channel.title,
            "link" => &mut channel.link,
            "description" => &mut channel.description,
            _ => return,
        };
        target.push_str(text);
    } else if depth == channel_depth + 2 && path[depth - 2] == "item" {
        let Some(item) = item else {
            return;
        };
        let target = match path[depth - 1].as_str() {
            "title" => &mut item.title,
            "link" => &mut item.link,
            "description" => &mut item.description,
            "pubDate" => &mut item.pub_date,
            _ => return,
        };
        target.push_str(text);
    }
}

/// Resolves the five predefined XML entities and numeric character
/// references. Anything else, including HTML-only entities such as `&nbsp;`,
/// is kept verbatim for the HTML pass.
fn decode_xml_references(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let tail = &rest[start..];

        let resolved = tail
            .find(';')
            .and_then(|end| resolve_reference(&tail[1..end]).map(|text| (text, end)));

        match resolved {
            Some((text, end)) => {
                decoded.push_str(&text);
                rest = &tail[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

fn resolve_reference(name: &str) -> Option<String> {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(decimal) = name.strip_prefix('#') {
        decimal.parse::<u32>().ok()
    } else {
        return resolve_xml_entity(name).map(str::to_string);
    };

    code.and_then(char::from_u32).map(String::from)
}

fn unescape_document(document: &mut Document) {
    document.title = unescape(&document.title);
    document.link = document.link.trim().to_string();
    document.description = unescape(&document.description);

    for item in &mut document.items {
        item.title = unescape(&item.title);
        item.link = item.link.trim().to_string();
        item.description = unescape(&item.description);
        item.pub_date = item.pub_date.trim().to_string();
    }
}

fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}
