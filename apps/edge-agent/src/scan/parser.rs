use super::DeviceInfo;

const SCOPE_BASE: &str = "onvif://www.onvif.org/";
const SCOPE_TAGS: [&str; 4] = ["d:Scopes", "Scopes", "wsd:Scopes", "wsdd:Scopes"];

fn is_delimiter(ch: u8) -> bool {
    matches!(ch, b'/' | b':' | b'=' | b'-')
}

/// Fills `mac` and `name` from the first Scopes element of a probe reply.
/// Fields that are already populated are left alone.
pub fn apply_scopes(xml: &str, device: &mut DeviceInfo) {
    let Some(scopes) = extract_scopes(xml) else {
        return;
    };
    if device.mac.is_empty() {
        if let Some(mac) = find_scope_value(scopes, "mac") {
            device.mac = format_mac(&percent_decode(mac));
        }
    }
    if device.name.is_empty() {
        if let Some(name) = find_scope_value(scopes, "name") {
            device.name = percent_decode(name);
        }
    }
}

fn extract_scopes(xml: &str) -> Option<&str> {
    SCOPE_TAGS.iter().find_map(|tag| extract_tag(xml, tag))
}

/// Finds `<tag ...>content</tag>` by exact tag name and returns the trimmed
/// content. The tag name must be followed by `>` or whitespace so that
/// `Scopes` does not match `ScopesExt`.
fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let bytes = xml.as_bytes();
    let mut search_pos = 0;
    while let Some(open) = xml[search_pos..].find('<').map(|i| i + search_pos) {
        let name_start = open + 1;
        if name_start + tag.len() > xml.len() {
            break;
        }
        if &xml[name_start..name_start + tag.len()] != tag {
            search_pos = open + 1;
            continue;
        }

        let after_tag = name_start + tag.len();
        if after_tag >= xml.len() {
            break;
        }
        let next = bytes[after_tag];
        if next != b'>' && !next.is_ascii_whitespace() {
            search_pos = open + 1;
            continue;
        }

        let close = xml[after_tag..].find('>').map(|i| i + after_tag)?;
        let content_start = close + 1;

        let mut closing_search = content_start;
        while let Some(closing) = xml[closing_search..].find("</").map(|i| i + closing_search) {
            let closing_name = closing + 2;
            if closing_name + tag.len() > xml.len() {
                return None;
            }
            if &xml[closing_name..closing_name + tag.len()] != tag {
                closing_search = closing + 1;
                continue;
            }
            xml[closing_name + tag.len()..].find('>')?;
            return Some(xml[content_start..closing].trim());
        }
        return None;
    }
    None
}

/// Looks up `key` inside a whitespace-separated Scopes list. The token must
/// contain the ONVIF scope base (case-insensitively); the key must be
/// preceded by a delimiter or the start of the remainder, and the value is
/// whatever follows the key's own delimiter.
fn find_scope_value<'a>(scopes: &'a str, key: &str) -> Option<&'a str> {
    for token in scopes.split_whitespace() {
        let Some(base_pos) = find_case_insensitive(token, SCOPE_BASE) else {
            continue;
        };
        let rest = &token[base_pos + SCOPE_BASE.len()..];
        let Some(key_pos) = find_case_insensitive(rest, key) else {
            continue;
        };
        if key_pos > 0 && !is_delimiter(rest.as_bytes()[key_pos - 1]) {
            continue;
        }

        let mut value = &rest[key_pos + key.len()..];
        if let Some(&first) = value.as_bytes().first() {
            if is_delimiter(first) {
                value = &value[1..];
            }
        }
        if !value.is_empty() {
            return Some(value.trim());
        }
    }
    None
}

/// Byte-wise ASCII case-insensitive search; the returned index is always a
/// character boundary because both patterns are pure ASCII.
fn find_case_insensitive(text: &str, pattern: &str) -> Option<usize> {
    if pattern.is_empty() || text.len() < pattern.len() {
        return None;
    }
    let text = text.as_bytes();
    let pattern = pattern.as_bytes();
    (0..=text.len() - pattern.len()).find(|&start| {
        text[start..start + pattern.len()]
            .iter()
            .zip(pattern)
            .all(|(lhs, rhs)| lhs.eq_ignore_ascii_case(rhs))
    })
}

/// Decodes `%XY` escapes and maps `+` to space; invalid escapes pass through
/// literally.
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let high = (bytes[i + 1] as char).to_digit(16);
            let low = (bytes[i + 2] as char).to_digit(16);
            if let (Some(high), Some(low)) = (high, low) {
                decoded.push(((high << 4) | low) as u8);
                i += 3;
                continue;
            }
        }
        decoded.push(if bytes[i] == b'+' { b' ' } else { bytes[i] });
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Normalises a MAC value: keep hex digits, uppercase, and regroup with `:`
/// when exactly 12 digits remain. Anything else is returned uppercased
/// as-is.
pub fn format_mac(mac: &str) -> String {
    let filtered: String = mac
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if filtered.len() == 12 {
        let mut formatted = String::with_capacity(17);
        for (index, ch) in filtered.chars().enumerate() {
            if index > 0 && index % 2 == 0 {
                formatted.push(':');
            }
            formatted.push(ch);
        }
        return formatted;
    }
    mac.to_uppercase()
}
