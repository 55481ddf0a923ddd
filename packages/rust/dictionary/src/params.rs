//! Lenient parser for the raw `data-objects` parameter cell.
//!
//! Cells hold a list literal as written by spreadsheet tooling, e.g.
//! `['SetVariable', 'Value']` or `["Value"]`. Anything that is not a
//! bracketed list of quoted strings parses to an empty list.

/// Parse a raw parameter cell into parameter names. Never fails.
pub fn parse_params(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim) else {
        return Vec::new();
    };
    if raw.is_empty() || raw == "[]" {
        return Vec::new();
    }
    if !(raw.starts_with('[') && raw.ends_with(']')) {
        return Vec::new();
    }

    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list;
    }

    parse_quoted_list(&raw[1..raw.len() - 1]).unwrap_or_default()
}

/// Parse the inside of `[...]` as comma-separated single- or double-quoted strings.
fn parse_quoted_list(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let quote = match chars.next() {
            None => return Some(items),
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                c if c == quote => break,
                '\\' => match chars.next()? {
                    'n' => item.push('\n'),
                    't' => item.push('\t'),
                    other => item.push(other),
                },
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => return Some(items),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}
