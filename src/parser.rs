//! Rule text front end.
//!
//! Grammar, one rule per line:
//!
//! ```text
//! outbound(address[, protoPort[, hijackAddress]])
//! ```
//!
//! `#` starts a comment that runs to end of line. Blank lines are
//! skipped. A line of the form `file: <path>` splices in another rule
//! file (nesting is depth-limited to reject include cycles).

use std::fs;
use std::path::Path;

use crate::error::{AclError, Result};
use crate::types::{Protocol, TextRule};

/// Maximum nesting depth for `file:` includes.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Parse a rulebook from text, preserving source order.
pub fn parse_text_rules(text: &str) -> Result<Vec<TextRule>> {
    parse_nested(text, 0)
}

/// Parse a rulebook from a file on disk.
pub fn parse_text_rules_from_file(path: impl AsRef<Path>) -> Result<Vec<TextRule>> {
    parse_file_nested(path.as_ref(), 0, 0)
}

fn parse_file_nested(path: &Path, line: usize, depth: usize) -> Result<Vec<TextRule>> {
    let text = fs::read_to_string(path).map_err(|e| AclError::Parse {
        line,
        reason: format!("cannot read rule file '{}': {}", path.display(), e),
    })?;
    parse_nested(&text, depth)
}

fn parse_nested(text: &str, depth: usize) -> Result<Vec<TextRule>> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(AclError::Parse {
            line: 0,
            reason: format!(
                "file include depth exceeds {MAX_INCLUDE_DEPTH}, likely a circular include"
            ),
        });
    }

    let mut rules = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }

        if let Some(path) = content.strip_prefix("file:") {
            let included = parse_file_nested(Path::new(path.trim()), line, depth + 1)?;
            rules.extend(included);
            continue;
        }

        rules.push(parse_rule_line(content, line)?);
    }
    Ok(rules)
}

fn parse_rule_line(line_text: &str, line: usize) -> Result<TextRule> {
    let fail = |reason: &str| AclError::Parse {
        line,
        reason: reason.to_string(),
    };

    let open = line_text.find('(').ok_or_else(|| fail("expected '(' after outbound label"))?;
    if !line_text.ends_with(')') {
        return Err(fail("unbalanced parentheses"));
    }

    let outbound = line_text[..open].trim();
    if outbound.is_empty() {
        return Err(fail("missing outbound label"));
    }

    let inner = &line_text[open + 1..line_text.len() - 1];
    if inner.contains('(') || inner.contains(')') {
        return Err(fail("unbalanced parentheses"));
    }

    let mut fields = inner.split(',').map(str::trim);
    let address = fields.next().unwrap_or("");
    if address.is_empty() {
        return Err(fail("empty address"));
    }
    let proto_port = fields.next().filter(|f| !f.is_empty()).map(str::to_string);
    let hijack_address = fields.next().filter(|f| !f.is_empty()).map(str::to_string);
    if fields.next().is_some() {
        return Err(fail("too many fields (at most address, protoPort, hijackAddress)"));
    }

    Ok(TextRule {
        outbound: outbound.to_string(),
        address: address.to_string(),
        proto_port,
        hijack_address,
        line,
    })
}

/// Parse a protocol/port specification.
///
/// Accepted forms: `""`, `"*"`, `"tcp"`, `"udp"`, `proto "/" port`,
/// `proto "/" start "-" end` where proto is `tcp`, `udp` or `*`.
/// Returns `None` on anything else. A result of `(_, 0, 0)` means any
/// port.
pub fn parse_proto_port(spec: &str) -> Option<(Protocol, u16, u16)> {
    let spec = spec.trim().to_ascii_lowercase();
    if spec.is_empty() || spec == "*" {
        return Some((Protocol::Both, 0, 0));
    }

    let (proto_str, port_spec) = match spec.split_once('/') {
        Some((p, rest)) => (p, Some(rest)),
        None => (spec.as_str(), None),
    };

    let proto = match proto_str {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        "*" => Protocol::Both,
        _ => return None,
    };

    let (start, end) = match port_spec {
        None => (0, 0),
        Some(ports) => match ports.split_once('-') {
            Some((a, b)) => {
                let start: u16 = a.parse().ok()?;
                let end: u16 = b.parse().ok()?;
                if start > end {
                    return None;
                }
                (start, end)
            }
            None => {
                let port: u16 = ports.parse().ok()?;
                (port, port)
            }
        },
    };

    Some((proto, start, end))
}

/// Split a `geosite:` payload into the site name and its `@`-attributes.
///
/// Whitespace around tokens is ignored; the name comes back lowercase.
/// `" google @jp "` parses to `("google", ["jp"])`.
pub fn parse_geosite_name(s: &str) -> (String, Vec<String>) {
    let mut tokens = s.split('@').map(str::trim);
    let name = tokens.next().unwrap_or("").to_ascii_lowercase();
    let attrs = tokens
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();
    (name, attrs)
}
