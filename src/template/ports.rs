//! Port rewriting inside JSON string literals
//!
//! A single left-to-right pass over the raw text. No JSON parsing: the
//! scanner only tracks whether it is inside a string literal so escaped
//! quotes never end a string early.
//!
//! ```text
//!   Normal ──'"'──► InString ──'\\'──► Escape
//!     ▲                │   ▲              │
//!     └──'"' (rewrite)─┘   └──any char────┘
//! ```

use std::collections::HashMap;

use crate::error::{McError, Result};

/// Where replacement ports come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSubstitution {
    /// Assigned to distinct document ports in first-seen order
    List(Vec<u16>),

    /// Explicit original → replacement mapping
    Map(HashMap<u32, u16>),
}

impl PortSubstitution {
    fn len(&self) -> usize {
        match self {
            PortSubstitution::List(ports) => ports.len(),
            PortSubstitution::Map(map) => map.len(),
        }
    }
}

/// Scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    /// The previous character was a backslash inside a string
    Escape,
}

/// Rewrites `host:port` and `transport:host:port` strings in a JSON document
#[derive(Debug, Clone)]
pub struct PortRewriter {
    substitution: PortSubstitution,

    /// Original → assigned port for the current pass
    port_map: HashMap<u32, u16>,
}

impl PortRewriter {
    pub fn new(substitution: PortSubstitution) -> Self {
        Self {
            substitution,
            port_map: HashMap::new(),
        }
    }

    /// Rewrite `json`; fails without output on any sizing mismatch
    ///
    /// Every call is an independent pass with a fresh port map.
    pub fn rewrite(&mut self, json: &str) -> Result<String> {
        self.port_map.clear();

        let mut out = String::with_capacity(json.len());
        let mut literal = String::new();
        let mut state = ScanState::Normal;

        for c in json.chars() {
            state = match state {
                ScanState::Normal => {
                    out.push(c);
                    if c == '"' {
                        literal.clear();
                        ScanState::InString
                    } else {
                        ScanState::Normal
                    }
                }
                ScanState::InString => match c {
                    '\\' => {
                        literal.push(c);
                        ScanState::Escape
                    }
                    '"' => {
                        out.push_str(&self.sub_port(&literal)?);
                        out.push(c);
                        ScanState::Normal
                    }
                    _ => {
                        literal.push(c);
                        ScanState::InString
                    }
                },
                ScanState::Escape => {
                    literal.push(c);
                    ScanState::InString
                }
            };
        }

        // An unterminated string is copied through untouched
        if state != ScanState::Normal {
            out.push_str(&literal);
        }

        if self.port_map.len() < self.substitution.len() {
            return Err(McError::ConfigMismatch(format!(
                "config has {} distinct ports but {} replacements were supplied",
                self.port_map.len(),
                self.substitution.len()
            )));
        }
        Ok(out)
    }

    /// Original → replacement assignments made by the last pass
    pub fn port_map(&self) -> &HashMap<u32, u16> {
        &self.port_map
    }

    /// Substitute the last and second-to-last `:` segments if they are integers
    fn sub_port(&mut self, literal: &str) -> Result<String> {
        let mut parts: Vec<String> = literal.split(':').map(str::to_string).collect();
        if parts.len() < 2 {
            return Ok(literal.to_string());
        }

        for back in 1..=2 {
            let Some(index) = parts.len().checked_sub(back) else {
                continue;
            };
            let Ok(port) = parts[index].parse::<u32>() else {
                continue;
            };
            parts[index] = self.assign(port)?.to_string();
        }
        Ok(parts.join(":"))
    }

    fn assign(&mut self, port: u32) -> Result<u16> {
        if let Some(&assigned) = self.port_map.get(&port) {
            return Ok(assigned);
        }
        if self.port_map.len() >= self.substitution.len() {
            return Err(McError::ConfigMismatch(format!(
                "looking up port {}: config has more ports than the {} replacements supplied",
                port,
                self.substitution.len()
            )));
        }

        let assigned = match &self.substitution {
            PortSubstitution::List(ports) => ports[self.port_map.len()],
            PortSubstitution::Map(map) => *map.get(&port).ok_or_else(|| {
                McError::ConfigMismatch(format!("port {} not in substitute port map", port))
            })?,
        };
        tracing::trace!("Assigning port {} -> {}", port, assigned);
        self.port_map.insert(port, assigned);
        Ok(assigned)
    }
}

/// One-shot [`PortRewriter::rewrite`]
pub fn replace_ports(json: &str, substitution: &PortSubstitution) -> Result<String> {
    PortRewriter::new(substitution.clone()).rewrite(json)
}
