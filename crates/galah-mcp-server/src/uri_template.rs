//! RFC 6570 level-1 URI templates (`{var}` expressions only), as used by
//! the resource registry to address families of resources.

use std::collections::HashMap;

use galah_mcp_protocol::{McpError, McpResult};

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Variable(String),
}

/// A parsed template. Matching is non-greedy: a variable captures up to the
/// first character of the following literal.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> McpResult<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(McpError::InvalidParams(format!(
                                    "unterminated expression in uri template: {}",
                                    template
                                )));
                            }
                            Some(c) => name.push(c),
                        }
                    }
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(McpError::InvalidParams(format!(
                            "invalid variable name '{}' in uri template: {}",
                            name, template
                        )));
                    }
                    parts.push(Part::Variable(name));
                }
                '}' => {
                    return Err(McpError::InvalidParams(format!(
                        "stray '}}' in uri template: {}",
                        template
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self {
            source: template.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Variable(name) => Some(name.as_str()),
                Part::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete URI, extracting variable values. `None` on mismatch.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let mut rest = uri;
        let mut parts = self.parts.iter().peekable();
        while let Some(part) = parts.next() {
            match part {
                Part::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                }
                Part::Variable(name) => {
                    let value = match parts.peek() {
                        // Capture up to the next literal's first occurrence.
                        Some(Part::Literal(next)) => {
                            let idx = rest.find(next.as_str())?;
                            let (value, tail) = rest.split_at(idx);
                            rest = tail;
                            value
                        }
                        // Trailing variable swallows the remainder.
                        _ => std::mem::take(&mut rest),
                    };
                    if value.is_empty() {
                        return None;
                    }
                    vars.insert(name.clone(), value.to_string());
                }
            }
        }
        rest.is_empty().then_some(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_variable() {
        let template = UriTemplate::parse("weather://{city}/current").unwrap();
        assert_eq!(template.variables(), vec!["city"]);

        let vars = template.matches("weather://sydney/current").unwrap();
        assert_eq!(vars["city"], "sydney");
        assert!(template.matches("weather://sydney/forecast").is_none());
        assert!(template.matches("news://sydney/current").is_none());
    }

    #[test]
    fn test_multiple_variables() {
        let template = UriTemplate::parse("db://{table}/{id}").unwrap();
        let vars = template.matches("db://users/42").unwrap();
        assert_eq!(vars["table"], "users");
        assert_eq!(vars["id"], "42");
    }

    #[test]
    fn test_trailing_variable_takes_rest() {
        let template = UriTemplate::parse("file:///{path}").unwrap();
        let vars = template.matches("file:///a/b/c.txt").unwrap();
        assert_eq!(vars["path"], "a/b/c.txt");
    }

    #[test]
    fn test_empty_capture_is_no_match() {
        let template = UriTemplate::parse("db://{table}/rows").unwrap();
        assert!(template.matches("db:///rows").is_none());
    }

    #[test]
    fn test_literal_template_matches_exactly() {
        let template = UriTemplate::parse("config://app").unwrap();
        assert!(template.matches("config://app").unwrap().is_empty());
        assert!(template.matches("config://app2").is_none());
    }

    #[test]
    fn test_malformed_templates_rejected() {
        assert!(UriTemplate::parse("a://{unclosed").is_err());
        assert!(UriTemplate::parse("a://}stray").is_err());
        assert!(UriTemplate::parse("a://{}").is_err());
        assert!(UriTemplate::parse("a://{bad-name}").is_err());
    }
}
