//! Pattern matcher — compiles `prefix.{var}` authorization patterns to
//! matchers, the way an authorization rule's channel pattern is turned into
//! a regex with named capture groups.

use regex::Regex;
use std::collections::HashMap;

#[derive(Debug)]
pub struct CompiledPattern {
    template: String,
    regex: Regex,
    group_names: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("unbalanced `{{` in pattern template")]
    UnbalancedBrace,
    #[error("empty variable name in pattern template")]
    EmptyVariableName,
    #[error("duplicate variable name `{0}` in pattern template")]
    DuplicateVariableName(String),
}

/// Escapes regex metacharacters in a literal fragment (the non-`{var}`
/// portions of the template).
fn escape_literal(fragment: &str) -> String {
    regex::escape(fragment)
}

impl CompiledPattern {
    /// Compiles `literal-with-{name}-segments` into an anchored matcher.
    /// Each `{name}` becomes a capturing group matching one dot-free segment
    /// (`[^.]+`).
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut regex_src = String::from("^");
        let mut group_names = Vec::new();
        let mut literal_start = 0usize;

        let bytes = template.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                regex_src.push_str(&escape_literal(&template[literal_start..i]));
                let close = template[i..]
                    .find('}')
                    .map(|offset| i + offset)
                    .ok_or(PatternError::UnbalancedBrace)?;
                let name = &template[i + 1..close];
                if name.is_empty() {
                    return Err(PatternError::EmptyVariableName);
                }
                if group_names.iter().any(|n: &String| n == name) {
                    return Err(PatternError::DuplicateVariableName(name.to_owned()));
                }
                regex_src.push_str(&format!("(?P<{name}>[^.]+)"));
                group_names.push(name.to_owned());
                i = close + 1;
                literal_start = i;
            } else {
                i += 1;
            }
        }
        regex_src.push_str(&escape_literal(&template[literal_start..]));
        regex_src.push('$');

        let regex = Regex::new(&regex_src).expect("generated pattern regex is always valid");
        Ok(CompiledPattern {
            template: template.to_owned(),
            regex,
            group_names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Tests full-string equality (the regex is anchored) and extracts the
    /// named groups on success.
    pub fn matches(&self, candidate: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(candidate)?;
        let mut extracted = HashMap::with_capacity(self.group_names.len());
        for name in &self.group_names {
            if let Some(m) = captures.name(name) {
                extracted.insert(name.clone(), m.as_str().to_owned());
            }
        }
        Some(extracted)
    }
}
