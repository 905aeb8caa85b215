use std::{borrow::Cow, collections::BTreeMap};

use super::error::{ShellError, ShellResult};

/// Name → expansion, listed in name order.
#[derive(Debug, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines an alias from a `name=command` argument.
    pub fn define(&mut self, assignment: &str) -> ShellResult<()> {
        let (name, expansion) = assignment
            .split_once('=')
            .ok_or_else(|| ShellError::argument("alias", "expected name=command"))?;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ShellError::argument(
                "alias",
                format!("invalid alias name: {}", name),
            ));
        }
        let expansion = unquote(expansion.trim());
        if expansion.is_empty() {
            return Err(ShellError::argument("alias", "empty alias command"));
        }
        self.entries.insert(name.to_string(), expansion.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> ShellResult<()> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ShellError::lookup("unalias", format!("{} alias does not exist", name)))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replaces the first word of `segment` when it names an alias. One level only.
    pub fn expand<'a>(&self, segment: &'a str) -> Cow<'a, str> {
        let trimmed = segment.trim_start();
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (head, rest) = trimmed.split_at(end);
        match self.get(head) {
            Some(expansion) => Cow::Owned(format!("{}{}", expansion, rest)),
            None => Cow::Borrowed(segment),
        }
    }
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_expand_remove() {
        let mut aliases = AliasTable::new();
        aliases.define("ll='ls -l'").unwrap();
        assert_eq!(aliases.get("ll"), Some("ls -l"));
        assert_eq!(aliases.expand("ll /tmp &"), "ls -l /tmp &");
        assert_eq!(aliases.expand("lll /tmp"), "lll /tmp");

        aliases.remove("ll").unwrap();
        assert!(matches!(
            aliases.remove("ll"),
            Err(ShellError::Lookup { .. })
        ));
    }

    #[test]
    fn expansion_is_not_recursive() {
        let mut aliases = AliasTable::new();
        aliases.define("a=b").unwrap();
        aliases.define("b=c").unwrap();
        assert_eq!(aliases.expand("a x"), "b x");
    }

    #[test]
    fn rejects_bad_definitions() {
        let mut aliases = AliasTable::new();
        assert!(aliases.define("noequals").is_err());
        assert!(aliases.define("=ls").is_err());
        assert!(aliases.define("bad name=ls").is_err());
        assert!(aliases.define("x=''").is_err());
    }
}
