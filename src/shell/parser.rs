use super::error::{ShellError, ShellResult};

/// Upper bound on words in one command, program name included.
pub const ARGS_NUM_MAX: usize = 20;

/// One parsed command of a `&&` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub name: String,
    pub args: Vec<String>,
    pub background: bool,
    pub text: String, // Command as typed, trailing `&` included
}

impl Cmd {
    /// Number of words, including the program name.
    pub fn argc(&self) -> usize {
        self.args.len() + 1
    }

    /// Program name followed by its arguments, as handed to `execvp`.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Splits a line on every `&&` that is not inside single or double quotes.
pub fn split_chain(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'&' && bytes.get(i + 1) == Some(&b'&') => {
                parts.push(line[start..i].trim());
                i += 2;
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(line[start..].trim());
    parts
}

/// Parses a single command. Returns `None` for a blank segment.
pub fn parse_cmd(segment: &str) -> ShellResult<Option<Cmd>> {
    let trimmed = segment.trim();
    let (body, background) = match trimmed.strip_suffix('&') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };

    let mut words = tokenize(body)?;
    if words.is_empty() {
        return Ok(None);
    }
    if words.len() > ARGS_NUM_MAX {
        return Err(ShellError::parse(&words[0], "too many arguments"));
    }

    let name = words.remove(0);
    Ok(Some(Cmd {
        name,
        args: words,
        background,
        text: trimmed.to_string(),
    }))
}

/// Whitespace tokenizer with quote grouping. Quotes are stripped.
fn tokenize(s: &str) -> ShellResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(ShellError::parse(s, format!("unterminated {} quote", q)));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("true && false", vec!["true", "false"])]
    #[case("echo \"a && b\" && pwd", vec!["echo \"a && b\"", "pwd"])]
    #[case("echo 'x&&y'", vec!["echo 'x&&y'"])]
    #[case("echo \"it's\" && pwd", vec!["echo \"it's\"", "pwd"])]
    #[case("sleep 1 & && jobs", vec!["sleep 1 &", "jobs"])]
    #[case("a &&", vec!["a", ""])]
    fn chain_splitting(#[case] line: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_chain(line), expected);
    }

    #[test]
    fn quoted_separator_is_literal() {
        let parts = split_chain("\"a && b\" && c");
        assert_eq!(parts, vec!["\"a && b\"", "c"]);
        let cmd = parse_cmd(parts[0]).unwrap().unwrap();
        assert_eq!(cmd.name, "a && b");
    }

    #[test]
    fn background_flag() {
        let cmd = parse_cmd("sleep 10 &").unwrap().unwrap();
        assert!(cmd.background);
        assert_eq!(cmd.argv(), vec!["sleep", "10"]);
        assert_eq!(cmd.text, "sleep 10 &");

        let cmd = parse_cmd("  sleep 10&").unwrap().unwrap();
        assert!(cmd.background);
        assert_eq!(cmd.args, vec!["10"]);
        assert_eq!(cmd.text, "sleep 10&");

        let cmd = parse_cmd("echo '&'").unwrap().unwrap();
        assert!(!cmd.background);
        assert_eq!(cmd.args, vec!["&"]);
    }

    #[test]
    fn quotes_group_words() {
        let cmd = parse_cmd("echo 'hello world' \"\" x").unwrap().unwrap();
        assert_eq!(cmd.args, vec!["hello world", "", "x"]);
        assert_eq!(cmd.argc(), 4);
    }

    #[test]
    fn blank_segments() {
        assert_eq!(parse_cmd("   ").unwrap(), None);
        assert_eq!(parse_cmd("&").unwrap(), None);
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(
            parse_cmd("echo 'oops"),
            Err(ShellError::Parse { .. })
        ));

        let long = std::iter::repeat("x").take(ARGS_NUM_MAX + 1).collect::<Vec<_>>().join(" ");
        assert!(matches!(parse_cmd(&long), Err(ShellError::Parse { .. })));
    }
}
