//! Static screening of submitted Python source.
//!
//! Source is tokenized just far enough to see names, import statements and
//! statement boundaries. String literal bodies and comments are skipped, with
//! one exception: f-string bodies can hold expressions, so every identifier
//! inside them is screened as if it were code.
//!
//! Python folds identifiers to NFKC, so `ｏｐｅｎ` names the same builtin as
//! `open`. Code outside literals must therefore be plain ASCII.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::types::SandboxConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("import of module '{0}' is not allowed")]
    ForbiddenImport(String),

    #[error("use of '{0}' is not allowed")]
    ForbiddenName(String),

    #[error("source contains forbidden sequence '{0}'")]
    ForbiddenMarker(String),

    #[error("unterminated string literal starting on line {0}")]
    UnterminatedString(usize),

    #[error("non-ASCII character '{ch}' outside a string literal on line {line}")]
    NonAsciiCode { ch: char, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Punct(char),
    /// End of a logical statement (`\n` or `;`).
    End,
}

/// Checks `source` against the configured allow-list and deny-lists.
///
/// # Errors
/// Returns the first [`PolicyViolation`] found.
pub fn screen_source(source: &str, config: &SandboxConfig) -> Result<(), PolicyViolation> {
    if let Some(marker) = config
        .forbidden_markers
        .iter()
        .find(|m| source.contains(m.as_str()))
    {
        return Err(PolicyViolation::ForbiddenMarker(marker.clone()));
    }

    let tokens = tokenize(source)?;
    check_tokens(&tokens, &config.allowed_modules, &config.forbidden_names)
}

fn check_tokens(
    tokens: &[Token],
    allowed: &BTreeSet<String>,
    forbidden: &BTreeSet<String>,
) -> Result<(), PolicyViolation> {
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Name(name) if name == "from" && at_statement_start(tokens, i) => {
                i += 1;
                match tokens.get(i) {
                    Some(Token::Name(module)) => check_module(module, allowed)?,
                    Some(Token::Punct('.')) => {
                        return Err(PolicyViolation::ForbiddenImport(".".to_string()));
                    }
                    _ => {}
                }
                // Imported member names are not modules; skip to the end.
                while i < tokens.len() && tokens[i] != Token::End {
                    if let Token::Name(n) = &tokens[i] {
                        check_name(n, forbidden)?;
                    }
                    i += 1;
                }
            }
            Token::Name(name) if name == "import" => {
                i = check_import_list(tokens, i + 1, allowed)?;
            }
            Token::Name(name) => check_name(name, forbidden)?,
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

/// Walks `import a.b as c, d` and returns the index of the terminating token.
fn check_import_list(
    tokens: &[Token],
    mut i: usize,
    allowed: &BTreeSet<String>,
) -> Result<usize, PolicyViolation> {
    let mut expect_module = true;
    let mut skip_alias = false;
    while i < tokens.len() && tokens[i] != Token::End {
        match &tokens[i] {
            Token::Name(n) if n == "as" => skip_alias = true,
            Token::Name(_) if skip_alias => skip_alias = false,
            Token::Name(module) if expect_module => {
                check_module(module, allowed)?;
                expect_module = false;
            }
            Token::Punct(',') => expect_module = true,
            _ => {}
        }
        i += 1;
    }
    Ok(i)
}

fn at_statement_start(tokens: &[Token], i: usize) -> bool {
    i == 0 || matches!(tokens[i - 1], Token::End | Token::Punct(':'))
}

fn check_module(module: &str, allowed: &BTreeSet<String>) -> Result<(), PolicyViolation> {
    if allowed.contains(module) {
        Ok(())
    } else {
        Err(PolicyViolation::ForbiddenImport(module.to_string()))
    }
}

fn check_name(name: &str, forbidden: &BTreeSet<String>) -> Result<(), PolicyViolation> {
    if forbidden.contains(name) {
        Err(PolicyViolation::ForbiddenName(name.to_string()))
    } else {
        Ok(())
    }
}

const fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.as_bytes(),
        [b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F']
            | [b'r' | b'R', b'b' | b'B' | b'f' | b'F']
            | [b'b' | b'B' | b'f' | b'F', b'r' | b'R']
    )
}

fn tokenize(source: &str) -> Result<Vec<Token>, PolicyViolation> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                tokens.push(Token::End);
                i += 1;
            }
            ';' => {
                tokens.push(Token::End);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                line += 1;
                i += 2;
            }
            '\'' | '"' => {
                i = skip_string(&chars, i, &mut line)?;
            }
            c if !c.is_ascii() => return Err(PolicyViolation::NonAsciiCode { ch: c, line }),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if is_string_prefix(&word) && matches!(chars.get(i), Some('\'' | '"')) {
                    let formatted = word.contains(['f', 'F']);
                    let body_start = i;
                    i = skip_string(&chars, i, &mut line)?;
                    if formatted {
                        let body: String = chars[body_start..i].iter().collect();
                        for expr in fstring_expressions(&body) {
                            if let Some(ch) = expr.chars().find(|c| !c.is_ascii()) {
                                return Err(PolicyViolation::NonAsciiCode { ch, line });
                            }
                            tokens.extend(identifiers(expr).map(Token::Name));
                        }
                    }
                } else {
                    tokens.push(Token::Name(word));
                }
            }
            c if c.is_whitespace() => i += 1,
            c => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Returns the index just past the literal that opens at `start`.
fn skip_string(
    chars: &[char],
    start: usize,
    line: &mut usize,
) -> Result<usize, PolicyViolation> {
    let quote = chars[start];
    let opened_on = *line;
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut i = if triple { start + 3 } else { start + 1 };

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    *line += 1;
                }
                i += 2;
            }
            '\n' if !triple => return Err(PolicyViolation::UnterminatedString(opened_on)),
            '\n' => {
                *line += 1;
                i += 1;
            }
            c if c == quote => {
                if !triple {
                    return Ok(i + 1);
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return Ok(i + 3);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    Err(PolicyViolation::UnterminatedString(opened_on))
}

/// Replacement fields of an f-string body, without their braces. `{{` and
/// `}}` are literal braces.
fn fstring_expressions(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut exprs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if depth == 0 && bytes.get(i + 1) == Some(&b'{') => i += 1,
            b'{' => {
                if depth == 0 {
                    start = i + 1;
                }
                depth += 1;
            }
            b'}' if depth == 1 => {
                exprs.push(&body[start..i]);
                depth = 0;
            }
            b'}' if depth > 1 => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    if depth > 0 {
        exprs.push(&body[start..]);
    }
    exprs
}

fn identifiers(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.starts_with(|c: char| c.is_alphabetic() || c == '_'))
        .map(ToString::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn screen(src: &str) -> Result<(), PolicyViolation> {
        screen_source(src, &SandboxConfig::default())
    }

    #[test]
    fn test_allows_whitelisted_imports() {
        let src = "import math, json as j\nfrom datetime import date\nprint(math.sqrt(16))";
        assert!(screen(src).is_ok());
    }

    #[test]
    fn test_rejects_unlisted_import() {
        assert_eq!(
            screen("import os").unwrap_err(),
            PolicyViolation::ForbiddenImport("os".to_string())
        );
        assert_eq!(
            screen("import math, subprocess").unwrap_err(),
            PolicyViolation::ForbiddenImport("subprocess".to_string())
        );
    }

    #[test]
    fn test_rejects_dotted_and_from_imports() {
        assert_eq!(
            screen("import os.path").unwrap_err(),
            PolicyViolation::ForbiddenImport("os".to_string())
        );
        assert_eq!(
            screen("from shutil import rmtree").unwrap_err(),
            PolicyViolation::ForbiddenImport("shutil".to_string())
        );
        assert_eq!(
            screen("from . import sibling").unwrap_err(),
            PolicyViolation::ForbiddenImport(".".to_string())
        );
    }

    #[test]
    fn test_import_after_semicolon_or_colon() {
        assert!(screen("x = 1; import socket").is_err());
        assert!(screen("if True: import socket").is_err());
    }

    #[test]
    fn test_rejects_forbidden_names() {
        assert_eq!(
            screen("eval('1+1')").unwrap_err(),
            PolicyViolation::ForbiddenName("eval".to_string())
        );
        assert_eq!(
            screen("f = open('x.txt')").unwrap_err(),
            PolicyViolation::ForbiddenName("open".to_string())
        );
    }

    #[test]
    fn test_names_inside_plain_strings_are_ignored() {
        assert!(screen("print('please open the door')").is_ok());
        assert!(screen("# exec is mentioned only here\nprint(1)").is_ok());
    }

    #[test]
    fn test_names_inside_fstrings_are_screened() {
        assert!(screen("x = f\"{eval('2')}\"").is_err());
    }

    #[test]
    fn test_forbidden_name_is_token_not_substring() {
        assert!(screen("direction = 'north'\nprint(direction)").is_ok());
    }

    #[test]
    fn test_rejects_dunder_and_decorator_markers() {
        assert_eq!(
            screen("__import__('os')").unwrap_err(),
            PolicyViolation::ForbiddenMarker("__".to_string())
        );
        assert!(matches!(
            screen("@decorator\ndef f(): pass"),
            Err(PolicyViolation::ForbiddenMarker(_))
        ));
    }

    #[test]
    fn test_raise_from_is_not_an_import() {
        let src = "try:\n    x = 1\nexcept ValueError as err:\n    raise KeyError('k') from err";
        assert!(screen(src).is_ok());
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let src = "doc = \"\"\"import os\nopen\"\"\"\nprint(doc)";
        assert!(screen(src).is_ok());
    }

    #[test]
    fn test_rejects_fullwidth_identifiers() {
        assert_eq!(
            screen("print(ｏｐｅｎ('/etc/hostname').read())").unwrap_err(),
            PolicyViolation::NonAsciiCode { ch: 'ｏ', line: 1 }
        );
        assert!(matches!(
            screen("x = 1\n＿＿import＿＿('os')"),
            Err(PolicyViolation::NonAsciiCode { line: 2, .. })
        ));
        assert!(matches!(
            screen("x = f\"{ｅｖａｌ('2')}\""),
            Err(PolicyViolation::NonAsciiCode { .. })
        ));
    }

    #[test]
    fn test_non_ascii_text_in_literals_is_allowed() {
        assert!(screen("print('Grüße, ｏｐｅｎ')").is_ok());
        assert!(screen("name = 'Zoë'\nprint(f\"café {name}\")").is_ok());
    }

    #[test]
    fn test_rejects_module_attribute_chains() {
        let src = "import json\nm = json.codecs.sys.modules\nprint(m['posix'].listdir('/'))";
        assert_eq!(
            screen(src).unwrap_err(),
            PolicyViolation::ForbiddenName("codecs".to_string())
        );
        assert!(screen("import re\nprint(re.sys)").is_err());
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            screen("x = 'abc\nprint(x)").unwrap_err(),
            PolicyViolation::UnterminatedString(1)
        );
    }
}
