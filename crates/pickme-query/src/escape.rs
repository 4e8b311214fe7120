//! Tokenize a raw query and quote it into a BM25-safe FTS5 MATCH expression.

/// FTS5-special characters that must never reach the MATCH expression
/// unescaped; they're replaced with a space before re-splitting into atoms.
const FTS5_SPECIAL: &[char] = &['"', '\'', '(', ')', '*', '^', ':', '+', '-', '|', '\\', '/'];

/// The result of escaping a raw query: a MATCH expression, and whether the
/// last token in it is a quoted phrase (which must never get a trailing `*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapedQuery {
    pub expression: String,
    pub last_is_phrase: bool,
}

/// One raw part of the query: either a quoted phrase or an unquoted run of
/// non-whitespace text.
enum Part {
    Quoted(String),
    Bare(String),
}

/// Split `raw` into quoted and unquoted parts, tracking balanced single and
/// double quotes.
fn split_parts(raw: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut current = String::new();

    while let Some(&ch) = chars.peek() {
        match ch {
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                if !current.is_empty() {
                    parts.push(Part::Bare(std::mem::take(&mut current)));
                }
                let mut phrase = String::new();
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                    phrase.push(c);
                }
                parts.push(Part::Quoted(phrase));
            }
            c if c.is_whitespace() => {
                chars.next();
                if !current.is_empty() {
                    parts.push(Part::Bare(std::mem::take(&mut current)));
                }
            }
            _ => {
                chars.next();
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        parts.push(Part::Bare(current));
    }
    parts
}

/// Break one part's text into token atoms: replace FTS5-special characters
/// with a space, then split on whitespace/`/`/`\`/`.`/`_`/`-`, dropping
/// empties.
fn atomize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if FTS5_SPECIAL.contains(&c) { ' ' } else { c })
        .collect();
    cleaned
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '\\' | '.' | '_' | '-'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn quote_phrase(atoms: &[String]) -> String {
    let joined = atoms.join(" ").replace('"', "\"\"");
    format!("\"{joined}\"")
}

/// Escape `raw` into a MATCH expression, applying a trailing prefix
/// wildcard to the final token unless it's a phrase.
pub fn escape_query(raw: &str) -> EscapedQuery {
    let parts = split_parts(raw);
    let mut tokens: Vec<String> = Vec::new();
    let mut last_is_phrase = false;

    for part in parts {
        match part {
            Part::Quoted(text) => {
                let atoms = atomize(&text);
                if atoms.is_empty() {
                    continue;
                }
                tokens.push(quote_phrase(&atoms));
                last_is_phrase = true;
            }
            Part::Bare(text) => {
                let atoms = atomize(&text);
                for atom in atoms {
                    tokens.push(format!("\"{atom}\""));
                    last_is_phrase = false;
                }
            }
        }
    }

    if tokens.is_empty() {
        return EscapedQuery {
            expression: String::new(),
            last_is_phrase: false,
        };
    }

    if !last_is_phrase {
        let last = tokens.last_mut().unwrap();
        last.push('*');
    }

    EscapedQuery {
        expression: tokens.join(" "),
        last_is_phrase,
    }
}
