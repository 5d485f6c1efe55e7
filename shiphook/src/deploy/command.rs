//! Command-line tokenizer
//!
//! Splits a run script into a program and its arguments using shell-style
//! quoting rules, without handing the line to a shell:
//!
//! - unquoted whitespace separates tokens
//! - `'single quotes'` keep everything literally
//! - `"double quotes"` keep whitespace; `\"`, `\\`, `` \` `` and `\$` are escapes
//! - outside quotes a backslash escapes the next character
//! - quoted and unquoted pieces next to each other form one token
//!
//! No expansion of any kind happens: `$HOME`, globs and `~` reach the program
//! as written.

use thiserror::Error;

/// Used when the configured run script is empty or only whitespace
pub const DEFAULT_COMMAND: [&str; 3] = ["npm", "run", "deploy"];

/// A tokenized command ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Parse a run script; empty input yields `npm run deploy`
    pub fn parse(line: &str) -> Result<Self, TokenizeError> {
        let mut tokens = tokenize(line)?.into_iter();
        match tokens.next() {
            Some(program) => Ok(Self {
                program,
                args: tokens.collect(),
            }),
            None => Ok(Self::default()),
        }
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        Self {
            program: DEFAULT_COMMAND[0].to_string(),
            args: DEFAULT_COMMAND[1..].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("unterminated {0} quote in run script")]
    UnterminatedQuote(&'static str),

    #[error("run script ends with a dangling backslash")]
    DanglingEscape,
}

/// Split `line` into tokens. Returns an empty list for blank input.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty argument) from no token at all.
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(TokenizeError::UnterminatedQuote("single")),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(TokenizeError::UnterminatedQuote("double")),
                        },
                        Some(c) => current.push(c),
                        None => return Err(TokenizeError::UnterminatedQuote("double")),
                    }
                }
            }
            '\\' => match chars.next() {
                // line continuation
                Some('\n') => {}
                Some(c) => {
                    in_token = true;
                    current.push(c);
                }
                None => return Err(TokenizeError::DanglingEscape),
            },
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
