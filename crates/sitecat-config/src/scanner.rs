//! Tokenizer for the legacy pool config format.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::{ConfigError, ConfigResult};

/// Words that open an attribute line or a pool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedWord {
    Pool,
    Universe,
    Lrc,
    Gridlaunch,
    Workdir,
    Gridftp,
    Profile,
    Sysinfo,
}

impl ReservedWord {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "pool" => Some(Self::Pool),
            "universe" => Some(Self::Universe),
            "lrc" => Some(Self::Lrc),
            "gridlaunch" => Some(Self::Gridlaunch),
            "workdir" => Some(Self::Workdir),
            "gridftp" => Some(Self::Gridftp),
            "profile" => Some(Self::Profile),
            "sysinfo" => Some(Self::Sysinfo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Universe => "universe",
            Self::Lrc => "lrc",
            Self::Gridlaunch => "gridlaunch",
            Self::Workdir => "workdir",
            Self::Gridftp => "gridftp",
            Self::Profile => "profile",
            Self::Sysinfo => "sysinfo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Reserved(ReservedWord),
    Identifier(String),
    QuotedString(String),
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Semicolon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Reserved(word) => write!(f, "reserved word \"{}\"", word.as_str()),
            Token::Identifier(id) => write!(f, "identifier \"{}\"", id),
            Token::QuotedString(s) => write!(f, "quoted string \"{}\"", s),
            Token::OpenBrace => f.write_str("'{'"),
            Token::CloseBrace => f.write_str("'}'"),
            Token::OpenParen => f.write_str("'('"),
            Token::CloseParen => f.write_str("')'"),
            Token::Semicolon => f.write_str("';'"),
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ':' | '@' | '+')
}

/// True when `word` scans as a single identifier token.
pub fn is_identifier(word: &str) -> bool {
    !word.is_empty()
        && word.chars().all(is_identifier_char)
        && ReservedWord::from_word(word).is_none()
}

/// Lazy token stream over pool config text.
///
/// Yields `Err` once on the first lexical error and then ends.
pub struct Scanner<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    failed: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            failed: false,
        }
    }

    /// Current 1-based line.
    pub fn line(&self) -> usize {
        self.line
    }

    fn lexical(&mut self, message: impl Into<String>) -> ConfigError {
        self.failed = true;
        ConfigError::Lexical {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.peek() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                '#' => {
                    while self.chars.next_if(|&c| c != '\n').is_some() {}
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                _ => break,
            }
        }
    }

    fn quoted(&mut self) -> ConfigResult<Token> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None | Some('\n') => return Err(self.lexical("unterminated quoted string")),
                Some('\\') => match self.chars.next() {
                    None | Some('\n') => {
                        return Err(self.lexical("unterminated quoted string"));
                    }
                    Some(c) => value.push(c),
                },
                Some('"') => return Ok(Token::QuotedString(value)),
                Some(c) => value.push(c),
            }
        }
    }

    fn word(&mut self, first: char) -> Token {
        let mut word = String::from(first);
        while let Some(c) = self.chars.next_if(|&c| is_identifier_char(c)) {
            word.push(c);
        }
        match ReservedWord::from_word(&word) {
            Some(reserved) => Token::Reserved(reserved),
            None => Token::Identifier(word),
        }
    }

    /// Next token, `Ok(None)` at end of input.
    pub fn next_token(&mut self) -> ConfigResult<Option<Token>> {
        if self.failed {
            return Ok(None);
        }
        self.skip_blank();
        let Some(c) = self.chars.next() else {
            return Ok(None);
        };
        let token = match c {
            '{' => Token::OpenBrace,
            '}' => Token::CloseBrace,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            ';' => Token::Semicolon,
            '"' => self.quoted()?,
            c if is_identifier_char(c) => self.word(c),
            other => return Err(self.lexical(format!("unrecognized character '{}'", other))),
        };
        Ok(Some(token))
    }
}

impl Iterator for Scanner<'_> {
    type Item = ConfigResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Scanner::new(input).collect::<ConfigResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_profile_line() {
        assert_eq!(
            tokens(r#"profile env "PATH" "/usr/bin""#),
            vec![
                Token::Reserved(ReservedWord::Profile),
                Token::Identifier("env".to_string()),
                Token::QuotedString("PATH".to_string()),
                Token::QuotedString("/usr/bin".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_and_punctuation() {
        let input = "# a comment\npool isi { } ( ) ; # trailing\n";
        assert_eq!(
            tokens(input),
            vec![
                Token::Reserved(ReservedWord::Pool),
                Token::Identifier("isi".to_string()),
                Token::OpenBrace,
                Token::CloseBrace,
                Token::OpenParen,
                Token::CloseParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_escape_in_quoted_string() {
        assert_eq!(
            tokens(r#""say \"hi\" \\ now""#),
            vec![Token::QuotedString(r#"say "hi" \ now"#.to_string())]
        );
    }

    #[test]
    fn test_unterminated_quote_reports_line() {
        let mut scanner = Scanner::new("pool x {\n  workdir \"/scratch\n}");
        let result: ConfigResult<Vec<Token>> = scanner.by_ref().collect();
        assert!(matches!(result, Err(ConfigError::Lexical { line: 2, .. })));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_unrecognized_character() {
        let result: ConfigResult<Vec<Token>> = Scanner::new("pool\n\n x = y").collect();
        assert!(matches!(result, Err(ConfigError::Lexical { line: 3, .. })));
    }

    #[test]
    fn test_reserved_words_need_exact_match() {
        assert_eq!(
            tokens("pools universe"),
            vec![
                Token::Identifier("pools".to_string()),
                Token::Reserved(ReservedWord::Universe),
            ]
        );
    }
}
