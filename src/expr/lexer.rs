//! IV-003: Lexer for the embedded expression language.
//!
//! Fractional number literals are lexed but carry their source text;
//! they become a fatal float error at evaluation, where the message can
//! point at `decimal("...")` as the remedy.

use crate::errors::InvariantError;
use num_bigint::BigInt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(BigInt),
    /// Fractional literal, kept as source text. Never a value.
    Float(String),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl Token {
    /// Short description for parser diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(i) => format!("integer '{}'", i),
            Token::Float(s) => format!("fractional literal '{}'", s),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
        }
    }
}

fn err(msg: String) -> InvariantError {
    InvariantError::Resolution(msg)
}

/// Tokenize an expression source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, InvariantError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            // A '.' followed by a digit makes this a fractional literal.
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Float(text));
            } else {
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<BigInt>()
                    .map_err(|_| err(format!("invalid integer literal '{}'", text)))?;
                tokens.push(Token::Int(value));
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut text = String::new();
            let mut closed = false;
            while i < chars.len() {
                let ch = chars[i];
                if ch == '\\' {
                    let esc = chars.get(i + 1).copied().ok_or_else(|| {
                        err("unterminated escape at end of string literal".to_string())
                    })?;
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        other => {
                            return Err(err(format!("unknown escape '\\{}' in string", other)))
                        }
                    });
                    i += 2;
                    continue;
                }
                if ch == quote {
                    closed = true;
                    i += 1;
                    break;
                }
                text.push(ch);
                i += 1;
            }
            if !closed {
                return Err(err(format!("unterminated string literal starting with {}", quote)));
            }
            tokens.push(Token::Str(text));
            continue;
        }

        let two: Option<Token> = if i + 1 < chars.len() {
            match (c, chars[i + 1]) {
                ('=', '=') => Some(Token::EqEq),
                ('!', '=') => Some(Token::NotEq),
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                ('&', '&') => Some(Token::AndAnd),
                ('|', '|') => Some(Token::OrOr),
                _ => None,
            }
        } else {
            None
        };
        if let Some(tok) = two {
            tokens.push(tok);
            i += 2;
            continue;
        }

        let one = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' => Token::Bang,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '?' => Token::Question,
            ':' => Token::Colon,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            other => return Err(err(format!("unexpected character '{}' in expression", other))),
        };
        tokens.push(one);
        i += 1;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iv003_basic_tokens() {
        let toks = tokenize("x + 12 * y").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".to_string()),
                Token::Plus,
                Token::Int(BigInt::from(12)),
                Token::Star,
                Token::Ident("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_iv003_fractional_literal_is_lexed_not_parsed() {
        let toks = tokenize("3.14").unwrap();
        assert_eq!(toks, vec![Token::Float("3.14".to_string())]);
    }

    #[test]
    fn test_iv003_field_access_is_dot() {
        let toks = tokenize("x.value").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".to_string()),
                Token::Dot,
                Token::Ident("value".to_string()),
            ]
        );
    }

    #[test]
    fn test_iv003_both_quote_styles() {
        assert_eq!(
            tokenize("\"ab\"").unwrap(),
            vec![Token::Str("ab".to_string())]
        );
        assert_eq!(tokenize("'ab'").unwrap(), vec![Token::Str("ab".to_string())]);
    }

    #[test]
    fn test_iv003_string_escapes() {
        assert_eq!(
            tokenize(r#""a\"b\n""#).unwrap(),
            vec![Token::Str("a\"b\n".to_string())]
        );
    }

    #[test]
    fn test_iv003_two_char_operators() {
        let toks = tokenize("a <= b && c != d").unwrap();
        assert!(toks.contains(&Token::Le));
        assert!(toks.contains(&Token::AndAnd));
        assert!(toks.contains(&Token::NotEq));
    }

    #[test]
    fn test_iv003_unterminated_string() {
        let e = tokenize("\"abc").unwrap_err();
        assert!(e.to_string().contains("unterminated"));
    }

    #[test]
    fn test_iv003_unexpected_character() {
        let e = tokenize("a @ b").unwrap_err();
        assert!(e.to_string().contains("'@'"));
    }

    #[test]
    fn test_iv003_keywords() {
        assert_eq!(
            tokenize("true false null").unwrap(),
            vec![Token::True, Token::False, Token::Null]
        );
    }
}
