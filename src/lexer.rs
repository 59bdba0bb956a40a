use crate::error::{Error, Result};

/// Leading marker that selects the class of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    BlockOpen,  // #
    BlockClose, // /
    Inverted,   // ^
    Partial,    // >
    Comment,    // !
    Data,       // @
    Parent,     // ..
    This,       // . or this
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    ExprStart, // {{
    ExprEnd,   // }}
    Word { value: String, sigil: Option<Sigil> },
    StringLiteral(String),
}

impl Token {
    pub(crate) fn word(value: impl Into<String>, sigil: Option<Sigil>) -> Self {
        Token::Word {
            value: value.into(),
            sigil,
        }
    }
}

/// Tokenize a whole template.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    in_tag: bool,
    // Offset of the `{{` that opened the current tag, for error positions.
    tag_start: usize,
    // No word has been read yet in the current tag.
    at_head: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            in_tag: false,
            tag_start: 0,
            at_head: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        let skipped = rest.len() - rest.trim_start().len();
        self.advance(skipped);
    }

    fn unterminated(&self) -> Error {
        Error::lex(self.input, self.tag_start, "unterminated expression, missing `}}`")
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if self.in_tag {
            return self.next_in_tag().map(Some);
        }

        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }

        match rest.find("{{") {
            Some(0) => {
                self.tag_start = self.cursor;
                self.advance(2);
                self.in_tag = true;
                self.at_head = true;
                Ok(Some(Token::ExprStart))
            }
            Some(idx) => {
                let text = rest[..idx].to_string();
                self.advance(idx);
                Ok(Some(Token::Text(text)))
            }
            None => {
                let text = rest.to_string();
                self.advance(rest.len());
                Ok(Some(Token::Text(text)))
            }
        }
    }

    fn next_in_tag(&mut self) -> Result<Token> {
        if self.at_head && self.remaining().starts_with('!') {
            return self.comment();
        }

        self.skip_whitespace();
        let rest = self.remaining();
        if rest.is_empty() {
            return Err(self.unterminated());
        }

        if rest.starts_with("}}") {
            self.advance(2);
            self.in_tag = false;
            return Ok(Token::ExprEnd);
        }

        let first = match rest.chars().next() {
            Some(c) => c,
            None => return Err(self.unterminated()),
        };

        if first == '"' || first == '\'' {
            self.at_head = false;
            return self.string_literal(first);
        }

        if self.at_head {
            self.at_head = false;
            let sigil = match first {
                '#' => Some(Sigil::BlockOpen),
                '/' => Some(Sigil::BlockClose),
                '^' => Some(Sigil::Inverted),
                '>' => Some(Sigil::Partial),
                _ => None,
            };
            if let Some(sigil) = sigil {
                self.advance(1);
                self.skip_whitespace();
                if self.remaining().is_empty() {
                    return Err(self.unterminated());
                }
                // `{{^}}` carries no name.
                if self.remaining().starts_with("}}") {
                    return Ok(Token::word("", Some(sigil)));
                }
                let value = self.read_word();
                return Ok(Token::word(value, Some(sigil)));
            }
        }

        let value = self.read_word();
        let sigil = path_sigil(&value);
        Ok(Token::word(value, sigil))
    }

    /// Reads up to whitespace or the closing delimiter.
    fn read_word(&mut self) -> String {
        let rest = self.remaining();
        let mut end = rest.len();
        for (idx, c) in rest.char_indices() {
            if c.is_whitespace() || rest[idx..].starts_with("}}") {
                end = idx;
                break;
            }
        }
        let word = rest[..end].to_string();
        self.advance(end);
        word
    }

    fn comment(&mut self) -> Result<Token> {
        self.at_head = false;
        let rest = self.remaining();
        let (body, consumed) = if let Some(long) = rest.strip_prefix("!--") {
            let end = long.find("--}}").ok_or_else(|| {
                Error::lex(self.input, self.tag_start, "unterminated comment, missing `--}}`")
            })?;
            (&long[..end], 3 + end + 2)
        } else {
            let end = rest.find("}}").ok_or_else(|| self.unterminated())?;
            (&rest[1..end], end)
        };
        let token = Token::word(body.trim(), Some(Sigil::Comment));
        self.advance(consumed);
        Ok(token)
    }

    fn string_literal(&mut self, quote: char) -> Result<Token> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token::StringLiteral(s));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err(Error::lex(self.input, self.tag_start, "unterminated string literal"))
    }
}

fn path_sigil(word: &str) -> Option<Sigil> {
    if word.starts_with('@') {
        Some(Sigil::Data)
    } else if word.starts_with("..") {
        Some(Sigil::Parent)
    } else if word == "."
        || word == "this"
        || word.starts_with("./")
        || word.starts_with("this.")
        || word.starts_with("this/")
    {
        Some(Sigil::This)
    } else {
        None
    }
}
