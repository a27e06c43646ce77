//! Line-oriented source reader producing [`Statement`]s.
//!
//! # Grammar
//!
//! ```text
//! line      := { label ":" } [ statement ] [ ";" comment ]
//! statement := mnemonic [ width ] [ value { "," value } ]
//! width     := byte | word | dword | qword
//! value     := register | number | string | identifier | "[" address "]"
//! address   := term [ ("+" | "-" | "*" | "/") term ]
//! ```
//!
//! - Mnemonics, widths and register names are case-insensitive.
//! - `db/dw/dd/dq/resb/resw/resd/resq` produce [`Statement::Sequence`].
//! - Strings are double-quoted and accept `\n \t \r \0 \\ \" \xHH`.
//! - There is no preprocessor: no macros, no includes.

use crate::virtual_machine::errors::CompileError;
use crate::virtual_machine::operand::{DataType, Operator, Statement, Value};
use crate::virtual_machine::vm::registers::register_index;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const SEQUENCE_DIRECTIVES: [&str; 8] = ["db", "dw", "dd", "dq", "resb", "resw", "resd", "resq"];

/// A statement and the 1-based position of its first token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatement {
    pub line: usize,
    pub column: usize,
    pub statement: Statement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Number(String),
    Str(Vec<u8>),
    Comma,
    Colon,
    Open,
    Close,
    Op(Operator),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// 1-based column in the line.
    column: usize,
}

fn parse_error(line: usize, column: usize, message: impl Into<String>) -> CompileError {
    CompileError::ParseError {
        line,
        column,
        message: message.into(),
    }
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Splits one line into tokens, stopping at a comment.
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = line.chars().collect();
    let mut out = Vec::with_capacity(8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        if c == COMMENT_CHAR {
            break;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let kind = match c {
            ',' => TokenKind::Comma,
            LABEL_SUFFIX => TokenKind::Colon,
            '[' => TokenKind::Open,
            ']' => TokenKind::Close,
            '"' => {
                let (text, next) = read_string(line_no, &chars, i)?;
                out.push(Token {
                    kind: TokenKind::Str(text),
                    column,
                });
                i = next;
                continue;
            }
            c if c.is_ascii_digit() || c == '$' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Token {
                    kind: TokenKind::Number(chars[start..i].iter().collect()),
                    column,
                });
                continue;
            }
            c if is_word_start(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                out.push(Token {
                    kind: TokenKind::Word(chars[start..i].iter().collect()),
                    column,
                });
                continue;
            }
            c => match Operator::from_symbol(c) {
                Some(op) => TokenKind::Op(op),
                None => {
                    return Err(parse_error(
                        line_no,
                        column,
                        format!("unexpected character `{c}`"),
                    ));
                }
            },
        };
        out.push(Token { kind, column });
        i += 1;
    }

    Ok(out)
}

/// Reads a quoted string starting at `chars[start] == '"'`.
///
/// Returns the unescaped bytes and the index after the closing quote. Each
/// escape yields exactly one byte; other characters are stored as UTF-8.
fn read_string(line_no: usize, chars: &[char], start: usize) -> Result<(Vec<u8>, usize), CompileError> {
    let mut text = Vec::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((text, i + 1)),
            '\\' => {
                let escape_column = i + 1;
                let Some(&escaped) = chars.get(i + 1) else {
                    break;
                };
                i += 2;
                match escaped {
                    'n' => text.push(b'\n'),
                    't' => text.push(b'\t'),
                    'r' => text.push(b'\r'),
                    '0' => text.push(0),
                    '\\' => text.push(b'\\'),
                    '"' => text.push(b'"'),
                    'x' => {
                        let digits: String = chars.iter().skip(i).take(2).collect();
                        let value = (digits.len() == 2)
                            .then(|| u8::from_str_radix(&digits, 16).ok())
                            .flatten()
                            .ok_or_else(|| {
                                parse_error(line_no, escape_column, "invalid \\x escape")
                            })?;
                        text.push(value);
                        i += 2;
                    }
                    other => {
                        return Err(parse_error(
                            line_no,
                            escape_column,
                            format!("unknown escape `\\{other}`"),
                        ));
                    }
                }
            }
            c => {
                text.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
                i += 1;
            }
        }
    }
    Err(parse_error(
        line_no,
        start + 1,
        "unterminated string literal (missing closing quote)",
    ))
}

/// Cursor over one line's tokens.
struct LineParser<'a> {
    line: usize,
    tokens: &'a [Token],
    pos: usize,
    /// Column reported when the line ends unexpectedly.
    end_column: usize,
}

impl<'a> LineParser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let column = self.peek().map_or(self.end_column, |t| t.column);
        parse_error(self.line, column, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), CompileError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    fn parse_values(&mut self) -> Result<Vec<Value>, CompileError> {
        let mut values = Vec::new();
        if self.at_end() {
            return Ok(values);
        }
        loop {
            values.push(self.parse_value()?);
            if self.at_end() {
                return Ok(values);
            }
            self.expect(TokenKind::Comma, "`,` between operands")?;
        }
    }

    fn parse_value(&mut self) -> Result<Value, CompileError> {
        let Some(token) = self.next() else {
            return Err(self.error_here("expected operand"));
        };
        match &token.kind {
            TokenKind::Number(text) => Ok(Value::Number(text.clone())),
            TokenKind::Op(Operator::Sub) => match self.next() {
                Some(Token {
                    kind: TokenKind::Number(text),
                    ..
                }) => Ok(Value::Number(format!("-{text}"))),
                _ => Err(parse_error(self.line, token.column, "expected number after `-`")),
            },
            TokenKind::Str(text) => Ok(Value::Str(text.clone())),
            TokenKind::Word(word) => Ok(word_value(word)),
            TokenKind::Open => {
                let inner = self.parse_address()?;
                self.expect(TokenKind::Close, "`]`")?;
                Ok(Value::address_of(inner))
            }
            _ => Err(parse_error(self.line, token.column, "expected operand")),
        }
    }

    /// Parses the expression between `[` and `]`.
    fn parse_address(&mut self) -> Result<Value, CompileError> {
        let base = self.parse_value()?;
        let operator = match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) => {
                self.pos += 1;
                *op
            }
            _ => return Ok(base),
        };
        let offset_column = self.peek().map_or(self.end_column, |t| t.column);
        let offset = self.parse_value()?;

        match (base, offset) {
            (Value::Register(base), Value::Number(offset)) => Ok(Value::RegisterOffsetNumber {
                base,
                operator,
                offset,
            }),
            (Value::Register(base), Value::Register(offset)) => {
                Ok(Value::RegisterOffsetRegister {
                    base,
                    operator,
                    offset,
                })
            }
            (Value::Identifier(label), Value::Number(offset)) => Ok(Value::LabelOffsetNumber {
                label,
                operator,
                offset,
            }),
            (Value::Identifier(label), Value::Register(offset)) => {
                Ok(Value::LabelOffsetRegister {
                    label,
                    operator,
                    offset,
                })
            }
            (Value::Register(_) | Value::Identifier(_), _) => Err(parse_error(
                self.line,
                offset_column,
                "address offset must be a number or a register",
            )),
            _ => Err(parse_error(
                self.line,
                self.end_column,
                "address base must be a register or a label",
            )),
        }
    }
}

fn word_value(word: &str) -> Value {
    match register_index(word) {
        Some(index) => Value::Register(index),
        None => Value::Identifier(word.to_string()),
    }
}

fn parse_line(line_no: usize, line: &str, out: &mut Vec<SourceStatement>) -> Result<(), CompileError> {
    let tokens = tokenize(line_no, line)?;
    let mut parser = LineParser {
        line: line_no,
        tokens: &tokens,
        pos: 0,
        end_column: line.trim_end().chars().count() + 1,
    };

    while let (Some(name), Some(colon)) = (tokens.get(parser.pos), tokens.get(parser.pos + 1)) {
        let (TokenKind::Word(label), TokenKind::Colon) = (&name.kind, &colon.kind) else {
            break;
        };
        out.push(SourceStatement {
            line: line_no,
            column: name.column,
            statement: Statement::Label(label.clone()),
        });
        parser.pos += 2;
    }

    let Some(head) = parser.next() else {
        return Ok(());
    };
    let TokenKind::Word(name) = &head.kind else {
        return Err(parse_error(line_no, head.column, "expected mnemonic"));
    };

    let lowered = name.to_ascii_lowercase();
    let statement = if SEQUENCE_DIRECTIVES.contains(&lowered.as_str()) {
        Statement::Sequence {
            name: lowered,
            values: parser.parse_values()?,
        }
    } else {
        let data_type = match parser.peek() {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) => match DataType::from_keyword(word) {
                Some(data_type) => {
                    parser.pos += 1;
                    data_type
                }
                None => DataType::Unset,
            },
            _ => DataType::Unset,
        };
        Statement::Instruction {
            name: name.clone(),
            data_type,
            args: parser.parse_values()?,
        }
    };

    out.push(SourceStatement {
        line: line_no,
        column: head.column,
        statement,
    });
    Ok(())
}

/// Parses a whole source text.
pub fn parse(source: &str) -> Result<Vec<SourceStatement>, CompileError> {
    let mut out = Vec::new();
    for (index, line) in source.lines().enumerate() {
        parse_line(index + 1, line, &mut out)?;
    }
    Ok(out)
}

/// Parses a source text and drops the positions.
pub fn parse_statements(source: &str) -> Result<Vec<Statement>, CompileError> {
    Ok(parse(source)?.into_iter().map(|s| s.statement).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(source: &str) -> Vec<Statement> {
        parse_statements(source).unwrap()
    }

    #[test]
    fn parse_empty_and_comments() {
        assert!(statements("").is_empty());
        assert!(statements("   ; nothing here\n\n\t;\n").is_empty());
    }

    #[test]
    fn parse_label_and_instruction_on_one_line() {
        assert_eq!(
            statements("_start: mov x0, 5 ; load"),
            vec![
                Statement::Label("_start".into()),
                Statement::instruction(
                    "mov",
                    vec![Value::Register(0), Value::Number("5".into())]
                ),
            ]
        );
    }

    #[test]
    fn parse_width_qualifier() {
        assert_eq!(
            statements("MOV DWORD [fp - 8], X3"),
            vec![Statement::Instruction {
                name: "MOV".into(),
                data_type: DataType::Dword,
                args: vec![
                    Value::address_of(Value::RegisterOffsetNumber {
                        base: 17,
                        operator: Operator::Sub,
                        offset: "8".into(),
                    }),
                    Value::Register(3),
                ],
            }]
        );
    }

    #[test]
    fn parse_address_forms() {
        let parsed = statements(
            "push [table]\npush [table + x1]\npush [table * 4]\npush [sp + x2]\npush [0x10]",
        );
        let inner: Vec<Value> = parsed
            .into_iter()
            .map(|s| match s {
                Statement::Instruction { mut args, .. } => match args.remove(0) {
                    Value::AddressOf(inner) => *inner,
                    other => panic!("expected address, got {other:?}"),
                },
                other => panic!("expected instruction, got {other:?}"),
            })
            .collect();
        assert_eq!(
            inner,
            vec![
                Value::Identifier("table".into()),
                Value::LabelOffsetRegister {
                    label: "table".into(),
                    operator: Operator::Add,
                    offset: 1,
                },
                Value::LabelOffsetNumber {
                    label: "table".into(),
                    operator: Operator::Mul,
                    offset: "4".into(),
                },
                Value::RegisterOffsetRegister {
                    base: 18,
                    operator: Operator::Add,
                    offset: 2,
                },
                Value::Number("0x10".into()),
            ]
        );
    }

    #[test]
    fn parse_sequences() {
        assert_eq!(
            statements("msg: DB \"hi\\n\", 0\nbuf: resq 4\nneg: dw -1"),
            vec![
                Statement::Label("msg".into()),
                Statement::Sequence {
                    name: "db".into(),
                    values: vec![Value::Str("hi\n".into()), Value::Number("0".into())],
                },
                Statement::Label("buf".into()),
                Statement::Sequence {
                    name: "resq".into(),
                    values: vec![Value::Number("4".into())],
                },
                Statement::Label("neg".into()),
                Statement::Sequence {
                    name: "dw".into(),
                    values: vec![Value::Number("-1".into())],
                },
            ]
        );
    }

    #[test]
    fn parse_section_directive() {
        assert_eq!(
            statements(".section data"),
            vec![Statement::instruction(
                ".section",
                vec![Value::Identifier("data".into())]
            )]
        );
    }

    #[test]
    fn parse_string_escapes() {
        assert_eq!(
            statements(r#"db "a\tb\x41\"\\\0""#),
            vec![Statement::Sequence {
                name: "db".into(),
                values: vec![Value::Str("a\tbA\"\\\0".into())],
            }]
        );
    }

    #[test]
    fn hex_escape_is_one_byte() {
        assert_eq!(
            statements(r#"db "\xff\x80é""#),
            vec![Statement::Sequence {
                name: "db".into(),
                values: vec![Value::Str(vec![0xFF, 0x80, 0xC3, 0xA9])],
            }]
        );
    }

    #[test]
    fn parse_hex_dollar_number() {
        assert_eq!(
            statements("mov x0, $ff"),
            vec![Statement::instruction(
                "mov",
                vec![Value::Register(0), Value::Number("$ff".into())]
            )]
        );
    }

    #[test]
    fn unterminated_string_is_located() {
        let err = parse("  db \"open").unwrap_err();
        assert_eq!(err.location(), Some((1, 6)));
    }

    #[test]
    fn unknown_escape_is_rejected() {
        assert!(matches!(
            parse(r#"db "\q""#),
            Err(CompileError::ParseError { column: 5, .. })
        ));
    }

    #[test]
    fn missing_comma_is_rejected() {
        let err = parse("mov x0 x1").unwrap_err();
        assert_eq!(err.location(), Some((1, 8)));
    }

    #[test]
    fn missing_close_bracket() {
        let err = parse("pop [x1").unwrap_err();
        assert_eq!(err.location(), Some((1, 8)));
        assert_eq!(err.message(), "expected `]`");
    }

    #[test]
    fn number_base_is_rejected() {
        assert!(matches!(
            parse("push [4 + x1]"),
            Err(CompileError::ParseError { .. })
        ));
    }

    #[test]
    fn label_offset_by_label_is_rejected() {
        assert!(matches!(
            parse("push [a + b]"),
            Err(CompileError::ParseError { column: 11, .. })
        ));
    }

    #[test]
    fn unexpected_character() {
        assert_eq!(
            parse("mov x0, @1"),
            Err(CompileError::ParseError {
                line: 1,
                column: 9,
                message: "unexpected character `@`".into(),
            })
        );
    }

    #[test]
    fn positions_are_reported() {
        let parsed = parse("\n  start:\n\thlt").unwrap();
        assert_eq!(parsed[0].line, 2);
        assert_eq!(parsed[0].column, 3);
        assert_eq!(parsed[1].line, 3);
        assert_eq!(parsed[1].column, 2);
    }
}
