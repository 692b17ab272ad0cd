//! Single pass compiler from source text to a bytecode [`Function`].
//!
//! Every token is an instruction of its own, with the exception of `( op )` and
//! `=> name` which span a few tokens. There is no syntax tree: bytes are emitted as the
//! tokens come in, with one token of lookahead.

pub mod chunk;
pub mod disassemble;

use core::fmt;

use crate::{
    lexer::{Lexeme, LexerError, Scanner, Span, Token},
    runtime::{operation::Operator, Vm, WHILE_CONDITION},
    world::{
        object::{Function, Object},
        value::{ObjRef, Value},
    },
};
use chunk::{Chunk, OpCode, MAX_CONSTANTS};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("Must have operator before closing ')'.")]
    EmptyParens,
    #[error("Operator is not allowed inside '(' ')'.")]
    NotAnOperator,
    #[error("Missing closing ')'.")]
    MissingCloseParen,
    #[error("Expect procedure name after '=>'.")]
    MissingProcedureName,
    #[error("Too many constants in one chunk.")]
    TooManyConstants,
    #[error("Token not allowed.")]
    TokenNotAllowed,
}

/// Where an error is reported.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorLocation {
    /// at a token, with its source text
    Lexeme(String),
    End,
    /// the token itself could not be scanned
    Lexical,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::Lexeme(text) => write!(f, " at '{text}'"),
            ErrorLocation::End => write!(f, " at end"),
            ErrorLocation::Lexical => Ok(()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error{location}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub line: usize,
    pub span: Span,
    pub location: ErrorLocation,
}

/// Every error found in one compilation, in source order.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Default)]
#[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The operator a token names inside `( )`.
fn operator_for(token: &Token) -> Option<Operator> {
    Some(match token {
        Token::Plus => Operator::Add,
        Token::Minus => Operator::Subtract,
        Token::Star => Operator::Multiply,
        Token::Slash => Operator::Divide,
        Token::Percent => Operator::Modulo,
        Token::Equal => Operator::Assign,
        Token::QuestionEqual => Operator::Equal,
        Token::BangEqual => Operator::NotEqual,
        Token::Less => Operator::Less,
        Token::Greater => Operator::Greater,
        Token::LessEqual => Operator::LessEqual,
        Token::GreaterEqual => Operator::GreaterEqual,
        Token::Bang => Operator::Not,
        Token::Question => Operator::Truthy,
        Token::Comma => Operator::Apply,
        Token::Dot => Operator::Print,
        Token::Caret => Operator::Scan,
        Token::If => Operator::If,
        _ => return None,
    })
}

struct Compiler<'vm, 'src> {
    vm: &'vm mut Vm,
    scanner: Scanner<'src>,
    peeked: Option<Lexeme<'src>>,
    chunk: Chunk,
    errors: Vec<CompileError>,
    panic_mode: bool,
    /// set by every error of the current instruction, reported or not
    erred: bool,
    pinned_base: usize,
}

/// Compiles `source` into the top level script function.
///
/// String constants are interned into `vm`'s heap and stay pinned until the function
/// that holds them has been allocated. The returned function is *not* rooted.
pub fn compile(vm: &mut Vm, source: &str) -> Result<ObjRef, CompileErrors> {
    let pinned_base = vm.pinned_len();
    let mut compiler = Compiler {
        vm,
        scanner: Scanner::new(source),
        peeked: None,
        chunk: Chunk::new(),
        errors: vec![],
        panic_mode: false,
        erred: false,
        pinned_base,
    };
    while let Some(lexeme) = compiler.advance() {
        compiler.erred = false;
        compiler.instruction(lexeme);
        // a clean instruction is the recovery point
        if !compiler.erred {
            compiler.panic_mode = false;
        }
    }
    compiler.finish()
}

impl<'vm, 'src> Compiler<'vm, 'src> {
    fn advance(&mut self) -> Option<Lexeme<'src>> {
        self.peeked.take().or_else(|| self.scanner.next())
    }

    fn peek(&mut self) -> Option<&Lexeme<'src>> {
        if self.peeked.is_none() {
            self.peeked = self.scanner.next();
        }
        self.peeked.as_ref()
    }

    fn next_is(&mut self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|lexeme| lexeme.token.as_ref() == Ok(token))
    }

    fn report(&mut self, error: CompileError) {
        self.erred = true;
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(error);
    }

    fn error_at(&mut self, lexeme: &Lexeme<'src>, kind: CompileErrorKind) {
        self.report(CompileError {
            kind,
            line: lexeme.line,
            span: lexeme.span.clone(),
            location: ErrorLocation::Lexeme(lexeme.text.to_owned()),
        });
    }

    fn error_at_end(&mut self, kind: CompileErrorKind) {
        let end = self.scanner.offset();
        self.report(CompileError {
            kind,
            line: self.scanner.line(),
            span: end..end,
            location: ErrorLocation::End,
        });
    }

    fn lexical_error(&mut self, lexeme: &Lexeme<'src>, error: LexerError) {
        self.report(CompileError {
            kind: error.into(),
            line: lexeme.line,
            span: lexeme.span.clone(),
            location: ErrorLocation::Lexical,
        });
    }

    fn emit(&mut self, op: OpCode, line: usize) {
        self.chunk.write(op, line);
    }

    fn make_constant(&mut self, value: Value, lexeme: &Lexeme<'src>) -> u8 {
        if self.chunk.constants.len() >= MAX_CONSTANTS {
            self.error_at(lexeme, CompileErrorKind::TooManyConstants);
            return 0;
        }
        let index = self.chunk.add_constant(value);
        u8::try_from(index).unwrap_or(u8::MAX)
    }

    fn emit_with_constant(&mut self, op: OpCode, value: Value, lexeme: &Lexeme<'src>) {
        let index = self.make_constant(value, lexeme);
        self.emit(op, lexeme.line);
        self.chunk.write(index, lexeme.line);
    }

    /// Interns `text` and keeps it alive until the function is done.
    fn string(&mut self, text: &str) -> Value {
        let obj = self.vm.intern(text);
        self.vm.pin(obj);
        Value::Object(obj)
    }

    fn instruction(&mut self, lexeme: Lexeme<'src>) {
        let line = lexeme.line;
        let token = match &lexeme.token {
            Ok(token) => token.clone(),
            Err(error) => {
                let error = error.clone();
                return self.lexical_error(&lexeme, error);
            }
        };
        match token {
            Token::Dot => self.emit(OpCode::Print, line),
            Token::Caret => self.emit(OpCode::Scan, line),
            Token::Plus => self.emit(OpCode::Add, line),
            Token::Minus => self.emit(OpCode::Subtract, line),
            Token::Star => self.emit(OpCode::Multiply, line),
            Token::Slash => self.emit(OpCode::Divide, line),
            Token::Percent => self.emit(OpCode::Mod, line),
            Token::QuestionEqual => self.emit(OpCode::Equal, line),
            Token::BangEqual => {
                self.emit(OpCode::Equal, line);
                self.emit(OpCode::Not, line);
            }
            Token::Less => self.emit(OpCode::Less, line),
            Token::Greater => self.emit(OpCode::Greater, line),
            Token::LessEqual => self.emit(OpCode::LessEqual, line),
            Token::GreaterEqual => self.emit(OpCode::GreaterEqual, line),
            Token::Bang => self.emit(OpCode::Not, line),
            Token::Question => {
                self.emit(OpCode::Not, line);
                self.emit(OpCode::Not, line);
            }
            Token::Equal => self.emit(OpCode::SetVariable, line),
            Token::Comma => self.emit(OpCode::Apply, line),
            Token::If => self.emit(OpCode::If, line),
            Token::LeftParen => self.operation(),
            Token::Arrow => self.procedure_definition(),
            Token::While => {
                let name = self.string(WHILE_CONDITION);
                self.emit_with_constant(OpCode::DefineFunction, name, &lexeme);
                self.emit(OpCode::While, line);
            }
            // the sentinel a procedure body starts after
            Token::Colon => self.emit_with_constant(OpCode::Constant, Value::Nil, &lexeme),
            Token::Number(n) => self.emit_with_constant(OpCode::Constant, Value::Number(n), &lexeme),
            Token::True => self.emit_with_constant(OpCode::Constant, Value::Bool(true), &lexeme),
            Token::False => self.emit_with_constant(OpCode::Constant, Value::Bool(false), &lexeme),
            Token::String(text) => {
                let text = self.string(&text);
                self.emit_with_constant(OpCode::Constant, text, &lexeme);
            }
            Token::Identifier(name) => {
                let name = self.string(&name);
                self.emit_with_constant(OpCode::Variable, name, &lexeme);
            }
            Token::And | Token::Or | Token::RightParen | Token::Newline => {
                self.error_at(&lexeme, CompileErrorKind::TokenNotAllowed)
            }
        }
    }

    /// `( op )`, the opening parenthesis already consumed.
    fn operation(&mut self) {
        let Some(inner) = self.advance() else {
            return self.error_at_end(CompileErrorKind::MissingCloseParen);
        };
        let operator = match &inner.token {
            Ok(Token::RightParen) => {
                return self.error_at(&inner, CompileErrorKind::EmptyParens);
            }
            Ok(token) => operator_for(token),
            Err(error) => {
                let error = error.clone();
                self.lexical_error(&inner, error);
                None
            }
        };
        let Some(operator) = operator else {
            self.error_at(&inner, CompileErrorKind::NotAnOperator);
            if self.next_is(&Token::RightParen) {
                _ = self.advance(); // consume
            }
            return;
        };

        if self.next_is(&Token::RightParen) {
            _ = self.advance(); // consume
        } else {
            match self.peek().cloned() {
                Some(next) => self.error_at(&next, CompileErrorKind::MissingCloseParen),
                None => self.error_at_end(CompileErrorKind::MissingCloseParen),
            }
            return;
        }

        let spelling = self.string(operator.spelling());
        self.emit_with_constant(OpCode::PushOperation, spelling, &inner);
    }

    /// `=> name`, the arrow already consumed.
    fn procedure_definition(&mut self) {
        match self.peek().cloned() {
            Some(name) if matches!(name.token, Ok(Token::Identifier(_))) => {
                _ = self.advance(); // consume
                let constant = self.string(name.text);
                self.emit_with_constant(OpCode::DefineFunction, constant, &name);
            }
            Some(other) => self.error_at(&other, CompileErrorKind::MissingProcedureName),
            None => self.error_at_end(CompileErrorKind::MissingProcedureName),
        }
    }

    fn finish(mut self) -> Result<ObjRef, CompileErrors> {
        let line = self.scanner.line();
        self.emit(OpCode::Return, line);
        let result = if self.errors.is_empty() {
            // the constants are still pinned while this allocates
            Ok(self.vm.allocate(Object::Function(Function {
                arity: 0,
                upvalue_count: 0,
                chunk: self.chunk,
                name: None,
            })))
        } else {
            Err(CompileErrors(self.errors))
        };
        self.vm.unpin_to(self.pinned_base);
        result
    }
}
