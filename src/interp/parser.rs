// Tue Oct 13 2026 - Alex

use crate::interp::ast::{
    BinaryOp, DeclarationKind, Expression, FunctionDef, Program, Statement, StatementKind, UnaryOp,
};
use crate::interp::lexer::{tokenize, SyntaxErrorInfo, Token, TokenKind};
use crate::interp::value::number_to_string;
use std::sync::Arc;

/// Tokenize and parse a whole script.
pub fn parse(source: &str) -> Result<Program, SyntaxErrorInfo> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    parser.parse_program()
}

/// Constructs the parser recurses into: statements, assignments, unary
/// operands, `new` callees.
const MAX_NESTING_DEPTH: usize = 96;
/// Tree depth, counting left-nested operator and member chains as well.
const MAX_EXPRESSION_DEPTH: usize = 1024;

struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    nesting: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            current: 0,
            nesting: 0,
            depth: 0,
        }
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> Result<T, SyntaxErrorInfo>) -> Result<T, SyntaxErrorInfo> {
        if self.nesting >= MAX_NESTING_DEPTH || self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error_here("Maximum nesting depth exceeded"));
        }
        self.nesting += 1;
        self.depth += 1;
        let result = parse(self);
        self.nesting -= 1;
        self.depth -= 1;
        result
    }

    /// One more link in a left-nested chain. Callers restore `depth` after
    /// the chain ends.
    fn extend_chain(&mut self) -> Result<(), SyntaxErrorInfo> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error_here("Expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_program(&mut self) -> Result<Program, SyntaxErrorInfo> {
        let mut program = Program::default();
        while !self.is_at_end() {
            program.body.push(self.parse_statement()?);
        }
        Ok(program)
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxErrorInfo> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Statement, SyntaxErrorInfo> {
        let line = self.peek().line;
        let kind = match &self.peek().kind {
            TokenKind::LeftBrace => StatementKind::Block(self.parse_block()?),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let declaration = self.parse_declaration()?;
                self.consume_semicolon()?;
                declaration
            }
            TokenKind::Function => {
                self.advance();
                let def = self.parse_function_rest(true, line)?;
                StatementKind::Function(def)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                StatementKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.consume_semicolon()?;
                StatementKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.consume_semicolon()?;
                StatementKind::Continue
            }
            TokenKind::Throw => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.error_here("Illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                StatementKind::Throw(value)
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Semicolon => {
                self.advance();
                StatementKind::Empty
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                StatementKind::Expression(expr)
            }
        };
        Ok(Statement { kind, line })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, SyntaxErrorInfo> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    fn parse_declaration(&mut self) -> Result<StatementKind, SyntaxErrorInfo> {
        let kind = match self.advance().kind {
            TokenKind::Let => DeclarationKind::Let,
            TokenKind::Const => DeclarationKind::Const,
            _ => DeclarationKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let value = if self.check(&TokenKind::Assign) {
                self.advance();
                Some(self.parse_assignment()?)
            } else {
                if kind == DeclarationKind::Const {
                    return Err(self.error_here("Missing initializer in const declaration"));
                }
                None
            };
            declarations.push((name, value));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(StatementKind::Declaration { kind, declarations })
    }

    /// Everything after the `function` keyword.
    fn parse_function_rest(&mut self, require_name: bool, line: i32) -> Result<Arc<FunctionDef>, SyntaxErrorInfo> {
        let name = if require_name || !self.check(&TokenKind::LeftParen) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(&TokenKind::RightParen)?;
        let body = self.parse_block()?;

        Ok(Arc::new(FunctionDef { name, params, body, line }))
    }

    fn parse_if(&mut self) -> Result<StatementKind, SyntaxErrorInfo> {
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StatementKind::If { condition, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> Result<StatementKind, SyntaxErrorInfo> {
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(StatementKind::While { condition, body })
    }

    fn parse_for(&mut self) -> Result<StatementKind, SyntaxErrorInfo> {
        self.advance();
        self.expect(&TokenKind::LeftParen)?;

        if let Some((declared, name)) = self.for_in_head() {
            let object = self.parse_expression()?;
            self.expect(&TokenKind::RightParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(StatementKind::ForIn { declared, name, object, body });
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            let line = self.peek().line;
            let kind = match self.peek().kind {
                TokenKind::Var | TokenKind::Let | TokenKind::Const => self.parse_declaration()?,
                _ => StatementKind::Expression(self.parse_expression()?),
            };
            Some(Box::new(Statement { kind, line }))
        };
        self.expect(&TokenKind::Semicolon)?;

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(StatementKind::For { init, condition, update, body })
    }

    /// Consumes `[var] name in` when the loop head has that shape.
    fn for_in_head(&mut self) -> Option<(bool, String)> {
        let declared = matches!(
            self.peek().kind,
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        );
        let offset = if declared { 1 } else { 0 };
        let name = match self.peek_at(offset).map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => name.clone(),
            _ => return None,
        };
        if !matches!(self.peek_at(offset + 1).map(|t| &t.kind), Some(TokenKind::In)) {
            return None;
        }
        self.current += offset + 2;
        Some((declared, name))
    }

    fn parse_try(&mut self) -> Result<StatementKind, SyntaxErrorInfo> {
        self.advance();
        let block = self.parse_block()?;

        let (catch_param, catch_block) = if self.check(&TokenKind::Catch) {
            self.advance();
            let param = if self.check(&TokenKind::LeftParen) {
                self.advance();
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::RightParen)?;
                Some(name)
            } else {
                None
            };
            (param, Some(self.parse_block()?))
        } else {
            (None, None)
        };

        let finally_block = if self.check(&TokenKind::Finally) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        if catch_block.is_none() && finally_block.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }
        Ok(StatementKind::Try { block, catch_param, catch_block, finally_block })
    }

    fn parse_expression(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            items.push(self.parse_assignment()?);
        }
        Ok(Expression::Sequence(items))
    }

    fn parse_assignment(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let target = self.parse_conditional()?;

        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(self.error_here("Invalid left-hand side in assignment"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expression::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let condition = self.parse_logical_or()?;
        if !self.check(&TokenKind::Question) {
            return Ok(condition);
        }
        self.advance();
        let then_value = self.parse_assignment()?;
        self.expect(&TokenKind::Colon)?;
        let else_value = self.parse_assignment()?;
        Ok(Expression::Conditional {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let depth = self.depth;
        let mut left = self.parse_logical_and()?;
        while self.check(&TokenKind::PipePipe) {
            self.advance();
            self.extend_chain()?;
            let right = self.parse_logical_and()?;
            left = Expression::Logical {
                and: false,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let depth = self.depth;
        let mut left = self.parse_binary(0)?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            self.extend_chain()?;
            let right = self.parse_binary(0)?;
            left = Expression::Logical {
                and: true,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    /// Precedence climbing over the binary operator levels, loosest first.
    fn parse_binary(&mut self, level: usize) -> Result<Expression, SyntaxErrorInfo> {
        if level >= BINARY_LEVELS {
            return self.parse_unary();
        }
        let depth = self.depth;
        let mut left = self.parse_binary(level + 1)?;
        loop {
            let op = match binary_op(&self.peek().kind) {
                Some((op, op_level)) if op_level == level => op,
                _ => break,
            };
            self.advance();
            self.extend_chain()?;
            let right = self.parse_binary(level + 1)?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expression::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let increment = self.check(&TokenKind::PlusPlus);
            self.advance();
            let target = self.nested(Self::parse_unary)?;
            if !target.is_assignable() {
                return Err(self.error_here("Invalid left-hand side expression in prefix operation"));
            }
            return Ok(Expression::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let expr = self.parse_call()?;
        let is_update = self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus);
        if is_update && !self.peek().newline_before {
            if !expr.is_assignable() {
                return Err(self.error_here("Invalid left-hand side expression in postfix operation"));
            }
            let increment = self.check(&TokenKind::PlusPlus);
            self.advance();
            return Ok(Expression::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_call(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let depth = self.depth;
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            self.extend_chain()?;
            if self.check(&TokenKind::LeftParen) {
                let args = self.parse_args()?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if !self.parse_member_suffix(&mut expr)? {
                break;
            }
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        self.advance();
        let depth = self.depth;
        let mut callee = if self.check(&TokenKind::New) {
            self.nested(Self::parse_new)?
        } else {
            self.parse_primary()?
        };
        while self.parse_member_suffix(&mut callee)? {
            self.extend_chain()?;
        }
        self.depth = depth;
        let args = if self.check(&TokenKind::LeftParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expression::New {
            callee: Box::new(callee),
            args,
        })
    }

    /// `.name` or `[expr]`; returns false when neither follows.
    fn parse_member_suffix(&mut self, expr: &mut Expression) -> Result<bool, SyntaxErrorInfo> {
        if self.check(&TokenKind::Dot) {
            self.advance();
            let property = match self.peek().kind.word() {
                Some(word) => word.to_string(),
                None => return Err(self.unexpected()),
            };
            self.advance();
            let object = std::mem::replace(expr, Expression::Null);
            *expr = Expression::Member {
                object: Box::new(object),
                property,
            };
            Ok(true)
        } else if self.check(&TokenKind::LeftBracket) {
            self.advance();
            let index = self.parse_expression()?;
            self.expect(&TokenKind::RightBracket)?;
            let object = std::mem::replace(expr, Expression::Null);
            *expr = Expression::Index {
                object: Box::new(object),
                index: Box::new(index),
            };
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expression>, SyntaxErrorInfo> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Number(n) => Expression::Number(n),
            TokenKind::String(s) => Expression::String(s),
            TokenKind::True => Expression::Bool(true),
            TokenKind::False => Expression::Bool(false),
            TokenKind::Null => Expression::Null,
            TokenKind::This => Expression::This,
            TokenKind::Identifier(name) => Expression::Identifier(name),
            TokenKind::Function => {
                self.advance();
                return Ok(Expression::Function(self.parse_function_rest(false, token.line)?));
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => return self.parse_array(),
            TokenKind::LeftBrace => return self.parse_object(),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_array(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        self.expect(&TokenKind::LeftBracket)?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_assignment()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightBracket)?;
        Ok(Expression::Array(elements))
    }

    fn parse_object(&mut self) -> Result<Expression, SyntaxErrorInfo> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = match &self.peek().kind {
                TokenKind::String(s) => s.clone(),
                TokenKind::Number(n) => number_to_string(*n),
                other => match other.word() {
                    Some(word) => word.to_string(),
                    None => return Err(self.unexpected()),
                },
            };
            self.advance();
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_assignment()?;
            properties.push((key, value));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expression::Object(properties))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.current + offset)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn at_statement_end(&self) -> bool {
        self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RightBrace)
            || self.is_at_end()
            || self.peek().newline_before
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<&Token, SyntaxErrorInfo> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(SyntaxErrorInfo::new(
                format!("Expected {} but found {}", kind, token.kind),
                token.line,
                token.column,
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, SyntaxErrorInfo> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            let token = self.peek();
            Err(SyntaxErrorInfo::new(
                format!("Expected identifier but found {}", token.kind),
                token.line,
                token.column,
            ))
        }
    }

    /// Statements end at `;`, before `}`, at end of input, or at a line break.
    fn consume_semicolon(&mut self) -> Result<(), SyntaxErrorInfo> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return Ok(());
        }
        if self.check(&TokenKind::RightBrace) || self.is_at_end() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn unexpected(&self) -> SyntaxErrorInfo {
        let token = self.peek();
        SyntaxErrorInfo::new(format!("Unexpected {}", token.kind), token.line, token.column)
    }

    fn error_here(&self, message: &str) -> SyntaxErrorInfo {
        let token = self.peek();
        SyntaxErrorInfo::new(message, token.line, token.column)
    }
}

/// `|`, `^`, `&`, equality, relational, shift, additive, multiplicative.
const BINARY_LEVELS: usize = 8;

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, usize)> {
    let entry = match kind {
        TokenKind::Pipe => (BinaryOp::BitOr, 0),
        TokenKind::Caret => (BinaryOp::BitXor, 1),
        TokenKind::Ampersand => (BinaryOp::BitAnd, 2),
        TokenKind::EqualEqual => (BinaryOp::Eq, 3),
        TokenKind::BangEqual => (BinaryOp::Ne, 3),
        TokenKind::EqualEqualEqual => (BinaryOp::StrictEq, 3),
        TokenKind::BangEqualEqual => (BinaryOp::StrictNe, 3),
        TokenKind::Less => (BinaryOp::Lt, 4),
        TokenKind::LessEqual => (BinaryOp::Le, 4),
        TokenKind::Greater => (BinaryOp::Gt, 4),
        TokenKind::GreaterEqual => (BinaryOp::Ge, 4),
        TokenKind::Instanceof => (BinaryOp::Instanceof, 4),
        TokenKind::In => (BinaryOp::In, 4),
        TokenKind::ShiftLeft => (BinaryOp::Shl, 5),
        TokenKind::ShiftRight => (BinaryOp::Shr, 5),
        TokenKind::UnsignedShiftRight => (BinaryOp::UShr, 5),
        TokenKind::Plus => (BinaryOp::Add, 6),
        TokenKind::Minus => (BinaryOp::Sub, 6),
        TokenKind::Star => (BinaryOp::Mul, 7),
        TokenKind::Slash => (BinaryOp::Div, 7),
        TokenKind::Percent => (BinaryOp::Mod, 7),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source).unwrap()
    }

    #[test]
    fn test_parse_declarations() {
        let program = parse_ok("var a = 1, b; let c = 2; const d = 3;");
        assert_eq!(program.body.len(), 3);
        match &program.body[0].kind {
            StatementKind::Declaration { kind, declarations } => {
                assert_eq!(*kind, DeclarationKind::Var);
                assert_eq!(declarations.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("1 + 2 * 3");
        match &program.body[0].kind {
            StatementKind::Expression(Expression::Binary { op, right, .. }) => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(**right, Expression::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_newline_terminates_statement() {
        let program = parse_ok("var a = 1\nvar b = 2\na + b");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_invalid_syntax_is_rejected() {
        let err = parse("this is not valid syntax").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("Unexpected"));
    }

    #[test]
    fn test_statement_lines() {
        let program = parse_ok("var a;\n\nfunction f() {\n  return a;\n}");
        assert_eq!(program.body[0].line, 1);
        assert_eq!(program.body[1].line, 3);
    }

    #[test]
    fn test_for_forms() {
        let program = parse_ok("for (var i = 0; i < 3; i++) {} for (var k in o) {} for (;;) { break; }");
        assert!(matches!(program.body[0].kind, StatementKind::For { .. }));
        assert!(matches!(program.body[1].kind, StatementKind::ForIn { declared: true, .. }));
        assert!(matches!(program.body[2].kind, StatementKind::For { condition: None, .. }));
    }

    #[test]
    fn test_try_requires_handler() {
        assert!(parse("try { a(); }").is_err());
        assert!(parse("try { a(); } catch (e) { b(e); } finally { c(); }").is_ok());
    }

    #[test]
    fn test_new_and_member_chains() {
        let program = parse_ok("new a.B(1).c");
        match &program.body[0].kind {
            StatementKind::Expression(Expression::Member { object, property }) => {
                assert_eq!(property, "c");
                assert!(matches!(**object, Expression::New { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
        assert!(parse("a.b = 2").is_ok());
    }

    #[test]
    fn test_object_literal_keys() {
        let program = parse_ok("({ a: 1, 'b c': 2, 3: 4, default: 5 })");
        match &program.body[0].kind {
            StatementKind::Expression(Expression::Object(props)) => {
                let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b c", "3", "default"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let error = parse(&parens).unwrap_err();
        assert_eq!(error.message, "Maximum nesting depth exceeded");
        assert_eq!(error.line, 1);

        let negations = format!("{}x", "!".repeat(10_000));
        assert!(parse(&negations).is_err());

        let nested = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse(&nested).is_ok());
    }

    #[test]
    fn test_long_chains_are_bounded() {
        let terms = vec!["1"; 100_000].join("+");
        let error = parse(&terms).unwrap_err();
        assert_eq!(error.message, "Expression nested too deeply");

        let members = format!("a{}", ".b".repeat(5_000));
        assert!(parse(&members).is_err());

        assert!(parse(&vec!["1"; 500].join("+")).is_ok());
    }
}
