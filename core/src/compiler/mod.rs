//! Single-pass bytecode compiler: lowers the statement AST directly into
//! per-function chunks, with no separate optimization pass.

mod error;

pub use error::CompileError;

use lumen_syntax::{AssignOp, BinaryOp, Expr, Literal, LogicalOp, Name, Stmt, UnaryOp};

use crate::bytefile::BytecodeFile;
use crate::chunk::{Chunk, FunctionProto, NativeRegistry};
use crate::opcode::Opcode;
use crate::pool::{ConstantPool, StringPool};
use crate::value::{FunctionKind, Value};

/// Compile a full program into a loadable bytecode file.
pub fn compile(stmts: &[Stmt], natives: NativeRegistry) -> Result<BytecodeFile, CompileError> {
    tracing::debug!(stmt_count = stmts.len(), "compiling");
    let file = Compiler::new(natives).compile(stmts)?;
    tracing::debug!(
        function_count = file.functions.len(),
        constant_count = file.constants.len(),
        string_pool_len = file.strings.len(),
        "compiled"
    );
    Ok(file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalKind {
    /// Declared but its initializer hasn't finished compiling yet; reading
    /// it is an error.
    Uninitialized,
    Variable,
    UserFn(u8),
    NativeFn(u8),
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    /// `-1` while the local is mid-initialization.
    scope_depth: i32,
    stack_offset: u8,
    kind: LocalKind,
}

struct FunctionCompiler {
    function_index: u8,
    locals: Vec<Local>,
    scope_depth: i32,
}

/// Whether resolving a name for a value-use pushed the value itself (a
/// fresh function reference) or merely located an existing stack slot that
/// still needs a `GET_LOCAL`.
enum Resolved {
    AlreadyOnStack,
    NeedsGet(u8),
}

struct Compiler {
    functions: Vec<FunctionProto>,
    natives: NativeRegistry,
    constants: ConstantPool,
    strings: StringPool,
    stack: Vec<FunctionCompiler>,
    current_line: u32,
}

impl Compiler {
    fn new(natives: NativeRegistry) -> Self {
        let script = FunctionProto::script();
        Self {
            functions: vec![script],
            natives,
            constants: ConstantPool::new(),
            strings: StringPool::new(),
            stack: vec![FunctionCompiler { function_index: 0, locals: Vec::new(), scope_depth: 0 }],
            current_line: 0,
        }
    }

    fn compile(mut self, stmts: &[Stmt]) -> Result<BytecodeFile, CompileError> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        self.emit_return();
        Ok(BytecodeFile { functions: self.functions, constants: self.constants, strings: self.strings })
    }

    fn fc(&self) -> &FunctionCompiler {
        self.stack.last().expect("function stack is never empty")
    }

    fn fc_mut(&mut self) -> &mut FunctionCompiler {
        self.stack.last_mut().expect("function stack is never empty")
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        let idx = self.fc().function_index;
        &mut self.functions[idx as usize].chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.current_line as i32;
        self.chunk_mut().write(byte, line);
    }

    fn emit_op(&mut self, op: Opcode) {
        self.emit_byte(op.into());
    }

    fn emit_bytes(&mut self, op: Opcode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(Opcode::Nil);
        self.emit_op(Opcode::Return);
    }

    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk_mut().len() - 2
    }

    fn patch_jump(&mut self, placeholder: usize) -> Result<(), CompileError> {
        let jump = self.chunk_mut().len() - placeholder - 2;
        if jump > u16::MAX as usize {
            return Err(CompileError::JumpTooLarge { line: self.current_line });
        }
        let bytes = (jump as u16).to_be_bytes();
        let chunk = self.chunk_mut();
        chunk.code[placeholder] = bytes[0];
        chunk.code[placeholder + 1] = bytes[1];
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize) -> Result<(), CompileError> {
        self.emit_op(Opcode::Loop);
        let offset = self.chunk_mut().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            return Err(CompileError::JumpTooLarge { line: self.current_line });
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
        Ok(())
    }

    fn emit_constant(&mut self, value: Value) -> Result<(), CompileError> {
        if let Value::Bool(b) = value {
            self.emit_op(if b { Opcode::True } else { Opcode::False });
            return Ok(());
        }
        let idx = self
            .constants
            .intern(value)
            .ok_or(CompileError::TooManyConstants { line: self.current_line })?;
        self.emit_bytes(Opcode::Constant, idx);
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.fc_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let depth = {
            let fc = self.fc_mut();
            fc.scope_depth -= 1;
            fc.scope_depth
        };
        let mut popped = 0u8;
        while let Some(local) = self.fc().locals.last() {
            if local.scope_depth <= depth {
                break;
            }
            popped += 1;
            self.fc_mut().locals.pop();
        }
        if popped > 0 {
            self.emit_bytes(Opcode::PopN, popped);
        }
    }

    fn declare_local(&mut self, name: &Name) -> Result<u8, CompileError> {
        let fc = self.fc();
        for local in fc.locals.iter().rev() {
            if local.scope_depth != -1 && local.scope_depth < fc.scope_depth {
                break;
            }
            if local.name == name.text {
                return Err(CompileError::DuplicateVariable { name: name.text.clone(), line: name.line });
            }
        }
        if fc.locals.len() >= 256 {
            return Err(CompileError::TooManyLocals { line: name.line });
        }
        let offset = fc.locals.len() as u8;
        self.fc_mut().locals.push(Local {
            name: name.text.clone(),
            scope_depth: -1,
            stack_offset: offset,
            kind: LocalKind::Uninitialized,
        });
        Ok(offset)
    }

    fn mark_initialized(&mut self) {
        let depth = self.fc().scope_depth;
        let local = self.fc_mut().locals.last_mut().expect("just declared");
        local.scope_depth = depth;
        local.kind = LocalKind::Variable;
    }

    fn push_synthetic_local(&mut self, name: &Name, kind: LocalKind) -> Result<u8, CompileError> {
        let fc = self.fc();
        if fc.locals.len() >= 256 {
            return Err(CompileError::TooManyLocals { line: name.line });
        }
        let offset = fc.locals.len() as u8;
        let depth = fc.scope_depth;
        self.fc_mut().locals.push(Local { name: name.text.clone(), scope_depth: depth, stack_offset: offset, kind });
        Ok(offset)
    }

    /// Resolve `name` for a value-producing use: a local variable, or (on
    /// first mention) a user/native function, which is pushed as a constant
    /// and remembered as a local so later mentions in the same function just
    /// re-read that slot.
    fn resolve_value(&mut self, name: &Name) -> Result<Resolved, CompileError> {
        for local in self.fc().locals.iter().rev() {
            if local.name == name.text {
                if local.scope_depth == -1 {
                    return Err(CompileError::UninitializedLocal { name: name.text.clone(), line: name.line });
                }
                return Ok(Resolved::NeedsGet(local.stack_offset));
            }
        }
        if let Some(idx) = self.functions.iter().position(|f| !f.name.is_empty() && f.name == name.text) {
            self.emit_constant(Value::FunctionIndex { kind: FunctionKind::User, idx: idx as u8 })?;
            self.push_synthetic_local(name, LocalKind::UserFn(idx as u8))?;
            return Ok(Resolved::AlreadyOnStack);
        }
        if let Some((idx, _)) = self.natives.find(&name.text) {
            self.emit_constant(Value::FunctionIndex { kind: FunctionKind::Native, idx })?;
            self.push_synthetic_local(name, LocalKind::NativeFn(idx))?;
            return Ok(Resolved::AlreadyOnStack);
        }
        Err(CompileError::UndeclaredName { name: name.text.clone(), line: name.line })
    }

    /// Resolve `name` as an assignment target: only an existing local slot
    /// (possibly one synthesized by a prior function reference) counts.
    fn resolve_assign_target(&mut self, name: &Name) -> Result<u8, CompileError> {
        match self.resolve_value(name)? {
            Resolved::NeedsGet(offset) => Ok(offset),
            Resolved::AlreadyOnStack => {
                let offset = self.fc().locals.last().expect("just synthesized").stack_offset;
                Ok(offset)
            }
        }
    }

    fn resolve_callee(&self, name: &Name) -> Result<Callee, CompileError> {
        if let Some(idx) = self.functions.iter().position(|f| !f.name.is_empty() && f.name == name.text) {
            return Ok(Callee::User(idx as u8));
        }
        if let Some((idx, _)) = self.natives.find(&name.text) {
            return Ok(Callee::Native(idx));
        }
        for local in self.fc().locals.iter().rev() {
            if local.name == name.text {
                match local.kind {
                    LocalKind::UserFn(idx) => return Ok(Callee::User(idx)),
                    LocalKind::NativeFn(idx) => return Ok(Callee::Native(idx)),
                    LocalKind::Variable | LocalKind::Uninitialized => break,
                }
            }
        }
        Err(CompileError::UndeclaredName { name: name.text.clone(), line: name.line })
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, initializer } => {
                self.current_line = name.line;
                self.declare_local(name)?;
                self.compile_expr(initializer)?;
                self.mark_initialized();
                Ok(())
            }
            Stmt::FunStmt { name, parameters, body } => self.compile_fun_stmt(name, parameters, body),
            Stmt::Block(stmts) => {
                self.begin_scope();
                for s in stmts {
                    self.compile_stmt(s)?;
                }
                self.end_scope();
                Ok(())
            }
            Stmt::ExprStmt(expr) => {
                self.compile_expr(expr)?;
                self.emit_op(Opcode::Pop);
                Ok(())
            }
            Stmt::If { condition, then_branch, else_branch } => {
                self.compile_expr(condition)?;
                let then_jump = self.emit_jump(Opcode::JumpIfFalse);
                self.emit_op(Opcode::Pop);
                self.compile_stmt(then_branch)?;
                let else_jump = self.emit_jump(Opcode::Jump);
                self.patch_jump(then_jump)?;
                self.emit_op(Opcode::Pop);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch)?;
                }
                self.patch_jump(else_jump)?;
                Ok(())
            }
            Stmt::While { condition, body } => {
                let loop_start = self.chunk_mut().len();
                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(Opcode::JumpIfFalse);
                self.emit_op(Opcode::Pop);
                self.compile_stmt(body)?;
                self.emit_loop(loop_start)?;
                self.patch_jump(exit_jump)?;
                self.emit_op(Opcode::Pop);
                Ok(())
            }
            Stmt::Print { value, line } => {
                self.current_line = *line;
                self.compile_expr(value)?;
                self.emit_op(Opcode::Print);
                Ok(())
            }
            Stmt::Return { value, line } => {
                self.current_line = *line;
                self.compile_expr(value)?;
                self.emit_op(Opcode::Return);
                Ok(())
            }
        }
    }

    fn compile_fun_stmt(&mut self, name: &Name, parameters: &[Name], body: &Stmt) -> Result<(), CompileError> {
        if self.functions.iter().any(|f| f.name == name.text) {
            return Err(CompileError::DuplicateFunction { name: name.text.clone(), line: name.line });
        }
        if self.functions.len() >= 256 {
            return Err(CompileError::TooManyFunctions { line: name.line });
        }
        let idx = self.functions.len() as u8;
        self.functions.push(FunctionProto { name: name.text.clone(), arity: parameters.len() as u8, chunk: Chunk::new() });

        self.stack.push(FunctionCompiler { function_index: idx, locals: Vec::new(), scope_depth: 0 });
        for param in parameters {
            self.declare_local(param)?;
            self.mark_initialized();
        }
        self.compile_stmt(body)?;
        self.emit_return();
        self.stack.pop();
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(Literal::Nil) => {
                self.emit_op(Opcode::Nil);
                Ok(())
            }
            Expr::Literal(Literal::Bool(b)) => self.emit_constant(Value::Bool(*b)),
            Expr::Literal(Literal::Number(n)) => self.emit_constant(Value::Number(*n)),
            Expr::Literal(Literal::Str(s)) => {
                let offset = self.strings.intern(s.as_bytes());
                if offset > u8::MAX as u32 {
                    return Err(CompileError::TooManyStrings { line: self.current_line });
                }
                self.emit_bytes(Opcode::String, offset as u8);
                Ok(())
            }
            Expr::Variable(name) => {
                self.current_line = name.line;
                match self.resolve_value(name)? {
                    Resolved::NeedsGet(offset) => self.emit_bytes(Opcode::GetLocal, offset),
                    Resolved::AlreadyOnStack => {}
                }
                Ok(())
            }
            Expr::Unary { op, right } => {
                self.compile_expr(right)?;
                self.emit_op(match op {
                    UnaryOp::Negate => Opcode::Negate,
                    UnaryOp::Not => Opcode::Not,
                });
                Ok(())
            }
            Expr::Binary { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(binary_opcode(*op));
                Ok(())
            }
            Expr::Logical { left, op, right } => self.compile_logical(left, *op, right),
            Expr::Call { callee, args } => {
                self.current_line = callee.line;
                let resolved = self.resolve_callee(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                match resolved {
                    Callee::User(idx) => self.emit_bytes(Opcode::Call, idx),
                    Callee::Native(idx) => self.emit_bytes(Opcode::CallNative, idx),
                }
                Ok(())
            }
            Expr::Assign { name, value } => {
                self.current_line = name.line;
                let offset = self.resolve_assign_target(name)?;
                self.compile_expr(value)?;
                self.emit_bytes(Opcode::SetLocal, offset);
                Ok(())
            }
            Expr::CompoundAssign { name, op, value } => {
                self.current_line = name.line;
                let offset = self.resolve_assign_target(name)?;
                self.compile_expr(value)?;
                self.emit_bytes(assign_opcode(*op), offset);
                Ok(())
            }
        }
    }

    fn compile_logical(&mut self, left: &Expr, op: LogicalOp, right: &Expr) -> Result<(), CompileError> {
        self.compile_expr(left)?;
        match op {
            LogicalOp::And => {
                let end_jump = self.emit_jump(Opcode::JumpIfFalse);
                self.emit_op(Opcode::Pop);
                self.compile_expr(right)?;
                self.patch_jump(end_jump)?;
            }
            LogicalOp::Or => {
                let else_jump = self.emit_jump(Opcode::JumpIfFalse);
                let end_jump = self.emit_jump(Opcode::Jump);
                self.patch_jump(else_jump)?;
                self.emit_op(Opcode::Pop);
                self.compile_expr(right)?;
                self.patch_jump(end_jump)?;
            }
        }
        Ok(())
    }
}

enum Callee {
    User(u8),
    Native(u8),
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Subtract => Opcode::Subtract,
        BinaryOp::Multiply => Opcode::Multiply,
        BinaryOp::Divide => Opcode::Divide,
        BinaryOp::Modulo => Opcode::Modulo,
        BinaryOp::Equal => Opcode::Equal,
        BinaryOp::NotEqual => Opcode::NotEqual,
        BinaryOp::Less => Opcode::Less,
        BinaryOp::LessEqual => Opcode::LessEqual,
        BinaryOp::Greater => Opcode::Greater,
        BinaryOp::GreaterEqual => Opcode::GreaterEqual,
    }
}

fn assign_opcode(op: AssignOp) -> Opcode {
    match op {
        AssignOp::Add => Opcode::AddAssign,
        AssignOp::Subtract => Opcode::SubtractAssign,
        AssignOp::Multiply => Opcode::MultiplyAssign,
        AssignOp::Divide => Opcode::DivideAssign,
        AssignOp::Modulo => Opcode::ModuloAssign,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_syntax::parse_source;

    fn compile_source(source: &str) -> BytecodeFile {
        let stmts = parse_source(source).unwrap();
        compile(&stmts, NativeRegistry::with_standard_library()).unwrap()
    }

    #[test]
    fn arithmetic_emits_add_and_multiply() {
        let file = compile_source("print 1 + 2 * 3\n");
        let code = &file.functions[0].chunk.code;
        assert!(code.contains(&(Opcode::Multiply as u8)));
        assert!(code.contains(&(Opcode::Add as u8)));
        assert!(code.ends_with(&[Opcode::Nil as u8, Opcode::Return as u8]));
    }

    #[test]
    fn let_then_read_resolves_to_get_local() {
        let file = compile_source("let x = 1\nprint x\n");
        let code = &file.functions[0].chunk.code;
        assert!(code.windows(2).any(|w| w == [Opcode::GetLocal as u8, 0]));
    }

    #[test]
    fn reading_own_initializer_is_an_error() {
        let stmts = parse_source("let x = x\n").unwrap();
        let err = compile(&stmts, NativeRegistry::with_standard_library()).unwrap_err();
        assert!(matches!(err, CompileError::UninitializedLocal { .. }));
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let stmts = parse_source("fun f()\n  return 1\nfun f()\n  return 2\n").unwrap();
        let err = compile(&stmts, NativeRegistry::with_standard_library()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateFunction { .. }));
    }

    #[test]
    fn calling_undeclared_name_is_an_error() {
        let stmts = parse_source("nope()\n").unwrap();
        let err = compile(&stmts, NativeRegistry::with_standard_library()).unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredName { .. }));
    }

    #[test]
    fn function_declaration_compiles_its_own_chunk() {
        let file = compile_source("fun add(a, b)\n  return a + b\n");
        assert_eq!(file.functions.len(), 2);
        assert_eq!(file.functions[1].name, "add");
        assert_eq!(file.functions[1].arity, 2);
    }

    #[test]
    fn calling_a_user_function_emits_call() {
        let file = compile_source("fun greet()\n  return nil\ngreet()\n");
        let code = &file.functions[0].chunk.code;
        assert!(code.windows(2).any(|w| w == [Opcode::Call as u8, 1]));
    }

    #[test]
    fn calling_a_native_emits_call_native() {
        let file = compile_source("clock()\n");
        let code = &file.functions[0].chunk.code;
        assert!(code.windows(2).any(|w| w == [Opcode::CallNative as u8, 0]));
    }

    #[test]
    fn while_loop_emits_a_backward_loop() {
        let file = compile_source("let i = 0\nwhile i < 3\n  i += 1\n");
        let code = &file.functions[0].chunk.code;
        assert!(code.contains(&(Opcode::Loop as u8)));
        assert!(code.contains(&(Opcode::AddAssign as u8)));
    }

    #[test]
    fn redeclaring_a_variable_in_the_same_scope_is_an_error() {
        let stmts = parse_source("let x = 1\nlet x = 2\n").unwrap();
        let err = compile(&stmts, NativeRegistry::with_standard_library()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateVariable { .. }));
    }

    #[test]
    fn identical_string_literals_share_one_string_operand() {
        let file = compile_source("print \"hi\"\nprint \"hi\"\n");
        let code = &file.functions[0].chunk.code;
        let offsets: Vec<u8> = code
            .windows(2)
            .filter(|w| w[0] == Opcode::String as u8)
            .map(|w| w[1])
            .collect();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0], offsets[1]);
    }

    #[test]
    fn shadowing_in_a_nested_block_is_allowed() {
        let stmts = parse_source("let x = 1\nif true\n  let x = 2\n  print x\n").unwrap();
        assert!(compile(&stmts, NativeRegistry::with_standard_library()).is_ok());
    }
}
