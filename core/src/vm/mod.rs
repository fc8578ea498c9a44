//! The stack-based bytecode interpreter.

mod error;
mod stack;

pub use error::RuntimeError;

use crate::bytefile::BytecodeFile;
use crate::chunk::{FunctionProto, NativeRegistry};
use crate::opcode::Opcode;
use crate::pool::{ConstantPool, StringPool};
use crate::value::{FunctionKind, Value};
use stack::Stack;

/// Generous enough for any realistic program; only here to catch a runaway
/// recursive program with a bounded, debug-only overflow check rather than
/// exhausting host memory silently.
const MAX_VALUE_STACK: usize = 1 << 20;

struct CallFrame {
    function_index: u8,
    ip: usize,
    base: usize,
}

/// Executes one compiled program to completion, or until a runtime error.
pub struct Vm {
    functions: Vec<FunctionProto>,
    constants: ConstantPool,
    strings: StringPool,
    natives: NativeRegistry,
    stack: Stack<Value>,
    frames: Vec<CallFrame>,
}

impl Vm {
    pub fn new(file: BytecodeFile, natives: NativeRegistry) -> Self {
        Self {
            functions: file.functions,
            constants: file.constants,
            strings: file.strings,
            natives,
            stack: Stack::new(MAX_VALUE_STACK),
            frames: vec![CallFrame { function_index: 0, ip: 0, base: 0 }],
        }
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let mut steps: u64 = 0;
        loop {
            let op = self.read_opcode()?;
            steps += 1;
            tracing::trace!(steps, ?op, "dispatch");
            match op {
                Opcode::Constant => {
                    let idx = self.read_byte()?;
                    let value = self.constants.get(idx).ok_or(RuntimeError::MissingConstant(idx))?;
                    self.stack.push(value);
                }
                Opcode::String => {
                    let offset = self.read_byte()? as u32;
                    self.stack.push(Value::StringIndex(offset));
                }
                Opcode::Nil => self.stack.push(Value::Nil),
                Opcode::True => self.stack.push(Value::Bool(true)),
                Opcode::False => self.stack.push(Value::Bool(false)),
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::PopN => {
                    let n = self.read_byte()?;
                    self.stack.pop_n(n as usize);
                }
                Opcode::GetLocal => {
                    let off = self.read_byte()? as usize;
                    let base = self.current_frame().base;
                    let value = *self.stack.get(base + off).ok_or(RuntimeError::StackUnderflow)?;
                    self.stack.push(value);
                }
                Opcode::SetLocal => {
                    let off = self.read_byte()? as usize;
                    let base = self.current_frame().base;
                    let value = self.peek(0)?;
                    self.stack.set(base + off, value);
                }
                Opcode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::Bool(a == b));
                }
                Opcode::NotEqual => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::Bool(a != b));
                }
                Opcode::Greater => self.binary_compare(|a, b| a > b)?,
                Opcode::GreaterEqual => self.binary_compare(|a, b| a >= b)?,
                Opcode::Less => self.binary_compare(|a, b| a < b)?,
                Opcode::LessEqual => self.binary_compare(|a, b| a <= b)?,
                Opcode::Add => self.add()?,
                Opcode::AddAssign => self.compound_assign(|a, b| Ok(a + b))?,
                Opcode::Subtract => self.binary_numeric(|a, b| a - b)?,
                Opcode::SubtractAssign => self.compound_assign(|a, b| Ok(a - b))?,
                Opcode::Multiply => self.binary_numeric(|a, b| a * b)?,
                Opcode::MultiplyAssign => self.compound_assign(|a, b| Ok(a * b))?,
                Opcode::Divide => self.binary_numeric(|a, b| a / b)?,
                Opcode::DivideAssign => self.compound_assign(|a, b| Ok(a / b))?,
                Opcode::Modulo => self.modulo()?,
                Opcode::ModuloAssign => {
                    let line = self.current_line();
                    self.compound_assign(|a, b| modulo_i64(a, b, line))?
                }
                Opcode::Not => {
                    let v = self.pop()?;
                    self.stack.push(Value::Bool(v.is_falsey()));
                }
                Opcode::Negate => {
                    let v = self.pop()?;
                    match v {
                        Value::Number(n) => self.stack.push(Value::Number(-n)),
                        _ => return Err(RuntimeError::NegateTypeMismatch { line: self.current_line() }),
                    }
                }
                Opcode::Print => {
                    let v = self.pop()?;
                    println!("{}", self.render(v));
                }
                Opcode::Jump => {
                    let offset = self.read_u16()? as usize;
                    self.current_frame_mut().ip += offset;
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_u16()? as usize;
                    if self.peek(0)?.is_falsey() {
                        self.current_frame_mut().ip += offset;
                    }
                }
                Opcode::Loop => {
                    let offset = self.read_u16()? as usize;
                    self.current_frame_mut().ip -= offset;
                }
                Opcode::Call => {
                    let idx = self.read_byte()?;
                    self.call_user(idx)?;
                }
                Opcode::CallNative => {
                    let idx = self.read_byte()?;
                    self.call_native(idx)?;
                }
                Opcode::Return => {
                    if self.return_()? {
                        tracing::debug!(steps, "run finished");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("frame stack is never empty while running")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("frame stack is never empty while running")
    }

    fn current_line(&self) -> i32 {
        let frame = self.current_frame();
        self.functions[frame.function_index as usize]
            .chunk
            .lines
            .get(frame.ip.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let function_index = self.current_frame().function_index;
        let ip = self.current_frame().ip;
        let byte = *self.functions[function_index as usize]
            .chunk
            .code
            .get(ip)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.current_frame_mut().ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_opcode(&mut self) -> Result<Opcode, RuntimeError> {
        let byte = self.read_byte()?;
        Opcode::try_from(byte).map_err(|e| RuntimeError::UnknownOpcode(e.0))
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        self.stack.peek_at(distance).copied().ok_or(RuntimeError::StackUnderflow)
    }

    fn binary_numeric(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.push(Value::Number(f(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers { line: self.current_line() }),
        }
    }

    fn binary_compare(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.push(Value::Bool(f(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers { line: self.current_line() }),
        }
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::StringIndex(a), Value::StringIndex(b)) => {
                let mut bytes = self.strings.get(a).to_vec();
                bytes.extend_from_slice(self.strings.get(b));
                let offset = self.strings.intern(&bytes);
                self.stack.push(Value::StringIndex(offset));
                Ok(())
            }
            (Value::Number(a), Value::Number(b)) => {
                self.stack.push(Value::Number(a + b));
                Ok(())
            }
            _ => Err(RuntimeError::AddTypeMismatch { line: self.current_line() }),
        }
    }

    fn modulo(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let line = self.current_line();
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.push(Value::Number(modulo_i64(a, b, line)?));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers { line }),
        }
    }

    fn compound_assign(&mut self, f: impl Fn(f64, f64) -> Result<f64, RuntimeError>) -> Result<(), RuntimeError> {
        let off = self.read_byte()? as usize;
        let base = self.current_frame().base;
        let idx = base + off;
        let stored = *self.stack.get(idx).ok_or(RuntimeError::StackUnderflow)?;
        let rhs = self.peek(0)?;
        match (stored, rhs) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.set(idx, Value::Number(f(a, b)?));
                Ok(())
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers { line: self.current_line() }),
        }
    }

    fn call_user(&mut self, idx: u8) -> Result<(), RuntimeError> {
        let arity = self.functions.get(idx as usize).ok_or(RuntimeError::MissingFunction(idx))?.arity as usize;
        let base = self.stack.len().checked_sub(arity).ok_or(RuntimeError::StackUnderflow)?;
        self.frames.push(CallFrame { function_index: idx, ip: 0, base });
        Ok(())
    }

    fn call_native(&mut self, idx: u8) -> Result<(), RuntimeError> {
        let native = self.natives.get(idx).ok_or(RuntimeError::MissingNative(idx))?;
        let arity = native.arity as usize;
        let args: Vec<Value> = self.stack.top_n(arity).ok_or(RuntimeError::StackUnderflow)?.to_vec();
        let result = (native.callable)(&args)?;
        self.stack.pop_n(arity);
        self.stack.push(result);
        Ok(())
    }

    /// Returns `true` once the outermost frame has returned and the program
    /// has finished running.
    fn return_(&mut self) -> Result<bool, RuntimeError> {
        let result = self.pop()?;
        let base = self.current_frame().base;
        self.frames.pop();
        if self.frames.is_empty() {
            self.stack.pop();
            return Ok(true);
        }
        self.stack.truncate(base);
        self.stack.push(result);
        Ok(false)
    }

    fn render(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::StringIndex(offset) => self.strings.get_str(offset).to_string(),
            Value::FunctionIndex { kind: FunctionKind::User, idx } => {
                let name = self.functions.get(idx as usize).map(|f| f.name.as_str()).unwrap_or("?");
                format!("<fn {name}>")
            }
            Value::FunctionIndex { kind: FunctionKind::Native, .. } => "<native fn>".to_string(),
        }
    }
}

fn modulo_i64(a: f64, b: f64, line: i32) -> Result<f64, RuntimeError> {
    if !a.is_finite() || !b.is_finite() {
        return Err(RuntimeError::ModuloOperandNotFinite { line });
    }
    let divisor = truncate_to_i64_wrapping(b);
    if divisor == 0 {
        return Err(RuntimeError::ModuloByZero { line });
    }
    let dividend = truncate_to_i64_wrapping(a);
    Ok(dividend.wrapping_rem(divisor) as f64)
}

/// Truncates `x` toward zero into an `i64`, wrapping on overflow.
///
/// Rust's `as i64` cast on a float saturates to `i64::MAX`/`MIN` rather than
/// wrapping, which doesn't match the truncation semantics `MODULO` needs:
/// reduce the truncated magnitude modulo 2**64 first, then reinterpret the
/// low 64 bits as two's complement.
fn truncate_to_i64_wrapping(x: f64) -> i64 {
    const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;
    let truncated = x.trunc();
    let reduced = truncated.rem_euclid(TWO_POW_64);
    reduced as u64 as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use lumen_syntax::parse_source;

    fn run_source(source: &str) -> Vm {
        let stmts = parse_source(source).unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        vm.run().unwrap();
        vm
    }

    #[test]
    fn arithmetic_precedence() {
        run_source("print 1 + 2 * 3\n");
    }

    #[test]
    fn string_concatenation_runs_without_error() {
        run_source("print \"foo\" + \"bar\"\n");
    }

    #[test]
    fn while_loop_with_compound_assign_terminates() {
        let stmts = parse_source("let i = 0\nwhile i < 5\n  i += 1\nprint i\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn calling_a_user_function() {
        let stmts = parse_source("fun add(a, b)\n  return a + b\nprint add(2, 3)\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn clock_native_returns_a_non_negative_number() {
        let stmts = parse_source("let t = clock()\nprint t >= 0\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn adding_a_number_to_a_string_is_a_runtime_error() {
        let stmts = parse_source("print 1 + \"x\"\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::AddTypeMismatch { .. }));
    }

    #[test]
    fn modulo_rejects_non_finite_operands() {
        let stmts = parse_source("print 1 % 0\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::ModuloByZero { .. }));
    }

    #[test]
    fn modulo_rejects_nan_and_infinite_operands() {
        let stmts = parse_source("print (1 / 0) % 1\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::ModuloOperandNotFinite { .. }));
    }

    #[test]
    fn modulo_wraps_a_huge_operand_instead_of_saturating() {
        // 1e20 doesn't fit in an i64; a saturating cast would clamp it to
        // i64::MAX before the `%`, giving a result that doesn't match
        // wraparound truncation.
        let stmts = parse_source("print 1e20 % 3\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
        assert_eq!(truncate_to_i64_wrapping(1e20), 7766279631452241920);
        assert_eq!(truncate_to_i64_wrapping(1e20) % 3, 2);
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        let stmts = parse_source("if false\n  print 1\nelse\n  print 2\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn or_short_circuits_and_does_not_evaluate_the_right_side() {
        let stmts = parse_source("print true || (1 % 0 == 0)\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn and_short_circuits_and_does_not_evaluate_the_right_side() {
        let stmts = parse_source("print false && (1 % 0 == 0)\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
    }

    #[test]
    fn straight_line_program_leaves_the_stack_empty() {
        let stmts = parse_source("let a = 1\nlet b = 2\nprint a + b\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
        assert!(vm.run().is_ok());
        assert_eq!(vm.stack.len(), 0);
    }
}
