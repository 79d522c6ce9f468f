//! Instructions and their arguments.

use crate::bytecode::value::{StructureToken, Value};
use crate::bytecode::Bytecode;
use crate::coefficient::Coefficient;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One instruction argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[serde(bound = "C: Coefficient")]
pub enum Argument<C: Coefficient> {
    /// A primitive (or composite) value.
    Value(Value),
    /// A nested sub-traversal, compiled into a child pipeline.
    Bytecode(Bytecode<C>),
    /// An opaque reference to a backing structure.
    Structure(StructureToken),
}

impl<C: Coefficient> Argument<C> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Argument::Value(v) => v.type_name(),
            Argument::Bytecode(_) => "bytecode",
            Argument::Structure(_) => "structure reference",
        }
    }
}

impl<C: Coefficient> fmt::Display for Argument<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "{}", v),
            Argument::Bytecode(b) => write!(f, "{}", b),
            Argument::Structure(token) => write!(f, "&{}", token),
        }
    }
}

impl<C: Coefficient> From<Value> for Argument<C> {
    fn from(v: Value) -> Self {
        Argument::Value(v)
    }
}

impl<C: Coefficient> From<Bytecode<C>> for Argument<C> {
    fn from(b: Bytecode<C>) -> Self {
        Argument::Bytecode(b)
    }
}

impl<C: Coefficient> From<StructureToken> for Argument<C> {
    fn from(token: StructureToken) -> Self {
        Argument::Structure(token)
    }
}

impl<C: Coefficient> From<&str> for Argument<C> {
    fn from(s: &str) -> Self {
        Argument::Value(Value::from(s))
    }
}

impl<C: Coefficient> From<i64> for Argument<C> {
    fn from(i: i64) -> Self {
        Argument::Value(Value::Int(i))
    }
}

/// A single uncompiled step: opcode, optional label, coefficient and arguments.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "C: Coefficient")]
pub struct Instruction<C: Coefficient> {
    opcode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    coefficient: C,
    #[serde(default)]
    args: Vec<Argument<C>>,
}

impl<C: Coefficient> Instruction<C> {
    /// Create an instruction with the identity coefficient and no arguments.
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            label: None,
            coefficient: C::identity(),
            args: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_coefficient(mut self, coefficient: C) -> Self {
        self.coefficient = coefficient;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<Argument<C>>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<A: Into<Argument<C>>>(mut self, args: impl IntoIterator<Item = A>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn coefficient(&self) -> &C {
        &self.coefficient
    }

    pub fn args(&self) -> &[Argument<C>] {
        &self.args
    }
}

/// Render one step as `coefficient*opcode(args)@label`.
///
/// The coefficient is omitted when it is the identity, the argument list
/// when it is empty.
pub(crate) fn write_step<C: Coefficient>(
    f: &mut fmt::Formatter<'_>,
    opcode: &str,
    label: Option<&str>,
    coefficient: &C,
    args: &[Argument<C>],
) -> fmt::Result {
    if !coefficient.is_identity() {
        write!(f, "{}*", coefficient)?;
    }
    f.write_str(opcode)?;
    if !args.is_empty() {
        write!(f, "(")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")?;
    }
    if let Some(label) = label {
        write!(f, "@{}", label)?;
    }
    Ok(())
}

impl<C: Coefficient> fmt::Display for Instruction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_step(f, &self.opcode, self.label.as_deref(), &self.coefficient, &self.args)
    }
}
