//! Test data builders for bytecode

use traversal_machine::{Argument, Bytecode, Instruction, LongCoefficient, StructureToken};

/// Builder for creating test bytecode one step at a time
#[derive(Default)]
pub struct BytecodeBuilder {
    code: Bytecode<LongCoefficient>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, opcode: &str) -> Self {
        self.code.push(Instruction::new(opcode));
        self
    }

    pub fn step_with<A: Into<Argument<LongCoefficient>>>(
        mut self,
        opcode: &str,
        args: impl IntoIterator<Item = A>,
    ) -> Self {
        self.code.push(Instruction::new(opcode).with_args(args));
        self
    }

    /// Push a prepared instruction (labels, coefficients)
    pub fn instruction(mut self, instruction: Instruction<LongCoefficient>) -> Self {
        self.code.push(instruction);
        self
    }

    /// `V` over the fixture graph
    pub fn vertices(self) -> Self {
        self.step_with("V", [StructureToken::new("modern")])
    }

    pub fn inject(self, values: &[i64]) -> Self {
        self.step_with("inject", values.iter().copied())
    }

    pub fn build(self) -> Bytecode<LongCoefficient> {
        self.code
    }
}

/// `V().both().both().count()` over the fixture graph
pub fn two_hop_count() -> Bytecode<LongCoefficient> {
    BytecodeBuilder::new()
        .vertices()
        .step("both")
        .step("both")
        .step("count")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytecode_builder() {
        let code = BytecodeBuilder::new().inject(&[1, 2]).step("count").build();

        assert_eq!(code.len(), 2);
        assert_eq!(code.instructions()[0].opcode(), "inject");
        assert_eq!(code.instructions()[0].args().len(), 2);
    }
}
