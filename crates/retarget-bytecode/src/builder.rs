//! Programmatic unit assembler

use crate::constants::{ConstantError, ConstantPool};
use crate::encoder::BytecodeWriter;
use crate::opcode::Opcode;
use crate::roles::{access, Roles};
use crate::unit::{
    Code, EnclosingMethod, FieldInfo, InnerClass, LocalVariable, MethodInfo, StackMapFrame, Unit,
    VerificationType,
};

/// Root of every unit hierarchy
pub const OBJECT: &str = "java/lang/Object";

/// Assembles a [`Unit`] one declaration at a time
///
/// The first symbol-table failure is kept and reported by [`UnitBuilder::build`].
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    unit: Unit,
    error: Option<ConstantError>,
}

impl UnitBuilder {
    /// Start a public unit extending [`OBJECT`]
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            unit: Unit {
                access: access::PUBLIC,
                this_class: 0,
                super_class: 0,
                interfaces: Vec::new(),
                constants: ConstantPool::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                inner_classes: Vec::new(),
                enclosing_method: None,
                nest_host: None,
                nest_members: Vec::new(),
                source_file: None,
            },
            error: None,
        };
        builder.unit.this_class = builder.class(name);
        builder.unit.super_class = builder.class(OBJECT);
        builder
    }

    fn class(&mut self, name: &str) -> u16 {
        let added = self.unit.constants.add_class(name);
        record(&mut self.error, added)
    }

    /// Replace the unit access flags
    pub fn access(mut self, flags: u16) -> Self {
        self.unit.access = flags;
        self
    }

    /// Set the super unit
    pub fn extends(mut self, name: &str) -> Self {
        self.unit.super_class = self.class(name);
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.unit.interfaces.push(index);
        self
    }

    /// Declare a field
    pub fn field(mut self, name: &str, descriptor: &str, flags: u16, roles: Roles) -> Self {
        self.unit.fields.push(FieldInfo {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            roles,
        });
        self
    }

    /// Declare a method without a body
    pub fn bodiless_method(mut self, name: &str, descriptor: &str, flags: u16) -> Self {
        self.unit.methods.push(MethodInfo {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            roles: Roles::NONE,
            code: None,
        });
        self
    }

    /// Declare a method whose body is assembled by `body`
    pub fn method<F>(
        mut self,
        name: &str,
        descriptor: &str,
        flags: u16,
        roles: Roles,
        body: F,
    ) -> Self
    where
        F: FnOnce(&mut CodeBuilder<'_>),
    {
        let mut code = CodeBuilder::new(&mut self.unit.constants);
        body(&mut code);
        let (code, error) = code.finish();
        if let Some(error) = error {
            self.error.get_or_insert(error);
        }
        self.unit.methods.push(MethodInfo {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            roles,
            code: Some(code),
        });
        self
    }

    /// Declare a public no-argument constructor calling the super constructor
    pub fn default_constructor(self) -> Self {
        let super_name = match self.unit.super_name() {
            Ok(Some(name)) => name.to_string(),
            _ => OBJECT.to_string(),
        };
        self.method("<init>", "()V", access::PUBLIC, Roles::NONE, |code| {
            code.max_stack(1).max_locals(1);
            code.local(Opcode::Aload, 0);
            code.invoke(Opcode::InvokeSpecial, &super_name, "<init>", "()V");
            code.op(Opcode::Return);
        })
    }

    /// Add a nested-unit table entry
    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        simple_name: Option<&str>,
        flags: u16,
    ) -> Self {
        let inner = self.class(inner);
        let outer = outer.map_or(0, |name| self.class(name));
        self.unit.inner_classes.push(InnerClass {
            inner,
            outer,
            simple_name: simple_name.map(str::to_string),
            access: flags,
        });
        self
    }

    /// Record the method a local unit is declared in
    pub fn enclosing_method(mut self, class: &str, method: Option<(&str, &str)>) -> Self {
        let class = self.class(class);
        self.unit.enclosing_method = Some(EnclosingMethod {
            class,
            method: method.map(|(name, descriptor)| (name.to_string(), descriptor.to_string())),
        });
        self
    }

    /// Set the nest host
    pub fn nest_host(mut self, host: &str) -> Self {
        self.unit.nest_host = Some(self.class(host));
        self
    }

    /// Add a nest member
    pub fn nest_member(mut self, member: &str) -> Self {
        let index = self.class(member);
        self.unit.nest_members.push(index);
        self
    }

    /// Set the source file name
    pub fn source_file(mut self, name: &str) -> Self {
        self.unit.source_file = Some(name.to_string());
        self
    }

    /// Direct access to the symbol table
    pub fn constants_mut(&mut self) -> &mut ConstantPool {
        &mut self.unit.constants
    }

    /// Finish the unit
    pub fn build(self) -> Result<Unit, ConstantError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.unit),
        }
    }
}

/// Keep the first failure and hand back index 0 in its place
fn record(error: &mut Option<ConstantError>, added: Result<u16, ConstantError>) -> u16 {
    added.unwrap_or_else(|failure| {
        error.get_or_insert(failure);
        0
    })
}

/// Assembles one method body against the owning unit's symbol table
pub struct CodeBuilder<'a> {
    constants: &'a mut ConstantPool,
    writer: BytecodeWriter,
    max_stack: u16,
    max_locals: u16,
    locals: Vec<(String, String, u16)>,
    frames: Vec<StackMapFrame>,
    error: Option<ConstantError>,
}

impl<'a> CodeBuilder<'a> {
    fn new(constants: &'a mut ConstantPool) -> Self {
        Self {
            constants,
            writer: BytecodeWriter::new(),
            max_stack: 0,
            max_locals: 0,
            locals: Vec::new(),
            frames: Vec::new(),
            error: None,
        }
    }

    fn symbol<F>(&mut self, add: F) -> u16
    where
        F: FnOnce(&mut ConstantPool) -> Result<u16, ConstantError>,
    {
        let added = add(&mut *self.constants);
        record(&mut self.error, added)
    }

    /// Set the maximum stack depth
    pub fn max_stack(&mut self, depth: u16) -> &mut Self {
        self.max_stack = depth;
        self
    }

    /// Set the number of local slots
    pub fn max_locals(&mut self, slots: u16) -> &mut Self {
        self.max_locals = slots;
        self
    }

    /// Current bytecode offset
    pub fn offset(&self) -> usize {
        self.writer.offset()
    }

    /// Emit an opcode without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.emit_opcode(opcode);
        self
    }

    /// Emit an integer constant
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.writer.emit_iconst(value);
        self
    }

    /// Emit a load or store of a local slot
    pub fn local(&mut self, opcode: Opcode, slot: u16) -> &mut Self {
        self.writer.emit_local(opcode, slot);
        self
    }

    /// Emit a branch with a relative offset
    pub fn branch(&mut self, opcode: Opcode, offset: i32) -> &mut Self {
        self.writer.emit_branch(opcode, offset);
        self
    }

    /// Load a string literal
    pub fn ldc_string(&mut self, text: &str) -> &mut Self {
        let index = self.symbol(|constants| constants.add_string(text));
        self.writer.emit_symbol(Opcode::Ldc, index);
        self
    }

    /// Emit an instruction whose operand is a Class entry (New, CheckCast, ...)
    pub fn class_op(&mut self, opcode: Opcode, class: &str) -> &mut Self {
        let index = self.symbol(|constants| constants.add_class(class));
        self.writer.emit_symbol(opcode, index);
        self
    }

    /// Emit a field access
    pub fn field(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.symbol(|constants| constants.add_field_ref(owner, name, descriptor));
        self.writer.emit_symbol(opcode, index);
        self
    }

    /// Emit a class method invocation
    pub fn invoke(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.symbol(|constants| constants.add_method_ref(owner, name, descriptor));
        self.writer.emit_symbol(opcode, index);
        self
    }

    /// Emit an interface method invocation
    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index =
            self.symbol(|constants| constants.add_interface_method_ref(owner, name, descriptor));
        self.writer.emit_symbol(Opcode::InvokeInterface, index);
        self
    }

    /// Emit a dynamic call site naming a NameAndType
    pub fn invoke_dynamic(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let index = self.symbol(|constants| constants.add_name_and_type(name, descriptor));
        self.writer.emit_symbol(Opcode::InvokeDynamic, index);
        self
    }

    /// Allocate a multi-dimensional array of the given array class
    pub fn multi_new_array(&mut self, class: &str, dimensions: u8) -> &mut Self {
        let index = self.symbol(|constants| constants.add_class(class));
        self.writer.emit_multi_new_array(index, dimensions);
        self
    }

    /// Declare a local variable live over the whole body
    pub fn local_variable(&mut self, name: &str, descriptor: &str, slot: u16) -> &mut Self {
        self.locals
            .push((name.to_string(), descriptor.to_string(), slot));
        self
    }

    /// Stack-map slot for an object of `class`
    pub fn object_type(&mut self, class: &str) -> VerificationType {
        VerificationType::Object(self.symbol(|constants| constants.add_class(class)))
    }

    /// Record a stack-map frame at the current offset
    pub fn frame(&mut self, locals: Vec<VerificationType>, stack: Vec<VerificationType>) -> &mut Self {
        self.frames.push(StackMapFrame {
            offset: self.writer.offset() as u32,
            locals,
            stack,
        });
        self
    }

    fn finish(self) -> (Code, Option<ConstantError>) {
        let length = self.writer.offset() as u32;
        let code = Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            bytecode: self.writer.into_bytes(),
            local_variables: self
                .locals
                .into_iter()
                .map(|(name, descriptor, slot)| LocalVariable {
                    start: 0,
                    length,
                    name,
                    descriptor,
                    slot,
                })
                .collect(),
            stack_map: self.frames,
        };
        (code, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::decode_instructions;

    #[test]
    fn test_builder_method_body() {
        let unit = UnitBuilder::new("pkg/R")
            .field("seed", "I", access::STATIC, Roles::HELPER)
            .method("gen", "()I", access::STATIC, Roles::GENERATOR, |code| {
                code.max_stack(1);
                code.field(Opcode::GetStatic, "pkg/R", "seed", "I");
                code.op(Opcode::Ireturn);
            })
            .build()
            .unwrap();

        let method = unit.method("gen", "()I").unwrap();
        let code = method.code.as_ref().unwrap();
        let instructions = decode_instructions(&code.bytecode).unwrap();
        assert_eq!(instructions.len(), 2);
        let member = unit
            .constants
            .member_ref(instructions[0].symbol().unwrap())
            .unwrap();
        assert_eq!((member.owner, member.name), ("pkg/R", "seed"));
        assert!(unit.field("seed").unwrap().roles.contains(Roles::HELPER));
    }

    #[test]
    fn test_default_constructor_calls_super() {
        let unit = UnitBuilder::new("pkg/Sub")
            .extends("pkg/Base")
            .default_constructor()
            .build()
            .unwrap();
        let ctor = unit.method("<init>", "()V").unwrap();
        let instructions = decode_instructions(&ctor.code.as_ref().unwrap().bytecode).unwrap();
        let member = unit
            .constants
            .member_ref(instructions[1].symbol().unwrap())
            .unwrap();
        assert_eq!(member.owner, "pkg/Base");
    }

    #[test]
    fn test_full_symbol_table_fails_build() {
        let mut builder = UnitBuilder::new("pkg/R");
        while builder.constants_mut().len() < crate::constants::MAX_ENTRIES {
            let next = builder.constants_mut().len() as i32;
            builder
                .constants_mut()
                .push(crate::constants::Constant::Integer(next))
                .unwrap();
        }
        let result = builder
            .method("gen", "()V", access::STATIC, Roles::GENERATOR, |code| {
                code.invoke(Opcode::InvokeStatic, "pkg/R", "pick", "()V");
                code.op(Opcode::Return);
            })
            .build();
        assert_eq!(result.unwrap_err(), ConstantError::Overflow);
    }
}
