//! Integration tests for the binary unit format

use retarget_bytecode::{
    access, decode_instructions, rewrite_symbols, Constant, Opcode, Roles, Unit, UnitBuilder,
    VerificationType,
};

fn nested_reference() -> Unit {
    UnitBuilder::new("pkg/R")
        .source_file("R.java")
        .field("seed", "I", access::STATIC, Roles::HELPER)
        .field("value", "I", access::PRIVATE, Roles::NONE)
        .default_constructor()
        .method(
            "gen",
            "()Lpkg/R;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.max_stack(2).max_locals(1);
                code.class_op(Opcode::New, "pkg/R");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R", "<init>", "()V");
                code.local(Opcode::Astore, 0);
                let this = code.object_type("pkg/R");
                code.frame(vec![this], vec![]);
                code.local(Opcode::Aload, 0);
                code.op(Opcode::Areturn);
                code.local_variable("r", "Lpkg/R;", 0);
            },
        )
        .inner_class("pkg/R$Node", Some("pkg/R"), Some("Node"), access::PUBLIC | access::STATIC)
        .nest_member("pkg/R$Node")
        .build()
        .unwrap()
}

#[test]
fn test_encode_decode_preserves_unit() {
    let unit = nested_reference();
    let decoded = Unit::decode(&unit.encode()).expect("Failed to decode");
    assert_eq!(decoded, unit);
    assert_eq!(decoded.name().unwrap(), "pkg/R");
    assert_eq!(decoded.inner_class_names().unwrap(), vec!["pkg/R$Node"]);
    assert_eq!(decoded.source_file.as_deref(), Some("R.java"));
}

#[test]
fn test_roles_survive_encoding() {
    let decoded = Unit::decode(&nested_reference().encode()).unwrap();
    assert!(decoded.field("seed").unwrap().roles.contains(Roles::HELPER));
    assert!(decoded.field("value").unwrap().roles.is_empty());
    assert!(decoded
        .method("gen", "()Lpkg/R;")
        .unwrap()
        .roles
        .intersects(Roles::GENERATION));
}

#[test]
fn test_stack_map_references_class_entry() {
    let unit = nested_reference();
    let code = unit.method("gen", "()Lpkg/R;").unwrap().code.clone().unwrap();
    let frame = &code.stack_map[0];
    let VerificationType::Object(index) = frame.locals[0] else {
        panic!("expected object slot");
    };
    assert_eq!(unit.constants.class_name(index).unwrap(), "pkg/R");
    assert_eq!(code.local_variables[0].length as usize, code.bytecode.len());
}

#[test]
fn test_retarget_new_operand() {
    let mut unit = nested_reference();
    let target = unit.constants.add_class("sub/S").unwrap();
    let original = unit.constants.add_class("pkg/R").unwrap();

    let method = unit
        .methods
        .iter_mut()
        .find(|m| m.name == "gen")
        .unwrap();
    let code = method.code.as_mut().unwrap();
    let changed = rewrite_symbols(&mut code.bytecode, |insn| {
        (insn.opcode == Opcode::New && insn.symbol() == Some(original)).then_some(target)
    })
    .unwrap();
    assert_eq!(changed, 1);

    let instructions = decode_instructions(&code.bytecode).unwrap();
    assert_eq!(instructions[0].symbol(), Some(target));
    assert!(matches!(
        unit.constants.get(target),
        Some(Constant::Class { .. })
    ));
}
