//! Integration tests for generator mirrors

mod common;

use common::{
    nested_reference, provided_pool, reference, reference_node, submission, wrapping_reference,
};
use retarget_bytecode::{access, Constant, MemberKind, Opcode, Roles, Unit, UnitBuilder};
use retarget_core::{build_generator_mirror, build_generator_mirror_with_prefix, verify, VerifyError};
use std::sync::Arc;

#[test]
fn test_tagged_methods_survive() {
    let pool = provided_pool(vec![reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    let mirror = build_generator_mirror(&r, &s, &pool).expect("Failed to mirror");
    let unit = mirror.unit();

    assert!(mirror.name().starts_with("retargetmirror/m"));
    assert!(unit.method("gen", "()Lpkg/S;").is_some());
    assert!(unit.method("check", "(Lpkg/S;)Z").is_some());
    assert!(unit.methods_named("size").next().is_none());
    assert!(unit.methods_named("tweak").next().is_none());
    assert!(unit.methods_named("<init>").next().is_none());

    pool.link(&mirror).expect("Mirror should link");
}

#[test]
fn test_receiver_retargeted_and_helpers_bound() {
    let pool = provided_pool(vec![reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();
    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    let constants = &mirror.unit().constants;

    let mut members = Vec::new();
    for (index, constant) in constants.iter() {
        if matches!(constant, Constant::FieldRef { .. } | Constant::MethodRef { .. }) {
            let member = constants.member_ref(index).unwrap();
            members.push((member.kind, member.owner.to_string(), member.name.to_string()));
        }
    }
    assert!(members.contains(&(MemberKind::Method, "pkg/S".into(), "tweak".into())));
    assert!(members.contains(&(MemberKind::Method, "pkg/S".into(), "<init>".into())));
    assert!(members.contains(&(MemberKind::Field, "pkg/R".into(), "seed".into())));
    assert!(!members.contains(&(MemberKind::Method, "pkg/R".into(), "tweak".into())));

    let gen = mirror.unit().method("gen", "()Lpkg/S;").unwrap();
    let code = gen.code.as_ref().unwrap();
    let created: Vec<_> = retarget_bytecode::decode_instructions(&code.bytecode)
        .unwrap()
        .into_iter()
        .filter(|instruction| instruction.opcode == Opcode::New)
        .map(|instruction| constants.class_name(instruction.symbol().unwrap()).unwrap().to_string())
        .collect();
    assert_eq!(created, vec!["pkg/S".to_string()]);
    assert_eq!(code.local_variables[0].descriptor, "Lpkg/S;");
}

#[test]
fn test_reference_typed_helper_served_by_mirror() {
    let pool = provided_pool(vec![wrapping_reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();
    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    let unit = mirror.unit();

    assert!(unit.method("wrap", "(Lpkg/S;)Lpkg/S;").is_some());
    let gen = unit.method("gen", "()Lpkg/S;").unwrap();
    let code = gen.code.as_ref().unwrap();
    let calls: Vec<_> = retarget_bytecode::decode_instructions(&code.bytecode)
        .unwrap()
        .into_iter()
        .filter(|instruction| instruction.opcode == Opcode::InvokeStatic)
        .map(|instruction| {
            let member = unit.constants.member_ref(instruction.symbol().unwrap()).unwrap();
            (member.owner.to_string(), member.descriptor.to_string())
        })
        .collect();
    assert_eq!(
        calls,
        vec![(mirror.name().to_string(), "(Lpkg/S;)Lpkg/S;".to_string())]
    );

    pool.link(&mirror).unwrap();
}

#[test]
fn test_mirroring_is_idempotent() {
    let pool = provided_pool(vec![reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    let first = build_generator_mirror(&r, &s, &pool).unwrap();
    let second = build_generator_mirror(&r, &s, &pool).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = build_generator_mirror_with_prefix(&r, &s, &pool, "alt").unwrap();
    assert_ne!(first.name(), other.name());
}

#[test]
fn test_no_nested_units_single_mirror() {
    let pool = provided_pool(vec![reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();
    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();

    let synthesized = pool.synthesized_bytes();
    assert_eq!(synthesized.len(), 1);
    assert!(synthesized.contains_key(mirror.name()));
    assert_eq!(pool.original_of(mirror.name()), "pkg/R");
}

#[test]
fn test_nested_units_mirrored() {
    let pool = provided_pool(vec![nested_reference(), reference_node(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    let node_name = format!("{}$Node", mirror.name());
    let node = pool.find(&node_name).unwrap().expect("Nested mirror defined");

    assert_eq!(pool.synthesized_bytes().len(), 2);
    assert!(mirror
        .unit()
        .method("gen", &format!("()L{node_name};"))
        .is_some());
    assert!(node.unit().method("owner", "()Lpkg/S;").is_some());
    assert_eq!(node.unit().field("next").unwrap().descriptor, format!("L{node_name};"));

    let host = node.unit().nest_host.unwrap();
    assert_eq!(node.unit().constants.class_name(host).unwrap(), mirror.name());
    let entry = &node.unit().inner_classes[0];
    assert_eq!(node.unit().constants.class_name(entry.inner).unwrap(), node_name);
    assert_eq!(node.unit().constants.class_name(entry.outer).unwrap(), mirror.name());
    assert_eq!(pool.original_of(&node_name), "pkg/R$Node");

    pool.link(&mirror).unwrap();
    pool.link(&node).unwrap();
}

/// `pkg/R` whose generator builds `R$A`, where `R$A` and `R$B` construct each other
fn mutual_family() -> Vec<Unit> {
    let outer = UnitBuilder::new("pkg/R")
        .default_constructor()
        .method(
            "gen",
            "()Lpkg/R$A;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.class_op(Opcode::New, "pkg/R$A");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R$A", "<init>", "()V");
                code.op(Opcode::Areturn);
            },
        )
        .inner_class("pkg/R$A", Some("pkg/R"), Some("A"), access::PUBLIC | access::STATIC)
        .inner_class("pkg/R$B", Some("pkg/R"), Some("B"), access::PUBLIC | access::STATIC)
        .build()
        .unwrap();
    let side = |name: &str, other: &str, simple: &str| {
        UnitBuilder::new(name)
            .field("peer", &format!("L{other};"), access::PUBLIC, Roles::NONE)
            .default_constructor()
            .method("peer", &format!("()L{other};"), access::PUBLIC, Roles::NONE, |code| {
                code.class_op(Opcode::New, other);
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, other, "<init>", "()V");
                code.op(Opcode::Areturn);
            })
            .inner_class(name, Some("pkg/R"), Some(simple), access::PUBLIC | access::STATIC)
            .build()
            .unwrap()
    };
    vec![
        outer,
        side("pkg/R$A", "pkg/R$B", "A"),
        side("pkg/R$B", "pkg/R$A", "B"),
    ]
}

#[test]
fn test_mutually_nested_units_terminate() {
    let mut units = mutual_family();
    units.push(submission());
    let pool = provided_pool(units);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    let a_name = format!("{}$A", mirror.name());
    let b_name = format!("{}$B", mirror.name());
    let a = pool.find(&a_name).unwrap().expect("A mirrored");
    let b = pool.find(&b_name).unwrap().expect("B mirrored");

    assert_eq!(pool.synthesized_bytes().len(), 3);
    assert_eq!(a.unit().field("peer").unwrap().descriptor, format!("L{b_name};"));
    assert_eq!(b.unit().field("peer").unwrap().descriptor, format!("L{a_name};"));
    assert!(b.unit().method("peer", &format!("()L{a_name};")).is_some());

    for unit in [&mirror, &a, &b] {
        pool.link(unit).unwrap();
    }
}

#[test]
fn test_nested_target_rejected() {
    let pool = provided_pool(vec![nested_reference(), reference_node(), submission()]);
    let node = pool.resolve("pkg/R$Node").unwrap();
    let s = pool.resolve("pkg/S").unwrap();
    assert!(build_generator_mirror(&node, &s, &pool).is_err());
}

#[test]
fn test_end_to_end_seed_and_tweak() {
    let pool = provided_pool(vec![reference(), submission()]);
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    pool.link(&mirror).unwrap();

    match verify(&r, &pool) {
        Err(VerifyError::Violation(violation)) => {
            assert_eq!(violation.blame_method(), "gen");
            assert_eq!(violation.member().name(), "tweak");
            assert_eq!(violation.member().signature(), "pkg.R.tweak()");
        }
        other => panic!("expected a violation, got {other:?}"),
    }
}
