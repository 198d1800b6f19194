//! Integration tests for member access verification

mod common;

use common::{provided_pool, reference, safe_reference};
use retarget_bytecode::{access, Opcode, Roles, Unit, UnitBuilder};
use retarget_core::{verify, RetargetError, VerifyError};

/// Reference with a nested `Hidden` unit that calls the private `tweak()`;
/// the generator only constructs `Hidden` when `reach_hidden` is set
fn hidden_family(reach_hidden: bool) -> Vec<Unit> {
    let outer = UnitBuilder::new("pkg/R")
        .default_constructor()
        .method("tweak", "()V", access::PRIVATE, Roles::NONE, |code| {
            code.op(Opcode::Return);
        })
        .method("size", "()I", access::PUBLIC, Roles::NONE, |code| {
            code.iconst(0).op(Opcode::Ireturn);
        })
        .method("gen", "()I", access::PUBLIC | access::STATIC, Roles::GENERATOR, |code| {
            if reach_hidden {
                code.class_op(Opcode::New, "pkg/R$Hidden");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R$Hidden", "<init>", "()V");
                code.op(Opcode::Pop);
            }
            code.class_op(Opcode::New, "pkg/R");
            code.op(Opcode::Dup);
            code.invoke(Opcode::InvokeSpecial, "pkg/R", "<init>", "()V");
            code.invoke(Opcode::InvokeVirtual, "pkg/R", "size", "()I");
            code.op(Opcode::Ireturn);
        })
        .inner_class("pkg/R$Hidden", Some("pkg/R"), Some("Hidden"), access::STATIC)
        .build()
        .unwrap();
    let hidden = UnitBuilder::new("pkg/R$Hidden")
        .default_constructor()
        .method("poke", "(Lpkg/R;)V", access::PUBLIC, Roles::NONE, |code| {
            code.local(Opcode::Aload, 1);
            code.invoke(Opcode::InvokeVirtual, "pkg/R", "tweak", "()V");
            code.op(Opcode::Return);
        })
        .inner_class("pkg/R$Hidden", Some("pkg/R"), Some("Hidden"), access::STATIC)
        .build()
        .unwrap();
    vec![outer, hidden]
}

#[test]
fn test_private_instance_call_fails() {
    let pool = provided_pool(vec![reference()]);
    let r = pool.resolve("pkg/R").unwrap();

    let err = verify(&r, &pool).unwrap_err();
    let VerifyError::Violation(violation) = err else {
        panic!("expected a violation");
    };
    assert_eq!(violation.unit(), "pkg/R");
    assert_eq!(
        violation.to_string(),
        "Mirrorable method `gen' in `R' calls non-public submission method: pkg.R.tweak()"
    );
    assert!(violation.cause().is_none());
}

#[test]
fn test_public_and_helper_access_passes() {
    let pool = provided_pool(vec![safe_reference()]);
    let r = pool.resolve("pkg/R").unwrap();
    verify(&r, &pool).expect("Only public or Helper members are used");
}

#[test]
fn test_violation_converts_to_umbrella_error() {
    let pool = provided_pool(vec![reference()]);
    let r = pool.resolve("pkg/R").unwrap();

    let err: RetargetError = verify(&r, &pool).unwrap_err().into();
    assert!(matches!(err, RetargetError::Violation(_)));
}

#[test]
fn test_report_serializes() {
    let pool = provided_pool(vec![reference()]);
    let r = pool.resolve("pkg/R").unwrap();
    let Err(VerifyError::Violation(violation)) = verify(&r, &pool) else {
        panic!("expected a violation");
    };

    let json: serde_json::Value = serde_json::from_str(&violation.report().to_json().unwrap()).unwrap();
    assert_eq!(json["blame_method"], "gen");
    assert_eq!(json["member"]["kind"], "method");
    assert_eq!(json["member"]["name"], "tweak");
    assert_eq!(json["signature"], "pkg.R.tweak()");
    assert!(json.get("cause").is_none());
}

#[test]
fn test_unreached_nested_unit_not_checked() {
    let pool = provided_pool(hidden_family(false));
    let r = pool.resolve("pkg/R").unwrap();
    verify(&r, &pool).expect("Hidden is never constructed by generation code");
}

#[test]
fn test_reached_nested_unit_checked() {
    let pool = provided_pool(hidden_family(true));
    let r = pool.resolve("pkg/R").unwrap();

    let Err(VerifyError::Violation(violation)) = verify(&r, &pool) else {
        panic!("expected a violation");
    };
    assert_eq!(violation.blame_method(), "poke");
    assert_eq!(violation.unit(), "pkg/R$Hidden");
    assert_eq!(violation.member().name(), "tweak");
}
