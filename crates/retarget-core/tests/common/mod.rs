//! Shared fixtures for integration tests

#![allow(dead_code)]

use retarget_bytecode::{access, Opcode, Roles, Unit, UnitBuilder};
use retarget_core::{MemoryProvider, PoolConfig, UnitPool};
use std::sync::Arc;

/// Pool whose provider serves `units` as pre-compiled binaries
pub fn provided_pool(units: Vec<Unit>) -> Arc<UnitPool> {
    let provider: MemoryProvider = units
        .into_iter()
        .map(|unit| (unit.name().expect("unit name").to_string(), unit.encode()))
        .collect();
    Arc::new(UnitPool::with_provider(PoolConfig::default(), Arc::new(provider)))
}

/// Reference unit: Helper-tagged static `seed`, a generator that reads it
/// and calls the private instance method `tweak()`, an untagged instance
/// method and a Verify hook
pub fn reference() -> Unit {
    UnitBuilder::new("pkg/R")
        .field("seed", "I", access::PRIVATE | access::STATIC, Roles::HELPER)
        .field("value", "I", access::PRIVATE, Roles::NONE)
        .default_constructor()
        .method("tweak", "()V", access::PRIVATE, Roles::NONE, |code| {
            code.op(Opcode::Return);
        })
        .method("size", "()I", access::PUBLIC, Roles::NONE, |code| {
            code.iconst(0).op(Opcode::Ireturn);
        })
        .method(
            "gen",
            "()Lpkg/R;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.max_stack(2).max_locals(1);
                code.field(Opcode::GetStatic, "pkg/R", "seed", "I");
                code.op(Opcode::Pop);
                code.class_op(Opcode::New, "pkg/R");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R", "<init>", "()V");
                code.local(Opcode::Astore, 0);
                let receiver = code.object_type("pkg/R");
                code.frame(vec![receiver], vec![]);
                code.local(Opcode::Aload, 0);
                code.invoke(Opcode::InvokeVirtual, "pkg/R", "tweak", "()V");
                code.local(Opcode::Aload, 0);
                code.op(Opcode::Areturn);
                code.local_variable("r", "Lpkg/R;", 0);
            },
        )
        .method("check", "(Lpkg/R;)Z", access::PUBLIC, Roles::VERIFY, |code| {
            code.iconst(1).op(Opcode::Ireturn);
        })
        .build()
        .unwrap()
}

/// Same reference shape with only public members reached from generation code
pub fn safe_reference() -> Unit {
    UnitBuilder::new("pkg/R")
        .field("seed", "I", access::PRIVATE | access::STATIC, Roles::HELPER)
        .default_constructor()
        .method("tweak", "()V", access::PUBLIC, Roles::NONE, |code| {
            code.op(Opcode::Return);
        })
        .method("pick", "(I)I", access::PRIVATE | access::STATIC, Roles::HELPER, |code| {
            code.local(Opcode::Iload, 0).op(Opcode::Ireturn);
        })
        .method(
            "gen",
            "()Lpkg/R;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.field(Opcode::GetStatic, "pkg/R", "seed", "I");
                code.invoke(Opcode::InvokeStatic, "pkg/R", "pick", "(I)I");
                code.op(Opcode::Pop);
                code.class_op(Opcode::New, "pkg/R");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R", "<init>", "()V");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeVirtual, "pkg/R", "tweak", "()V");
                code.op(Opcode::Areturn);
            },
        )
        .build()
        .unwrap()
}

/// Submission unit structurally matching [`reference`]
pub fn submission() -> Unit {
    UnitBuilder::new("pkg/S")
        .field("value", "I", access::PRIVATE, Roles::NONE)
        .default_constructor()
        .method("tweak", "()V", access::PRIVATE, Roles::NONE, |code| {
            code.op(Opcode::Return);
        })
        .method("size", "()I", access::PUBLIC, Roles::NONE, |code| {
            code.iconst(1).op(Opcode::Ireturn);
        })
        .build()
        .unwrap()
}

/// Reference whose generator builds a nested `Node`
pub fn nested_reference() -> Unit {
    UnitBuilder::new("pkg/R")
        .default_constructor()
        .method(
            "gen",
            "()Lpkg/R$Node;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.class_op(Opcode::New, "pkg/R$Node");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R$Node", "<init>", "()V");
                code.op(Opcode::Areturn);
            },
        )
        .inner_class("pkg/R$Node", Some("pkg/R"), Some("Node"), access::PUBLIC | access::STATIC)
        .nest_member("pkg/R$Node")
        .build()
        .unwrap()
}

/// Nested unit of [`nested_reference`]
pub fn reference_node() -> Unit {
    UnitBuilder::new("pkg/R$Node")
        .field("next", "Lpkg/R$Node;", access::PUBLIC, Roles::NONE)
        .default_constructor()
        .method("owner", "()Lpkg/R;", access::PUBLIC, Roles::NONE, |code| {
            code.op(Opcode::AconstNull).op(Opcode::Areturn);
        })
        .inner_class("pkg/R$Node", Some("pkg/R"), Some("Node"), access::PUBLIC | access::STATIC)
        .nest_host("pkg/R")
        .build()
        .unwrap()
}

/// Final outer unit with a final nested unit
pub fn sealed_outer() -> Unit {
    UnitBuilder::new("pkg/Outer")
        .access(access::PUBLIC | access::FINAL)
        .default_constructor()
        .method("value", "()I", access::PUBLIC | access::FINAL, Roles::NONE, |code| {
            code.iconst(3).op(Opcode::Ireturn);
        })
        .method(
            "make",
            "()Lpkg/Outer$Inner;",
            access::PUBLIC | access::STATIC,
            Roles::NONE,
            |code| {
                code.class_op(Opcode::New, "pkg/Outer$Inner");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/Outer$Inner", "<init>", "()V");
                code.op(Opcode::Areturn);
            },
        )
        .inner_class(
            "pkg/Outer$Inner",
            Some("pkg/Outer"),
            Some("Inner"),
            access::PUBLIC | access::STATIC | access::FINAL,
        )
        .build()
        .unwrap()
}

/// Nested unit of [`sealed_outer`]
pub fn sealed_inner() -> Unit {
    UnitBuilder::new("pkg/Outer$Inner")
        .access(access::PUBLIC | access::FINAL)
        .default_constructor()
        .method("get", "()I", access::PUBLIC | access::FINAL, Roles::NONE, |code| {
            code.iconst(4).op(Opcode::Ireturn);
        })
        .method("outer", "()Lpkg/Outer;", access::PUBLIC, Roles::NONE, |code| {
            code.op(Opcode::AconstNull).op(Opcode::Areturn);
        })
        .inner_class(
            "pkg/Outer$Inner",
            Some("pkg/Outer"),
            Some("Inner"),
            access::PUBLIC | access::STATIC | access::FINAL,
        )
        .build()
        .unwrap()
}

/// Outer unit `name` with a public `size` field, a `head()` method returning
/// its nested `Node`, and the nested unit itself
pub fn list_family(name: &str) -> Vec<Unit> {
    let node = format!("{name}$Node");
    let node_type = format!("L{node};");
    let outer = UnitBuilder::new(name)
        .field("size", "I", access::PUBLIC, Roles::NONE)
        .default_constructor()
        .method("head", &format!("(){node_type}"), access::PUBLIC, Roles::NONE, |code| {
            code.op(Opcode::AconstNull).op(Opcode::Areturn);
        })
        .method("push", "(I)V", access::PUBLIC, Roles::NONE, |code| {
            code.op(Opcode::Return);
        })
        .inner_class(&node, Some(name), Some("Node"), access::PUBLIC | access::STATIC)
        .build()
        .unwrap();
    let nested = UnitBuilder::new(&node)
        .field("value", "I", access::PUBLIC, Roles::NONE)
        .default_constructor()
        .method("get", "()I", access::PUBLIC, Roles::NONE, |code| {
            code.iconst(0).op(Opcode::Ireturn);
        })
        .inner_class(&node, Some(name), Some("Node"), access::PUBLIC | access::STATIC)
        .build()
        .unwrap();
    vec![outer, nested]
}

/// Reference whose generator passes a fresh instance through a
/// reference-typed Helper
pub fn wrapping_reference() -> Unit {
    UnitBuilder::new("pkg/R")
        .default_constructor()
        .method(
            "wrap",
            "(Lpkg/R;)Lpkg/R;",
            access::PRIVATE | access::STATIC,
            Roles::HELPER,
            |code| {
                code.local(Opcode::Aload, 0).op(Opcode::Areturn);
            },
        )
        .method(
            "gen",
            "()Lpkg/R;",
            access::PUBLIC | access::STATIC,
            Roles::GENERATOR,
            |code| {
                code.class_op(Opcode::New, "pkg/R");
                code.op(Opcode::Dup);
                code.invoke(Opcode::InvokeSpecial, "pkg/R", "<init>", "()V");
                code.invoke(Opcode::InvokeStatic, "pkg/R", "wrap", "(Lpkg/R;)Lpkg/R;");
                code.op(Opcode::Areturn);
            },
        )
        .build()
        .unwrap()
}
