//! Test harness for testing-type scenarios
//!
//! Assembles the model classes with `ClassBuilder` (the shapes `javac`
//! emits for them), installs them into a fresh registry, and calls into the
//! generated types through their capability interfaces.

#![allow(dead_code)]

use pft_engine::classfile::{access, ref_kind, ClassBuilder, HandleRef, MemberRef, Opcode, RefKind};
use pft_engine::Extras;
use pft_runtime::{testing_type_in, Capability, ClassRegistry, TypeHandle, Value};

pub const TAG: &str = "Lpft/PublicForTests;";
pub const STRING_GETTER: &str = "()Ljava/lang/String;";

pub const PUBLIC_EXPECTATION: &str = "Hello from Public";
pub const PRIVATE_EXPECTATION: &str = "Hello from Private";
pub const EXPECTED_PRIVATE1: &str = "Hello from Private 1";
pub const EXPECTED_PRIVATE2: &str = "Hello from Private 2";
pub const PACKAGE_PRIVATE_EXPECTATION: &str = "Package Private";
pub const TRIMMED_EXPECTATION: &str = "One,Two";

pub const CLASS1_TESTING: &str = "testmodel.Class1Testing";

// ============================================================================
// Installation
// ============================================================================

pub fn install(registry: &ClassRegistry, builder: &mut ClassBuilder) -> TypeHandle {
    let bytes = builder.build_bytes().expect("model class builds");
    registry.define_class(&bytes).expect("model class installs")
}

/// Interface whose methods all return strings
pub fn string_interface(registry: &ClassRegistry, name: &str, methods: &[&str]) -> TypeHandle {
    let mut builder = ClassBuilder::new_interface(name);
    for method in methods {
        builder.abstract_method(access::PUBLIC, method, STRING_GETTER);
    }
    install(registry, &mut builder)
}

pub fn class1_testing(registry: &ClassRegistry) -> TypeHandle {
    string_interface(
        registry,
        "testmodel/Class1Testing",
        &["somePrivateMethod", "somePublicMethod"],
    )
}

fn returns_string(builder: &mut ClassBuilder, flags: u16, name: &str, value: &str) {
    builder.method(flags, name, STRING_GETTER, |c| {
        c.ldc_string(value).op(Opcode::Areturn);
    });
}

fn tagged(builder: &mut ClassBuilder, interface: &str) {
    builder.annotate(TAG, Some(interface));
}

// ============================================================================
// Model classes
// ============================================================================

/// A private tagged method and a public one
pub fn class1(registry: &ClassRegistry) -> TypeHandle {
    let mut builder = ClassBuilder::new("testmodel/Class1", "java/lang/Object");
    builder.default_constructor();
    returns_string(&mut builder, access::PRIVATE, "somePrivateMethod", PRIVATE_EXPECTATION);
    tagged(&mut builder, CLASS1_TESTING);
    returns_string(&mut builder, access::PUBLIC, "somePublicMethod", PUBLIC_EXPECTATION);
    install(registry, &mut builder)
}

/// The public method reaches its result through a private self call
pub fn self_call_class(registry: &ClassRegistry) -> TypeHandle {
    let mut builder = ClassBuilder::new("testmodel/SelfCallClass1", "java/lang/Object");
    builder.default_constructor();
    returns_string(&mut builder, access::PRIVATE, "somePrivateMethod", PRIVATE_EXPECTATION);
    tagged(&mut builder, CLASS1_TESTING);
    returns_string(&mut builder, access::PRIVATE, "selfCalled", PUBLIC_EXPECTATION);
    builder.method(access::PUBLIC, "somePublicMethod", STRING_GETTER, |c| {
        c.aload(0)
            .invokevirtual("testmodel/SelfCallClass1", "selfCalled", STRING_GETTER)
            .op(Opcode::Areturn);
    });
    install(registry, &mut builder)
}

/// Two private methods tagged with different interfaces
pub fn class2(registry: &ClassRegistry) -> TypeHandle {
    let mut builder = ClassBuilder::new("testmodel/Class2", "java/lang/Object");
    builder.default_constructor();
    returns_string(&mut builder, access::PRIVATE, "private1", EXPECTED_PRIVATE1);
    tagged(&mut builder, "testmodel.Class2Testing1");
    returns_string(&mut builder, access::PRIVATE, "private2", EXPECTED_PRIVATE2);
    tagged(&mut builder, "testmodel.Class2Testing2");
    install(registry, &mut builder)
}

/// A private method without a tag
pub fn private_without_annotation(registry: &ClassRegistry) -> TypeHandle {
    let mut builder = ClassBuilder::new("testmodel/PrivateWithoutAnnotation", "java/lang/Object");
    builder.default_constructor();
    returns_string(&mut builder, access::PRIVATE, "somePrivateMethod", PRIVATE_EXPECTATION);
    returns_string(&mut builder, access::PUBLIC, "somePublicMethod", PUBLIC_EXPECTATION);
    install(registry, &mut builder)
}

/// A field holding a package-private helper, read by the tagged method
pub fn package_private_user(registry: &ClassRegistry) -> TypeHandle {
    let mut helper = ClassBuilder::new("testmodel/PackagePrivateClass", "java/lang/Object");
    helper.access(access::SUPER);
    helper.method(0, "<init>", "()V", |c| {
        c.aload(0)
            .invokespecial("java/lang/Object", "<init>", "()V")
            .op(Opcode::Return);
    });
    returns_string(&mut helper, 0, "returnResult", PACKAGE_PRIVATE_EXPECTATION);
    install(registry, &mut helper);

    let owner = "testmodel/PackagePrivateUser1";
    let field_type = "Ltestmodel/PackagePrivateClass;";
    let mut builder = ClassBuilder::new(owner, "java/lang/Object");
    builder.field(0, "supplier", field_type);
    builder.method(access::PUBLIC, "<init>", "()V", |c| {
        c.aload(0)
            .invokespecial("java/lang/Object", "<init>", "()V")
            .aload(0)
            .new_object("testmodel/PackagePrivateClass")
            .op(Opcode::Dup)
            .invokespecial("testmodel/PackagePrivateClass", "<init>", "()V")
            .putfield(owner, "supplier", field_type)
            .op(Opcode::Return);
    });
    builder.method(access::PRIVATE, "somePrivateMethod", STRING_GETTER, |c| {
        c.aload(0)
            .getfield(owner, "supplier", field_type)
            .invokevirtual("testmodel/PackagePrivateClass", "returnResult", STRING_GETTER)
            .op(Opcode::Areturn);
    });
    tagged(&mut builder, CLASS1_TESTING);
    returns_string(&mut builder, access::PUBLIC, "somePublicMethod", PUBLIC_EXPECTATION);
    install(registry, &mut builder)
}

/// A static helper writes then reads its own static field; both the tagged
/// method and the public one reach it through `invokestatic`
pub fn static_self_class(registry: &ClassRegistry) -> TypeHandle {
    let owner = "testmodel/StaticSelfClass1";
    let field_type = "Ljava/lang/String;";
    let mut builder = ClassBuilder::new(owner, "java/lang/Object");
    builder.field(access::PRIVATE | access::STATIC, "greeting", field_type);
    builder.default_constructor();
    builder.method(access::PRIVATE | access::STATIC, "greet", STRING_GETTER, |c| {
        c.ldc_string(PRIVATE_EXPECTATION)
            .putstatic(owner, "greeting", field_type)
            .getstatic(owner, "greeting", field_type)
            .op(Opcode::Areturn);
    });
    builder.method(access::PRIVATE, "somePrivateMethod", STRING_GETTER, |c| {
        c.invokestatic(owner, "greet", STRING_GETTER).op(Opcode::Areturn);
    });
    tagged(&mut builder, CLASS1_TESTING);
    builder.method(access::PUBLIC, "somePublicMethod", STRING_GETTER, |c| {
        c.invokestatic(owner, "greet", STRING_GETTER).op(Opcode::Areturn);
    });
    install(registry, &mut builder)
}

fn handle(kind: u8, owner: &str, name: &str, descriptor: &str) -> HandleRef {
    HandleRef {
        kind,
        member: MemberRef {
            kind: RefKind::Method,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        },
    }
}

const FUNCTION: &str = "java/util/function/Function";
const APPLY: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";
const STRING_UNARY: &str = "(Ljava/lang/String;)Ljava/lang/String;";
const CONCAT: &str = "(Ljava/lang/String;)Ljava/lang/String;";

/// Body of `somePrivateMethod` for the lambda and method-reference models:
/// applies a `Function<String, String>` to two padded words and joins them
fn trim_and_join(builder: &mut ClassBuilder, implementation: HandleRef) {
    builder.method(access::PRIVATE, "somePrivateMethod", STRING_GETTER, |c| {
        c.lambda("apply", "()Ljava/util/function/Function;", APPLY, implementation, STRING_UNARY)
            .astore(1);
        c.aload(1)
            .ldc_string("One   ")
            .invokeinterface(FUNCTION, "apply", APPLY)
            .checkcast("java/lang/String")
            .ldc_string(",")
            .invokevirtual("java/lang/String", "concat", CONCAT);
        c.aload(1)
            .ldc_string("  Two ")
            .invokeinterface(FUNCTION, "apply", APPLY)
            .checkcast("java/lang/String")
            .invokevirtual("java/lang/String", "concat", CONCAT)
            .op(Opcode::Areturn);
    });
}

/// Lambdas backed by synthetic private implementations: a static one in
/// the tagged method, an instance one capturing `this` in the public method
pub fn lambda_class(registry: &ClassRegistry) -> TypeHandle {
    let owner = "testmodel/LambdaClass1";
    let mut builder = ClassBuilder::new(owner, "java/lang/Object");
    builder.default_constructor();
    trim_and_join(
        &mut builder,
        handle(ref_kind::INVOKE_STATIC, owner, "lambda$somePrivateMethod$0", STRING_UNARY),
    );
    tagged(&mut builder, CLASS1_TESTING);
    builder.method(
        access::PRIVATE | access::STATIC | access::SYNTHETIC,
        "lambda$somePrivateMethod$0",
        STRING_UNARY,
        |c| {
            c.aload(0)
                .invokevirtual("java/lang/String", "trim", STRING_GETTER)
                .op(Opcode::Areturn);
        },
    );

    builder.method(access::PUBLIC, "somePublicMethod", STRING_GETTER, |c| {
        c.aload(0)
            .lambda(
                "get",
                "(Ltestmodel/LambdaClass1;)Ljava/util/function/Supplier;",
                "()Ljava/lang/Object;",
                handle(ref_kind::INVOKE_SPECIAL, owner, "lambda$somePublicMethod$1", STRING_GETTER),
                STRING_GETTER,
            )
            .invokeinterface("java/util/function/Supplier", "get", "()Ljava/lang/Object;")
            .checkcast("java/lang/String")
            .op(Opcode::Areturn);
    });
    returns_string(
        &mut builder,
        access::PRIVATE | access::SYNTHETIC,
        "lambda$somePublicMethod$1",
        PUBLIC_EXPECTATION,
    );
    install(registry, &mut builder)
}

/// The tagged method uses `String::trim`, a call site without a synthetic body
pub fn method_ref_class(registry: &ClassRegistry) -> TypeHandle {
    let mut builder = ClassBuilder::new("testmodel/InvokeDynamicNoLambdaClass1", "java/lang/Object");
    builder.default_constructor();
    trim_and_join(
        &mut builder,
        handle(ref_kind::INVOKE_VIRTUAL, "java/lang/String", "trim", STRING_GETTER),
    );
    tagged(&mut builder, CLASS1_TESTING);
    returns_string(&mut builder, access::PUBLIC, "somePublicMethod", PUBLIC_EXPECTATION);
    install(registry, &mut builder)
}

// ============================================================================
// Calls
// ============================================================================

pub fn testing_type(registry: &ClassRegistry, source: &str) -> TypeHandle {
    testing_type_in(registry, source, &Extras::new(), None).expect("testing type builds")
}

/// New instance of `handle` viewed through `interface`
pub fn capability(handle: &TypeHandle, interface: &str) -> Capability {
    handle
        .new_instance()
        .expect("instance")
        .cast(interface)
        .expect("cast to capability interface")
}

/// Call a `()Ljava/lang/String;` method and unwrap the string
pub fn call_string(capability: &Capability, method: &str) -> String {
    match capability.invoke(method, STRING_GETTER, Vec::new()) {
        Ok(Some(Value::Str(s))) => s.to_string(),
        other => panic!("{} returned {:?}", method, other),
    }
}

pub fn is_public(handle: &TypeHandle, method: &str) -> bool {
    let flags = handle.method_flags(method, STRING_GETTER).expect("method declared");
    flags & access::PUBLIC != 0 && flags & access::RESTRICTED == 0
}
