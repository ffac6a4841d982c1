//! Lambda and method-reference call sites inside generated types

use super::harness::*;
use pft_engine::classfile::{access, ref_kind, ClassBuilder, HandleRef, MemberRef, Opcode, RefKind};
use pft_runtime::{ClassRegistry, RuntimeError, Value};

#[test]
fn test_lambda_with_private_static_body() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    lambda_class(&registry);

    let generated = testing_type(&registry, "testmodel.LambdaClass1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), TRIMMED_EXPECTATION);
}

#[test]
fn test_capturing_lambda_with_private_instance_body() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    lambda_class(&registry);

    let generated = testing_type(&registry, "testmodel.LambdaClass1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePublicMethod"), PUBLIC_EXPECTATION);
}

#[test]
fn test_synthetic_bodies_stay_private() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    lambda_class(&registry);

    let generated = testing_type(&registry, "testmodel.LambdaClass1");
    let flags = generated
        .method_flags("lambda$somePrivateMethod$0", "(Ljava/lang/String;)Ljava/lang/String;")
        .unwrap();
    assert_ne!(flags & access::PRIVATE, 0);
}

#[test]
fn test_method_reference_to_host_type() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    method_ref_class(&registry);

    let generated = testing_type(&registry, "testmodel.InvokeDynamicNoLambdaClass1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), TRIMMED_EXPECTATION);
    assert_eq!(call_string(&testing, "somePublicMethod"), PUBLIC_EXPECTATION);
}

#[test]
fn test_foreign_lambda_cannot_target_private_body() {
    let registry = ClassRegistry::new();
    lambda_class(&registry);

    let implementation = HandleRef {
        kind: ref_kind::INVOKE_STATIC,
        member: MemberRef {
            kind: RefKind::Method,
            owner: "testmodel/LambdaClass1".to_string(),
            name: "lambda$somePrivateMethod$0".to_string(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/String;".to_string(),
        },
    };
    let mut builder = ClassBuilder::new("testmodel/Foreign", "java/lang/Object");
    builder.method(
        access::PUBLIC | access::STATIC,
        "link",
        "()Ljava/util/function/Function;",
        |c| {
            c.lambda(
                "apply",
                "()Ljava/util/function/Function;",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
                implementation,
                "(Ljava/lang/String;)Ljava/lang/String;",
            )
            .op(Opcode::Areturn);
        },
    );
    let foreign = install(&registry, &mut builder);

    let err = foreign
        .invoke_static("link", "()Ljava/util/function/Function;", Vec::new())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::IllegalAccess(_)), "{:?}", err);
}

#[test]
fn test_lambda_value_escapes_as_interface() {
    let registry = ClassRegistry::new();
    let mut builder = ClassBuilder::new("testmodel/Factory", "java/lang/Object");
    builder.method(
        access::PUBLIC | access::STATIC,
        "trimmer",
        "()Ljava/util/function/Function;",
        |c| {
            c.lambda(
                "apply",
                "()Ljava/util/function/Function;",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
                HandleRef {
                    kind: ref_kind::INVOKE_VIRTUAL,
                    member: MemberRef {
                        kind: RefKind::Method,
                        owner: "java/lang/String".to_string(),
                        name: "trim".to_string(),
                        descriptor: STRING_GETTER.to_string(),
                    },
                },
                "(Ljava/lang/String;)Ljava/lang/String;",
            )
            .op(Opcode::Areturn);
        },
    );
    let factory = install(&registry, &mut builder);

    match factory.invoke_static("trimmer", "()Ljava/util/function/Function;", Vec::new()) {
        Ok(Some(Value::Lambda(lambda))) => assert!(lambda.implements("java/util/function/Function")),
        other => panic!("unexpected {:?}", other),
    }
}
