//! Round-trip tests
//!
//! Tagged private methods become callable through their capability interfaces.

use super::harness::*;
use pft_engine::classfile::{access, ClassBuilder, Opcode};
use pft_engine::Extras;
use pft_runtime::{testing_type_in, ClassRegistry, RuntimeError};

#[test]
fn test_tagged_private_method_becomes_callable() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    class1(&registry);

    let generated = testing_type(&registry, "testmodel.Class1");
    assert!(generated.name().starts_with("testmodel.GeneratedClass"));
    assert_eq!(generated.interfaces(), vec![CLASS1_TESTING.to_string()]);
    assert!(is_public(&generated, "somePrivateMethod"));

    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PRIVATE_EXPECTATION);
    assert_eq!(call_string(&testing, "somePublicMethod"), PUBLIC_EXPECTATION);
}

#[test]
fn test_source_class_is_untouched() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    let source = class1(&registry);
    let before = source.bytes().to_vec();

    testing_type(&registry, "testmodel.Class1");

    assert_eq!(source.bytes(), &before[..]);
    assert!(source.interfaces().is_empty());
    assert!(!is_public(&source, "somePrivateMethod"));

    let err = source.new_instance().unwrap().cast(CLASS1_TESTING).unwrap_err();
    assert!(matches!(err, RuntimeError::ClassCast { .. }));
}

#[test]
fn test_generated_type_keeps_superclass() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    class1(&registry);

    let generated = testing_type(&registry, "testmodel.Class1");
    assert_eq!(generated.super_name().as_deref(), Some("java.lang.Object"));
    assert!(generated.is_assignable_to("testmodel/Class1Testing"));
    assert!(!generated.is_assignable_to("testmodel.Class1"));
}

#[test]
fn test_two_tags_two_interfaces() {
    let registry = ClassRegistry::new();
    string_interface(&registry, "testmodel/Class2Testing1", &["private1"]);
    string_interface(&registry, "testmodel/Class2Testing2", &["private2"]);
    class2(&registry);

    let generated = testing_type(&registry, "testmodel.Class2");
    assert_eq!(
        generated.interfaces(),
        vec!["testmodel.Class2Testing1".to_string(), "testmodel.Class2Testing2".to_string()]
    );

    let first = capability(&generated, "testmodel.Class2Testing1");
    let second = capability(&generated, "testmodel.Class2Testing2");
    assert_eq!(call_string(&first, "private1"), EXPECTED_PRIVATE1);
    assert_eq!(call_string(&second, "private2"), EXPECTED_PRIVATE2);

    // each interface only exposes its own method
    let err = first.invoke("private2", STRING_GETTER, Vec::new()).unwrap_err();
    assert!(matches!(err, RuntimeError::NoSuchMethod(_)));
}

#[test]
fn test_extras_without_annotation() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    private_without_annotation(&registry);

    let extras = Extras::new()
        .member("somePrivateMethod", STRING_GETTER)
        .interface(CLASS1_TESTING);
    let generated = testing_type_in(&registry, "testmodel.PrivateWithoutAnnotation", &extras, None).unwrap();

    assert!(is_public(&generated, "somePrivateMethod"));
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PRIVATE_EXPECTATION);
}

#[test]
fn test_untagged_private_method_stays_private() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    private_without_annotation(&registry);

    // the interface is added but nothing is widened, so the call is rejected
    let extras = Extras::new().interface(CLASS1_TESTING);
    let generated = testing_type_in(&registry, "testmodel.PrivateWithoutAnnotation", &extras, None).unwrap();
    assert!(!is_public(&generated, "somePrivateMethod"));

    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePublicMethod"), PUBLIC_EXPECTATION);
    let err = testing.invoke("somePrivateMethod", STRING_GETTER, Vec::new()).unwrap_err();
    assert!(matches!(err, RuntimeError::IllegalAccess(_)));
}

#[test]
fn test_package_private_collaborator() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    package_private_user(&registry);

    let generated = testing_type(&registry, "testmodel.PackagePrivateUser1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PACKAGE_PRIVATE_EXPECTATION);

    let flags = generated
        .class()
        .file()
        .find_field("supplier", "Ltestmodel/PackagePrivateClass;")
        .map(|f| f.access_flags);
    assert_eq!(flags.map(|f| f & access::RESTRICTED), Some(0));
    assert!(testing.instance().get_field("supplier").is_some());
}

#[test]
fn test_public_entry_through_tagged_member_matches_source() {
    let registry = ClassRegistry::new();
    string_interface(&registry, "testmodel/Revealing", &["reveal"]);
    string_interface(&registry, "testmodel/SecretTesting", &["secret"]);

    let owner = "testmodel/Keeper";
    let mut builder = ClassBuilder::new(owner, "java/lang/Object");
    builder.interface("testmodel/Revealing").default_constructor();
    builder.method(access::PRIVATE, "secret", STRING_GETTER, |c| {
        c.ldc_string(PRIVATE_EXPECTATION).op(Opcode::Areturn);
    });
    builder.annotate(TAG, Some("testmodel.SecretTesting"));
    builder.method(access::PUBLIC, "reveal", STRING_GETTER, |c| {
        c.aload(0).invokevirtual(owner, "secret", STRING_GETTER).op(Opcode::Areturn);
    });
    let source = install(&registry, &mut builder);

    let generated = testing_type(&registry, "testmodel.Keeper");
    assert_eq!(
        generated.interfaces(),
        vec!["testmodel.Revealing".to_string(), "testmodel.SecretTesting".to_string()]
    );

    let expected = call_string(&capability(&source, "testmodel.Revealing"), "reveal");
    assert_eq!(expected, PRIVATE_EXPECTATION);
    assert_eq!(call_string(&capability(&generated, "testmodel.Revealing"), "reveal"), expected);
    assert_eq!(call_string(&capability(&generated, "testmodel.SecretTesting"), "secret"), expected);
}
