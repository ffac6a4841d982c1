//! Self-reference tests

use super::harness::*;
use pft_engine::Extras;
use pft_runtime::{testing_type_in, ClassRegistry, Value};

fn listing(registry: &ClassRegistry, source: &str) -> (String, String) {
    let mut out = Vec::new();
    let generated = testing_type_in(registry, source, &Extras::new(), Some(&mut out)).unwrap();
    (generated.internal_name().to_string(), String::from_utf8(out).unwrap())
}

#[test]
fn test_self_call_reaches_generated_class() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    self_call_class(&registry);

    let generated = testing_type(&registry, "testmodel.SelfCallClass1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePublicMethod"), PUBLIC_EXPECTATION);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PRIVATE_EXPECTATION);

    // the private callee is not part of the selection
    assert!(!is_public(&generated, "selfCalled"));
}

#[test]
fn test_self_references_are_retargeted() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    self_call_class(&registry);

    let (name, text) = listing(&registry, "testmodel.SelfCallClass1");
    let call = text
        .lines()
        .find(|line| line.contains("invokevirtual") && line.contains("selfCalled"))
        .expect("self call listed");
    assert!(call.contains(&format!("{}.selfCalled", name)), "{}", call);

    let stale = text
        .lines()
        .filter(|line| line.contains("//"))
        .any(|line| line.contains("testmodel/SelfCallClass1."));
    assert!(!stale, "{}", text);
}

#[test]
fn test_field_references_are_retargeted() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    package_private_user(&registry);

    let (name, text) = listing(&registry, "testmodel.PackagePrivateUser1");
    let field_ops: Vec<&str> = text
        .lines()
        .filter(|line| line.contains("getfield") || line.contains("putfield"))
        .collect();
    assert_eq!(field_ops.len(), 2);
    assert!(field_ops.iter().all(|line| line.contains(&format!("{}.supplier", name))));

    // references to other classes keep their owners
    assert!(text.contains("testmodel/PackagePrivateClass.returnResult"));
    assert!(text.contains("java/lang/Object.<init>"));
}

#[test]
fn test_static_self_references_are_retargeted() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    let source = static_self_class(&registry);

    let generated = testing_type(&registry, "testmodel.StaticSelfClass1");
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PRIVATE_EXPECTATION);
    assert_eq!(call_string(&testing, "somePublicMethod"), PRIVATE_EXPECTATION);
    assert!(!is_public(&generated, "greet"));

    // static state is written on the generated class, not the source
    let greeting = generated.get_static("greeting").unwrap();
    assert!(matches!(greeting, Some(Value::Str(ref s)) if &**s == PRIVATE_EXPECTATION), "{:?}", greeting);
    assert!(matches!(source.get_static("greeting").unwrap(), Some(Value::Null)));

    let (name, text) = listing(&registry, "testmodel.StaticSelfClass1");
    let static_ops: Vec<&str> = text
        .lines()
        .filter(|line| ["getstatic", "putstatic", "invokestatic"].iter().any(|op| line.contains(op)))
        .collect();
    assert_eq!(static_ops.len(), 4, "{}", text);
    for line in &static_ops {
        assert!(line.contains(&format!("{}.", name)), "{}", line);
    }
    assert!(!text.contains("testmodel/StaticSelfClass1."), "{}", text);
}

#[test]
fn test_listing_header_names_generated_class() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    class1(&registry);

    let (name, text) = listing(&registry, "testmodel.Class1");
    let header = text.lines().next().unwrap();
    assert!(name.starts_with("testmodel/GeneratedClass"));
    assert!(header.contains(&name.replace('/', ".")), "{}", header);
    assert!(header.contains("implements testmodel.Class1Testing"), "{}", header);
}
