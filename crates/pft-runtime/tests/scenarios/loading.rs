//! Loading behavior of generated types

use super::harness::*;
use pft_engine::classfile::{access, ClassBuilder, ClassFile, Opcode};
use pft_engine::{materialize, rewrite_as, ClassPath, EngineError, Extras, GenOptions, SelectionSet};
use pft_runtime::{default_context, generator, testing_type_in, testing_type_with, ClassRegistry, RuntimeError};
use rustc_hash::FxHashSet;

#[test]
fn test_each_call_gets_a_fresh_identity() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    class1(&registry);

    let first = testing_type(&registry, "testmodel.Class1");
    let second = testing_type(&registry, "testmodel.Class1");
    assert_ne!(first.name(), second.name());
    assert_ne!(first, second);
    assert_eq!(registry.len(), 4);

    let one = capability(&first, CLASS1_TESTING);
    let two = capability(&second, CLASS1_TESTING);
    assert_eq!(call_string(&one, "somePrivateMethod"), call_string(&two, "somePrivateMethod"));
}

#[test]
fn test_concurrent_generation() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    class1(&registry);

    let names: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                scope.spawn(move || testing_type(&registry, "testmodel.Class1").name())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let unique: FxHashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), names.len());
    assert_eq!(registry.len(), 2 + names.len());
}

#[test]
fn test_duplicate_name_is_a_loader_failure() {
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    let source = class1(&registry);

    let options = GenOptions::default();
    let unit = ClassFile::decode(source.bytes()).unwrap();
    let selection = generator(&registry).select(&unit, &Extras::new()).unwrap();
    let rewritten = rewrite_as(&unit, &selection, "testmodel/GeneratedClassFixed", &options).unwrap();

    materialize(rewritten.clone(), &registry, None, &options).unwrap();
    let err = materialize(rewritten, &registry, None, &options).unwrap_err();

    match &err {
        EngineError::LoaderInstall { name, .. } => assert_eq!(name, "testmodel.GeneratedClassFixed"),
        other => panic!("unexpected {:?}", other),
    }
    let cause = err.loader_cause().and_then(|c| c.downcast_ref::<RuntimeError>());
    assert!(matches!(cause, Some(RuntimeError::DuplicateClass(_))), "{:?}", cause);
}

#[test]
fn test_unknown_tag_degrades_gracefully() {
    let registry = ClassRegistry::new();
    let mut builder = ClassBuilder::new("testmodel/Orphan", "java/lang/Object");
    builder.default_constructor();
    builder.method(access::PRIVATE, "hidden", STRING_GETTER, |c| {
        c.ldc_string(PRIVATE_EXPECTATION)
            .op(Opcode::Areturn);
    });
    builder.annotate(TAG, Some("testmodel.Missing"));
    install(&registry, &mut builder);

    let generated = testing_type(&registry, "testmodel.Orphan");
    assert!(generated.interfaces().is_empty());
    assert!(!is_public(&generated, "hidden"));

    let err = generated.new_instance().unwrap().cast("testmodel.Missing").unwrap_err();
    assert!(matches!(err, RuntimeError::NoClassDefFound(_)));
}

#[test]
fn test_unknown_tag_is_recorded() {
    let registry = ClassRegistry::new();
    let mut builder = ClassBuilder::new("testmodel/Orphan", "java/lang/Object");
    builder.method(access::PRIVATE, "hidden", "()V", |c| {
        c.op(Opcode::Return);
    });
    builder.annotate(TAG, Some("testmodel.Missing"));
    let unit = builder.build().unwrap();

    let selection: SelectionSet = generator(&registry).select(&unit, &Extras::new()).unwrap();
    assert!(selection.is_empty());
    assert_eq!(selection.unresolved().len(), 1);
}

#[test]
fn test_missing_source_unit() {
    let registry = ClassRegistry::new();
    let err = testing_type_in(&registry, "testmodel.Nowhere", &Extras::new(), None).unwrap_err();
    assert!(err.is_source_failure());
    assert!(matches!(err, EngineError::SourceNotFound(ref name) if name == "testmodel/Nowhere"));
}

#[test]
fn test_default_context() {
    let context = default_context();
    string_interface(context, "defaultctx/WidgetTesting", &["label"]);
    let mut builder = ClassBuilder::new("defaultctx/Widget", "java/lang/Object");
    builder.default_constructor();
    builder.method(access::PRIVATE, "label", STRING_GETTER, |c| {
        c.ldc_string("widget").op(Opcode::Areturn);
    });
    builder.annotate(TAG, Some("defaultctx.WidgetTesting"));
    install(context, &mut builder);

    let mut out = Vec::new();
    let generated = testing_type_with("defaultctx.Widget", &Extras::new(), Some(&mut out)).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("GeneratedClass"));
    assert!(default_context().contains(generated.internal_name()));

    let widget = capability(&generated, "defaultctx.WidgetTesting");
    assert_eq!(call_string(&widget, "label"), "widget");
}

#[test]
fn test_source_from_class_path() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = ClassRegistry::new();
    let bytes = class1(&scratch).bytes().to_vec();
    ClassPath::store(dir.path(), "testmodel.Class1", &bytes).unwrap();

    // only the interface is installed; the source unit stays on disk
    let registry = ClassRegistry::new();
    class1_testing(&registry);
    let storage = ClassPath::new().with_root(dir.path());
    let generated = generator(&registry)
        .testing_type_from(&storage, "testmodel.Class1", &Extras::new(), None)
        .unwrap();

    assert!(!registry.contains("testmodel.Class1"));
    assert_eq!(registry.len(), 2);
    let testing = capability(&generated, CLASS1_TESTING);
    assert_eq!(call_string(&testing, "somePrivateMethod"), PRIVATE_EXPECTATION);
}
