//! Pipeline tests against a recording loader and an on-disk class path

use parking_lot::Mutex;
use pft_engine::classfile::{access, attr, ClassBuilder, ClassFile, Opcode};
use pft_engine::{ClassPath, EngineError, Extras, GenOptions, Generator, KnownTypes, Loader};
use std::path::Path;
use thiserror::Error;

const TAG: &str = "Lpft/PublicForTests;";
const GETTER: &str = "()I";

#[derive(Debug, Error)]
#[error("{name} is already defined")]
struct AlreadyDefined {
    name: String,
}

/// Loader that records every definition and can be told to refuse them
#[derive(Default)]
struct Recorder {
    defined: Mutex<Vec<(String, Vec<u8>)>>,
    refuse: bool,
}

impl Recorder {
    fn last(&self) -> ClassFile {
        let defined = self.defined.lock();
        let (_, bytes) = defined.last().expect("a definition");
        ClassFile::decode(bytes).unwrap()
    }
}

impl Loader for Recorder {
    type Handle = String;
    type Error = AlreadyDefined;

    fn define(&self, name: &str, bytes: &[u8]) -> Result<String, AlreadyDefined> {
        if self.refuse {
            return Err(AlreadyDefined { name: name.to_string() });
        }
        self.defined.lock().push((name.to_string(), bytes.to_vec()));
        Ok(name.to_string())
    }
}

fn widget_bytes() -> Vec<u8> {
    let mut builder = ClassBuilder::new("demo/Widget", "java/lang/Object");
    builder
        .with_line_numbers()
        .source_file("Widget.java")
        .default_constructor()
        .method(access::PRIVATE, "secret", GETTER, |c| {
            c.iconst(42).op(Opcode::Ireturn);
        })
        .annotate(TAG, Some("demo.WidgetTesting"))
        .method(access::PRIVATE, "hidden", GETTER, |c| {
            c.iconst(7).op(Opcode::Ireturn);
        })
        .method(access::PUBLIC, "size", GETTER, |c| {
            c.aload(0).invokevirtual("demo/Widget", "secret", GETTER).op(Opcode::Ireturn);
        });
    builder.build_bytes().unwrap()
}

fn class_path(root: &Path) -> ClassPath {
    ClassPath::store(root, "demo.Widget", &widget_bytes()).unwrap();
    ClassPath::new().with_root(root)
}

fn known() -> KnownTypes {
    KnownTypes::new().with("demo.WidgetTesting")
}

fn method_flags(class: &ClassFile, name: &str) -> u16 {
    class.find_method(name, GETTER).expect("method").access_flags
}

#[test]
fn test_generate_from_class_path() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());
    let loader = Recorder::default();

    let name = Generator::new(&loader, known())
        .testing_type_from(&storage, "demo.Widget", &Extras::new(), None)
        .unwrap();
    assert!(name.starts_with("demo.GeneratedClass"));

    let class = loader.last();
    assert_eq!(class.this_class_name().unwrap().replace('/', "."), name);
    assert_eq!(class.super_class_name().unwrap(), Some("java/lang/Object"));
    assert_eq!(class.interface_names().unwrap(), vec!["demo/WidgetTesting"]);
    assert_eq!(method_flags(&class, "secret") & access::PUBLIC, access::PUBLIC);
    assert_eq!(method_flags(&class, "secret") & access::PRIVATE, 0);
    assert_eq!(method_flags(&class, "hidden") & access::PRIVATE, access::PRIVATE);
}

#[test]
fn test_explicit_members_and_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());
    let loader = Recorder::default();
    let extras = Extras::new()
        .member("hidden", GETTER)
        .pair("size", GETTER, "demo.Sized")
        .interface("demo.Extra");

    Generator::new(&loader, known())
        .testing_type_from(&storage, "demo.Widget", &extras, None)
        .unwrap();

    let class = loader.last();
    let interfaces = class.interface_names().unwrap();
    assert_eq!(interfaces.len(), 3);
    for expected in ["demo/WidgetTesting", "demo/Sized", "demo/Extra"] {
        assert!(interfaces.contains(&expected), "{:?}", interfaces);
    }
    assert_eq!(method_flags(&class, "hidden") & access::PUBLIC, access::PUBLIC);
}

#[test]
fn test_debug_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());

    let stripped = Recorder::default();
    Generator::new(&stripped, known())
        .testing_type_from(&storage, "demo.Widget", &Extras::new(), None)
        .unwrap();
    assert!(stripped.last().raw_attribute(attr::SOURCE_FILE).is_none());

    let kept = Recorder::default();
    Generator::new(&kept, known())
        .with_options(GenOptions::default().keep_debug_info())
        .testing_type_from(&storage, "demo.Widget", &Extras::new(), None)
        .unwrap();
    assert!(kept.last().raw_attribute(attr::SOURCE_FILE).is_some());
}

#[test]
fn test_custom_prefix_and_sink() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());
    let loader = Recorder::default();
    let mut listing = Vec::new();

    let name = Generator::new(&loader, known())
        .with_options(GenOptions::default().with_class_prefix("Fixture"))
        .testing_type_from(&storage, "demo.Widget", &Extras::new(), Some(&mut listing))
        .unwrap();
    assert!(name.starts_with("demo.Fixture"));

    let text = String::from_utf8(listing).unwrap();
    assert!(text.starts_with("public"), "{}", text);
    assert!(text.contains(&name));
    assert!(text.contains(&format!("{}.secret", name.replace('.', "/"))));
}

#[test]
fn test_loader_refusal() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());
    let loader = Recorder {
        refuse: true,
        ..Recorder::default()
    };

    let err = Generator::new(&loader, known())
        .testing_type_from(&storage, "demo.Widget", &Extras::new(), None)
        .unwrap_err();
    assert!(!err.is_source_failure());
    let cause = err.loader_cause().and_then(|c| c.downcast_ref::<AlreadyDefined>());
    assert!(cause.is_some_and(|c| c.name.starts_with("demo.GeneratedClass")));
    assert!(loader.defined.lock().is_empty());
}

#[test]
fn test_missing_unit() {
    let dir = tempfile::tempdir().unwrap();
    let storage = class_path(dir.path());
    let loader = Recorder::default();

    let err = Generator::new(&loader, known())
        .testing_type_from(&storage, "demo.Gadget", &Extras::new(), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceNotFound(ref name) if name == "demo/Gadget"));
}

#[test]
fn test_corrupt_unit() {
    let dir = tempfile::tempdir().unwrap();
    ClassPath::store(dir.path(), "demo.Broken", b"not a class").unwrap();
    let storage = ClassPath::new().with_root(dir.path());
    let loader = Recorder::default();

    let err = Generator::new(&loader, known())
        .testing_type_from(&storage, "demo.Broken", &Extras::new(), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceRead(_)));
    assert!(loader.defined.lock().is_empty());
}
