//! Selection data model
//!
//! A [`SelectionSet`] maps member keys to the capability interfaces they
//! help satisfy, plus interfaces added unconditionally. Order of insertion is
//! preserved everywhere so the generated interface list is deterministic.

use crate::classfile::internal_name;
use rustc_hash::FxHashMap;
use std::fmt;

/// (name, descriptor) identity of a member within one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    /// Member name, e.g. `compute`
    pub name: String,
    /// JVM descriptor, e.g. `(I)Ljava/lang/String;`
    pub descriptor: String,
}

impl MemberKey {
    /// Create a key from its parts
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MemberKey {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Split a method signature such as `run(I)V` into a key
    ///
    /// Returns `None` when there is no `(` or the name part is empty.
    pub fn parse_method(signature: &str) -> Option<Self> {
        let split = signature.find('(')?;
        if split == 0 {
            return None;
        }
        Some(MemberKey::new(&signature[..split], &signature[split..]))
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A tag whose interface could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTag {
    /// Member carrying the tag
    pub member: MemberKey,
    /// Interface name exactly as written in the tag
    pub interface: String,
}

impl fmt::Display for UnresolvedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Testing interface '{}' not found for method '{}'",
            self.interface, self.member
        )
    }
}

/// Members to expose and the interfaces to add
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    members: Vec<(MemberKey, Vec<String>)>,
    index: FxHashMap<MemberKey, usize>,
    extra_interfaces: Vec<String>,
    unresolved: Vec<UnresolvedTag>,
}

impl SelectionSet {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, key: MemberKey) -> &mut Vec<String> {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                let position = self.members.len();
                self.index.insert(key.clone(), position);
                self.members.push((key, Vec::new()));
                position
            }
        };
        &mut self.members[position].1
    }

    /// Select a member without tying it to an interface
    pub fn add_member(&mut self, key: MemberKey) {
        self.slot(key);
    }

    /// Select a member for `interface` (internal name); sets union on collision
    pub fn add_pair(&mut self, key: MemberKey, interface: impl Into<String>) {
        let interface = interface.into();
        let interfaces = self.slot(key);
        if !interfaces.contains(&interface) {
            interfaces.push(interface);
        }
    }

    /// Add an interface not tied to any member
    pub fn add_interface(&mut self, interface: impl Into<String>) {
        let interface = interface.into();
        if !self.extra_interfaces.contains(&interface) {
            self.extra_interfaces.push(interface);
        }
    }

    /// Record a tag that was dropped because its interface is unknown
    pub fn record_unresolved(&mut self, tag: UnresolvedTag) {
        self.unresolved.push(tag);
    }

    /// Union another selection into this one
    pub fn merge(&mut self, other: SelectionSet) {
        for (key, interfaces) in other.members {
            let slot = self.slot(key);
            for interface in interfaces {
                if !slot.contains(&interface) {
                    slot.push(interface);
                }
            }
        }
        for interface in other.extra_interfaces {
            self.add_interface(interface);
        }
        self.unresolved.extend(other.unresolved);
    }

    /// Check whether a member is selected
    pub fn contains(&self, key: &MemberKey) -> bool {
        self.index.contains_key(key)
    }

    /// Check membership without allocating a key
    pub fn contains_member(&self, name: &str, descriptor: &str) -> bool {
        self.members
            .iter()
            .any(|(key, _)| key.name == name && key.descriptor == descriptor)
    }

    /// Interfaces mapped to a member (empty if unselected or explicit-only)
    pub fn interfaces_for(&self, key: &MemberKey) -> &[String] {
        self.index
            .get(key)
            .map(|&position| self.members[position].1.as_slice())
            .unwrap_or(&[])
    }

    /// Selected members in selection order
    pub fn members(&self) -> impl Iterator<Item = &MemberKey> {
        self.members.iter().map(|(key, _)| key)
    }

    /// Interfaces added regardless of members
    pub fn extra_interfaces(&self) -> &[String] {
        &self.extra_interfaces
    }

    /// Every interface named anywhere, deduplicated in discovery order
    ///
    /// Member interfaces come first in member order, then the extras.
    pub fn interfaces(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        let all = self
            .members
            .iter()
            .flat_map(|(_, interfaces)| interfaces.iter())
            .chain(self.extra_interfaces.iter());
        for interface in all {
            if !result.contains(interface) {
                result.push(interface.clone());
            }
        }
        result
    }

    /// Tags dropped during selection
    pub fn unresolved(&self) -> &[UnresolvedTag] {
        &self.unresolved
    }

    /// Number of selected members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when no member and no interface is selected
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.extra_interfaces.is_empty()
    }
}

/// Caller-supplied selection merged without resolution
///
/// Interface names may be given in binary (`a.b.C`) or internal (`a/b/C`)
/// form; they are stored in internal form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extras {
    members: Vec<MemberKey>,
    pairs: Vec<(MemberKey, String)>,
    interfaces: Vec<String>,
}

impl Extras {
    /// No extras
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a member without naming an interface
    pub fn member(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.members.push(MemberKey::new(name, descriptor));
        self
    }

    /// Expose a member through `interface`
    pub fn pair(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        interface: &str,
    ) -> Self {
        self.pairs
            .push((MemberKey::new(name, descriptor), internal_name(interface)));
        self
    }

    /// Add `interface` unconditionally
    pub fn interface(mut self, interface: &str) -> Self {
        self.interfaces.push(internal_name(interface));
        self
    }

    /// Explicit members
    pub fn members(&self) -> &[MemberKey] {
        &self.members
    }

    /// Explicit (member, interface) pairs
    pub fn pairs(&self) -> &[(MemberKey, String)] {
        &self.pairs
    }

    /// Explicit interfaces
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// True when nothing was supplied
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.pairs.is_empty() && self.interfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_key_display_and_parse() {
        let key = MemberKey::new("somePrivateMethod", "()Ljava/lang/String;");
        assert_eq!(key.to_string(), "somePrivateMethod()Ljava/lang/String;");
        assert_eq!(MemberKey::parse_method("somePrivateMethod()Ljava/lang/String;"), Some(key));
        assert_eq!(MemberKey::parse_method("noParens"), None);
        assert_eq!(MemberKey::parse_method("()V"), None);
    }

    #[test]
    fn test_collisions_union_interfaces() {
        let key = MemberKey::new("m", "()V");
        let mut selection = SelectionSet::new();
        selection.add_pair(key.clone(), "a/First");
        selection.add_pair(key.clone(), "a/Second");
        selection.add_pair(key.clone(), "a/First");

        assert_eq!(selection.len(), 1);
        assert_eq!(selection.interfaces_for(&key), ["a/First", "a/Second"]);
    }

    #[test]
    fn test_interfaces_in_discovery_order() {
        let mut selection = SelectionSet::new();
        selection.add_interface("a/Extra");
        selection.add_pair(MemberKey::new("x", "()V"), "a/Zed");
        selection.add_member(MemberKey::new("y", "()V"));
        selection.add_pair(MemberKey::new("z", "()V"), "a/Alpha");
        selection.add_pair(MemberKey::new("w", "()V"), "a/Zed");

        assert_eq!(selection.interfaces(), vec!["a/Zed", "a/Alpha", "a/Extra"]);
        assert!(selection.contains(&MemberKey::new("y", "()V")));
        assert!(selection.interfaces_for(&MemberKey::new("y", "()V")).is_empty());
        assert!(selection.interfaces_for(&MemberKey::new("nope", "()V")).is_empty());
    }

    #[test]
    fn test_merge() {
        let key = MemberKey::new("m", "()I");
        let mut left = SelectionSet::new();
        left.add_pair(key.clone(), "a/One");
        let mut right = SelectionSet::new();
        right.add_pair(key.clone(), "a/Two");
        right.add_interface("a/Three");
        right.record_unresolved(UnresolvedTag {
            member: MemberKey::new("bad", "()V"),
            interface: "a.Missing".to_string(),
        });

        left.merge(right);
        assert_eq!(left.interfaces_for(&key), ["a/One", "a/Two"]);
        assert_eq!(left.extra_interfaces(), ["a/Three"]);
        assert_eq!(left.unresolved().len(), 1);
        assert_eq!(
            left.unresolved()[0].to_string(),
            "Testing interface 'a.Missing' not found for method 'bad()V'"
        );
    }

    #[test]
    fn test_extras_normalize_names() {
        let extras = Extras::new()
            .member("hidden", "()V")
            .pair("other", "()I", "com.example.Sized")
            .interface("com.example.Marker");
        assert_eq!(extras.members()[0].name, "hidden");
        assert_eq!(extras.pairs()[0].1, "com/example/Sized");
        assert_eq!(extras.interfaces(), ["com/example/Marker"]);
        assert!(!extras.is_empty());
        assert!(Extras::new().is_empty());
    }
}
