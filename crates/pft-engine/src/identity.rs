//! Fresh identities for generated units

use crate::classfile::package_of;
use rand::Rng;

/// 128 random bits rendered as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
pub fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bits: u128 = rng.gen();
    let hex = format!("{:032x}", bits);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// New internal name in the package of `source`: `<package>/<prefix><token>`
pub fn generate(source: &str, prefix: &str) -> String {
    generate_with(source, prefix, &mut rand::thread_rng())
}

/// Like [`generate`] with a caller-supplied random source
pub fn generate_with<R: Rng + ?Sized>(source: &str, prefix: &str, rng: &mut R) -> String {
    let token = random_token(rng);
    match package_of(source) {
        "" => format!("{}{}", prefix, token),
        package => format!("{}/{}{}", package, prefix, token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_token_shape() {
        let token = random_token(&mut StdRng::seed_from_u64(7));
        let groups: Vec<usize> = token.split('-').map(str::len).collect();
        assert_eq!(groups, [8, 4, 4, 4, 12]);
        assert!(token.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_package() {
        let name = generate("com/example/Widget", "GeneratedClass");
        assert!(name.starts_with("com/example/GeneratedClass"));
        assert_eq!(package_of(&name), "com/example");

        let name = generate("Widget", "GeneratedClass");
        assert!(name.starts_with("GeneratedClass"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = generate_with("p/A", "X", &mut StdRng::seed_from_u64(42));
        let b = generate_with("p/A", "X", &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fresh_names() {
        let names: FxHashSet<String> = (0..1000).map(|_| generate("p/A", "GeneratedClass")).collect();
        assert_eq!(names.len(), 1000);
        assert!(!names.contains("p/A"));
    }
}
