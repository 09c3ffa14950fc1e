//! Shared-identity relation index.
//!
//! Several installed packages may execute under one shared uid and must
//! therefore share one effective network policy. The index is built once
//! per full rule set so that propagation during a change is O(group size)
//! instead of a linear scan over all rules.

use std::collections::HashMap;

/// Maps a package name to the other package names sharing its uid.
pub struct RelationIndex {
    related: HashMap<String, Vec<String>>,
}

impl RelationIndex {
    /// Build the index from (package name, uid) pairs in one O(n) pass.
    /// Packages whose uid is not shared get no entry.
    pub fn build<'a, I>(packages: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let mut by_uid: HashMap<u32, Vec<&'a str>> = HashMap::new();
        for (package, uid) in packages {
            by_uid.entry(uid).or_default().push(package);
        }

        let mut related = HashMap::new();
        for group in by_uid.values() {
            if group.len() < 2 {
                continue;
            }
            for package in group {
                let others: Vec<String> = group
                    .iter()
                    .filter(|p| *p != package)
                    .map(|p| p.to_string())
                    .collect();
                related.insert(package.to_string(), others);
            }
        }

        Self { related }
    }

    /// Packages that must mirror this package's override changes.
    /// Empty for packages with no shared identity.
    pub fn related_of(&self, package: &str) -> &[String] {
        self.related.get(package).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of packages that belong to a shared-identity group.
    pub fn len(&self) -> usize {
        self.related.len()
    }

    pub fn is_empty(&self) -> bool {
        self.related.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unshared_uids_have_no_relations() {
        let index = RelationIndex::build([("com.a", 1000), ("com.b", 1001)]);
        assert!(index.related_of("com.a").is_empty());
        assert!(index.related_of("com.b").is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_shared_uid_pair_is_symmetric() {
        let index =
            RelationIndex::build([("com.a", 2000), ("com.b", 2000), ("com.c", 3000)]);

        assert_eq!(index.related_of("com.a"), ["com.b"]);
        assert_eq!(index.related_of("com.b"), ["com.a"]);
        assert!(index.related_of("com.c").is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_three_way_group_excludes_self() {
        let index = RelationIndex::build([
            ("com.a", 2000),
            ("com.b", 2000),
            ("com.c", 2000),
        ]);

        for package in ["com.a", "com.b", "com.c"] {
            let related = index.related_of(package);
            assert_eq!(related.len(), 2);
            assert!(!related.contains(&package.to_string()));
        }
    }

    #[test]
    fn test_unknown_package_is_empty() {
        let index = RelationIndex::build([("com.a", 2000), ("com.b", 2000)]);
        assert!(index.related_of("com.zzz").is_empty());
    }
}
