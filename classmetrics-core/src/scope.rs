//! Scope keys for the four aggregation levels
//!
//! Global invariants enforced:
//! - File identity is (package, file); a file name alone never keys a row
//! - Methods are identified by `"name descriptor"` so overloads stay distinct

use crate::catalog::ScopeKind;
use crate::model::{AnalyzedClass, AnalyzedMethod};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite key addressing one row group in the store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ScopeKey {
    Package {
        package: String,
    },
    File {
        package: String,
        file: String,
    },
    Class {
        package: String,
        file: String,
        class: String,
    },
    Method {
        package: String,
        file: String,
        class: String,
        method: String,
    },
}

impl ScopeKey {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeKey::Package { .. } => ScopeKind::Package,
            ScopeKey::File { .. } => ScopeKind::File,
            ScopeKey::Class { .. } => ScopeKind::Class,
            ScopeKey::Method { .. } => ScopeKind::Method,
        }
    }

    /// Key columns in table order
    pub fn components(&self) -> Vec<&str> {
        match self {
            ScopeKey::Package { package } => vec![package.as_str()],
            ScopeKey::File { package, file } => vec![package.as_str(), file.as_str()],
            ScopeKey::Class {
                package,
                file,
                class,
            } => vec![package.as_str(), file.as_str(), class.as_str()],
            ScopeKey::Method {
                package,
                file,
                class,
                method,
            } => vec![
                package.as_str(),
                file.as_str(),
                class.as_str(),
                method.as_str(),
            ],
        }
    }

    /// Rebuild a key from its columns, as read back from a store
    pub fn from_components(kind: ScopeKind, parts: &[String]) -> Option<ScopeKey> {
        let key = match (kind, parts) {
            (ScopeKind::Package, [package]) => ScopeKey::Package {
                package: package.clone(),
            },
            (ScopeKind::File, [package, file]) => ScopeKey::File {
                package: package.clone(),
                file: file.clone(),
            },
            (ScopeKind::Class, [package, file, class]) => ScopeKey::Class {
                package: package.clone(),
                file: file.clone(),
                class: class.clone(),
            },
            (ScopeKind::Method, [package, file, class, method]) => ScopeKey::Method {
                package: package.clone(),
                file: file.clone(),
                class: class.clone(),
                method: method.clone(),
            },
            _ => return None,
        };
        Some(key)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.components().join(", "))
    }
}

/// Method identity within its class: name and descriptor separated by a space
pub fn method_signature(method: &AnalyzedMethod) -> String {
    format!("{} {}", method.name, method.descriptor)
}

/// The package, file and class keys derived from one analyzed class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassScopes {
    pub package: ScopeKey,
    pub file: ScopeKey,
    pub class: ScopeKey,
}

impl ClassScopes {
    pub fn new(class: &AnalyzedClass) -> Self {
        ClassScopes {
            package: ScopeKey::Package {
                package: class.package_name.clone(),
            },
            file: ScopeKey::File {
                package: class.package_name.clone(),
                file: class.source_file_name.clone(),
            },
            class: ScopeKey::Class {
                package: class.package_name.clone(),
                file: class.source_file_name.clone(),
                class: class.class_name.clone(),
            },
        }
    }
}

/// Key for one method of an analyzed class
pub fn method_key(class: &AnalyzedClass, method: &AnalyzedMethod) -> ScopeKey {
    ScopeKey::Method {
        package: class.package_name.clone(),
        file: class.source_file_name.clone(),
        class: class.class_name.clone(),
        method: method_signature(method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(package: &str, file: &str, name: &str) -> AnalyzedClass {
        AnalyzedClass {
            package_name: package.to_string(),
            source_file_name: file.to_string(),
            class_name: name.to_string(),
            complexity_total: 0,
            lines_total: 0,
            method_count: 0,
            methods: vec![],
        }
    }

    fn method(name: &str, descriptor: &str) -> AnalyzedMethod {
        AnalyzedMethod {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            complexity_total: 1,
            lines_total: 1,
        }
    }

    #[test]
    fn test_keys_for_class() {
        let c = class("pkg", "Foo.java", "pkg/Foo");
        let scopes = ClassScopes::new(&c);
        assert_eq!(scopes.package.components(), vec!["pkg"]);
        assert_eq!(scopes.file.components(), vec!["pkg", "Foo.java"]);
        assert_eq!(scopes.class.components(), vec!["pkg", "Foo.java", "pkg/Foo"]);
    }

    #[test]
    fn test_method_key_uses_name_and_descriptor() {
        let c = class("pkg", "Foo.java", "pkg/Foo");
        let key = method_key(&c, &method("bar", "(I)V"));
        assert_eq!(key.kind(), ScopeKind::Method);
        assert_eq!(key.components()[3], "bar (I)V");
    }

    #[test]
    fn test_overloads_are_distinct() {
        let c = class("pkg", "Foo.java", "pkg/Foo");
        let a = method_key(&c, &method("bar", "(I)V"));
        let b = method_key(&c, &method("bar", "(J)V"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_file_name_in_different_packages() {
        let a = ClassScopes::new(&class("a", "Util.java", "a/Util"));
        let b = ClassScopes::new(&class("b", "Util.java", "b/Util"));
        assert_ne!(a.file, b.file, "file keys must include the package");
    }

    #[test]
    fn test_components_round_trip_through_kind() {
        let c = class("pkg", "Foo.java", "pkg/Foo");
        let key = method_key(&c, &method("bar", "()V"));
        let parts: Vec<String> = key.components().into_iter().map(String::from).collect();
        assert_eq!(ScopeKey::from_components(key.kind(), &parts), Some(key));
        assert_eq!(ScopeKey::from_components(ScopeKind::File, &parts), None);
    }

    #[test]
    fn test_display() {
        let key = ScopeKey::File {
            package: "pkg".to_string(),
            file: "Foo.java".to_string(),
        };
        assert_eq!(key.to_string(), "file(pkg, Foo.java)");
    }
}
