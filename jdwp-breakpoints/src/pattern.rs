// Type name patterns
//
// A `*` is only special as the first or last character. Matching is
// case-sensitive and interior `*` characters are literal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "text", rename_all = "snake_case")]
pub enum TypeNamePattern {
    Any,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl TypeNamePattern {
    pub fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return TypeNamePattern::Any;
        }
        let leading = pattern.starts_with('*');
        let trailing = pattern.len() > 1 && pattern.ends_with('*');
        let start = usize::from(leading);
        let end = pattern.len() - usize::from(trailing);
        let text = pattern[start..end].to_string();

        match (leading, trailing) {
            (true, true) => TypeNamePattern::Contains(text),
            (true, false) => TypeNamePattern::Suffix(text),
            (false, true) => TypeNamePattern::Prefix(text),
            (false, false) => TypeNamePattern::Exact(text),
        }
    }

    /// Whether `name` is a wildcard pattern rather than a concrete type name
    pub fn is_pattern(name: &str) -> bool {
        name.starts_with('*') || name.ends_with('*')
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            TypeNamePattern::Any => true,
            TypeNamePattern::Exact(text) => type_name == text,
            TypeNamePattern::Prefix(text) => type_name.starts_with(text.as_str()),
            TypeNamePattern::Suffix(text) => type_name.ends_with(text.as_str()),
            TypeNamePattern::Contains(text) => type_name.contains(text.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_prefix() {
        let p = TypeNamePattern::new("com.foo.*");
        assert!(p.matches("com.foo.Bar"));
        assert!(!p.matches("com.fooBar"));
        assert!(!p.matches("org.com.foo.Bar"));
    }

    #[test]
    fn test_suffix() {
        let p = TypeNamePattern::new("*Test");
        assert!(p.matches("MyTest"));
        assert!(p.matches("com.foo.MyTest"));
        assert!(!p.matches("Testing"));
    }

    #[test]
    fn test_exact() {
        let p = TypeNamePattern::new("com.foo.Bar");
        assert_eq!(p, TypeNamePattern::Exact("com.foo.Bar".to_string()));
        assert!(p.matches("com.foo.Bar"));
        assert!(!p.matches("com.foo.Bar2"));
        assert!(!p.matches("com.foo.bar"));
    }

    #[test]
    fn test_interior_star_is_literal() {
        let p = TypeNamePattern::new("com.*.Bar");
        assert!(!p.matches("com.foo.Bar"));
        assert!(p.matches("com.*.Bar"));
    }

    #[test]
    fn test_any_and_contains() {
        assert!(TypeNamePattern::new("*").matches("anything.At.All"));
        let p = TypeNamePattern::new("*Service*");
        assert!(p.matches("com.foo.ServiceImpl"));
        assert!(!p.matches("com.foo.Servic"));
    }

    #[test]
    fn test_is_pattern() {
        assert!(TypeNamePattern::is_pattern("*Test"));
        assert!(TypeNamePattern::is_pattern("com.foo.*"));
        assert!(!TypeNamePattern::is_pattern("com.foo.Bar"));
        assert!(!TypeNamePattern::is_pattern(""));
    }
}
