//! Store paths and action labels.
//!
//! A [`Path`] names a store by the route from its root: one component per
//! field, plus an index token for reference arrays and a key token for
//! reference maps (`todos/3/owner`). An [`ActionLabel`] is a path followed by
//! an action name and is the wire format every middleware observes:
//! `"<field>/<field>/ACTION"` below the root, `"ACTION"` at the root.

use std::fmt;

/// Rejected path or label text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
    #[error("invalid path: {message}")]
    InvalidPath { message: String },
}

/// Route from a root store to one of its descendants.
///
/// Components are field names, array indices, or map keys. Paths are used for
/// diagnostics, labels and label-driven navigation, never for store identity.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub components: Vec<String>,
}

impl Path {
    /// The empty path, naming a root store.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string.
    ///
    /// # Path Syntax
    ///
    /// - Components are separated by `/`
    /// - Empty components are ignored (normalizes `//` and trailing `/`)
    /// - A component may not start with `@`; that prefix belongs to action names
    ///
    /// # Examples
    ///
    /// ```rust
    /// use storetree_core::Path;
    ///
    /// let path = Path::parse("todos/3/owner").unwrap();
    /// assert_eq!(path.len(), 3);
    ///
    /// assert_eq!(Path::parse("a/b/").unwrap(), Path::parse("a/b").unwrap());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        Self::try_from_components(
            s.split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Try to create a path from components, validating each.
    pub fn try_from_components(components: Vec<String>) -> Result<Self, PathError> {
        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }
        Ok(Path { components })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let problem = if component.is_empty() {
            "empty component"
        } else if component.contains('/') {
            "component may not contain '/'"
        } else if component.starts_with('@') {
            "'@' prefix is reserved for action names"
        } else {
            return Ok(());
        };
        Err(PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: problem.to_string(),
        })
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Return a new path with one more component.
    #[must_use]
    pub fn child(&self, component: impl Into<String>) -> Path {
        let mut components = self.components.clone();
        components.push(component.into());
        Path { components }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::ops::Index<usize> for Path {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

/// Check whether `s` is a Unicode identifier (UAX#31), as required for
/// field names.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let valid_start = unicode_ident::is_xid_start(first)
        || (first == '_' && chars.clone().next().is_some_and(unicode_ident::is_xid_continue));
    valid_start && chars.all(unicode_ident::is_xid_continue)
}

/// The middleware-visible name of an action: target path plus action name.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ActionLabel {
    pub path: Path,
    pub name: String,
}

impl ActionLabel {
    pub fn new(path: Path, name: impl Into<String>) -> Self {
        Self {
            path,
            name: name.into(),
        }
    }

    /// Parse the wire format `"a/b/ACTION"`.
    ///
    /// Action names are split at the last `/` that precedes the name, so
    /// implicit-write names such as `@todos.push()` survive intact.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let (path, name) = match s.rsplit_once('/') {
            Some((path, name)) => (Path::parse(path)?, name),
            None => (Path::root(), s),
        };
        if name.is_empty() {
            return Err(PathError::InvalidPath {
                message: format!("label '{}' has no action name", s),
            });
        }
        Ok(Self::new(path, name))
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.path, self.name)
        }
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use storetree_core::path;
///
/// let p = path!("todos/0/owner");
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(Path::parse("").unwrap().len(), 0);
        assert_eq!(Path::parse("foo").unwrap().len(), 1);
        assert_eq!(Path::parse("foo/0/bar").unwrap().len(), 3);
    }

    #[test]
    fn normalize_slashes() {
        assert_eq!(
            Path::parse("foo//bar/").unwrap(),
            Path::parse("foo/bar").unwrap()
        );
        assert_eq!(
            Path::parse("/foo/bar").unwrap(),
            Path::parse("foo/bar").unwrap()
        );
    }

    #[test]
    fn map_keys_need_not_be_identifiers() {
        let p = Path::parse("byId/user-42").unwrap();
        assert_eq!(&p[1], "user-42");
    }

    #[test]
    fn reserved_prefix_rejected() {
        let err = Path::parse("foo/@bar").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("title"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("名前"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("_"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("has-dash"));
    }

    #[test]
    fn child_appends_component() {
        let p = path!("a").child("0");
        assert_eq!(p.to_string(), "a/0");
        assert_eq!(&p[1], "0");
    }

    #[test]
    fn label_display() {
        assert_eq!(ActionLabel::new(Path::root(), "RESET").to_string(), "RESET");
        assert_eq!(
            ActionLabel::new(path!("user/address"), "@city").to_string(),
            "user/address/@city"
        );
    }

    #[test]
    fn label_parse() {
        let label = ActionLabel::parse("todos/1/@tags.push()").unwrap();
        assert_eq!(label.path, path!("todos/1"));
        assert_eq!(label.name, "@tags.push()");

        let label = ActionLabel::parse("RESET").unwrap();
        assert!(label.path.is_empty());
        assert_eq!(label.name, "RESET");

        assert!(ActionLabel::parse("todos/").is_err());
    }

    #[test]
    fn component_error_names_position() {
        let err = Path::parse("a/b/@c").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid path component '@c' at position 2: '@' prefix is reserved for action names"
        );
    }
}
