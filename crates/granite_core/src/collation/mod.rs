use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Locale-aware comparison policy for strings.
///
/// The collator is owned by the surrounding engine's configuration context
/// and injected into the operators as a shared handle; operators never
/// construct or free one themselves.
///
/// Comparison and hashing both derive from [`comparison_key`], which keeps
/// collated equality, ordering, and hashing mutually consistent by
/// construction: strings with the same comparison key are equal, order
/// equal, and hash identically.
///
/// [`comparison_key`]: Collator::comparison_key
pub trait Collator: Debug + Send + Sync {
    /// Normalized form of `s` under this collation.
    fn comparison_key<'a>(&self, s: &'a str) -> Cow<'a, str>;

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.comparison_key(a).cmp(&self.comparison_key(b))
    }

    fn eq(&self, a: &str, b: &str) -> bool {
        self.comparison_key(a) == self.comparison_key(b)
    }
}

/// Collation that ignores case, normalizing to lowercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveCollator;

impl Collator for CaseInsensitiveCollator {
    fn comparison_key<'a>(&self, s: &'a str) -> Cow<'a, str> {
        if s.chars().any(|c| c.is_uppercase()) {
            Cow::Owned(s.to_lowercase())
        } else {
            Cow::Borrowed(s)
        }
    }
}
