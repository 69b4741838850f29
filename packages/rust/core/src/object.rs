//! Identity, equality and deep-clone contract shared by build entities.

use helpforge_shared::{BuildFormat, ContentGroup, TopicEntry};

/// Common contract for every entity the build passes around.
///
/// `Clone` must produce an independent deep copy: mutating the copy never
/// shows through in the source, and vice versa. `PartialEq` is structural.
pub trait BuildObject: Clone + PartialEq + std::fmt::Debug {
    /// Identity of the object within its owning collection.
    fn key(&self) -> &str;

    /// Whether the object carries enough state to take part in a build.
    fn is_empty(&self) -> bool;
}

impl BuildObject for TopicEntry {
    fn key(&self) -> &str {
        &self.id
    }

    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl BuildObject for ContentGroup {
    fn key(&self) -> &str {
        &self.id
    }

    fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

impl BuildObject for BuildFormat {
    fn key(&self) -> &str {
        &self.name
    }

    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// First object in `items` whose key equals `key`.
pub fn find_by_key<'a, T: BuildObject>(items: &'a [T], key: &str) -> Option<&'a T> {
    items.iter().find(|item| item.key() == key)
}
