//! Resource handles

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Kind of a materialized resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Mesh,
    Font,
    Material,
}

/// Type-erased pool slot reference; stale once the slot is destroyed and
/// reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub index: u32,
    pub generation: u32,
}

/// Typed handle to a resource in a [`ResourceManager`](super::ResourceManager)
pub struct Handle<T> {
    id: ResourceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self { id, _marker: PhantomData }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle<{}>({}v{})",
            std::any::type_name::<T>().rsplit("::").next().unwrap_or("?"),
            self.id.index,
            self.id.generation
        )
    }
}

impl<T> From<Handle<T>> for ResourceId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}
