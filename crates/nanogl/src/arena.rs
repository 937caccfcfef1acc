//! Id-indexed storage for resources owned by the facade.
//!
//! Slots are never reused: once an id has been handed out it names exactly
//! one resource for the lifetime of the arena, so id equality is identity.

use std::fmt;
use std::marker::PhantomData;

/// Index-backed resource id.
pub trait ArenaId: Copy + Eq + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! arena_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl ArenaId for $name {
                #[inline]
                fn from_index(index: usize) -> Self {
                    Self(index as u32)
                }

                #[inline]
                fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

arena_id! {
    /// Handle to a [`Program`](crate::program::Program).
    ProgramId,
    /// Handle to a [`VertexBuffer`](crate::buffer::VertexBuffer).
    BufferId,
    /// Handle to a [`Texture`](crate::texture::Texture) (2D or cubemap).
    TextureId,
    /// Handle to a [`Framebuffer`](crate::framebuffer::Framebuffer).
    FramebufferId,
    /// Handle to a [`VertexArray`](crate::vertex_array::VertexArray).
    VertexArrayId,
}

/// Append-only slot storage. Removal empties the slot; the id stays retired.
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    _id: PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), _id: PhantomData }
    }

    /// Id the next insertion will receive.
    #[inline]
    pub fn next_id(&self) -> I {
        I::from_index(self.slots.len())
    }

    /// Inserts a value built from its own id.
    pub fn insert_with(&mut self, build: impl FnOnce(I) -> T) -> I {
        let id = self.next_id();
        self.slots.push(Some(build(id)));
        id
    }

    /// Fallible [`insert_with`](Self::insert_with). Nothing is inserted on error
    /// and the id is not consumed.
    pub fn try_insert_with<E>(&mut self, build: impl FnOnce(I) -> Result<T, E>) -> Result<I, E> {
        let id = self.next_id();
        let value = build(id)?;
        self.slots.push(Some(value));
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T: fmt::Debug> fmt::Debug for Arena<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let mut arena: Arena<BufferId, &str> = Arena::new();
        let a = arena.insert_with(|_| "a");
        let b = arena.insert_with(|_| "b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn builder_sees_its_own_id() {
        let mut arena: Arena<TextureId, TextureId> = Arena::new();
        let id = arena.insert_with(|id| id);
        assert_eq!(arena.get(id), Some(&id));
    }

    #[test]
    fn failed_insert_keeps_next_id() {
        let mut arena: Arena<BufferId, u8> = Arena::new();
        let err: Result<BufferId, &str> = arena.try_insert_with(|_| Err("no"));
        assert!(err.is_err());
        assert!(arena.is_empty());

        let ok: Result<BufferId, &str> = arena.try_insert_with(|_| Ok(7));
        assert_eq!(ok.map(ArenaId::index), Ok(0));
    }

    #[test]
    fn removed_slot_is_not_reused() {
        let mut arena: Arena<ProgramId, u8> = Arena::new();
        let a = arena.insert_with(|_| 1);
        assert_eq!(arena.remove(a), Some(1));
        assert!(arena.get(a).is_none());

        let b = arena.insert_with(|_| 2);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 1);
    }
}
