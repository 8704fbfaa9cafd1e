//! Generational handle table backing every host-visible token.
//!
//! # Responsibility
//! - Own parse contexts, objects and pixel buffers in stable slots.
//! - Hand out pointer-sized tokens that can be validated on the way back in.
//!
//! # Invariants
//! - A token is never zero, so it never reads as a null pointer on the host.
//! - The low bits of a token name the resource family; a token minted by one
//!   table never resolves in another.
//! - Removing an entry bumps the slot generation; stale tokens never resolve
//!   to a later occupant of the same slot.

use crate::error::{ExtError, ExtResult, Resource};

const HALF_BITS: u32 = usize::BITS / 2;
const LOW_MASK: usize = (1usize << HALF_BITS) - 1;
const TAG_BITS: u32 = 2;
const TAG_MASK: usize = (1usize << TAG_BITS) - 1;
const INDEX_LIMIT: usize = LOW_MASK >> TAG_BITS;

fn resource_tag(resource: Resource) -> usize {
    match resource {
        Resource::ParseContext => 1,
        Resource::Object => 2,
        Resource::Buffer => 3,
    }
}

fn tagged_resource(tag: usize) -> Option<Resource> {
    match tag {
        1 => Some(Resource::ParseContext),
        2 => Some(Resource::Object),
        3 => Some(Resource::Buffer),
        _ => None,
    }
}

/// Stable reference to one arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    resource: Resource,
    index: u32,
    generation: u32,
}

impl Handle {
    /// Packs the handle into a non-zero pointer-sized token.
    ///
    /// Layout: generation in the high half, slot index above a two-bit
    /// resource tag in the low half.
    pub fn to_token(self) -> usize {
        ((self.generation as usize & LOW_MASK) << HALF_BITS)
            | ((self.index as usize) << TAG_BITS)
            | resource_tag(self.resource)
    }

    /// Unpacks a token produced by [`Handle::to_token`]. Zero and untagged
    /// tokens are rejected.
    pub fn from_token(token: usize) -> Option<Self> {
        let slot = token & LOW_MASK;
        let resource = tagged_resource(slot & TAG_MASK)?;
        Some(Self {
            resource,
            index: (slot >> TAG_BITS) as u32,
            generation: (token >> HALF_BITS) as u32,
        })
    }

    pub fn resource(self) -> Resource {
        self.resource
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot table with free-list reuse and generation checks.
pub struct Arena<T> {
    resource: Resource,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&mut self, value: T) -> ExtResult<Handle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                // Slot index and tag must fit the low half of the token.
                if self.slots.len() >= INDEX_LIMIT || self.slots.len() >= u32::MAX as usize {
                    return Err(ExtError::Exhausted(self.resource));
                }
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;
        Ok(Handle {
            resource: self.resource,
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if !self.owns(handle, slot.generation) {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if handle.resource != self.resource {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if !Self::same_generation(slot.generation, handle.generation) {
            return None;
        }
        slot.value.as_mut()
    }

    /// Removes and returns the value; the handle is dead afterwards.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if handle.resource != self.resource {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if !Self::same_generation(slot.generation, handle.generation) {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Resolves a raw token, failing with `UnknownHandle` for dead tokens.
    pub fn resolve(&self, token: usize) -> ExtResult<Handle> {
        Handle::from_token(token)
            .filter(|handle| self.get(*handle).is_some())
            .ok_or(ExtError::UnknownHandle {
                resource: self.resource,
                token,
            })
    }

    /// Handles of all live entries, in slot order.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Handle {
                resource: self.resource,
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Removes every live entry.
    pub fn drain(&mut self) -> Vec<T> {
        self.handles()
            .into_iter()
            .filter_map(|handle| self.remove(handle))
            .collect()
    }

    fn owns(&self, handle: Handle, generation: u32) -> bool {
        handle.resource == self.resource && Self::same_generation(generation, handle.generation)
    }

    // Tokens only carry the low half of the generation on 32-bit targets.
    fn same_generation(stored: u32, requested: u32) -> bool {
        (stored as usize & LOW_MASK) == (requested as usize & LOW_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::{Arena, Handle};
    use crate::error::{ExtError, Resource};

    #[test]
    fn tokens_are_non_zero_and_round_trip() {
        let mut arena = Arena::new(Resource::Object);
        let handle = arena.insert("a").expect("insert");
        let token = handle.to_token();
        assert_ne!(token, 0);
        assert_eq!(Handle::from_token(token), Some(handle));
        assert_eq!(Handle::from_token(0), None);
    }

    #[test]
    fn removed_handles_go_stale_even_when_slot_is_reused() {
        let mut arena = Arena::new(Resource::Buffer);
        let first = arena.insert(1u8).expect("insert");
        assert_eq!(arena.remove(first), Some(1));
        assert_eq!(arena.remove(first), None);

        let second = arena.insert(2u8).expect("insert");
        assert_ne!(first.to_token(), second.to_token());
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&2));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn resolve_rejects_dead_tokens() {
        let mut arena = Arena::new(Resource::ParseContext);
        let handle = arena.insert(()).expect("insert");
        let token = handle.to_token();
        assert_eq!(arena.resolve(token).expect("live"), handle);
        arena.remove(handle);
        assert_eq!(
            arena.resolve(token).expect_err("dead"),
            ExtError::UnknownHandle {
                resource: Resource::ParseContext,
                token,
            }
        );
    }

    #[test]
    fn tokens_from_another_table_do_not_resolve() {
        let mut parses = Arena::new(Resource::ParseContext);
        let mut objects = Arena::new(Resource::Object);
        let mut buffers = Arena::new(Resource::Buffer);
        let parse = parses.insert(()).expect("parse").to_token();
        let object = objects.insert(()).expect("object").to_token();
        let buffer = buffers.insert(()).expect("buffer").to_token();

        assert_ne!(parse, object);
        assert_ne!(object, buffer);
        assert_ne!(parse, buffer);
        assert_eq!(
            buffers.resolve(object).expect_err("object token"),
            ExtError::UnknownHandle {
                resource: Resource::Buffer,
                token: object,
            }
        );
        assert!(objects.resolve(parse).is_err());
        assert!(parses.resolve(buffer).is_err());

        let foreign = Handle::from_token(object).expect("decodes");
        assert_eq!(foreign.resource(), Resource::Object);
        assert_eq!(buffers.remove(foreign), None);
        assert_eq!(buffers.len(), 1);
    }

    #[test]
    fn untagged_tokens_are_rejected() {
        assert_eq!(Handle::from_token(0b100), None);
        assert_eq!(Handle::from_token(1 << (usize::BITS - 1)), None);
    }

    #[test]
    fn drain_empties_the_table() {
        let mut arena = Arena::new(Resource::Object);
        for value in 0..4 {
            arena.insert(value).expect("insert");
        }
        let mut drained = arena.drain();
        drained.sort();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(arena.is_empty());
    }
}
