// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    collections::HashMap,
    hash::Hash,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Arbitrary size chosen to pre-allocate the hashmap.
const DEFAULT_SIZE: usize = 64;

//======================================================================================================================
// Structures
//======================================================================================================================

/// This data structure is a general-purpose map between caller-chosen external ids and the internal keys of an arena.
/// External modules address entries by the external id; the map owns the translation and reports collisions to the
/// caller instead of overwriting.
pub struct IdMap<E: Eq + Hash + Copy, I: Copy> {
    /// Map between external and internal ids.
    ids: HashMap<E, I>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<E: Eq + Hash + Copy, I: Copy> IdMap<E, I> {
    /// Retrieve the internal id mapped to this external id, if the mapping exists.
    pub fn get(&self, external_id: &E) -> Option<I> {
        self.ids.get(external_id).copied()
    }

    /// Insert a mapping between a specified external and internal id. Returns the previously mapped internal id if the
    /// external id was already in use; in that case the map is left unchanged.
    pub fn insert(&mut self, external_id: E, internal_id: I) -> Option<I> {
        if let Some(existing) = self.ids.get(&external_id) {
            return Some(*existing);
        }
        self.ids.insert(external_id, internal_id);
        None
    }

    /// Checks whether a mapping exists for this external id.
    pub fn contains(&self, external_id: &E) -> bool {
        self.ids.contains_key(external_id)
    }

    /// Number of mappings currently held.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Checks whether the map holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// A default implementation for the external to internal id map.
impl<E: Eq + Hash + Copy, I: Copy> Default for IdMap<E, I> {
    fn default() -> Self {
        Self {
            ids: HashMap::<E, I>::with_capacity(DEFAULT_SIZE),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
