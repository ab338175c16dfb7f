//! Type hierarchy resolution.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use changecast_proto::DELIMITER;

use super::def::TypeDef;
use super::registry::TypeSource;
use crate::error::ScanError;

/// Indexed snapshot of the type universe.
struct TypeUniverse {
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
}

impl TypeUniverse {
    fn build(types: Vec<TypeDef>) -> Result<Self, ScanError> {
        let mut index = HashMap::with_capacity(types.len());

        for (position, def) in types.iter().enumerate() {
            if def.name.trim().is_empty() || def.name.contains(DELIMITER) {
                return Err(ScanError::InvalidTypeName(def.name.clone()));
            }
            if index.insert(def.name.clone(), position).is_some() {
                return Err(ScanError::DuplicateType(def.name.clone()));
            }
        }

        for def in &types {
            if let Some(parent) = def.parents.iter().find(|p| !index.contains_key(*p)) {
                return Err(ScanError::UnknownParent {
                    type_name: def.name.clone(),
                    parent: parent.clone(),
                });
            }
        }

        Ok(Self { types, index })
    }

    /// Every transitive supertype of `def`.
    fn ancestors<'a>(&'a self, def: &'a TypeDef) -> Result<HashSet<&'a str>, ScanError> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = def.parents.iter().map(String::as_str).collect();

        while let Some(name) = queue.pop_front() {
            if name == def.name {
                return Err(ScanError::Cycle(def.name.clone()));
            }
            if !seen.insert(name) {
                continue;
            }
            // Parents were validated in build()
            if let Some(&position) = self.index.get(name) {
                queue.extend(self.types[position].parents.iter().map(String::as_str));
            }
        }

        Ok(seen)
    }

    fn concrete_subtypes(&self, base: &str) -> Result<Vec<String>, ScanError> {
        if !self.index.contains_key(base) {
            return Err(ScanError::UnknownType(base.to_string()));
        }

        let mut resolved = Vec::new();
        for def in &self.types {
            let ancestors = self.ancestors(def)?;
            if def.is_concrete() && (def.name == base || ancestors.contains(base)) {
                resolved.push(def.name.clone());
            }
        }
        Ok(resolved)
    }
}

/// A bounded scope in which hierarchy lookups are cached.
///
/// The universe is scanned lazily on the first [`resolve`](Self::resolve)
/// and shared by every later call; results are cached per base type.
/// Dropping the session discards everything, so the next session sees the
/// universe as it is then. Sessions are not shared: each one owns its
/// cache.
pub struct ResolutionSession<'a> {
    source: &'a dyn TypeSource,
    universe: Option<TypeUniverse>,
    cache: HashMap<String, Arc<[String]>>,
    scans: usize,
}

impl<'a> ResolutionSession<'a> {
    /// Open a session over `source`.
    pub fn open(source: &'a dyn TypeSource) -> Self {
        Self {
            source,
            universe: None,
            cache: HashMap::new(),
            scans: 0,
        }
    }

    /// Concrete runtime subtypes of `base`, including `base` itself when it
    /// is concrete.
    ///
    /// Fails with [`ScanError::UnknownType`] when `base` is not part of the
    /// universe, rather than resolving to nothing.
    pub fn resolve(&mut self, base: &str) -> Result<Arc<[String]>, ScanError> {
        if let Some(cached) = self.cache.get(base) {
            return Ok(cached.clone());
        }

        let universe = match self.universe.take() {
            Some(universe) => universe,
            None => {
                self.scans += 1;
                TypeUniverse::build(self.source.scan()?)?
            }
        };
        let resolved = universe.concrete_subtypes(base);
        self.universe = Some(universe);

        let resolved: Arc<[String]> = resolved?.into();
        tracing::trace!(base, subtypes = resolved.len(), "resolved type hierarchy");
        self.cache.insert(base.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Number of times this session scanned the universe.
    pub fn scans(&self) -> usize {
        self.scans
    }

    /// Number of cached base types.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Release the session and its cache.
    pub fn release(self) {
        tracing::trace!(cached = self.cache.len(), "resolution session released");
    }
}
