//! Builders: per-position families of candidate argument types.

use std::any::TypeId;
use std::fmt;
use std::mem;

use strap_rt::{RuntimeResult, State};

use crate::pool::{Pool, SlotIndex};
use crate::traits::{self, Marshal};

/// A concrete candidate type together with what dispatch needs to know
/// about it at runtime.
#[derive(Clone, Copy)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
    read_into: fn(&mut State, i32, &mut Pool) -> Option<SlotIndex>,
    emplace_from: Option<EmplaceFn>,
}

type EmplaceFn = fn(&Pool, SlotIndex, &mut State, i32) -> RuntimeResult<()>;

fn read_into<T: Marshal>(state: &mut State, idx: i32, pool: &mut Pool) -> Option<SlotIndex> {
    let value = traits::read::<T>(state, idx)?;
    Some(pool.build(value))
}

fn emplace_from<T: Marshal>(
    pool: &Pool,
    slot: SlotIndex,
    state: &mut State,
    idx: i32,
) -> RuntimeResult<()> {
    match pool.get::<T>(slot) {
        Some(value) => traits::emplace(state, value, idx),
        None => Ok(()),
    }
}

impl TypeKey {
    /// # Panics
    /// Panics if `T` cannot be read from dynamic data.
    pub fn of<T: Marshal>() -> Self {
        assert!(
            T::CAPS.is_readable(),
            "{} can't be a builder candidate: it is not readable",
            T::type_name()
        );
        TypeKey {
            id: TypeId::of::<T>(),
            name: T::type_name(),
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
            read_into: read_into::<T>,
            emplace_from: T::CAPS.emplace.then_some(emplace_from::<T> as EmplaceFn),
        }
    }

    /// Reads the argument at `idx` as this type and builds it into `pool`.
    pub fn read_into(&self, state: &mut State, idx: i32, pool: &mut Pool) -> Option<SlotIndex> {
        (self.read_into)(state, idx, pool)
    }

    pub fn supports_emplace(&self) -> bool {
        self.emplace_from.is_some()
    }

    /// Emplaces the value in `slot` back into the argument at `idx`. Types
    /// without emplace support are left alone.
    pub fn emplace_from(
        &self,
        pool: &Pool,
        slot: SlotIndex,
        state: &mut State,
        idx: i32,
    ) -> RuntimeResult<()> {
        match self.emplace_from {
            Some(emplace) => emplace(pool, slot, state, idx),
            None => Ok(()),
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What a builder tells the dispatcher it may commit to.
pub struct BuildContext<'a> {
    viable: &'a dyn Fn(TypeId) -> bool,
}

impl<'a> BuildContext<'a> {
    pub fn new(viable: &'a dyn Fn(TypeId) -> bool) -> Self {
        BuildContext { viable }
    }

    /// Whether building `key` here still leaves at least one instance
    /// callable with the choices already made.
    pub fn leads_anywhere(&self, key: &TypeKey) -> bool {
        (self.viable)(key.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { key: TypeKey, slot: SlotIndex },
    /// None of the candidates leads to a callable instance.
    NoViableType,
    /// Some candidates were viable but the argument reads as none of them.
    WrongFormat,
}

/// A family of candidate types for one argument position.
pub trait Builder: 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    fn possible_types(&self) -> &[TypeKey];

    /// One dynamic shape may read as several candidates.
    fn is_ambiguous(&self) -> bool;

    fn build(
        &self,
        state: &mut State,
        idx: i32,
        pool: &mut Pool,
        ctx: &BuildContext<'_>,
    ) -> BuildOutcome;
}

/// Tries the candidates in declaration order and commits to the first viable
/// one the argument reads as. There is no backtracking once a candidate has
/// been built.
pub struct SimpleBuilder {
    name: &'static str,
    types: Vec<TypeKey>,
    ambiguous: bool,
}

impl SimpleBuilder {
    pub fn new(name: &'static str) -> Self {
        SimpleBuilder {
            name,
            types: Vec::new(),
            ambiguous: false,
        }
    }

    /// A builder whose candidates overlap in shape, built after all
    /// unambiguous ones.
    pub fn ambiguous(name: &'static str) -> Self {
        SimpleBuilder {
            ambiguous: true,
            ..Self::new(name)
        }
    }

    pub fn with<T: Marshal>(mut self) -> Self {
        let key = TypeKey::of::<T>();
        assert!(
            !self.types.contains(&key),
            "{} is listed twice in builder {}",
            key.name,
            self.name
        );
        self.types.push(key);
        self
    }
}

impl Builder for SimpleBuilder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn possible_types(&self) -> &[TypeKey] {
        &self.types
    }

    fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    fn build(
        &self,
        state: &mut State,
        idx: i32,
        pool: &mut Pool,
        ctx: &BuildContext<'_>,
    ) -> BuildOutcome {
        let mut any_viable = false;
        for key in self.types.iter().filter(|k| ctx.leads_anywhere(k)) {
            any_viable = true;
            if let Some(slot) = key.read_into(state, idx, pool) {
                return BuildOutcome::Built { key: *key, slot };
            }
        }
        if any_viable {
            BuildOutcome::WrongFormat
        } else {
            BuildOutcome::NoViableType
        }
    }
}

impl fmt::Debug for SimpleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleBuilder")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("ambiguous", &self.ambiguous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolLayout;

    fn builder() -> SimpleBuilder {
        SimpleBuilder::new("Number").with::<i64>().with::<f64>()
    }

    fn pool() -> Pool {
        Pool::new(PoolLayout::for_positions(&[8], 8))
    }

    #[test]
    fn commits_to_the_first_candidate_that_reads() {
        let mut state = State::new();
        state.push(2.5);
        let mut pool = pool();
        let all = |_: TypeId| true;
        let outcome = builder().build(&mut state, 1, &mut pool, &BuildContext::new(&all));
        let BuildOutcome::Built { key, slot } = outcome else {
            panic!("expected a build, got {outcome:?}");
        };
        assert_eq!(key.name, "f64");
        assert_eq!(pool.get::<f64>(slot), Some(&2.5));
    }

    #[test]
    fn skips_candidates_that_lead_nowhere() {
        let mut state = State::new();
        state.push(3);
        let mut pool = pool();
        let floats_only = |id: TypeId| id == TypeId::of::<f64>();
        let outcome = builder().build(&mut state, 1, &mut pool, &BuildContext::new(&floats_only));
        assert!(matches!(outcome, BuildOutcome::Built { key, .. } if key.name == "f64"));
    }

    #[test]
    fn distinguishes_wrong_format_from_no_viable_type() {
        let mut state = State::new();
        state.push("text");
        let mut pool = pool();
        let all = |_: TypeId| true;
        let none = |_: TypeId| false;
        assert_eq!(
            builder().build(&mut state, 1, &mut pool, &BuildContext::new(&all)),
            BuildOutcome::WrongFormat
        );
        assert_eq!(
            builder().build(&mut state, 1, &mut pool, &BuildContext::new(&none)),
            BuildOutcome::NoViableType
        );
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "listed twice")]
    fn duplicate_candidates_are_rejected() {
        let _ = SimpleBuilder::new("Twice").with::<i64>().with::<i64>();
    }
}
