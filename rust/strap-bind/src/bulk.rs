//! Dispatch over families of argument types.
//!
//! A [`BulkFunc`] pairs one [`Builder`] per argument position with the
//! concrete instances of a generic operation, e.g. matrix-vector products
//! for every size pairing. A call builds its arguments one position at a
//! time into a [`Pool`], unambiguous positions first, and only commits to
//! candidate types that still lead to some registered instance given the
//! choices already made. Once every position is built the matching instance
//! runs, its result is pushed and every argument whose type supports emplace
//! is written back.
//!
//! Among the viable candidates of an ambiguous position the first one in
//! the builder's declaration order that reads successfully wins. That rule
//! is deterministic; it is not a statement about which reading is "right".

use std::any::TypeId;
use std::fmt;

use strap_rt::{RuntimeError, State};
use tracing::{debug, trace};

use crate::builder::{BuildContext, BuildOutcome, Builder, TypeKey};
use crate::errors::CallError;
use crate::param::Return;
use crate::pool::{Pool, PoolLayout, SlotIndex};
use crate::traits::Marshal;

/// Most argument positions a bulk function may have.
pub const MAX_BULK_ARGS: usize = 8;

/// A concrete instantiation of a bulk function.
pub trait BulkInstance<Marker>: 'static {
    /// Parameter types in argument order.
    fn signature() -> Vec<TypeKey>;

    fn check_binding();

    /// Runs the instance on the values in `slots`, given in argument order.
    fn invoke(
        &self,
        state: &mut State,
        pool: &mut Pool,
        slots: &[SlotIndex],
    ) -> Result<usize, CallError>;
}

macro_rules! impl_bulk_instance {
    ($($p:ident $i:tt),+) => {
        impl<Func, Ret, $($p,)+> BulkInstance<($($p,)+ Ret,)> for Func
        where
            Func: Fn($(&mut $p),+) -> Ret + 'static,
            Ret: Return,
            $($p: Marshal,)+
        {
            fn signature() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$p>()),+]
            }

            fn check_binding() {
                Ret::check_binding();
            }

            #[allow(non_snake_case)]
            fn invoke(
                &self,
                state: &mut State,
                pool: &mut Pool,
                slots: &[SlotIndex],
            ) -> Result<usize, CallError> {
                $(let $p = pool.slot_ptr::<$p>(slots[$i]);)+
                // SAFETY: every position was built into its own slot, so the
                // pointers are distinct, and the pool outlives the call.
                let result = unsafe { (self)($(&mut *$p),+) };
                result.push_results(state)
            }
        }
    };
}

impl_bulk_instance!(A1 0);
impl_bulk_instance!(A1 0, A2 1);
impl_bulk_instance!(A1 0, A2 1, A3 2);
impl_bulk_instance!(A1 0, A2 1, A3 2, A4 3);
impl_bulk_instance!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_bulk_instance!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_bulk_instance!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_bulk_instance!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);

type Invoke = Box<dyn Fn(&mut State, &mut Pool, &[SlotIndex]) -> Result<usize, CallError>>;

struct Instance {
    signature: Vec<TypeKey>,
    invoke: Invoke,
}

/// Declaration of a bulk function: builders in argument order plus the
/// instances they dispatch to.
#[derive(Default)]
pub struct BulkFunc {
    builders: Vec<Box<dyn Builder>>,
    instances: Vec<Instance>,
}

impl BulkFunc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the builder for the next argument position.
    pub fn builder(mut self, builder: impl Builder) -> Self {
        self.builders.push(Box::new(builder));
        self
    }

    pub fn instance<M, F: BulkInstance<M>>(mut self, f: F) -> Self {
        F::check_binding();
        self.instances.push(Instance {
            signature: F::signature(),
            invoke: Box::new(move |state: &mut State, pool: &mut Pool, slots: &[SlotIndex]| {
                f.invoke(state, pool, slots)
            }),
        });
        self
    }
}

impl fmt::Debug for BulkFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkFunc")
            .field(
                "builders",
                &self.builders.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field(
                "instances",
                &self.instances.iter().map(|i| &i.signature).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// One node per prefix of some instance signature, taken in build order.
#[derive(Debug, Default)]
struct Node {
    children: Vec<(TypeId, usize)>,
    instance: Option<usize>,
}

#[derive(Debug)]
struct Reachability {
    nodes: Vec<Node>,
}

impl Reachability {
    const ROOT: usize = 0;

    fn new() -> Self {
        Reachability {
            nodes: vec![Node::default()],
        }
    }

    fn child(&self, node: usize, id: TypeId) -> Option<usize> {
        self.nodes[node]
            .children
            .iter()
            .find_map(|(child_id, child)| (*child_id == id).then_some(*child))
    }

    fn insert(&mut self, path: impl Iterator<Item = TypeId>, instance: usize) -> Result<(), usize> {
        let mut node = Self::ROOT;
        for id in path {
            node = match self.child(node, id) {
                Some(next) => next,
                None => {
                    self.nodes.push(Node::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.push((id, next));
                    next
                }
            };
        }
        match self.nodes[node].instance {
            Some(existing) => Err(existing),
            None => {
                self.nodes[node].instance = Some(instance);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

struct Dispatcher {
    builders: Vec<Box<dyn Builder>>,
    instances: Vec<Instance>,
    /// Argument positions (0-based) in build order.
    order: Vec<usize>,
    reach: Reachability,
    layout: PoolLayout,
}

impl Dispatcher {
    fn new(bulk: BulkFunc) -> Self {
        let BulkFunc {
            builders,
            instances,
        } = bulk;
        assert!(!builders.is_empty(), "a bulk function needs at least one builder");
        assert!(
            builders.len() <= MAX_BULK_ARGS,
            "a bulk function takes at most {MAX_BULK_ARGS} arguments, got {}",
            builders.len()
        );
        assert!(
            !instances.is_empty(),
            "a bulk function needs at least one instance"
        );

        let order: Vec<usize> = (0..builders.len())
            .filter(|&p| !builders[p].is_ambiguous())
            .chain((0..builders.len()).filter(|&p| builders[p].is_ambiguous()))
            .collect();

        let mut reach = Reachability::new();
        for (index, instance) in instances.iter().enumerate() {
            assert_eq!(
                instance.signature.len(),
                builders.len(),
                "instance {:?} does not take one argument per builder",
                instance.signature
            );
            for (position, key) in instance.signature.iter().enumerate() {
                let builder = &builders[position];
                assert!(
                    builder.possible_types().contains(key),
                    "instance {:?}: {} is not a possible type of builder {} (argument #{})",
                    instance.signature,
                    key.name,
                    builder.name(),
                    position + 1
                );
            }
            let path = order.iter().map(|&p| instance.signature[p].id);
            if let Err(existing) = reach.insert(path, index) {
                panic!(
                    "instances #{existing} and #{index} share the signature {:?}",
                    instance.signature
                );
            }
        }

        let largest: Vec<usize> = builders
            .iter()
            .map(|b| b.possible_types().iter().map(|k| k.size).max().unwrap_or(0))
            .collect();
        let max_align = builders
            .iter()
            .flat_map(|b| b.possible_types().iter().map(|k| k.align))
            .max()
            .unwrap_or(1);
        let layout = PoolLayout::for_positions(&largest, max_align);

        debug!(
            builders = builders.len(),
            instances = instances.len(),
            nodes = reach.nodes.len(),
            capacity = layout.capacity,
            "bulk function registered"
        );
        Dispatcher {
            builders,
            instances,
            order,
            reach,
            layout,
        }
    }

    fn listing(&self, built: &[Option<(TypeKey, SlotIndex)>]) -> Vec<(usize, &'static str)> {
        built
            .iter()
            .enumerate()
            .filter_map(|(p, b)| b.map(|(key, _)| (p + 1, key.name)))
            .collect()
    }

    fn dispatch(&self, state: &mut State) -> Result<usize, CallError> {
        let count = self.builders.len();
        state.set_top(count as i32);

        let mut pool = Pool::new(self.layout);
        let mut built: Vec<Option<(TypeKey, SlotIndex)>> = vec![None; count];
        let mut node = Reachability::ROOT;

        for &position in &self.order {
            let builder = &self.builders[position];
            let idx = position as i32 + 1;
            let children = &self.reach.nodes[node].children;
            let viable = |id: TypeId| children.iter().any(|(child, _)| *child == id);
            match builder.build(state, idx, &mut pool, &BuildContext::new(&viable)) {
                BuildOutcome::Built { key, slot } => {
                    trace!(position = idx, builder = builder.name(), built = key.name, "argument built");
                    built[position] = Some((key, slot));
                    match self.reach.child(node, key.id) {
                        Some(next) => node = next,
                        None => {
                            return Err(CallError::NoOverload {
                                partial: true,
                                args: self.listing(&built),
                            })
                        }
                    }
                }
                BuildOutcome::NoViableType => {
                    trace!(position = idx, builder = builder.name(), "no viable candidate");
                    return Err(CallError::NoOverload {
                        partial: true,
                        args: self.listing(&built),
                    });
                }
                BuildOutcome::WrongFormat => {
                    trace!(position = idx, builder = builder.name(), "argument unreadable");
                    return Err(CallError::WrongFormat {
                        position: idx as usize,
                        builder: builder.name(),
                        arg_type: state.type_name(idx),
                    });
                }
            }
        }

        let Some(instance) = self.reach.nodes[node].instance else {
            return Err(CallError::NoOverload {
                partial: false,
                args: self.listing(&built),
            });
        };
        let mut slots = Vec::with_capacity(count);
        let mut emplacing = Vec::new();
        for (position, entry) in built.iter().enumerate() {
            if let Some((key, slot)) = entry {
                slots.push(*slot);
                if key.supports_emplace() {
                    emplacing.push((position, *key, *slot));
                }
            }
        }
        trace!(instance, "bulk instance selected");

        let pushed = (self.instances[instance].invoke)(state, &mut pool, &slots)?;
        for (position, key, slot) in emplacing {
            key.emplace_from(&pool, slot, state, position as i32 + 1)?;
        }
        Ok(pushed)
    }
}

/// Pushes `bulk` as a runtime function.
///
/// # Panics
/// Panics if the declaration is inconsistent: no builders or instances,
/// more than [`MAX_BULK_ARGS`] positions, an instance whose parameter count
/// or types do not match the builders, or two instances with the same
/// signature.
pub fn push_bulk_func(state: &mut State, bulk: BulkFunc) {
    let dispatcher = Dispatcher::new(bulk);
    state.push_function(move |s: &mut State| dispatcher.dispatch(s).map_err(RuntimeError::from));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SimpleBuilder;
    use strap_rt::Value;

    fn number() -> SimpleBuilder {
        SimpleBuilder::new("Number").with::<i64>().with::<f64>()
    }

    fn describe() -> BulkFunc {
        BulkFunc::new()
            .builder(number())
            .builder(SimpleBuilder::new("Text").with::<String>())
            .instance(|a: &mut i64, b: &mut String| format!("int {a} {b}"))
            .instance(|a: &mut f64, b: &mut String| format!("float {a} {b}"))
    }

    #[test]
    fn order_puts_ambiguous_positions_last() {
        let bulk = BulkFunc::new()
            .builder(SimpleBuilder::ambiguous("A").with::<i64>())
            .builder(SimpleBuilder::new("B").with::<i64>())
            .instance(|a: &mut i64, b: &mut i64| *a + *b);
        let dispatcher = Dispatcher::new(bulk);
        assert_eq!(dispatcher.order, vec![1, 0]);
    }

    #[test]
    fn layout_covers_the_largest_candidates() {
        let dispatcher = Dispatcher::new(describe());
        let string = std::mem::size_of::<String>();
        assert_eq!(dispatcher.layout.max_elements, 2);
        assert_eq!(dispatcher.layout.capacity, 8 + string.div_ceil(8) * 8);
    }

    #[test]
    fn dispatches_on_the_built_types() {
        let mut state = State::new();
        let cases = [
            (Value::Integer(3), "int 3 x"),
            (Value::Number(2.5), "float 2.5 x"),
        ];
        for (arg, expected) in cases {
            push_bulk_func(&mut state, describe());
            state.push(arg);
            state.push("x");
            state.call(2, 1).unwrap();
            assert_eq!(state.to_str(-1).as_deref(), Some(expected));
            state.set_top(0);
        }
    }

    #[test]
    fn unreadable_arguments_name_builder_and_type() {
        let mut state = State::new();
        push_bulk_func(&mut state, describe());
        state.push(1);
        state.push(true);
        let err = state.call(2, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Wrong format of argument #2\nBuilder: Text\nArgument type: boolean\n"
        );
    }

    #[test]
    fn missing_arguments_read_as_nil() {
        let mut state = State::new();
        push_bulk_func(&mut state, describe());
        state.push(1);
        let err = state.call(1, 1).unwrap_err();
        assert!(err.to_string().contains("Argument type: nil"), "{err}");
    }

    #[test]
    #[should_panic(expected = "share the signature")]
    fn duplicate_instances_are_rejected() {
        let bulk = describe().instance(|a: &mut i64, _: &mut String| *a);
        let _ = Dispatcher::new(bulk);
    }

    #[test]
    #[should_panic(expected = "is not a possible type")]
    fn instances_must_match_their_builders() {
        let bulk = BulkFunc::new()
            .builder(SimpleBuilder::new("Int").with::<i64>())
            .instance(|a: &mut f64| *a);
        let _ = Dispatcher::new(bulk);
    }
}
