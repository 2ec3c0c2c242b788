//! Baking and unbaking through the script-facing utilities.

use std::cell::Cell;

use strap_bind::data::{self, DataState};
use strap_bind::strap_rt::{RuntimeResult, State, UtilsConfig, Value};
use strap_bind::{
    impl_record, publish_utils, push_func, traits, Baked, Caps, Marshal, Methods, Mut, Ref,
};

thread_local! {
    static CONVERSIONS: Cell<usize> = const { Cell::new(0) };
}

/// A sequence of integers that counts how often it is decoded.
#[derive(Debug, Clone, PartialEq)]
struct Counted(Vec<i64>);

impl Marshal for Counted {
    const CAPS: Caps = Caps::CONTAINER;

    fn type_name() -> &'static str {
        "Counted"
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let values = traits::read::<Vec<i64>>(state, idx)?;
        CONVERSIONS.with(|c| c.set(c.get() + 1));
        Some(Counted(values))
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        self.0.emplace(state, idx)
    }
}

fn conversions() -> usize {
    CONVERSIONS.with(Cell::get)
}

/// State with the utilities published as globals and the table `{1, 2, 3}`
/// at index 1.
fn setup() -> State {
    let mut state = State::new();
    state.new_table();
    publish_utils(&mut state, -1, &UtilsConfig::default()).expect("table is writable");
    state.set_global("utils");
    traits::write(&mut state, &vec![1i64, 2, 3]).unwrap();
    state
}

fn call_util(state: &mut State, name: &str, arg: Value) -> RuntimeResult<Value> {
    state.get_global("utils");
    state.get_field(-1, name)?;
    state.remove(-2);
    state.push(arg);
    state.call(1, 1)?;
    Ok(state.pop_value())
}

fn sum(c: Ref<Counted>) -> i64 {
    c.0.iter().sum()
}

fn call_sum(state: &mut State, arg: Value) -> RuntimeResult<Value> {
    push_func(state, sum);
    state.push(arg);
    state.call(1, 1)?;
    Ok(state.pop_value())
}

#[test]
fn dynamic_reads_convert_every_time() {
    let mut state = setup();
    let table = state.value(1);
    let before = conversions();
    call_sum(&mut state, table.clone()).unwrap();
    call_sum(&mut state, table).unwrap();
    assert_eq!(conversions() - before, 2);
}

#[test]
fn marked_data_converts_once() {
    let mut state = setup();
    let table = state.value(1);
    let marked = call_util(&mut state, "markedForBaking", table).unwrap();
    state.push(marked.clone());
    assert_eq!(data::classify(&state, -1), DataState::PendingBake);
    state.pop(1);

    let before = conversions();
    assert_eq!(call_sum(&mut state, marked.clone()).unwrap().as_integer(), Some(6));
    assert_eq!(call_sum(&mut state, marked.clone()).unwrap().as_integer(), Some(6));
    assert_eq!(conversions() - before, 1);

    state.push(marked);
    assert_eq!(data::classify(&state, -1), DataState::Indirect);
}

#[test]
fn unbaking_returns_editable_data() {
    let mut state = setup();
    let table = state.value(1);
    let marked = call_util(&mut state, "markedForBaking", table).unwrap();
    call_sum(&mut state, marked.clone()).unwrap();

    let thawed = call_util(&mut state, "unbaked", marked).unwrap();
    let t = thawed.as_table().expect("unbaked data is a table").clone();
    t.borrow_mut().set_int(4, Value::Integer(4));
    assert_eq!(call_sum(&mut state, thawed.clone()).unwrap().as_integer(), Some(10));

    let err = call_util(&mut state, "unbaked", thawed).unwrap_err();
    assert_eq!(err.to_string(), "The data is already dynamic.");
}

#[test]
fn marking_twice_is_an_error() {
    let mut state = setup();
    let table = state.value(1);
    let marked = call_util(&mut state, "markedForBaking", table).unwrap();
    let err = call_util(&mut state, "markedForBaking", marked).unwrap_err();
    assert_eq!(err.to_string(), "The data is already marked for baking.");
}

#[test]
fn markers_share_the_baked_object() {
    let mut state = setup();
    let table = state.value(1);
    let marked = call_util(&mut state, "markedForBaking", table).unwrap();

    push_func(&mut state, |mut c: Mut<Counted>| c.0.push(10));
    state.push(marked.clone());
    state.call(1, 0).unwrap();

    assert_eq!(call_sum(&mut state, marked).unwrap().as_integer(), Some(16));
    let original = state.value(1);
    state.push(original);
    assert_eq!(
        traits::read::<Vec<i64>>(&mut state, -1),
        Some(vec![1, 2, 3]),
        "the dynamic original is untouched"
    );
}

// ─── records bake through their hook ───

#[derive(Debug, Clone, PartialEq)]
struct Person {
    name: String,
    age: u32,
}

impl_record!(Person { name, age });

#[test]
fn records_bake_immediately() {
    let mut state = setup();
    traits::write(
        &mut state,
        &Person {
            name: "Ada".into(),
            age: 36,
        },
    )
    .unwrap();
    let record = state.pop_value();
    let baked = call_util(&mut state, "markedForBaking", record).unwrap();
    state.push(baked.clone());
    assert_eq!(data::classify(&state, -1), DataState::Baked);
    state.pop(1);

    let thawed = call_util(&mut state, "unbaked", baked).unwrap();
    state.push(thawed);
    assert_eq!(
        traits::read::<Person>(&mut state, -1).map(|p| p.name),
        Some("Ada".to_owned())
    );
}

// ─── baked-only objects ───

#[derive(Debug, Default)]
struct Scene {
    objects: Vec<String>,
}

impl Marshal for Scene {
    const CAPS: Caps = Caps::OPAQUE;

    fn type_name() -> &'static str {
        "Scene"
    }

    fn methods(m: &mut Methods<Self>) {
        m.add("add", |mut scene: Mut<Scene>, name: String| {
            scene.objects.push(name);
        });
        m.add("count", |scene: Ref<Scene>| scene.objects.len());
    }
}

fn method_call(state: &mut State, object: &Value, name: &str, args: Vec<Value>) -> Value {
    state.push(object.clone());
    state.get_field(-1, name).expect("objects are indexable");
    state.insert(-2);
    let n = args.len() + 1;
    for arg in args {
        state.push(arg);
    }
    state.call(n, 1).expect("method call should succeed");
    state.pop_value()
}

#[test]
fn scenes_exist_only_baked() {
    let mut state = State::new();
    push_func(&mut state, || Baked(Scene::default()));
    state.call(0, 1).unwrap();
    let scene = state.pop_value();

    method_call(&mut state, &scene, "add", vec!["cube".into()]);
    method_call(&mut state, &scene, "add", vec!["lamp".into()]);
    let count = method_call(&mut state, &scene, "count", vec![]);
    assert_eq!(count.as_integer(), Some(2));

    state.push(scene);
    let err = data::to_dynamic(&mut state, -1).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Baked data of type Scene can't be converted to dynamic data."
    );
}

#[test]
fn scenes_cannot_be_read_from_tables() {
    let mut state = State::new();
    push_func(&mut state, |scene: Ref<Scene>| scene.objects.len());
    state.new_table();
    let err = state.call(1, 1).unwrap_err();
    assert_eq!(err.to_string(), "Failed reading argument #1.");
}
