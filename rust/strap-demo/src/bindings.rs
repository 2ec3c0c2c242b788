//! Host functions and types exposed to the scenarios as globals.

use std::collections::BTreeMap;

use strap_bind::strap_rt::{RuntimeResult, State};
use strap_bind::{
    impl_record, impl_variant, push_bulk_func, push_func, push_overloaded_func, traits, Baked,
    CallError, Caps, Marshal, Methods, Mut, Overloads, Ref,
};

use crate::linalg;

pub fn average(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

// ─── eraseKey ───

/// A map key that is either an integer or a string; integers are tried first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Int(i64),
    Text(String),
}

impl_variant!(MapKey { Int(i64), Text(String) });

pub fn erase_key(mut map: Mut<BTreeMap<MapKey, f64>>, key: MapKey) -> bool {
    map.remove(&key).is_some()
}

pub fn plus() -> Overloads {
    Overloads::new()
        .with(|a: f64, b: f64| a + b)
        .with(|a: String, b: String| a + &b)
        .with(|a: (f64, f64), b: (f64, f64)| (a.0 + b.0, a.1 + b.1))
}

// ─── Person ───

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

fn person_methods(m: &mut Methods<Person>) {
    m.add("greeting", |p: Ref<Person>, formal: Option<bool>| {
        if formal.unwrap_or(false) {
            format!("Good day, {}.", p.name)
        } else {
            format!("Hi {}!", p.name)
        }
    });
}

impl_record!(Person { name, age }, methods = person_methods);

pub fn is_mature(p: Ref<Person>) -> bool {
    p.age >= 18
}

pub fn birthday(mut p: Mut<Person>) -> u32 {
    p.age += 1;
    p.age
}

// ─── PointCloud ───

/// A sequence of `{x, y, z}` points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud(pub Vec<[f64; 3]>);

impl Marshal for PointCloud {
    const CAPS: Caps = Caps::CONTAINER;

    fn type_name() -> &'static str {
        "PointCloud"
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        traits::read::<Vec<[f64; 3]>>(state, idx).map(PointCloud)
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        self.0.emplace(state, idx)
    }
}

pub fn centroid(cloud: Ref<PointCloud>) -> Result<[f64; 3], CallError> {
    if cloud.0.is_empty() {
        return Err(CallError::msg("The point cloud is empty."));
    }
    let mut sum = [0.0; 3];
    for p in &cloud.0 {
        for (s, v) in sum.iter_mut().zip(p) {
            *s += v;
        }
    }
    let n = cloud.0.len() as f64;
    Ok(sum.map(|s| s / n))
}

pub fn translate(mut cloud: Mut<PointCloud>, offset: [f64; 3]) {
    for p in cloud.0.iter_mut() {
        for (v, d) in p.iter_mut().zip(offset) {
            *v += d;
        }
    }
}

// ─── Scene ───

/// Only ever lives baked; scripts hold it as an opaque handle.
#[derive(Debug, Default)]
pub struct Scene {
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
        m.add("describe", |scene: Ref<Scene>| scene.objects.join(", "));
    }
}

fn bind(state: &mut State, name: &str, push: impl FnOnce(&mut State)) {
    push(state);
    state.set_global(name);
}

/// Publishes every demo function as a global.
pub fn register(state: &mut State) {
    bind(state, "average", |s| push_func(s, average));
    bind(state, "eraseKey", |s| push_func(s, erase_key));
    bind(state, "plus", |s| push_overloaded_func(s, plus()));
    bind(state, "isMature", |s| push_func(s, is_mature));
    bind(state, "birthday", |s| push_func(s, birthday));
    bind(state, "centroid", |s| push_func(s, centroid));
    bind(state, "translate", |s| push_func(s, translate));
    bind(state, "newScene", |s| push_func(s, || Baked(Scene::default())));
    bind(state, "mul", |s| push_bulk_func(s, linalg::mul()));
    bind(state, "transpose", |s| push_bulk_func(s, linalg::transpose()));
    bind(state, "scale", |s| push_bulk_func(s, linalg::scale()));
}
