//! Named walkthroughs of the binding engine.
//!
//! Every step is checked against the result a script author would expect, so
//! a scenario either produces its full transcript or stops at the first
//! surprise.

use std::collections::BTreeMap;

use strap_bind::strap_rt::{RuntimeError, RuntimeResult, StrapConfig, Value};
use thiserror::Error;
use tracing::{debug, info_span};

use crate::bindings::{MapKey, Person, PointCloud};
use crate::session::{render, Session};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("{step}: expected {expected}, got {got}")]
    Mismatch {
        step: String,
        expected: String,
        got: String,
    },
    #[error("unknown scenario '{0}'")]
    Unknown(String),
}

type Transcript = Result<Vec<String>, ScenarioError>;

pub struct Scenario {
    pub name: &'static str,
    pub about: &'static str,
    body: fn(&mut Session) -> Transcript,
}

impl Scenario {
    /// Runs the scenario in a fresh session.
    pub fn run(&self, config: &StrapConfig) -> Transcript {
        let _span = info_span!("scenario", name = self.name).entered();
        let mut session = Session::new(config)?;
        (self.body)(&mut session)
    }
}

pub fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "average",
            about: "fixed arity and argument errors",
            body: average,
        },
        Scenario {
            name: "erase-key",
            about: "a map parameter written back after the call",
            body: erase_key,
        },
        Scenario {
            name: "plus",
            about: "overload resolution",
            body: plus,
        },
        Scenario {
            name: "person",
            about: "records with methods, dynamic and baked",
            body: person,
        },
        Scenario {
            name: "point-cloud",
            about: "marking data for baking and unbaking it",
            body: point_cloud,
        },
        Scenario {
            name: "scene",
            about: "an object that only exists baked",
            body: scene,
        },
        Scenario {
            name: "linalg",
            about: "bulk dispatch over vectors and matrices",
            body: linalg,
        },
    ]
}

/// Scenarios selected by `name`; `all` selects every one.
pub fn select(name: &str) -> Result<Vec<Scenario>, ScenarioError> {
    let scenarios = all();
    if name == "all" {
        return Ok(scenarios);
    }
    let picked: Vec<Scenario> = scenarios.into_iter().filter(|s| s.name == name).collect();
    if picked.is_empty() {
        return Err(ScenarioError::Unknown(name.to_owned()));
    }
    Ok(picked)
}

// ─── checks ───

fn expect(
    out: &mut Vec<String>,
    step: &str,
    got: &Value,
    expected: &str,
) -> Result<(), ScenarioError> {
    let rendered = render(got);
    debug!(step, result = %rendered);
    if rendered != expected {
        return Err(ScenarioError::Mismatch {
            step: step.to_owned(),
            expected: expected.to_owned(),
            got: rendered,
        });
    }
    out.push(format!("{step} --> {rendered}"));
    Ok(())
}

/// Compares the first line of the error message.
fn expect_err(
    out: &mut Vec<String>,
    step: &str,
    result: RuntimeResult<Value>,
    expected: &str,
) -> Result<(), ScenarioError> {
    let err = match result {
        Ok(v) => {
            return Err(ScenarioError::Mismatch {
                step: step.to_owned(),
                expected: format!("error '{expected}'"),
                got: render(&v),
            })
        }
        Err(e) => e.to_string(),
    };
    let first = err.lines().next().unwrap_or_default();
    debug!(step, error = first);
    if first != expected {
        return Err(ScenarioError::Mismatch {
            step: step.to_owned(),
            expected: format!("error '{expected}'"),
            got: format!("error '{first}'"),
        });
    }
    out.push(format!("{step} --> error: {first}"));
    Ok(())
}

// ─── scenarios ───

fn average(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let r = s.call("average", vec![3.into(), 5.into()])?;
    expect(&mut out, "average(3, 5)", &r, "4")?;
    expect_err(
        &mut out,
        "average(3)",
        s.call("average", vec![3.into()]),
        "Wrong number of arguments. Expected 2, got 1.",
    )?;
    expect_err(
        &mut out,
        "average(3, \"five\")",
        s.call("average", vec![3.into(), "five".into()]),
        "Failed reading argument #2.",
    )?;
    Ok(out)
}

fn erase_key(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let map = s.encode(&BTreeMap::from([
        (MapKey::Text("a".to_owned()), 1.0),
        (MapKey::Int(7), 2.0),
    ]))?;
    expect(&mut out, "map", &map, "{[7] = 2, a = 1}")?;

    let r = s.call("eraseKey", vec![map.clone(), "a".into()])?;
    expect(&mut out, "eraseKey(map, \"a\")", &r, "true")?;
    expect(&mut out, "map", &map, "{[7] = 2}")?;

    let r = s.call("eraseKey", vec![map.clone(), 99.into()])?;
    expect(&mut out, "eraseKey(map, 99)", &r, "false")?;
    expect(&mut out, "map", &map, "{[7] = 2}")?;
    Ok(out)
}

fn plus(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let r = s.call("plus", vec![1.into(), 2.into()])?;
    expect(&mut out, "plus(1, 2)", &r, "3")?;

    let r = s.call("plus", vec!["ab".into(), "cd".into()])?;
    expect(&mut out, "plus(\"ab\", \"cd\")", &r, "\"abcd\"")?;

    let a = s.encode(&vec![1i64, 2])?;
    let b = s.encode(&vec![2i64, 3])?;
    let r = s.call("plus", vec![a, b])?;
    expect(&mut out, "plus({1, 2}, {2, 3})", &r, "{3, 5}")?;

    expect_err(
        &mut out,
        "plus(true, 1)",
        s.call("plus", vec![true.into(), 1.into()]),
        "None of the overloads are compatible with the given arguments. \
         Last attempt: Failed reading argument #1.",
    )?;
    Ok(out)
}

fn person(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let grace = s.encode(&Person {
        name: "Grace".to_owned(),
        age: 45,
    })?;
    let r = s.call("isMature", vec![grace.clone()])?;
    expect(&mut out, "isMature(grace)", &r, "true")?;
    let r = s.call_method(&grace, "greeting", vec![true.into()])?;
    expect(&mut out, "grace:greeting(true)", &r, "\"Good day, Grace.\"")?;

    let tim = s.encode(&Person {
        name: "Tim".to_owned(),
        age: 17,
    })?;
    let r = s.call("isMature", vec![tim.clone()])?;
    expect(&mut out, "isMature(tim)", &r, "false")?;
    let r = s.call("birthday", vec![tim.clone()])?;
    expect(&mut out, "birthday(tim)", &r, "18")?;
    let r = s.call("isMature", vec![tim.clone()])?;
    expect(&mut out, "isMature(tim)", &r, "true")?;

    // Records carry their own conversion hook, so marking bakes them at once.
    let baked = s.mark_for_baking(tim.clone())?;
    expect(&mut out, "baked = markedForBaking(tim)", &baked, "userdata")?;
    let r = s.call("birthday", vec![baked.clone()])?;
    expect(&mut out, "birthday(baked)", &r, "19")?;
    let r = s.call_method(&baked, "greeting", vec![])?;
    expect(&mut out, "baked:greeting()", &r, "\"Hi Tim!\"")?;

    let thawed = s.unbake(baked)?;
    expect(&mut out, "unbaked(baked)", &thawed, "{age = 19, name = \"Tim\"}")?;
    expect(&mut out, "tim", &tim, "{age = 18, name = \"Tim\"}")?;
    Ok(out)
}

fn point_cloud(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let cloud = s.encode(&PointCloud(vec![
        [0.0, 0.0, 0.0],
        [2.0, 0.0, 0.0],
        [1.0, 3.0, 0.0],
    ]))?;
    let r = s.call("centroid", vec![cloud.clone()])?;
    expect(&mut out, "centroid(cloud)", &r, "{1, 1, 0}")?;

    let marked = s.mark_for_baking(cloud.clone())?;
    expect(&mut out, "marked = markedForBaking(cloud)", &marked, "userdata")?;
    let r = s.call("centroid", vec![marked.clone()])?;
    expect(&mut out, "centroid(marked)", &r, "{1, 1, 0}")?;

    let offset = s.encode(&[1.0, 1.0, 1.0])?;
    let r = s.call("translate", vec![marked.clone(), offset])?;
    expect(&mut out, "translate(marked, {1, 1, 1})", &r, "nil")?;
    let r = s.call("centroid", vec![marked.clone()])?;
    expect(&mut out, "centroid(marked)", &r, "{2, 2, 1}")?;

    let thawed = s.unbake(marked)?;
    expect(
        &mut out,
        "unbaked(marked)",
        &thawed,
        "{{1, 1, 1}, {3, 1, 1}, {2, 4, 1}}",
    )?;
    expect(&mut out, "cloud", &cloud, "{{0, 0, 0}, {2, 0, 0}, {1, 3, 0}}")?;

    let empty = s.encode(&PointCloud::default())?;
    expect_err(
        &mut out,
        "centroid({})",
        s.call("centroid", vec![empty]),
        "The point cloud is empty.",
    )?;
    Ok(out)
}

fn scene(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let scene = s.call("newScene", vec![])?;
    expect(&mut out, "scene = newScene()", &scene, "userdata")?;
    s.call_method(&scene, "add", vec!["cube".into()])?;
    s.call_method(&scene, "add", vec!["lamp".into()])?;
    let r = s.call_method(&scene, "count", vec![])?;
    expect(&mut out, "scene:count()", &r, "2")?;
    let r = s.call_method(&scene, "describe", vec![])?;
    expect(&mut out, "scene:describe()", &r, "\"cube, lamp\"")?;
    expect_err(
        &mut out,
        "unbaked(scene)",
        s.unbake(scene),
        "Baked data of type Scene can't be converted to dynamic data.",
    )?;
    Ok(out)
}

fn linalg(s: &mut Session) -> Transcript {
    let mut out = Vec::new();
    let m = s.encode(&vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;

    // The vector is built first and decides which matrix shape fits.
    let v3 = s.encode(&vec![1.0, 2.0, 3.0])?;
    let r = s.call("mul", vec![m.clone(), v3])?;
    expect(&mut out, "mul(m, {1, 2, 3})", &r, "{14, 32}")?;
    let v2 = s.encode(&vec![1.0, 2.0])?;
    let r = s.call("mul", vec![m.clone(), v2])?;
    expect(&mut out, "mul(m, {1, 2})", &r, "{5, 11, 17}")?;

    // Nothing narrows the matrix here; 2x3 is declared first.
    let r = s.call("transpose", vec![m.clone()])?;
    expect(&mut out, "transpose(m)", &r, "{1, 4, 2, 5, 3, 6}")?;

    let v = s.encode(&vec![1.0, 2.0])?;
    let r = s.call("scale", vec![v.clone(), 3.into()])?;
    expect(&mut out, "scale(v, 3)", &r, "nil")?;
    expect(&mut out, "v", &v, "{3, 6}")?;

    let v4 = s.encode(&vec![1.0, 2.0, 3.0, 4.0])?;
    expect_err(
        &mut out,
        "mul(m, {1, 2, 3, 4})",
        s.call("mul", vec![m, v4]),
        "Wrong format of argument #2",
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes_with_the_default_config() {
        let config = StrapConfig::default();
        for scenario in all() {
            let transcript = scenario
                .run(&config)
                .unwrap_or_else(|e| panic!("{} failed: {e}", scenario.name));
            assert!(!transcript.is_empty(), "{} produced no output", scenario.name);
        }
    }

    #[test]
    fn select_by_name() {
        assert_eq!(select("all").unwrap().len(), all().len());
        assert_eq!(select("plus").unwrap()[0].name, "plus");
        assert!(matches!(select("nope"), Err(ScenarioError::Unknown(_))));
    }
}
