//! Variable bindings and closure snapshots.
//!
//! Globals and frame locals are `Rc<Bindings>` written through
//! `Rc::make_mut`: taking a snapshot is a reference-count bump, and the map
//! is only copied when someone writes to a binding table that a live closure
//! still shares. Capture is by value without a full copy per closure.

use std::rc::Rc;

use ahash::AHashMap;

use super::value::Value;

/// A name → value table.
pub type Bindings = AHashMap<String, Value>;

/// The environment a function value closes over. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct CapturedEnv {
    /// Locals of the frame the function was created in.
    pub locals: Rc<Bindings>,
    /// Snapshot held by that frame's own function, if any.
    pub enclosing: Option<Rc<CapturedEnv>>,
    /// Globals as of creation.
    pub globals: Rc<Bindings>,
}

impl CapturedEnv {
    pub fn new(
        locals: Rc<Bindings>,
        enclosing: Option<Rc<CapturedEnv>>,
        globals: Rc<Bindings>,
    ) -> Self {
        Self {
            locals,
            enclosing,
            globals,
        }
    }

    /// Resolve a name: locals shadow the enclosing snapshot, which shadows
    /// globals. An enclosing snapshot is searched whole, including the
    /// globals it captured, so older captures win over newer globals.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .get(name)
            .or_else(|| self.enclosing.as_deref().and_then(|env| env.lookup(name)))
            .or_else(|| self.globals.get(name))
    }
}

/// Write a binding into a shared table, copying it first if a snapshot
/// still holds it.
pub fn bind(table: &mut Rc<Bindings>, name: &str, value: Value) {
    let map = Rc::make_mut(table);
    if let Some(slot) = map.get_mut(name) {
        *slot = value;
    } else {
        map.insert(name.to_string(), value);
    }
}
